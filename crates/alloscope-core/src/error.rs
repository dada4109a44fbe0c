//! # Error Types
//!
//! General error handling for the introspection core.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

use crate::types::Address;

/// Main error type for introspection operations
///
/// Each variant corresponds to a specific failure mode of the core. The
/// variants fall into three groups with very different severities:
///
/// 1. **Table errors**: `MalformedTable`, `UnsupportedFormatVersion`. Fatal
///    for the component being loaded, harmless for everything already loaded.
/// 2. **Caller bugs**: `OverlapViolation`, `StaleUnit`, `InvalidArgument`.
///    The offending call is rejected, prior state wins.
/// 3. **Expected outcomes**: `UntrackedAddress`, `TypeNotFound`,
///    `OffsetOutOfBounds`. "No information" and "type confusion detected"
///    are ordinary query results, not faults. Callers are expected to match
///    on these rather than bail.
#[derive(Error, Debug)]
pub enum AlloscopeError
{
    /// The component's descriptor section is absent, truncated, or internally
    /// inconsistent (e.g. a member references an out-of-range descriptor index).
    ///
    /// Self-referential cycles between composite descriptors are *not*
    /// malformed; recursive types produce them routinely.
    #[error("malformed descriptor table in `{component}`: {reason}")]
    MalformedTable
    {
        /// Name of the component whose table failed to parse
        component: String,
        /// What exactly was wrong with the bytes
        reason: String,
    },

    /// The descriptor section was written by a newer toolchain than this
    /// reader understands.
    ///
    /// Old readers must fail here rather than silently misparse newer
    /// formats, so this is checked before anything past the header is read.
    #[error("unsupported descriptor format version {found} (supported: <= {supported})")]
    UnsupportedFormatVersion
    {
        /// Version found in the section header
        found: u16,
        /// Highest version this reader understands
        supported: u16,
    },

    /// `notify_alloc` was called with a range that intersects a live unit.
    ///
    /// This is an instrumentation bug (double registration, missed free).
    /// The new registration is rejected and the prior unit wins.
    #[error("allocation [{base}, +{extent}) overlaps live unit at {existing}")]
    OverlapViolation
    {
        /// Base of the rejected registration
        base: Address,
        /// Extent of the rejected registration
        extent: u64,
        /// Base of the already-live unit it collided with
        existing: Address,
    },

    /// No loaded component provides a descriptor with the requested name.
    ///
    /// Recoverable: a future component load may provide it, so callers may
    /// retry after more components arrive.
    #[error("no loaded component provides type `{0}`")]
    TypeNotFound(String),

    /// The queried address is not inside any live allocation unit.
    ///
    /// This is the common case for most of the address space and is not an
    /// error in the exceptional sense; it simply means "no information".
    #[error("no live allocation unit contains {0}")]
    UntrackedAddress(Address),

    /// The residual offset fell outside the descriptor's known size during
    /// query descent.
    ///
    /// This legitimately happens when an object is accessed through an
    /// unrelated pointer, which is exactly the type confusion this core
    /// exists to detect. The payload is the diagnostic.
    #[error("offset {offset} is out of bounds for `{type_name}` (size {size})")]
    OffsetOutOfBounds
    {
        /// Name of the descriptor whose bounds were exceeded
        type_name: String,
        /// Known size of that descriptor in bytes
        size: u64,
        /// Offending residual offset in bytes
        offset: u64,
    },

    /// The given component id does not name a loaded component
    ///
    /// Either it was never loaded or it has since been unloaded.
    #[error("component {0} is not loaded")]
    ComponentNotFound(u32),

    /// The unit id refers to an allocation that has been freed (or was never
    /// registered).
    ///
    /// Generational ids guarantee a stale handle can never alias a recycled
    /// slot, so this is always reported instead of touching the wrong unit.
    #[error("allocation unit handle is stale or unknown")]
    StaleUnit,

    /// Invalid argument passed to a core function
    ///
    /// Examples:
    /// - Zero-extent or address-wrapping allocation ranges
    /// - A component file that cannot be parsed as an object at all
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error while reading a component file from disk
    ///
    /// Table loads at component-load time are the only blocking point in the
    /// core; nothing on a query path performs I/O.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, AlloscopeError>`
///
/// ```rust
/// use alloscope_core::error::AlloscopeResult;
/// fn foo() -> AlloscopeResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type AlloscopeResult<T> = std::result::Result<T, AlloscopeError>;
