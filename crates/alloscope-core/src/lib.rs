//! # alloscope-core
//!
//! Runtime introspection of memory allocations: given an arbitrary address,
//! answer "what type of object lives here, and how large is it?" without the
//! program having been written with that question in mind.
//!
//! The crate is two tightly coupled halves:
//!
//! - **Type identity**: per-component descriptor tables (extracted from
//!   debug metadata at build time) are unified at load time so that the same
//!   logical type is one canonical descriptor process-wide; type equality
//!   becomes [`types::TypeId`] equality, whichever component asks.
//! - **Allocation mapping**: a page-bucketed shadow map associates live
//!   memory regions with their current canonical descriptor and answers
//!   point queries in expected O(1); the query engine then descends the
//!   descriptor to name the exact member or array element at the address.
//!
//! Everything hangs off an explicit [`Alloscope`] context; there is no
//! global state, so isolated instances coexist freely (tests rely on this).
//! The core owns no threads, performs no I/O outside component loads, and
//! never dereferences the addresses it tracks; it reports information, and
//! callers decide what to do with it.

pub mod component;
pub mod context;
pub mod error;
pub mod query;
pub mod registry;
pub mod shadow;
pub mod table;
pub mod types;

pub use component::ComponentId;
pub use context::{Alloscope, Stats};
// Re-export commonly used types
pub use error::{AlloscopeError, AlloscopeResult};
pub use query::{PathSegment, QueryResult};
pub use shadow::{UnitId, UnitInfo};
pub use table::{DescriptorTable, TableBuilder};
pub use types::{Address, TypeId, TypeInfo, TypeKind};
