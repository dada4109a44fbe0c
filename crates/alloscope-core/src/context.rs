//! # Alloscope Context
//!
//! The context object tying the subsystems together: per-component
//! descriptor tables, the canonical type registry, the allocation shadow
//! map, and the query engine.
//!
//! One [`Alloscope`] instance is one isolated introspection universe. The
//! host process typically owns a single long-lived instance and hands it to
//! its component loader and allocation instrumentation; tests create as many
//! independent instances as they like. Nothing in the crate is global.
//!
//! ## Lifecycle
//!
//! 1. Create a context: `Alloscope::new()`
//! 2. Load components as the loader maps them:
//!    [`Alloscope::load_component_file`] / [`Alloscope::load_component_bytes`]
//! 3. Mirror allocator events: [`Alloscope::notify_alloc`],
//!    [`Alloscope::assign_type`], [`Alloscope::notify_free`]
//! 4. Ask questions: [`Alloscope::query`], [`Alloscope::resolve_canonical`]
//! 5. Unload components as the loader unmaps them:
//!    [`Alloscope::unload_component`]
//!
//! ## Thread Safety
//!
//! The context is `Send + Sync` and is safe to share behind an `Arc`.
//! Mutations (loads, unloads, allocation events) serialize on internal
//! `RwLock`s; queries take read locks only. New state is fully built before
//! it is published under the lock, so a concurrent query sees either the
//! state before a mutation or after it, never a half-inserted unit or a
//! partially resolved descriptor. Unload takes both write locks, so a query
//! in flight completes against the pre-unload state or fails cleanly with
//! `UntrackedAddress`/an untyped result, never against freed descriptors.

use std::path::Path;
use std::sync::RwLock;

use crate::component::{self, ComponentId};
use crate::error::{AlloscopeError, AlloscopeResult};
use crate::query::{self, QueryResult};
use crate::registry::TypeRegistry;
use crate::shadow::{ShadowMap, UnitId, UnitInfo};
use crate::table::DescriptorTable;
use crate::types::{Address, TypeId, TypeInfo};

/// Counters for instrumentation heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats
{
    /// Loaded components
    pub components: usize,
    /// Live canonical descriptors
    pub canonical_types: usize,
    /// Live allocation units
    pub live_units: usize,
}

/// One isolated introspection universe.
///
/// See the [module documentation](self) for the lifecycle and threading
/// story.
pub struct Alloscope
{
    // Lock order: registry before shadow, always.
    registry: RwLock<TypeRegistry>,
    shadow: RwLock<ShadowMap>,
}

impl Default for Alloscope
{
    fn default() -> Self
    {
        Alloscope::new()
    }
}

impl Alloscope
{
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self
    {
        Alloscope {
            registry: RwLock::new(TypeRegistry::new()),
            shadow: RwLock::new(ShadowMap::new()),
        }
    }

    // ----- component lifecycle -------------------------------------------

    /// Load a component from an object file on disk.
    ///
    /// Extracts the embedded descriptor section (ELF `.alloscope_types` or
    /// Mach-O `__alloscope_types`), parses it, and registers every
    /// descriptor with the canonical registry. The component name is the
    /// file stem.
    ///
    /// This is the only blocking I/O in the core.
    ///
    /// ## Errors
    ///
    /// - `Io` / `InvalidArgument` if the file cannot be read or parsed as an
    ///   object
    /// - `MalformedTable` if the section is absent or corrupt
    /// - `UnsupportedFormatVersion` for sections from a newer toolchain
    ///
    /// A failure here poisons nothing: previously loaded components remain
    /// fully usable.
    pub fn load_component_file(&self, path: &Path) -> AlloscopeResult<ComponentId>
    {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = component::read_section_from_file(&name, path)?;
        self.load_component_bytes(&name, &bytes)
    }

    /// Load a component from raw descriptor-section bytes.
    ///
    /// The path tests and embedded callers use; semantics are identical to
    /// [`Alloscope::load_component_file`] minus the object-file extraction.
    pub fn load_component_bytes(&self, name: &str, bytes: &[u8]) -> AlloscopeResult<ComponentId>
    {
        let table = DescriptorTable::parse(name, bytes)?;
        let mut registry = self.registry.write().unwrap();
        Ok(registry.load_component(name.to_string(), table))
    }

    /// Unload a component.
    ///
    /// Canonical descriptors it donated are re-homed to another component
    /// that provides the same type, or retired when no component does.
    /// Allocation units typed by a retired descriptor revert to untyped in
    /// the same critical section; a concurrent query observes the pre- or
    /// post-unload state, nothing in between.
    ///
    /// ## Errors
    ///
    /// - `ComponentNotFound` if the id is unknown or already unloaded
    pub fn unload_component(&self, id: ComponentId) -> AlloscopeResult<()>
    {
        let mut registry = self.registry.write().unwrap();
        let mut shadow = self.shadow.write().unwrap();
        let retired = registry.unload_component(id)?;
        shadow.invalidate_types(&retired);
        Ok(())
    }

    /// Name of a loaded component.
    pub fn component_name(&self, id: ComponentId) -> Option<String>
    {
        let registry = self.registry.read().unwrap();
        registry.component(id).map(|record| record.name().to_string())
    }

    // ----- type resolution ------------------------------------------------

    /// The canonical descriptor equal to the one named `name` in `component`.
    ///
    /// This is the cross-component type-equality primitive: two calls that
    /// return the same [`TypeId`] denote the same logical type, whichever
    /// components they went through. The lookup always consults the shared
    /// registry, never a component-local fallback.
    ///
    /// ## Errors
    ///
    /// - `ComponentNotFound` for a stale component id
    /// - `TypeNotFound` if no loaded component provides the name;
    ///   recoverable, retry after more components load
    pub fn resolve_canonical(&self, component: ComponentId, name: &str) -> AlloscopeResult<TypeId>
    {
        let registry = self.registry.read().unwrap();
        registry.resolve(component, name)
    }

    /// Plain-data snapshot of a canonical descriptor.
    ///
    /// Returns `None` for retired descriptors (their component was unloaded
    /// and nothing re-homed them).
    pub fn type_info(&self, id: TypeId) -> Option<TypeInfo>
    {
        let registry = self.registry.read().unwrap();
        registry.type_info(id)
    }

    /// Install the fallback resolution hook.
    ///
    /// Consulted by [`Alloscope::resolve_canonical`] only after the named
    /// component's table and the whole registry both miss, letting hosts
    /// bolt on their own dynamic-lookup model (a symbol-table walk, a
    /// remote service) without the core depending on one.
    pub fn set_resolve_hook<F>(&self, hook: F)
    where
        F: Fn(ComponentId, &str) -> Option<TypeId> + Send + Sync + 'static,
    {
        let mut registry = self.registry.write().unwrap();
        registry.set_resolve_hook(Box::new(hook));
    }

    // ----- allocation events ---------------------------------------------

    /// Register a new, untyped allocation unit.
    ///
    /// Called by the allocation instrumentation on every tracked allocation.
    ///
    /// ## Errors
    ///
    /// - `OverlapViolation` if the range intersects a live unit (an
    ///   instrumentation bug: double registration or a missed free); the
    ///   call is rejected and the prior unit wins
    /// - `InvalidArgument` for zero-extent or wrapping ranges
    pub fn notify_alloc(&self, base: Address, extent: u64) -> AlloscopeResult<UnitId>
    {
        let mut shadow = self.shadow.write().unwrap();
        shadow.notify_alloc(base, extent)
    }

    /// Destroy an allocation unit.
    ///
    /// All future queries in its former range miss until a new unit is
    /// registered there, and the freed id is permanently stale.
    ///
    /// ## Errors
    ///
    /// - `StaleUnit` on double free or an id from a previous tenant
    pub fn notify_free(&self, id: UnitId) -> AlloscopeResult<()>
    {
        let mut shadow = self.shadow.write().unwrap();
        shadow.notify_free(id)
    }

    /// Set or overwrite a unit's type.
    ///
    /// Re-typing is ordinary and idempotent; `None` returns the unit to the
    /// untyped state. Extent-versus-size mismatches are deliberately not
    /// validated here; the query engine reports them when they matter.
    ///
    /// ## Errors
    ///
    /// - `StaleUnit` if the unit has been freed
    pub fn assign_type(&self, id: UnitId, ty: Option<TypeId>) -> AlloscopeResult<()>
    {
        let mut shadow = self.shadow.write().unwrap();
        shadow.assign_type(id, ty)
    }

    /// Current type of a unit.
    ///
    /// The read instrumentation uses to decide whether re-typing is needed.
    ///
    /// ## Errors
    ///
    /// - `StaleUnit` if the unit has been freed
    pub fn unit_type(&self, id: UnitId) -> AlloscopeResult<Option<TypeId>>
    {
        let shadow = self.shadow.read().unwrap();
        shadow.unit_type(id)
    }

    /// Which unit, if any, contains `address`.
    pub fn find_unit(&self, address: Address) -> Option<UnitInfo>
    {
        let shadow = self.shadow.read().unwrap();
        shadow.find_unit(address)
    }

    // ----- queries --------------------------------------------------------

    /// Resolve an address into (type, offset, path).
    ///
    /// Finds the owning unit, then descends its descriptor: composite
    /// members by containing byte range, arrays by element index. The result
    /// carries the deepest matched descriptor, the residual offset within
    /// it, and the traversal path.
    ///
    /// An untyped unit yields a result with `ty: None`: clearly "unknown",
    /// never a guess. The core does not fabricate types for memory it has
    /// not observed being typed.
    ///
    /// ## Errors
    ///
    /// - `UntrackedAddress` if no live unit contains the address (the
    ///   common, expected miss)
    /// - `OffsetOutOfBounds` if the offset does not fit the descriptor it is
    ///   viewed through; the type-confusion diagnostic
    pub fn query(&self, address: Address) -> AlloscopeResult<QueryResult>
    {
        let registry = self.registry.read().unwrap();
        let shadow = self.shadow.read().unwrap();

        let unit = shadow
            .find_unit(address)
            .ok_or(AlloscopeError::UntrackedAddress(address))?;
        let Some(offset) = address.offset_from(unit.base) else {
            return Err(AlloscopeError::UntrackedAddress(address));
        };

        let Some(ty) = unit.ty else {
            return Ok(QueryResult {
                unit,
                ty: None,
                offset,
                path: Vec::new(),
            });
        };

        let (deepest, residual, path) = query::descend(&registry, ty, offset)?;
        Ok(QueryResult {
            unit,
            ty: Some(deepest),
            offset: residual,
            path,
        })
    }

    /// Snapshot of a unit by handle, if still live.
    pub fn unit_info(&self, id: UnitId) -> Option<UnitInfo>
    {
        let shadow = self.shadow.read().unwrap();
        shadow.unit_info(id)
    }

    /// Current counters.
    pub fn stats(&self) -> Stats
    {
        let registry = self.registry.read().unwrap();
        let shadow = self.shadow.read().unwrap();
        Stats {
            components: registry.component_count(),
            canonical_types: registry.canonical_count(),
            live_units: shadow.live_units(),
        }
    }
}
