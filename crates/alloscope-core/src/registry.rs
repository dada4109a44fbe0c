//! # Cross-Component Resolver
//!
//! Guarantees that semantically identical types, independently emitted into
//! separate components, share one canonical descriptor instance, so type
//! equality reduces to [`TypeId`] equality.
//!
//! Canonical descriptors live in an arena addressed by stable index
//! ([`TypeId`]); self-reference is an index, never an owning reference, so
//! recursive type graphs carry no ownership cycles. The registry maps each
//! type's structural [`IdentityKey`] to its canonical slot: the first
//! component to register a key donates the canonical descriptor, later
//! components merely map their local indexes onto it.
//!
//! All state is owned by the enclosing [`crate::Alloscope`] context; there
//! is no process-global registry, so isolated instances coexist in tests.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use tracing::{debug, warn};

use crate::component::{ComponentId, ComponentRecord};
use crate::error::{AlloscopeError, AlloscopeResult};
use crate::table::DescriptorTable;
use crate::types::{TypeDescriptor, TypeId, TypeInfo, TypeKind, TypeRef};

/// Structural identity key of a type.
///
/// A content hash over name, kind, size, member layout, and (recursively)
/// member types' keys. Two descriptors with equal keys denote the same
/// logical type regardless of which component emitted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey(u64);

/// Injected fallback for [`TypeRegistry::resolve`].
///
/// Consulted only after the named component's table and the process-wide
/// registry both miss, letting hosts plug in their own dynamic-lookup model
/// without the core depending on one.
pub type ResolveHook = dyn Fn(ComponentId, &str) -> Option<TypeId> + Send + Sync;

struct Slot
{
    descriptor: TypeDescriptor<TypeId>,
    key: IdentityKey,
    owner: ComponentId,
    live: bool,
}

/// Canonical descriptor arena plus the per-component records.
///
/// Interior to [`crate::Alloscope`]; mutation happens under the context's
/// write lock, and new canonical slots are fully filled in before the
/// component record that references them is published.
pub(crate) struct TypeRegistry
{
    arena: Vec<Slot>,
    canonical: HashMap<IdentityKey, TypeId>,
    components: HashMap<ComponentId, ComponentRecord>,
    next_component: u32,
    resolve_hook: Option<Box<ResolveHook>>,
}

impl TypeRegistry
{
    pub(crate) fn new() -> Self
    {
        TypeRegistry {
            arena: Vec::new(),
            canonical: HashMap::new(),
            components: HashMap::new(),
            next_component: 0,
            resolve_hook: None,
        }
    }

    pub(crate) fn set_resolve_hook(&mut self, hook: Box<ResolveHook>)
    {
        self.resolve_hook = Some(hook);
    }

    /// Register a freshly parsed table as a new component.
    ///
    /// For every local descriptor: an already-registered identity key maps
    /// the local index onto the existing canonical slot (the local copy
    /// becomes dead weight); a new key makes the local descriptor *become*
    /// the canonical instance, with its member references rewritten from
    /// local indexes to canonical ids. The rewrite is two-pass so mutually
    /// recursive descriptors resolve each other.
    pub(crate) fn load_component(&mut self, name: String, table: DescriptorTable) -> ComponentId
    {
        let id = ComponentId(self.next_component);
        self.next_component += 1;

        let keys = identity_keys(&table);
        let mut local_to_canonical = Vec::with_capacity(table.len());
        let mut fresh = Vec::new();

        for (local, descriptor) in table.descriptors() {
            let key = keys[local.index()];
            match self.canonical.get(&key) {
                Some(&existing) => {
                    let slot = &self.arena[existing.index()];
                    if !layout_matches(&slot.descriptor, descriptor) {
                        // Same key, different layout: either build skew or a
                        // hash collision. First-loaded wins; recoverable.
                        warn!(
                            component = %name,
                            type_name = %descriptor.name,
                            canonical = %existing,
                            "layout mismatch for identical type identity; keeping first-loaded descriptor"
                        );
                    }
                    local_to_canonical.push(existing);
                }
                None => {
                    let canonical_id = TypeId(self.arena.len() as u32);
                    self.arena.push(Slot {
                        descriptor: placeholder_descriptor(),
                        key,
                        owner: id,
                        live: true,
                    });
                    self.canonical.insert(key, canonical_id);
                    local_to_canonical.push(canonical_id);
                    fresh.push(local);
                }
            }
        }

        for local in fresh {
            let descriptor = table
                .get(local)
                .map(|descriptor| descriptor.map_refs(|r| local_to_canonical[r.index()]));
            if let Some(descriptor) = descriptor {
                self.arena[local_to_canonical[local.index()].index()].descriptor = descriptor;
            }
        }

        debug!(component = %name, id = %id, descriptors = table.len(), "component loaded");

        self.components.insert(
            id,
            ComponentRecord {
                id,
                name,
                table,
                local_to_canonical,
            },
        );
        id
    }

    /// Remove a component, re-homing or retiring its canonical descriptors.
    ///
    /// A canonical slot the departing component donated stays alive if any
    /// remaining component also provides its key (ownership transfers);
    /// otherwise the slot is tombstoned and its id returned so the shadow
    /// map can drop the now-dangling type assignments.
    pub(crate) fn unload_component(&mut self, id: ComponentId) -> AlloscopeResult<Vec<TypeId>>
    {
        let record = self
            .components
            .remove(&id)
            .ok_or(AlloscopeError::ComponentNotFound(id.as_u32()))?;

        let mut dead = Vec::new();
        for (index, slot) in self.arena.iter_mut().enumerate() {
            if !slot.live || slot.owner != id {
                continue;
            }
            let canonical_id = TypeId(index as u32);
            // Tables are self-contained, so any component still mapping onto
            // this slot can adopt it wholesale.
            let adopter = self
                .components
                .values()
                .filter(|candidate| candidate.local_to_canonical.contains(&canonical_id))
                .map(ComponentRecord::id)
                .min();
            match adopter {
                Some(new_owner) => slot.owner = new_owner,
                None => {
                    slot.live = false;
                    self.canonical.remove(&slot.key);
                    dead.push(canonical_id);
                }
            }
        }

        debug!(component = %record.name, id = %id, retired = dead.len(), "component unloaded");
        Ok(dead)
    }

    /// Canonical descriptor equal to the one named `name` in `component`.
    ///
    /// The lookup order is: the named component's own table, then every
    /// other loaded component in load order, then the injected hook. The
    /// registry is always the single source of truth: there is no
    /// component-local fallback path, which is what makes two components
    /// observing the "same" type agree by construction.
    pub(crate) fn resolve(&self, component: ComponentId, name: &str) -> AlloscopeResult<TypeId>
    {
        let record = self
            .components
            .get(&component)
            .ok_or(AlloscopeError::ComponentNotFound(component.as_u32()))?;

        if let Some(local) = record.table.index_of_name(name) {
            return Ok(record.local_to_canonical[local.index()]);
        }

        let mut others: Vec<&ComponentRecord> = self.components.values().collect();
        others.sort_by_key(|candidate| candidate.id);
        for candidate in others {
            if let Some(local) = candidate.table.index_of_name(name) {
                return Ok(candidate.local_to_canonical[local.index()]);
            }
        }

        if let Some(hook) = &self.resolve_hook {
            if let Some(id) = hook(component, name) {
                if self.descriptor(id).is_some() {
                    return Ok(id);
                }
            }
        }

        Err(AlloscopeError::TypeNotFound(name.to_string()))
    }

    /// Live canonical descriptor behind `id`.
    pub(crate) fn descriptor(&self, id: TypeId) -> Option<&TypeDescriptor<TypeId>>
    {
        self.arena
            .get(id.index())
            .filter(|slot| slot.live)
            .map(|slot| &slot.descriptor)
    }

    pub(crate) fn type_info(&self, id: TypeId) -> Option<TypeInfo>
    {
        self.descriptor(id)
            .map(|descriptor| TypeInfo::from_descriptor(id, descriptor))
    }

    pub(crate) fn component(&self, id: ComponentId) -> Option<&ComponentRecord>
    {
        self.components.get(&id)
    }

    pub(crate) fn component_count(&self) -> usize
    {
        self.components.len()
    }

    pub(crate) fn canonical_count(&self) -> usize
    {
        self.arena.iter().filter(|slot| slot.live).count()
    }
}

fn placeholder_descriptor() -> TypeDescriptor<TypeId>
{
    TypeDescriptor {
        name: String::new(),
        kind: TypeKind::Opaque,
        size: None,
        members: Vec::new(),
        element: None,
        element_count: None,
        params: Vec::new(),
    }
}

/// Shallow layout comparison for skew detection.
///
/// Deep equality is already implied by key equality unless the hash lied;
/// comparing the directly observable layout catches both build skew and the
/// (astronomically unlikely) collision without another recursive walk.
fn layout_matches(canonical: &TypeDescriptor<TypeId>, local: &TypeDescriptor<TypeRef>) -> bool
{
    canonical.name == local.name
        && canonical.kind == local.kind
        && canonical.size == local.size
        && canonical.element_count == local.element_count
        && canonical.members.len() == local.members.len()
        && canonical.params.len() == local.params.len()
        && canonical
            .members
            .iter()
            .zip(&local.members)
            .all(|(a, b)| a.offset == b.offset && a.name == b.name)
}

/// Maximum descent depth for identity hashing.
///
/// Structures deeper than this hash a truncation marker instead of
/// recursing further; identical structures truncate identically, so key
/// equality is preserved.
const MAX_KEY_DEPTH: usize = 64;

/// Compute the identity key of every descriptor in a table.
///
/// The hash covers name, kind, size, element count, member offsets/names,
/// and recursively the referenced descriptors. A reference back to a
/// descriptor currently on the DFS stack hashes as a placeholder carrying
/// the relative stack depth ("a self-reference is a placeholder equal to
/// itself"), so recursive types get stable, position-independent keys.
/// Acyclic subresults are memoized (lowlink-style), keeping the walk linear.
pub(crate) fn identity_keys(table: &DescriptorTable) -> Vec<IdentityKey>
{
    let mut memo: Vec<Option<u64>> = vec![None; table.len()];
    let mut on_stack: HashMap<usize, usize> = HashMap::new();
    (0..table.len())
        .map(|index| {
            let (key, _lowlink) = key_of(table, index, 0, &mut on_stack, &mut memo);
            IdentityKey(key)
        })
        .collect()
}

/// Returns the key plus the shallowest stack depth the subtree referenced.
fn key_of(
    table: &DescriptorTable,
    index: usize,
    depth: usize,
    on_stack: &mut HashMap<usize, usize>,
    memo: &mut Vec<Option<u64>>,
) -> (u64, usize)
{
    if let Some(key) = memo[index] {
        return (key, usize::MAX);
    }
    if let Some(&entry_depth) = on_stack.get(&index) {
        // Back-reference into the current path: hash the relative distance
        // so structurally identical cycles hash identically wherever the
        // walk entered them.
        let mut hasher = DefaultHasher::new();
        0xB0B5_u16.hash(&mut hasher);
        (depth - entry_depth).hash(&mut hasher);
        return (hasher.finish(), entry_depth);
    }
    if depth >= MAX_KEY_DEPTH {
        let mut hasher = DefaultHasher::new();
        0xDEEB_u16.hash(&mut hasher);
        return (hasher.finish(), usize::MAX);
    }

    let Some(descriptor) = table.get(TypeRef(index as u32)) else {
        return (0, usize::MAX);
    };

    on_stack.insert(index, depth);

    let mut hasher = DefaultHasher::new();
    descriptor.name.hash(&mut hasher);
    descriptor.kind.hash(&mut hasher);
    descriptor.size.hash(&mut hasher);
    descriptor.element_count.hash(&mut hasher);
    descriptor.members.len().hash(&mut hasher);
    for member in &descriptor.members {
        member.offset.hash(&mut hasher);
        member.name.hash(&mut hasher);
    }
    descriptor.params.len().hash(&mut hasher);

    let mut lowlink = usize::MAX;
    for child in descriptor.references() {
        let (child_key, child_low) = key_of(table, child.index(), depth + 1, on_stack, memo);
        child_key.hash(&mut hasher);
        lowlink = lowlink.min(child_low);
    }

    on_stack.remove(&index);
    let key = hasher.finish();
    // Only memoize keys that didn't depend on a node still on the stack;
    // those are positional and must be recomputed per entry point.
    if lowlink >= depth {
        memo[index] = Some(key);
    }
    (key, lowlink)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::table::TableBuilder;

    fn linked_list_table() -> DescriptorTable
    {
        let mut builder = TableBuilder::new();
        let int32 = builder.primitive("int$32", 4);
        let node = TypeRef(2);
        let node_ptr = builder.pointer("node*", node);
        builder.strukt("node", 16, &[(0, "value", int32), (8, "next", node_ptr)]);
        builder.build("fixture").unwrap()
    }

    #[test]
    fn identical_tables_hash_identically()
    {
        let a = identity_keys(&linked_list_table());
        let b = identity_keys(&linked_list_table());
        assert_eq!(a, b);
    }

    #[test]
    fn key_is_independent_of_table_position()
    {
        // Same primitive, different index in each table.
        let mut first = TableBuilder::new();
        first.primitive("int$32", 4);
        let first = first.build("a").unwrap();

        let mut second = TableBuilder::new();
        second.primitive("char$8", 1);
        second.primitive("int$32", 4);
        let second = second.build("b").unwrap();

        assert_eq!(identity_keys(&first)[0], identity_keys(&second)[1]);
    }

    #[test]
    fn layout_changes_the_key()
    {
        let mut a = TableBuilder::new();
        let int32 = a.primitive("int$32", 4);
        a.strukt("s", 4, &[(0, "x", int32)]);
        let a = a.build("a").unwrap();

        let mut b = TableBuilder::new();
        let int64 = b.primitive("int$64", 8);
        b.strukt("s", 8, &[(0, "x", int64)]);
        let b = b.build("b").unwrap();

        assert_ne!(identity_keys(&a)[1], identity_keys(&b)[1]);
    }

    #[test]
    fn recursive_types_terminate_and_match()
    {
        let keys_a = identity_keys(&linked_list_table());
        let keys_b = identity_keys(&linked_list_table());
        // The cyclic pair (struct and its pointer) must both be stable.
        assert_eq!(keys_a[1], keys_b[1]);
        assert_eq!(keys_a[2], keys_b[2]);
        // And the cycle must not collapse the two descriptors together.
        assert_ne!(keys_a[1], keys_a[2]);
    }
}
