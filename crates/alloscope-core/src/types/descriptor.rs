//! Runtime type descriptors ("uniqtypes").
//!
//! A [`TypeDescriptor`] describes the layout of one type: its kind, size,
//! and (for composites) an ordered member list. Descriptors never reference
//! each other by owning pointers; all references are stable indexes, either
//! [`TypeRef`] (into one component's local table) or [`TypeId`] (into the
//! process-wide canonical arena). Self-referential types (a struct holding a
//! pointer to itself) are therefore just an index pointing back at the same
//! slot, with no ownership cycle to manage.

use std::fmt;

/// What shape of type a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind
{
    /// Base machine type: integer, float, bool, char
    Primitive,
    /// Pointer to a pointee descriptor
    Pointer,
    /// Fixed or unknown-length array of an element descriptor
    Array,
    /// Struct: ordered, non-overlapping members
    Struct,
    /// Union: members share offset zero (overlap is legal)
    Union,
    /// Restricted range of a base descriptor (e.g. a bounded integer)
    Subrange,
    /// Function signature: return descriptor plus parameter descriptors
    Function,
    /// Incomplete or unknown type; size may be absent
    Opaque,
}

impl TypeKind
{
    /// Whether this kind carries a member list.
    pub const fn is_composite(self) -> bool
    {
        matches!(self, TypeKind::Struct | TypeKind::Union)
    }

    /// Whether this kind carries an element/pointee reference.
    pub const fn has_element(self) -> bool
    {
        matches!(self, TypeKind::Pointer | TypeKind::Array | TypeKind::Subrange | TypeKind::Function)
    }
}

impl fmt::Display for TypeKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            TypeKind::Primitive => "primitive",
            TypeKind::Pointer => "pointer",
            TypeKind::Array => "array",
            TypeKind::Struct => "struct",
            TypeKind::Union => "union",
            TypeKind::Subrange => "subrange",
            TypeKind::Function => "function",
            TypeKind::Opaque => "opaque",
        };
        f.write_str(label)
    }
}

/// Index of a descriptor within one component's local table.
///
/// Only meaningful relative to the table it came from; the resolver maps it
/// to a process-wide [`TypeId`] at component load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef(pub u32);

impl TypeRef
{
    /// Slot index into the owning table.
    pub const fn index(self) -> usize
    {
        self.0 as usize
    }
}

/// Stable handle to a canonical descriptor in the process-wide arena.
///
/// Two `TypeId`s compare equal exactly when they denote the same canonical
/// descriptor, so `==` on `TypeId` is the fast type-equality test the whole
/// resolver exists to provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId
{
    pub(crate) const fn index(self) -> usize
    {
        self.0 as usize
    }
}

impl fmt::Display for TypeId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "type#{}", self.0)
    }
}

/// One member of a composite descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member<R>
{
    /// Byte offset from the start of the enclosing composite
    pub offset: u64,
    /// Member name, if the source had one (padding and anonymous members don't)
    pub name: Option<String>,
    /// Descriptor of the member's own type
    pub ty: R,
}

/// Layout description of one type.
///
/// Generic over the reference type `R` so the same shape serves both the
/// immutable per-component tables (`TypeDescriptor<TypeRef>`) and the
/// canonical arena (`TypeDescriptor<TypeId>`).
///
/// Field use by kind:
/// - composites carry `members` (offsets non-decreasing; overlapping only
///   for unions)
/// - `Pointer`/`Array`/`Subrange` carry `element` (pointee, element, base)
/// - `Array` may carry `element_count` (absent for unknown-length arrays)
/// - `Function` carries `element` (return type) and `params`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor<R>
{
    /// Source-level name ("s2", "int$32"); may be empty for synthesized types
    pub name: String,
    /// Kind discriminator
    pub kind: TypeKind,
    /// Size in bytes; `None` for incomplete types
    pub size: Option<u64>,
    /// Ordered member list (composites only)
    pub members: Vec<Member<R>>,
    /// Element / pointee / base / return descriptor
    pub element: Option<R>,
    /// Element count for fixed-length arrays
    pub element_count: Option<u64>,
    /// Parameter descriptors (function signatures only)
    pub params: Vec<R>,
}

impl<R: Copy> TypeDescriptor<R>
{
    /// Every descriptor reference this descriptor makes, in a fixed order.
    ///
    /// Used by the identity hash and the local-to-canonical rewrite; the
    /// order must be deterministic so structurally equal descriptors visit
    /// their children identically.
    pub(crate) fn references(&self) -> impl Iterator<Item = R> + '_
    {
        self.element
            .into_iter()
            .chain(self.members.iter().map(|member| member.ty))
            .chain(self.params.iter().copied())
    }

    /// Rebuild this descriptor with every reference mapped through `f`.
    pub(crate) fn map_refs<T, F>(&self, mut f: F) -> TypeDescriptor<T>
    where
        F: FnMut(R) -> T,
    {
        TypeDescriptor {
            name: self.name.clone(),
            kind: self.kind,
            size: self.size,
            members: self
                .members
                .iter()
                .map(|member| Member {
                    offset: member.offset,
                    name: member.name.clone(),
                    ty: f(member.ty),
                })
                .collect(),
            element: self.element.map(&mut f),
            element_count: self.element_count,
            params: self.params.iter().map(|param| f(*param)).collect(),
        }
    }
}

/// Caller-facing snapshot of a canonical descriptor.
///
/// A plain-data copy handed out by lookups so callers can render diagnostics
/// without holding any registry lock. Member and element references are
/// canonical [`TypeId`]s and can be resolved into further snapshots.
#[derive(Debug, Clone)]
pub struct TypeInfo
{
    /// Canonical handle of this descriptor
    pub id: TypeId,
    /// Source-level name
    pub name: String,
    /// Kind discriminator
    pub kind: TypeKind,
    /// Size in bytes, if known
    pub size: Option<u64>,
    /// Members with canonical type handles
    pub members: Vec<Member<TypeId>>,
    /// Element / pointee / base / return handle
    pub element: Option<TypeId>,
    /// Element count for fixed-length arrays
    pub element_count: Option<u64>,
    /// Parameter handles (function signatures)
    pub params: Vec<TypeId>,
}

impl TypeInfo
{
    pub(crate) fn from_descriptor(id: TypeId, descriptor: &TypeDescriptor<TypeId>) -> Self
    {
        TypeInfo {
            id,
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            size: descriptor.size,
            members: descriptor.members.clone(),
            element: descriptor.element,
            element_count: descriptor.element_count,
            params: descriptor.params.clone(),
        }
    }
}
