//! # Query Engine
//!
//! Turns a flat byte offset into a structured "what is really here" answer:
//! given an address, the engine locates the owning allocation unit, then
//! descends the unit's canonical descriptor, composite member by composite
//! member and array element by array element, until a primitive, an opaque
//! type, or padding stops it. The traversal path comes back as a chain of
//! member names and element indexes, which is the diagnostic payload
//! ("member `x` of struct `s2` at byte 4").
//!
//! A residual offset past a descriptor's known size is not a traversal bug;
//! it is the signal this system exists to produce. It means the memory is
//! being viewed through a type that does not fit; see
//! [`crate::AlloscopeError::OffsetOutOfBounds`].

use std::fmt;

use crate::error::{AlloscopeError, AlloscopeResult};
use crate::registry::TypeRegistry;
use crate::shadow::UnitInfo;
use crate::types::{TypeId, TypeKind};

/// Maximum structural descent depth.
///
/// Deeper nesting stops the walk and reports the last matched descriptor
/// rather than recursing without bound through degenerate tables.
const MAX_DESCENT_DEPTH: usize = 64;

/// One step of the traversal path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment
{
    /// Descended into a composite member (`None` for anonymous members)
    Member(Option<String>),
    /// Descended into an array element with this index
    Element(u64),
}

impl fmt::Display for PathSegment
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            PathSegment::Member(Some(name)) => write!(f, ".{name}"),
            PathSegment::Member(None) => f.write_str(".<anon>"),
            PathSegment::Element(index) => write!(f, "[{index}]"),
        }
    }
}

/// Answer to a point query.
#[derive(Debug, Clone)]
pub struct QueryResult
{
    /// The allocation unit owning the queried address
    pub unit: UnitInfo,
    /// Deepest matched canonical descriptor; `None` when the unit is untyped
    /// (a valid, common state; the result is then "unknown at this offset")
    pub ty: Option<TypeId>,
    /// Residual byte offset within the deepest descriptor (or within the
    /// unit, when untyped)
    pub offset: u64,
    /// Member/element chain traversed from the unit's descriptor down
    pub path: Vec<PathSegment>,
}

impl QueryResult
{
    /// Render the traversal path (e.g. `.inner[150].x`).
    #[must_use]
    pub fn path_string(&self) -> String
    {
        self.path.iter().map(ToString::to_string).collect()
    }
}

/// Descend `ty` by `offset` bytes, resolving members and array elements.
///
/// Returns the deepest matched descriptor, the residual offset within it,
/// and the traversal path. Stops cleanly on padding, unknown element sizes,
/// and non-structural kinds; fails with `OffsetOutOfBounds` when the offset
/// does not fit the descriptor it is being viewed through.
pub(crate) fn descend(
    registry: &TypeRegistry,
    ty: TypeId,
    offset: u64,
) -> AlloscopeResult<(TypeId, u64, Vec<PathSegment>)>
{
    let mut current = ty;
    let mut offset = offset;
    let mut path = Vec::new();

    for _ in 0..MAX_DESCENT_DEPTH {
        let Some(descriptor) = registry.descriptor(current) else {
            // Descriptor retired mid-walk (cannot happen under the context's
            // locking, but a clean stop beats a stale answer).
            return Ok((current, offset, path));
        };

        if let Some(size) = descriptor.size {
            if offset >= size {
                return Err(AlloscopeError::OffsetOutOfBounds {
                    type_name: descriptor.name.clone(),
                    size,
                    offset,
                });
            }
        }

        match descriptor.kind {
            TypeKind::Struct | TypeKind::Union => {
                let Some(member) = containing_member(registry, descriptor, offset) else {
                    // Padding between members: the composite itself is the
                    // deepest meaningful answer.
                    return Ok((current, offset, path));
                };
                path.push(PathSegment::Member(member.name.clone()));
                offset -= member.offset;
                current = member.ty;
            }
            TypeKind::Array => {
                let Some(element) = descriptor.element else {
                    return Ok((current, offset, path));
                };
                let Some(element_size) = registry.descriptor(element).and_then(|e| e.size).filter(|&s| s > 0)
                else {
                    // Array of an incomplete type: no way to index into it.
                    return Ok((current, offset, path));
                };
                let index = offset / element_size;
                if let Some(count) = descriptor.element_count {
                    if index >= count {
                        return Err(AlloscopeError::OffsetOutOfBounds {
                            type_name: descriptor.name.clone(),
                            size: element_size.saturating_mul(count),
                            offset,
                        });
                    }
                }
                path.push(PathSegment::Element(index));
                offset %= element_size;
                current = element;
            }
            TypeKind::Primitive
            | TypeKind::Pointer
            | TypeKind::Subrange
            | TypeKind::Function
            | TypeKind::Opaque => break,
        }
    }

    Ok((current, offset, path))
}

/// The member of `descriptor` whose byte range contains `offset`.
///
/// Struct members are ordered and non-overlapping, so the last member
/// starting at or before the offset is the only candidate. Union members all
/// overlap; the first one (declaration order) that contains the offset wins,
/// which keeps the answer deterministic.
fn containing_member<'a>(
    registry: &TypeRegistry,
    descriptor: &'a crate::types::TypeDescriptor<TypeId>,
    offset: u64,
) -> Option<&'a crate::types::Member<TypeId>>
{
    let member_size = |member: &crate::types::Member<TypeId>| registry.descriptor(member.ty).and_then(|d| d.size);

    if descriptor.kind == TypeKind::Union {
        return descriptor.members.iter().find(|member| {
            offset >= member.offset
                && member_size(member).is_none_or(|size| offset - member.offset < size)
        });
    }

    let candidate = descriptor
        .members
        .iter()
        .rev()
        .find(|member| member.offset <= offset)?;
    match member_size(candidate) {
        // Unknown member size: extend to the end of the composite.
        None => Some(candidate),
        Some(size) if offset - candidate.offset < size => Some(candidate),
        Some(_) => None,
    }
}
