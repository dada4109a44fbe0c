//! Descriptor section encoder.
//!
//! [`TableBuilder`] is the reference writer for the packed format in
//! [`super::format`]: the build-time extraction tooling links against it, and
//! tests use it to assemble fixture components without hand-packing bytes.
//! Forward references are allowed: [`TableBuilder::next_ref`] hands out the
//! index the next push will receive, which is how self-referential types
//! (e.g. a struct containing a pointer to itself) are expressed.

use std::collections::HashMap;

use crate::error::AlloscopeResult;
use crate::types::{Member, TypeDescriptor, TypeKind, TypeRef};

use super::format::{self, kind_codes};
use super::DescriptorTable;

/// Incremental builder for a descriptor section.
#[derive(Default)]
pub struct TableBuilder
{
    descriptors: Vec<TypeDescriptor<TypeRef>>,
}

impl TableBuilder
{
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self
    {
        TableBuilder { descriptors: Vec::new() }
    }

    /// The index the next pushed descriptor will receive.
    ///
    /// Indexes are assigned sequentially, so forward references (including
    /// the mutual struct/pointer reference a recursive type needs) can be
    /// computed before the descriptors exist:
    ///
    /// ```rust
    /// use alloscope_core::table::TableBuilder;
    /// use alloscope_core::types::TypeRef;
    ///
    /// // struct node { struct node *next; }: the struct lands at index 0,
    /// // the pointer at index 1, and each references the other.
    /// let mut builder = TableBuilder::new();
    /// assert_eq!(builder.next_ref(), TypeRef(0));
    /// let node = builder.strukt("node", 8, &[(0, "next", TypeRef(1))]);
    /// let next_ptr = builder.pointer("node*", node);
    /// assert_eq!(next_ptr, TypeRef(1));
    /// let table = builder.build("fixture").unwrap();
    /// assert_eq!(table.len(), 2);
    /// ```
    pub fn next_ref(&self) -> TypeRef
    {
        TypeRef(self.descriptors.len() as u32)
    }

    /// Append an arbitrary descriptor.
    pub fn push(&mut self, descriptor: TypeDescriptor<TypeRef>) -> TypeRef
    {
        let index = self.next_ref();
        self.descriptors.push(descriptor);
        index
    }

    /// Append a primitive of the given byte size.
    pub fn primitive(&mut self, name: &str, size: u64) -> TypeRef
    {
        self.push(TypeDescriptor {
            name: name.to_string(),
            kind: TypeKind::Primitive,
            size: Some(size),
            members: Vec::new(),
            element: None,
            element_count: None,
            params: Vec::new(),
        })
    }

    /// Append an opaque (incomplete) type with no known size.
    pub fn opaque(&mut self, name: &str) -> TypeRef
    {
        self.push(TypeDescriptor {
            name: name.to_string(),
            kind: TypeKind::Opaque,
            size: None,
            members: Vec::new(),
            element: None,
            element_count: None,
            params: Vec::new(),
        })
    }

    /// Append a pointer to `pointee` (8-byte, the only pointer width the
    /// extraction step currently emits).
    pub fn pointer(&mut self, name: &str, pointee: TypeRef) -> TypeRef
    {
        self.push(TypeDescriptor {
            name: name.to_string(),
            kind: TypeKind::Pointer,
            size: Some(8),
            members: Vec::new(),
            element: Some(pointee),
            element_count: None,
            params: Vec::new(),
        })
    }

    /// Append a fixed-length array of `count` elements.
    ///
    /// The array size is derived from the element's size when the element is
    /// already defined; arrays of forward-declared elements get an unknown
    /// size.
    pub fn array(&mut self, name: &str, element: TypeRef, count: u64) -> TypeRef
    {
        let size = self
            .descriptors
            .get(element.index())
            .and_then(|descriptor| descriptor.size)
            .and_then(|element_size| element_size.checked_mul(count));
        self.push(TypeDescriptor {
            name: name.to_string(),
            kind: TypeKind::Array,
            size,
            members: Vec::new(),
            element: Some(element),
            element_count: Some(count),
            params: Vec::new(),
        })
    }

    /// Append a struct with the given `(offset, name, type)` members.
    pub fn strukt(&mut self, name: &str, size: u64, members: &[(u64, &str, TypeRef)]) -> TypeRef
    {
        self.composite(TypeKind::Struct, name, size, members)
    }

    /// Append a union with the given `(offset, name, type)` members.
    pub fn union(&mut self, name: &str, size: u64, members: &[(u64, &str, TypeRef)]) -> TypeRef
    {
        self.composite(TypeKind::Union, name, size, members)
    }

    fn composite(&mut self, kind: TypeKind, name: &str, size: u64, members: &[(u64, &str, TypeRef)]) -> TypeRef
    {
        self.push(TypeDescriptor {
            name: name.to_string(),
            kind,
            size: Some(size),
            members: members
                .iter()
                .map(|&(offset, member_name, ty)| Member {
                    offset,
                    name: if member_name.is_empty() {
                        None
                    } else {
                        Some(member_name.to_string())
                    },
                    ty,
                })
                .collect(),
            element: None,
            element_count: None,
            params: Vec::new(),
        })
    }

    /// Append a subrange restriction of `base`.
    pub fn subrange(&mut self, name: &str, base: TypeRef, size: u64) -> TypeRef
    {
        self.push(TypeDescriptor {
            name: name.to_string(),
            kind: TypeKind::Subrange,
            size: Some(size),
            members: Vec::new(),
            element: Some(base),
            element_count: None,
            params: Vec::new(),
        })
    }

    /// Append a function signature with the given return and parameter types.
    pub fn function(&mut self, name: &str, returns: TypeRef, params: &[TypeRef]) -> TypeRef
    {
        self.push(TypeDescriptor {
            name: name.to_string(),
            kind: TypeKind::Function,
            size: None,
            members: Vec::new(),
            element: Some(returns),
            element_count: None,
            params: params.to_vec(),
        })
    }

    /// Encode the packed section bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8>
    {
        let mut strings = Vec::new();
        let mut interned: HashMap<String, u32> = HashMap::new();

        let mut records = Vec::new();
        for descriptor in &self.descriptors {
            let name = if descriptor.name.is_empty() {
                None
            } else {
                Some(descriptor.name.as_str())
            };
            let name_off = intern(name, &mut strings, &mut interned);

            records.push(kind_code(descriptor.kind));
            records.push(0); // flags
            records.extend_from_slice(&(descriptor.members.len() as u16).to_le_bytes());
            records.extend_from_slice(&(descriptor.params.len() as u16).to_le_bytes());
            records.extend_from_slice(&0u16.to_le_bytes()); // reserved
            records.extend_from_slice(&name_off.to_le_bytes());
            records.extend_from_slice(&descriptor.element.map_or(format::INDEX_NONE, |r| r.0).to_le_bytes());
            records.extend_from_slice(&descriptor.size.unwrap_or(format::SIZE_UNKNOWN).to_le_bytes());
            records.extend_from_slice(&descriptor.element_count.unwrap_or(format::COUNT_NONE).to_le_bytes());

            for member in &descriptor.members {
                records.extend_from_slice(&member.offset.to_le_bytes());
                let member_name_off = intern(member.name.as_deref(), &mut strings, &mut interned);
                records.extend_from_slice(&member_name_off.to_le_bytes());
                records.extend_from_slice(&member.ty.0.to_le_bytes());
            }
            for param in &descriptor.params {
                records.extend_from_slice(&param.0.to_le_bytes());
            }
        }

        let mut section = Vec::with_capacity(format::HEADER_LEN + records.len() + strings.len());
        section.extend_from_slice(&format::MAGIC);
        section.extend_from_slice(&format::FORMAT_VERSION.to_le_bytes());
        section.extend_from_slice(&0u16.to_le_bytes()); // reserved
        section.extend_from_slice(&(self.descriptors.len() as u32).to_le_bytes());
        section.extend_from_slice(&(strings.len() as u32).to_le_bytes());
        section.extend_from_slice(&records);
        section.extend_from_slice(&strings);
        section
    }

    /// Encode and re-parse, yielding a validated table.
    ///
    /// Round-tripping through the real parser keeps the builder honest: a
    /// table that `build` returns is exactly what a component load would see.
    pub fn build(&self, component: &str) -> AlloscopeResult<DescriptorTable>
    {
        DescriptorTable::parse(component, &self.encode())
    }
}

fn intern(name: Option<&str>, strings: &mut Vec<u8>, interned: &mut HashMap<String, u32>) -> u32
{
    match name {
        None => format::NAME_NONE,
        Some(text) => *interned.entry(text.to_string()).or_insert_with(|| {
            let offset = strings.len() as u32;
            strings.extend_from_slice(text.as_bytes());
            strings.push(0);
            offset
        }),
    }
}

const fn kind_code(kind: TypeKind) -> u8
{
    match kind {
        TypeKind::Primitive => kind_codes::PRIMITIVE,
        TypeKind::Pointer => kind_codes::POINTER,
        TypeKind::Array => kind_codes::ARRAY,
        TypeKind::Struct => kind_codes::STRUCT,
        TypeKind::Union => kind_codes::UNION,
        TypeKind::Subrange => kind_codes::SUBRANGE,
        TypeKind::Function => kind_codes::FUNCTION,
        TypeKind::Opaque => kind_codes::OPAQUE,
    }
}
