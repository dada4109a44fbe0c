//! # Descriptor Table
//!
//! The per-component, immutable, indexable list of type descriptors as
//! emitted by the build-time extraction step, plus name-based lookup within
//! the component.
//!
//! A table is parsed once from its packed section bytes and never mutated
//! afterwards. Validation happens entirely at parse time: truncation, bad
//! magic, out-of-range descriptor indexes, and decreasing struct member
//! offsets are all `MalformedTable`; a version newer than this reader is
//! `UnsupportedFormatVersion`. Self-referential index cycles between
//! composite descriptors are *valid* (recursive types require them) and
//! are deliberately not treated as an error.

pub mod build;
pub mod format;

use std::collections::HashMap;

use once_cell::sync::OnceCell;

use crate::error::{AlloscopeError, AlloscopeResult};
use crate::types::{Member, TypeDescriptor, TypeKind, TypeRef};
use format::{kind_codes, Cursor};

pub use build::TableBuilder;

/// Immutable, ordered descriptor table for one component.
pub struct DescriptorTable
{
    descriptors: Vec<TypeDescriptor<TypeRef>>,
    // Built on first name lookup; first occurrence of a duplicated name wins.
    name_index: OnceCell<HashMap<String, TypeRef>>,
}

impl DescriptorTable
{
    /// Parse a descriptor section.
    ///
    /// `component` is only used to label errors; the bytes are the raw
    /// section contents as emitted at build time.
    ///
    /// ## Errors
    ///
    /// - `MalformedTable` if the section is truncated, carries the wrong
    ///   magic, references an out-of-range index, or declares struct members
    ///   with decreasing offsets
    /// - `UnsupportedFormatVersion` if the header version is newer than
    ///   [`format::FORMAT_VERSION`]
    pub fn parse(component: &str, bytes: &[u8]) -> AlloscopeResult<Self>
    {
        let malformed = |reason: String| AlloscopeError::MalformedTable {
            component: component.to_string(),
            reason,
        };

        let mut cursor = Cursor::new(bytes);
        let magic = cursor.read_magic().ok_or_else(|| malformed("section shorter than header".into()))?;
        if magic != format::MAGIC {
            return Err(malformed(format!("bad magic {magic:02x?}")));
        }

        let version = cursor.read_u16().ok_or_else(|| malformed("section shorter than header".into()))?;
        if version > format::FORMAT_VERSION {
            return Err(AlloscopeError::UnsupportedFormatVersion {
                found: version,
                supported: format::FORMAT_VERSION,
            });
        }
        if version == 0 {
            return Err(malformed("format version 0".into()));
        }

        let _reserved = cursor.read_u16().ok_or_else(|| malformed("section shorter than header".into()))?;
        let count = cursor.read_u32().ok_or_else(|| malformed("section shorter than header".into()))?;
        let strings_len = cursor.read_u32().ok_or_else(|| malformed("section shorter than header".into()))? as usize;

        if strings_len > bytes.len().saturating_sub(format::HEADER_LEN) {
            return Err(malformed(format!(
                "string table ({strings_len} bytes) larger than section body"
            )));
        }
        let strings_start = bytes.len() - strings_len;
        let strings = &bytes[strings_start..];

        let mut descriptors = Vec::with_capacity(count as usize);
        for index in 0..count {
            if cursor.position() >= strings_start {
                return Err(malformed(format!("record {index} starts inside the string table")));
            }
            let descriptor = Self::parse_record(&mut cursor, strings, count, index, &malformed)?;
            descriptors.push(descriptor);
        }

        if cursor.position() > strings_start {
            return Err(malformed(format!(
                "record data overruns the string table by {} bytes",
                cursor.position() - strings_start
            )));
        }
        if cursor.position() != strings_start {
            return Err(malformed(format!(
                "{} unexpected bytes between records and string table",
                strings_start - cursor.position()
            )));
        }

        Ok(DescriptorTable {
            descriptors,
            name_index: OnceCell::new(),
        })
    }

    fn parse_record(
        cursor: &mut Cursor<'_>,
        strings: &[u8],
        count: u32,
        index: u32,
        malformed: &dyn Fn(String) -> AlloscopeError,
    ) -> AlloscopeResult<TypeDescriptor<TypeRef>>
    {
        let truncated = || malformed(format!("record {index} truncated"));

        let kind_code = cursor.read_u8().ok_or_else(truncated)?;
        let flags = cursor.read_u8().ok_or_else(truncated)?;
        let member_count = cursor.read_u16().ok_or_else(truncated)?;
        let param_count = cursor.read_u16().ok_or_else(truncated)?;
        let _reserved = cursor.read_u16().ok_or_else(truncated)?;
        let name_off = cursor.read_u32().ok_or_else(truncated)?;
        let element_raw = cursor.read_u32().ok_or_else(truncated)?;
        let size_raw = cursor.read_u64().ok_or_else(truncated)?;
        let element_count_raw = cursor.read_u64().ok_or_else(truncated)?;

        if flags != 0 {
            return Err(malformed(format!("record {index} has unknown flags 0x{flags:02x}")));
        }

        let kind = match kind_code {
            kind_codes::PRIMITIVE => TypeKind::Primitive,
            kind_codes::POINTER => TypeKind::Pointer,
            kind_codes::ARRAY => TypeKind::Array,
            kind_codes::STRUCT => TypeKind::Struct,
            kind_codes::UNION => TypeKind::Union,
            kind_codes::SUBRANGE => TypeKind::Subrange,
            kind_codes::FUNCTION => TypeKind::Function,
            kind_codes::OPAQUE => TypeKind::Opaque,
            other => return Err(malformed(format!("record {index} has unknown kind code {other}"))),
        };

        let resolve_index = |raw: u32, what: &str| -> AlloscopeResult<TypeRef> {
            if raw >= count {
                return Err(malformed(format!(
                    "record {index} references out-of-range {what} index {raw} (table has {count})"
                )));
            }
            Ok(TypeRef(raw))
        };

        let resolve_name = |raw: u32, what: &str| -> AlloscopeResult<Option<String>> {
            if raw == format::NAME_NONE {
                return Ok(None);
            }
            format::read_string(strings, raw)
                .map(|name| Some(name.to_string()))
                .ok_or_else(|| malformed(format!("record {index} has invalid {what} string offset {raw}")))
        };

        let name = resolve_name(name_off, "name")?.unwrap_or_default();
        let element = if element_raw == format::INDEX_NONE {
            None
        } else {
            Some(resolve_index(element_raw, "element")?)
        };
        let size = if size_raw == format::SIZE_UNKNOWN { None } else { Some(size_raw) };
        let element_count = if element_count_raw == format::COUNT_NONE {
            None
        } else {
            Some(element_count_raw)
        };

        let mut members = Vec::with_capacity(member_count as usize);
        let mut previous_offset = 0u64;
        for member_index in 0..member_count {
            let offset = cursor.read_u64().ok_or_else(truncated)?;
            let member_name_off = cursor.read_u32().ok_or_else(truncated)?;
            let ty_raw = cursor.read_u32().ok_or_else(truncated)?;

            // Struct member offsets are emitted in layout order; going
            // backwards means the table was corrupted or mis-assembled.
            // Unions legitimately restate the same (usually zero) offset.
            if kind == TypeKind::Struct && offset < previous_offset {
                return Err(malformed(format!(
                    "record {index} member {member_index} offset {offset} decreases (previous {previous_offset})"
                )));
            }
            previous_offset = offset;

            members.push(Member {
                offset,
                name: resolve_name(member_name_off, "member name")?,
                ty: resolve_index(ty_raw, "member type")?,
            });
        }

        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            let raw = cursor.read_u32().ok_or_else(truncated)?;
            params.push(resolve_index(raw, "parameter type")?);
        }

        Ok(TypeDescriptor {
            name,
            kind,
            size,
            members,
            element,
            element_count,
            params,
        })
    }

    /// Number of descriptors in this table.
    pub fn len(&self) -> usize
    {
        self.descriptors.len()
    }

    /// Whether the table holds no descriptors.
    pub fn is_empty(&self) -> bool
    {
        self.descriptors.is_empty()
    }

    /// Descriptor at `index`, if in range.
    pub fn get(&self, index: TypeRef) -> Option<&TypeDescriptor<TypeRef>>
    {
        self.descriptors.get(index.index())
    }

    /// All descriptors in index order.
    pub fn descriptors(&self) -> impl Iterator<Item = (TypeRef, &TypeDescriptor<TypeRef>)>
    {
        self.descriptors
            .iter()
            .enumerate()
            .map(|(index, descriptor)| (TypeRef(index as u32), descriptor))
    }

    /// Local index of the first descriptor with the given name.
    pub fn index_of_name(&self, name: &str) -> Option<TypeRef>
    {
        self.name_index().get(name).copied()
    }

    /// First descriptor with the given name, if any.
    pub fn lookup_by_name(&self, name: &str) -> Option<&TypeDescriptor<TypeRef>>
    {
        self.index_of_name(name).and_then(|index| self.get(index))
    }

    fn name_index(&self) -> &HashMap<String, TypeRef>
    {
        self.name_index.get_or_init(|| {
            let mut map = HashMap::with_capacity(self.descriptors.len());
            for (index, descriptor) in self.descriptors.iter().enumerate() {
                if descriptor.name.is_empty() {
                    continue;
                }
                map.entry(descriptor.name.clone()).or_insert(TypeRef(index as u32));
            }
            map
        })
    }

    /// Build a table directly from descriptors, bypassing the wire format.
    ///
    /// Index validity is the caller's responsibility; [`TableBuilder`] goes
    /// through the encoder and the full parse path instead, which is what
    /// tests should normally use.
    pub(crate) fn from_descriptors(descriptors: Vec<TypeDescriptor<TypeRef>>) -> Self
    {
        DescriptorTable {
            descriptors,
            name_index: OnceCell::new(),
        }
    }
}

impl std::fmt::Debug for DescriptorTable
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("DescriptorTable")
            .field("descriptors", &self.descriptors.len())
            .finish()
    }
}
