//! Loaded-component records and descriptor-section extraction.
//!
//! One [`ComponentRecord`] exists per loaded binary unit (main executable or
//! dynamically loaded library). It owns the component's immutable
//! [`DescriptorTable`] and the local-index-to-canonical mapping the resolver
//! fills in at load time.
//!
//! The descriptor section travels inside the component's object file under
//! [`SECTION_NAMES`] (ELF and Mach-O spellings); extraction goes through the
//! `object` crate so any format it reads works here.

use std::fmt;
use std::fs;
use std::path::Path;

use object::{Object, ObjectSection};

use crate::error::{AlloscopeError, AlloscopeResult};
use crate::table::DescriptorTable;
use crate::types::{TypeId, TypeRef};

/// Section names the extraction step emits, in lookup order.
///
/// ELF sections keep the dotted name; Mach-O section names cannot start with
/// a dot, hence the double-underscore alias.
pub const SECTION_NAMES: &[&str] = &[".alloscope_types", "__alloscope_types"];

/// Identifier of one loaded component.
///
/// Ids are never reused within one [`crate::Alloscope`] instance, so a stale
/// id after unload fails with `ComponentNotFound` instead of silently naming
/// a newer component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId
{
    /// Raw numeric value, for logs and error payloads.
    pub const fn as_u32(self) -> u32
    {
        self.0
    }
}

impl fmt::Display for ComponentId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "component#{}", self.0)
    }
}

/// Read the raw descriptor-section bytes out of an object file on disk.
///
/// This is the only blocking I/O in the core and it happens exclusively at
/// component-load time.
pub(crate) fn read_section_from_file(name: &str, path: &Path) -> AlloscopeResult<Vec<u8>>
{
    let bytes = fs::read(path)?;
    let file = object::File::parse(&*bytes)
        .map_err(|err| AlloscopeError::InvalidArgument(format!("failed to parse {}: {err}", path.display())))?;

    for section_name in SECTION_NAMES {
        if let Some(section) = file.section_by_name(section_name) {
            let data = section.uncompressed_data().map_err(|err| AlloscopeError::MalformedTable {
                component: name.to_string(),
                reason: format!("failed to read {section_name}: {err}"),
            })?;
            return Ok(data.into_owned());
        }
    }

    Err(AlloscopeError::MalformedTable {
        component: name.to_string(),
        reason: "descriptor section absent".to_string(),
    })
}

/// One loaded component: its table plus the canonical mapping.
pub struct ComponentRecord
{
    pub(crate) id: ComponentId,
    pub(crate) name: String,
    pub(crate) table: DescriptorTable,
    // Indexed by local descriptor index; built eagerly at load, immutable
    // afterwards. The local descriptors behind already-canonical entries are
    // dead weight, kept only inside `table` for name lookup.
    pub(crate) local_to_canonical: Vec<TypeId>,
}

impl ComponentRecord
{
    /// The component's id.
    pub fn id(&self) -> ComponentId
    {
        self.id
    }

    /// Human-readable component name (typically the file stem).
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// The component's parsed descriptor table.
    pub fn table(&self) -> &DescriptorTable
    {
        &self.table
    }

    /// Canonical descriptor for a local table index.
    pub fn canonical(&self, local: TypeRef) -> Option<TypeId>
    {
        self.local_to_canonical.get(local.index()).copied()
    }
}

impl fmt::Debug for ComponentRecord
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("ComponentRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("descriptors", &self.table.len())
            .finish()
    }
}
