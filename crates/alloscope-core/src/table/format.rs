//! Packed on-disk layout of the descriptor section.
//!
//! The build-time extraction step emits one section per component laid out
//! as:
//!
//! ```text
//! header   (16 bytes): magic "ALSC", u16 version, u16 reserved,
//!                      u32 descriptor count, u32 string-table length
//! records  (variable): one packed record per descriptor, in index order
//! strings  (string-table length bytes): NUL-terminated names
//! ```
//!
//! Each record is a 32-byte fixed part followed by `member_count` member
//! entries (16 bytes each) and `param_count` parameter indexes (4 bytes
//! each). All integers are little-endian. Sentinel values (`u32::MAX` /
//! `u64::MAX`) stand in for "absent".

/// Section magic, first four bytes of the header.
pub const MAGIC: [u8; 4] = *b"ALSC";

/// Highest format version this reader understands.
///
/// Newer versions fail with `UnsupportedFormatVersion` before any record is
/// read; the format is forward-incompatible by design.
pub const FORMAT_VERSION: u16 = 1;

/// Header length in bytes.
pub const HEADER_LEN: usize = 16;

/// Fixed part of a descriptor record, in bytes.
pub const RECORD_FIXED_LEN: usize = 32;

/// One member entry, in bytes.
pub const MEMBER_LEN: usize = 16;

/// Sentinel for an absent descriptor index.
pub const INDEX_NONE: u32 = u32::MAX;

/// Sentinel for an absent name offset.
pub const NAME_NONE: u32 = u32::MAX;

/// Sentinel for an unknown size.
pub const SIZE_UNKNOWN: u64 = u64::MAX;

/// Sentinel for an absent element count.
pub const COUNT_NONE: u64 = u64::MAX;

/// Kind discriminator codes as emitted by the extraction step.
pub mod kind_codes
{
    pub const PRIMITIVE: u8 = 0;
    pub const POINTER: u8 = 1;
    pub const ARRAY: u8 = 2;
    pub const STRUCT: u8 = 3;
    pub const UNION: u8 = 4;
    pub const SUBRANGE: u8 = 5;
    pub const FUNCTION: u8 = 6;
    pub const OPAQUE: u8 = 7;
}

/// Little-endian cursor over the section bytes.
///
/// Every read returns `None` past the end; the parser maps that to
/// `MalformedTable` with the position that fell short.
pub(crate) struct Cursor<'a>
{
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a>
{
    pub(crate) fn new(bytes: &'a [u8]) -> Self
    {
        Cursor { bytes, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize
    {
        self.pos
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]>
    {
        let end = self.pos.checked_add(len)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Option<u8>
    {
        self.take(1).map(|b| b[0])
    }

    pub(crate) fn read_u16(&mut self) -> Option<u16>
    {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Option<u32>
    {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> Option<u64>
    {
        self.take(8)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    pub(crate) fn read_magic(&mut self) -> Option<[u8; 4]>
    {
        self.take(4).map(|b| [b[0], b[1], b[2], b[3]])
    }
}

/// Read the NUL-terminated string starting at `offset` in the string table.
///
/// Returns `None` if the offset is out of range or no terminator follows.
pub(crate) fn read_string(strings: &[u8], offset: u32) -> Option<&str>
{
    let start = offset as usize;
    if start >= strings.len() {
        return None;
    }
    let rest = &strings[start..];
    let end = rest.iter().position(|&byte| byte == 0)?;
    std::str::from_utf8(&rest[..end]).ok()
}
