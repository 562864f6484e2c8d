//! Sectioned blob codec
//!
//! A blob bundles several independently width-coded integer arrays into one
//! byte string. Layout (all integers big-endian):
//!
//! ```text
//! 0   magic "HMB1"                          4 bytes
//! 4   version (1..=255)                     1 byte
//! 5   section count                         1 byte
//! 6   header length = 8 + 10 * count        2 bytes
//! 8   count x { id | bits | values | len }  1 + 1 + 4 + 4 bytes
//!     payloads, in declared order
//!     CRC32 of all preceding bytes          4 bytes, optional
//! ```

use std::collections::HashMap;

use crate::codec::bitpack;
use crate::error::CodecError;

/// Magic prefix identifying a sectioned blob
pub const MAGIC: [u8; 4] = *b"HMB1";

/// Fixed header size before the section table
pub const FIXED_HEADER_LEN: usize = 8;

/// Size of one section descriptor
pub const SECTION_ENTRY_LEN: usize = 10;

/// Size of the optional CRC32 trailer
pub const CHECKSUM_LEN: usize = 4;

/// Maximum number of sections one blob can declare
pub const MAX_SECTIONS: usize = u8::MAX as usize;

/// One array to be written into a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpec {
    /// Section identifier, unique within the blob
    pub id: u8,
    /// Fixed width used for every value (1..=32)
    pub bits_per_value: u8,
    /// Values to pack
    pub values: Vec<u32>,
}

impl SectionSpec {
    pub fn new(id: u8, bits_per_value: u8, values: Vec<u32>) -> Self {
        Self {
            id,
            bits_per_value,
            values,
        }
    }

    /// Build a section using the smallest width that fits every value
    pub fn fitted(id: u8, values: Vec<u32>) -> Self {
        let max = values.iter().copied().max().unwrap_or(0);
        Self::new(id, bitpack::bits_required(max), values)
    }
}

/// Descriptor of one packed array inside a parsed blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSection {
    pub id: u8,
    pub bits_per_value: u8,
    pub count: u32,
    pub byte_offset: usize,
    pub byte_length: usize,
}

/// Assemble a blob from `sections`.
pub fn build(
    version: u8,
    sections: &[SectionSpec],
    with_checksum: bool,
) -> Result<Vec<u8>, CodecError> {
    if sections.is_empty() {
        return Err(CodecError::IllegalState(
            "a blob needs at least one section".to_string(),
        ));
    }
    if sections.len() > MAX_SECTIONS {
        return Err(CodecError::InvalidArgument(format!(
            "{} sections exceed the maximum of {}",
            sections.len(),
            MAX_SECTIONS
        )));
    }
    if version == 0 {
        return Err(CodecError::InvalidArgument(
            "version must be between 1 and 255".to_string(),
        ));
    }

    let mut seen = [false; 256];
    let mut payloads = Vec::with_capacity(sections.len());
    for section in sections {
        if seen[section.id as usize] {
            return Err(CodecError::InvalidArgument(format!(
                "duplicate section id {}",
                section.id
            )));
        }
        seen[section.id as usize] = true;

        if bitpack::check_width(section.bits_per_value).is_err() {
            return Err(CodecError::InvalidArgument(format!(
                "section {} has bit width {}",
                section.id, section.bits_per_value
            )));
        }
        let count = u32::try_from(section.values.len()).map_err(|_| {
            CodecError::InvalidArgument(format!("section {} has too many values", section.id))
        })?;

        let payload = bitpack::encode(&section.values, section.bits_per_value)?;
        payloads.push((count, payload));
    }

    let header_len = FIXED_HEADER_LEN + SECTION_ENTRY_LEN * sections.len();
    let body_len: usize = payloads.iter().map(|(_, p)| p.len()).sum();
    let trailer_len = if with_checksum { CHECKSUM_LEN } else { 0 };

    let mut out = Vec::with_capacity(header_len + body_len + trailer_len);
    out.extend_from_slice(&MAGIC);
    out.push(version);
    out.push(sections.len() as u8);
    out.extend_from_slice(&(header_len as u16).to_be_bytes());

    for (section, (count, payload)) in sections.iter().zip(&payloads) {
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            CodecError::InvalidArgument(format!("section {} payload too large", section.id))
        })?;
        out.push(section.id);
        out.push(section.bits_per_value);
        out.extend_from_slice(&count.to_be_bytes());
        out.extend_from_slice(&payload_len.to_be_bytes());
    }

    for (_, payload) in &payloads {
        out.extend_from_slice(payload);
    }

    if with_checksum {
        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_be_bytes());
    }

    Ok(out)
}

/// Parse and validate a blob.
pub fn parse(bytes: &[u8]) -> Result<SectionedBlob<'_>, CodecError> {
    SectionedBlob::parse(bytes)
}

/// Structured, validated view over blob bytes.
///
/// Section payloads are only unpacked on request.
#[derive(Debug, Clone)]
pub struct SectionedBlob<'a> {
    bytes: &'a [u8],
    version: u8,
    order: Vec<u8>,
    sections: HashMap<u8, BitSection>,
    has_checksum: bool,
}

impl<'a> SectionedBlob<'a> {
    /// Validate header, section table and payload ranges.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, CodecError> {
        if bytes.len() < FIXED_HEADER_LEN {
            if bytes.len() >= MAGIC.len() && bytes[..MAGIC.len()] != MAGIC {
                return Err(CodecError::InvalidFormat("bad magic".to_string()));
            }
            return Err(CodecError::Truncated {
                needed: FIXED_HEADER_LEN,
                available: bytes.len(),
            });
        }
        if bytes[..MAGIC.len()] != MAGIC {
            return Err(CodecError::InvalidFormat("bad magic".to_string()));
        }

        let version = bytes[4];
        if version == 0 {
            return Err(CodecError::InvalidFormat("version 0".to_string()));
        }

        let section_count = bytes[5] as usize;
        let header_len = u16::from_be_bytes([bytes[6], bytes[7]]) as usize;
        let expected_header = FIXED_HEADER_LEN + SECTION_ENTRY_LEN * section_count;
        if header_len != expected_header {
            return Err(CodecError::InvalidFormat(format!(
                "header length {} does not match {} sections",
                header_len, section_count
            )));
        }
        if bytes.len() < header_len {
            return Err(CodecError::Truncated {
                needed: header_len,
                available: bytes.len(),
            });
        }

        let mut order = Vec::with_capacity(section_count);
        let mut sections = HashMap::with_capacity(section_count);
        let mut offset = header_len;

        for entry in bytes[FIXED_HEADER_LEN..header_len].chunks_exact(SECTION_ENTRY_LEN) {
            let id = entry[0];
            let bits_per_value = entry[1];
            let count = u32::from_be_bytes([entry[2], entry[3], entry[4], entry[5]]);
            let byte_length = u32::from_be_bytes([entry[6], entry[7], entry[8], entry[9]]) as usize;

            if bitpack::check_width(bits_per_value).is_err() {
                return Err(CodecError::InvalidFormat(format!(
                    "section {} declares bit width {}",
                    id, bits_per_value
                )));
            }
            let fits = bitpack::packed_len(count as usize, bits_per_value)
                .is_some_and(|needed| needed <= byte_length);
            if !fits {
                return Err(CodecError::InvalidFormat(format!(
                    "section {} payload of {} bytes cannot hold {} values",
                    id, byte_length, count
                )));
            }

            let end = offset.checked_add(byte_length).unwrap_or(usize::MAX);
            if end > bytes.len() {
                return Err(CodecError::OutOfBounds {
                    id,
                    offset,
                    end,
                    len: bytes.len(),
                });
            }

            let section = BitSection {
                id,
                bits_per_value,
                count,
                byte_offset: offset,
                byte_length,
            };
            if sections.insert(id, section).is_some() {
                return Err(CodecError::InvalidFormat(format!(
                    "duplicate section id {}",
                    id
                )));
            }
            order.push(id);
            offset = end;
        }

        let has_checksum = match bytes.len() - offset {
            0 => false,
            CHECKSUM_LEN => {
                let stored = u32::from_be_bytes([
                    bytes[offset],
                    bytes[offset + 1],
                    bytes[offset + 2],
                    bytes[offset + 3],
                ]);
                let computed = crc32fast::hash(&bytes[..offset]);
                if stored != computed {
                    return Err(CodecError::ChecksumMismatch { stored, computed });
                }
                true
            }
            extra => {
                return Err(CodecError::InvalidFormat(format!(
                    "{} unexpected trailing bytes",
                    extra
                )));
            }
        };

        Ok(Self {
            bytes,
            version,
            order,
            sections,
            has_checksum,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn has_checksum(&self) -> bool {
        self.has_checksum
    }

    /// Section ids in declaration order
    pub fn section_ids(&self) -> &[u8] {
        &self.order
    }

    /// Descriptors in declaration order
    pub fn sections(&self) -> impl Iterator<Item = &BitSection> + '_ {
        self.order.iter().filter_map(move |id| self.sections.get(id))
    }

    pub fn section(&self, id: u8) -> Result<&BitSection, CodecError> {
        self.sections.get(&id).ok_or(CodecError::NotFound(id))
    }

    /// Raw packed payload of a section
    pub fn payload(&self, id: u8) -> Result<&'a [u8], CodecError> {
        let section = self.section(id)?;
        Ok(&self.bytes[section.byte_offset..section.byte_offset + section.byte_length])
    }

    /// Unpack a section's values
    pub fn decode_section(&self, id: u8) -> Result<Vec<u32>, CodecError> {
        let section = *self.section(id)?;
        let payload = self.payload(id)?;
        bitpack::decode(payload, section.bits_per_value, section.count as usize)
    }
}
