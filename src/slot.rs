//! Slot persistence layout
//!
//! Maps a day's heatmap and sparse counter maps onto sectioned blobs. Each
//! array is written at the smallest width its largest value needs. Read
//! helpers treat a corrupt slot as unavailable so one bad record cannot fail
//! a multi-slot response.

use std::collections::BTreeMap;

use crate::codec::blob::{self, SectionSpec};
use crate::error::CodecError;
use crate::types::{HeatmapCell, PortfolioHeatmap};

/// Blob version written for slot records
pub const SLOT_BLOB_VERSION: u8 = 1;

/// Heatmap grid width (one 32-bit value)
pub const SECTION_COLUMNS: u8 = 0;
/// Heatmap layout version string, one byte per value
pub const SECTION_VERSION: u8 = 1;
pub const SECTION_INDICES: u8 = 2;
pub const SECTION_VALUES: u8 = 3;
pub const SECTION_COUNTS: u8 = 4;

/// Counter map keys
pub const SECTION_KEYS: u8 = 0;
/// Counter map values, aligned with keys
pub const SECTION_COUNTERS: u8 = 1;

/// Serialize a heatmap into a checksummed blob
pub fn encode_heatmap(heatmap: &PortfolioHeatmap) -> Result<Vec<u8>, CodecError> {
    let version_bytes: Vec<u32> = heatmap.version.bytes().map(u32::from).collect();

    let sections = [
        SectionSpec::new(SECTION_COLUMNS, 32, vec![heatmap.columns]),
        SectionSpec::new(SECTION_VERSION, 8, version_bytes),
        SectionSpec::fitted(SECTION_INDICES, heatmap.cells.iter().map(|c| c.index).collect()),
        SectionSpec::fitted(SECTION_VALUES, heatmap.cells.iter().map(|c| c.value).collect()),
        SectionSpec::fitted(SECTION_COUNTS, heatmap.cells.iter().map(|c| c.count).collect()),
    ];

    blob::build(SLOT_BLOB_VERSION, &sections, true)
}

/// Rebuild a heatmap from a blob written by [`encode_heatmap`]
pub fn decode_heatmap(bytes: &[u8]) -> Result<PortfolioHeatmap, CodecError> {
    let parsed = blob::parse(bytes)?;

    let columns = parsed
        .decode_section(SECTION_COLUMNS)?
        .first()
        .copied()
        .ok_or_else(|| CodecError::InvalidFormat("empty columns section".to_string()))?;

    let version_bytes = parsed
        .decode_section(SECTION_VERSION)?
        .into_iter()
        .map(|b| {
            u8::try_from(b)
                .map_err(|_| CodecError::InvalidFormat("version byte out of range".to_string()))
        })
        .collect::<Result<Vec<u8>, _>>()?;
    let version = String::from_utf8(version_bytes)
        .map_err(|_| CodecError::InvalidFormat("version is not UTF-8".to_string()))?;

    let indices = parsed.decode_section(SECTION_INDICES)?;
    let values = parsed.decode_section(SECTION_VALUES)?;
    let counts = parsed.decode_section(SECTION_COUNTS)?;
    if indices.len() != values.len() || indices.len() != counts.len() {
        return Err(CodecError::InvalidFormat(format!(
            "cell arrays disagree: {} indices, {} values, {} counts",
            indices.len(),
            values.len(),
            counts.len()
        )));
    }

    let cells = indices
        .into_iter()
        .zip(values)
        .zip(counts)
        .map(|((index, value), count)| HeatmapCell {
            index,
            value,
            count,
        })
        .collect();

    Ok(PortfolioHeatmap {
        version,
        columns,
        cells,
    })
}

/// Serialize a sparse counter map (e.g. exposures per project id)
pub fn encode_counter_map(counters: &BTreeMap<u32, u32>) -> Result<Vec<u8>, CodecError> {
    let sections = [
        SectionSpec::fitted(SECTION_KEYS, counters.keys().copied().collect()),
        SectionSpec::fitted(SECTION_COUNTERS, counters.values().copied().collect()),
    ];
    blob::build(SLOT_BLOB_VERSION, &sections, true)
}

pub fn decode_counter_map(bytes: &[u8]) -> Result<BTreeMap<u32, u32>, CodecError> {
    let parsed = blob::parse(bytes)?;
    let keys = parsed.decode_section(SECTION_KEYS)?;
    let counters = parsed.decode_section(SECTION_COUNTERS)?;
    if keys.len() != counters.len() {
        return Err(CodecError::InvalidFormat(format!(
            "{} keys but {} counters",
            keys.len(),
            counters.len()
        )));
    }
    Ok(keys.into_iter().zip(counters).collect())
}

/// Read-path helper: a missing or corrupt heatmap slot is reported as `None`
pub fn read_heatmap_slot(bytes: Option<&[u8]>) -> Option<PortfolioHeatmap> {
    let bytes = bytes?;
    match decode_heatmap(bytes) {
        Ok(heatmap) => Some(heatmap),
        Err(e) => {
            log::warn!("heatmap slot unavailable ({} bytes): {}", bytes.len(), e);
            None
        }
    }
}

/// Read-path helper: a missing or corrupt counter slot is reported as `None`
pub fn read_counter_slot(bytes: Option<&[u8]>) -> Option<BTreeMap<u32, u32>> {
    let bytes = bytes?;
    match decode_counter_map(bytes) {
        Ok(counters) => Some(counters),
        Err(e) => {
            log::warn!("counter slot unavailable ({} bytes): {}", bytes.len(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_heatmap() -> PortfolioHeatmap {
        PortfolioHeatmap {
            version: "grid-2024.1".to_string(),
            columns: 48,
            cells: vec![
                HeatmapCell {
                    index: 1200,
                    value: 90,
                    count: 4,
                },
                HeatmapCell {
                    index: 3,
                    value: 70_000,
                    count: 1,
                },
                HeatmapCell {
                    index: 47,
                    value: 0,
                    count: 12,
                },
            ],
        }
    }

    #[test]
    fn test_heatmap_round_trip() {
        let heatmap = sample_heatmap();
        let bytes = encode_heatmap(&heatmap).unwrap();
        assert_eq!(decode_heatmap(&bytes).unwrap(), heatmap);
    }

    #[test]
    fn test_heatmap_uses_fitted_widths() {
        let bytes = encode_heatmap(&sample_heatmap()).unwrap();
        let parsed = blob::parse(&bytes).unwrap();
        assert!(parsed.has_checksum());
        assert_eq!(parsed.section(SECTION_INDICES).unwrap().bits_per_value, 11);
        assert_eq!(parsed.section(SECTION_VALUES).unwrap().bits_per_value, 17);
        assert_eq!(parsed.section(SECTION_COUNTS).unwrap().bits_per_value, 4);
    }

    #[test]
    fn test_empty_heatmap_round_trip() {
        let heatmap = PortfolioHeatmap::default();
        let bytes = encode_heatmap(&heatmap).unwrap();
        assert_eq!(decode_heatmap(&bytes).unwrap(), heatmap);
    }

    #[test]
    fn test_counter_map_round_trip() {
        let counters: BTreeMap<u32, u32> = [(4, 19), (17, 0), (90_000, 3)].into_iter().collect();
        let bytes = encode_counter_map(&counters).unwrap();
        assert_eq!(decode_counter_map(&bytes).unwrap(), counters);
    }

    #[test]
    fn test_mismatched_arrays_rejected() {
        let sections = [
            SectionSpec::new(SECTION_COLUMNS, 32, vec![10]),
            SectionSpec::new(SECTION_VERSION, 8, vec![]),
            SectionSpec::new(SECTION_INDICES, 8, vec![1, 2]),
            SectionSpec::new(SECTION_VALUES, 8, vec![1]),
            SectionSpec::new(SECTION_COUNTS, 8, vec![1, 1]),
        ];
        let bytes = blob::build(SLOT_BLOB_VERSION, &sections, false).unwrap();
        assert!(matches!(decode_heatmap(&bytes), Err(CodecError::InvalidFormat(_))));
    }

    #[test]
    fn test_corrupt_slot_is_unavailable() {
        let mut bytes = encode_heatmap(&sample_heatmap()).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;

        assert!(read_heatmap_slot(Some(bytes.as_slice())).is_none());
        assert!(read_heatmap_slot(None).is_none());
        assert!(read_counter_slot(Some(&b"junk"[..])).is_none());
    }

    #[test]
    fn test_valid_slot_is_available() {
        let bytes = encode_heatmap(&sample_heatmap()).unwrap();
        assert_eq!(read_heatmap_slot(Some(bytes.as_slice())), Some(sample_heatmap()));
    }
}
