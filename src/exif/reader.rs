use anyhow::{Context, Result};
use img_parts::Bytes;
use img_parts::jpeg::Jpeg;
use nom_exif::{EntryValue, Exif, ExifIter, ExifTag, MediaParser, MediaSource};
use std::path::Path;

use super::tiff::{
    ENTRY_SIZE, INLINE_LIMIT, TAG_EXIF_IFD, TAG_SUBJECT_AREA, TAG_TZ_OFFSET, TIFF_BASE,
    TYPE_ASCII, TYPE_LONG, TYPE_SSHORT, TYPE_UNDEFINED, TYPE_USHORT,
};

const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const APP1: u8 = 0xE1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("segment does not start with the Exif signature")]
    NotExif,
    #[error("only big-endian TIFF structures are supported")]
    ByteOrder,
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("unknown TIFF type {0}")]
    UnknownType(u16),
}

/// One decoded directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub tag: u16,
    pub type_code: u16,
    pub count: u32,
    /// The 4-byte value slot as stored.
    pub raw_value: [u8; 4],
    /// TIFF-relative offset when the value lives out of line.
    pub offset: Option<u32>,
    /// The value bytes, resolved through `offset` when needed.
    pub value: Vec<u8>,
}

/// Both directories of a parsed segment.
#[derive(Debug, Clone, Default)]
pub struct ParsedExif {
    pub ifd0: Vec<ParsedEntry>,
    pub ifd1: Vec<ParsedEntry>,
}

impl ParsedExif {
    pub fn find(&self, tag: u16) -> Option<&ParsedEntry> {
        self.ifd0.iter().chain(self.ifd1.iter()).find(|e| e.tag == tag)
    }

    /// ASCII value with any trailing NUL removed.
    pub fn string(&self, tag: u16) -> Option<String> {
        let entry = self.find(tag).filter(|e| e.type_code == TYPE_ASCII)?;
        let bytes = entry.value.strip_suffix(&[0]).unwrap_or(&entry.value);
        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn tz_offset_hours(&self) -> Option<i16> {
        let entry = self.find(TAG_TZ_OFFSET).filter(|e| e.type_code == TYPE_SSHORT)?;
        let bytes = entry.value.get(..2)?;
        Some(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Centre x, centre y, width, height.
    pub fn subject_area(&self) -> Option<[u16; 4]> {
        let entry = self.find(TAG_SUBJECT_AREA).filter(|e| e.value.len() == 8)?;
        let mut out = [0u16; 4];
        for (v, chunk) in out.iter_mut().zip(entry.value.chunks_exact(2)) {
            *v = u16::from_be_bytes([chunk[0], chunk[1]]);
        }
        Some(out)
    }

    /// TIFF-relative end of the furthest out-of-line value, 0 if none.
    pub fn data_end(&self) -> usize {
        self.ifd0
            .iter()
            .chain(self.ifd1.iter())
            .filter_map(|e| e.offset.map(|o| o as usize + e.value.len()))
            .max()
            .unwrap_or(0)
    }
}

/// Decode an APP1 payload (starting with `Exif\0\0`) produced by
/// [`build_segment`](super::build_segment).
pub fn parse_segment(segment: &[u8]) -> Result<ParsedExif, ParseError> {
    let tiff = segment.strip_prefix(EXIF_PREFIX).ok_or(ParseError::NotExif)?;
    debug_assert_eq!(EXIF_PREFIX.len(), TIFF_BASE);
    if tiff.len() < 8 {
        return Err(ParseError::Truncated("TIFF header"));
    }
    if &tiff[..4] != b"MM\0\x2A" {
        return Err(ParseError::ByteOrder);
    }

    let ifd0_offset = read_u32(tiff, 4) as usize;
    let ifd0 = parse_ifd(tiff, ifd0_offset)?;

    let ifd1 = match ifd0.iter().find(|e| e.tag == TAG_EXIF_IFD) {
        Some(ptr) => parse_ifd(tiff, u32::from_be_bytes(ptr.raw_value) as usize)?,
        None => Vec::new(),
    };

    Ok(ParsedExif { ifd0, ifd1 })
}

fn parse_ifd(tiff: &[u8], offset: usize) -> Result<Vec<ParsedEntry>, ParseError> {
    if offset + 2 > tiff.len() {
        return Err(ParseError::Truncated("directory count"));
    }
    let count = read_u16(tiff, offset) as usize;
    let start = offset + 2;
    if start + count * ENTRY_SIZE + 4 > tiff.len() {
        return Err(ParseError::Truncated("directory entries"));
    }

    (0..count)
        .map(|i| parse_entry(tiff, start + i * ENTRY_SIZE))
        .collect()
}

fn parse_entry(tiff: &[u8], at: usize) -> Result<ParsedEntry, ParseError> {
    let tag = read_u16(tiff, at);
    let type_code = read_u16(tiff, at + 2);
    let count = read_u32(tiff, at + 4);
    let raw_value: [u8; 4] = [tiff[at + 8], tiff[at + 9], tiff[at + 10], tiff[at + 11]];

    let unit = match type_code {
        TYPE_ASCII | TYPE_UNDEFINED => 1,
        TYPE_USHORT | TYPE_SSHORT => 2,
        TYPE_LONG => 4,
        other => return Err(ParseError::UnknownType(other)),
    };
    let len = unit * count as usize;

    let (offset, value) = if len <= INLINE_LIMIT {
        (None, raw_value[..len].to_vec())
    } else {
        let off = u32::from_be_bytes(raw_value);
        let start = off as usize;
        let bytes = tiff
            .get(start..start + len)
            .ok_or(ParseError::Truncated("out-of-line value"))?;
        (Some(off), bytes.to_vec())
    };

    Ok(ParsedEntry { tag, type_code, count, raw_value, offset, value })
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Return the contents of the first `Exif\0\0` APP1 segment of a JPEG.
pub fn find_exif_segment(jpeg_bytes: &[u8]) -> Option<Vec<u8>> {
    let jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(jpeg_bytes)).ok()?;
    jpeg.segments()
        .iter()
        .find(|s| s.marker() == APP1 && s.contents().starts_with(EXIF_PREFIX))
        .map(|s| s.contents().to_vec())
}

/// Summary of capture metadata read back from a JPEG file.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExifSummary {
    pub description: Option<String>,
    pub modify_date: Option<String>,
    pub original_date: Option<String>,
}

/// Read capture metadata from an image file with an independent EXIF
/// parser.
pub fn read_exif(path: &Path) -> Result<ExifSummary> {
    let mut parser = MediaParser::new();
    let ms = MediaSource::file_path(path).context("Failed to open image file")?;

    let iter: ExifIter = match parser.parse(ms) {
        Ok(iter) => iter,
        Err(_) => {
            log::debug!("No EXIF data found in {}", path.display());
            return Ok(ExifSummary::default());
        }
    };
    let exif: Exif = iter.into();

    Ok(ExifSummary {
        description: exif.get(ExifTag::ImageDescription).and_then(entry_to_string),
        modify_date: exif.get(ExifTag::ModifyDate).and_then(entry_to_string),
        original_date: exif.get(ExifTag::DateTimeOriginal).and_then(entry_to_string),
    })
}

fn entry_to_string(val: &EntryValue) -> Option<String> {
    let s = val.to_string();
    let s = s.trim().trim_matches('"').to_string();
    if s.is_empty() { None } else { Some(s) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_signature() {
        assert_eq!(parse_segment(b"JFIF\0\0MM\0\x2A\0\0\0\x08").unwrap_err(), ParseError::NotExif);
    }

    #[test]
    fn rejects_little_endian() {
        let seg = b"Exif\0\0II\x2A\0\x08\0\0\0";
        assert_eq!(parse_segment(seg).unwrap_err(), ParseError::ByteOrder);
    }

    #[test]
    fn rejects_truncated_directory() {
        // IFD0 claims two entries but the buffer ends after the count
        let seg = b"Exif\0\0MM\0\x2A\0\0\0\x08\0\x02";
        assert_eq!(
            parse_segment(seg).unwrap_err(),
            ParseError::Truncated("directory entries")
        );
    }

    #[test]
    fn rejects_out_of_range_value() {
        let mut seg = b"Exif\0\0MM\0\x2A\0\0\0\x08".to_vec();
        seg.extend_from_slice(&[0, 1]); // one entry
        seg.extend_from_slice(&[0x01, 0x0E, 0, 2, 0, 0, 0, 20, 0, 0, 0x10, 0]);
        seg.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(
            parse_segment(&seg).unwrap_err(),
            ParseError::Truncated("out-of-line value")
        );
    }

    #[test]
    fn empty_tz_offset_is_absent() {
        let mut seg = b"Exif\0\0MM\0\x2A\0\0\0\x08".to_vec();
        seg.extend_from_slice(&[0, 1]);
        // SSHORT with count 0: no value bytes at all
        seg.extend_from_slice(&[0x88, 0x2A, 0, 8, 0, 0, 0, 0, 0, 0, 0, 0]);
        seg.extend_from_slice(&[0, 0, 0, 0]);

        let parsed = parse_segment(&seg).unwrap();
        assert!(parsed.find(TAG_TZ_OFFSET).unwrap().value.is_empty());
        assert_eq!(parsed.tz_offset_hours(), None);
    }

    #[test]
    fn summary_serializes_for_json_listing() {
        let summary = ExifSummary { description: Some("porch".into()), ..Default::default() };
        let v = serde_json::to_value(&summary).unwrap();
        assert_eq!(v["description"], "porch");
        assert!(v["modify_date"].is_null());
        assert!(v["original_date"].is_null());
    }

    #[test]
    fn find_exif_segment_ignores_non_jpeg() {
        assert!(find_exif_segment(b"not a jpeg").is_none());
    }
}
