use super::fields::MetadataFields;
use super::tiff::{ENTRY_SIZE, IFD_OVERHEAD, SEGMENT_PREAMBLE, TIFF_HEADER_LEN};

/// Slack per text value: NUL terminator plus worst-case alignment padding.
const TEXT_SLACK: usize = 5;

/// Out-of-line bytes for the subject area (four unsigned shorts).
const SUBJECT_AREA_BYTES: usize = 8;

/// Sizes computed before the segment buffer is allocated.
///
/// `data_size` is an upper bound on out-of-line data; the writer may use
/// less. The directory sizes are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectoryPlan {
    pub ifd0_tags: usize,
    pub ifd1_tags: usize,
    pub data_size: usize,
    pub ifds_size: usize,
}

impl DirectoryPlan {
    pub fn is_empty(&self) -> bool {
        self.ifds_size == 0
    }

    /// Bytes to allocate for the whole segment.
    pub fn capacity(&self) -> usize {
        SEGMENT_PREAMBLE.len() + self.ifds_size + self.data_size
    }

    /// TIFF-relative offset where out-of-line data begins.
    pub fn data_start(&self) -> usize {
        TIFF_HEADER_LEN + self.ifds_size
    }

    /// TIFF-relative offset of the Exif sub-IFD: header plus all of IFD0.
    pub fn ifd1_offset(&self) -> usize {
        TIFF_HEADER_LEN + ifd_size(self.ifd0_tags)
    }
}

fn ifd_size(tags: usize) -> usize {
    if tags == 0 { 0 } else { IFD_OVERHEAD + ENTRY_SIZE * tags }
}

/// Count entries per directory and bound the out-of-line data.
pub fn plan(fields: &MetadataFields) -> DirectoryPlan {
    let mut p = DirectoryPlan::default();

    if let Some(ref desc) = fields.description {
        p.ifd0_tags += 1;
        p.data_size += desc.len() + TEXT_SLACK;
    }

    // Written to both the TIFF datetime and the Exif original-datetime
    // tags, each with its own copy of the value, plus the timezone tag.
    if let Some(ref datetime) = fields.datetime {
        p.ifd0_tags += 2;
        p.ifd1_tags += 1;
        p.data_size += 2 * (datetime.len() + TEXT_SLACK);
    }

    if let Some(ref subsec) = fields.subsec_time {
        p.ifd1_tags += 1;
        p.data_size += subsec.len() + TEXT_SLACK;
    }

    if fields.region.is_some() {
        p.ifd1_tags += 1;
        p.data_size += SUBJECT_AREA_BYTES;
    }

    // The sub-IFD needs a pointer in IFD0 and carries the Exif version.
    if p.ifd1_tags > 0 {
        p.ifd0_tags += 1;
        p.ifd1_tags += 1;
    }

    p.ifds_size = ifd_size(p.ifd0_tags) + ifd_size(p.ifd1_tags);
    p
}
