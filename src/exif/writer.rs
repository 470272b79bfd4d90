use super::fields::MetadataFields;
use super::planner::{DirectoryPlan, plan};
use super::tiff::{
    ENTRY_SIZE, SEGMENT_PREAMBLE, TAG_DATETIME, TAG_EXIF_IFD, TAG_IMAGE_DESCRIPTION,
    TAG_ORIGINAL_DATETIME, TAG_ORIGINAL_DATETIME_SS, TAG_SUBJECT_AREA, TYPE_LONG, TYPE_USHORT,
    TiffWriter, put_i16,
};

// Fixed entries, copied verbatim into the directories.
const EXIF_VERSION_ENTRY: [u8; ENTRY_SIZE] = [
    0x90, 0x00, // tag 0x9000
    0x00, 0x07, // undefined (byte blob)
    0x00, 0x00, 0x00, 0x04, // four bytes
    b'0', b'2', b'2', b'0', // inline: version 2.2
];

const TZ_OFFSET_ENTRY: [u8; ENTRY_SIZE] = [
    0x88, 0x2A, // tag 0x882A
    0x00, 0x08, // signed short
    0x00, 0x00, 0x00, 0x01, // one value
    0, 0, 0, 0, // filled per capture
];

/// Build the APP1 payload for `fields`, or `None` when nothing would be
/// written.
///
/// The returned buffer starts with `Exif\0\0` and is exactly as long as the
/// bytes written; the planner's slack is not included.
///
/// # Example
///
/// ```rust
/// use camjpeg::exif::{MetadataFields, build_segment};
///
/// let fields = MetadataFields {
///     datetime: Some("2024:01:15 10:30:00".into()),
///     ..Default::default()
/// };
/// let segment = build_segment(&fields).unwrap();
/// assert!(segment.starts_with(b"Exif\0\0MM"));
///
/// assert!(build_segment(&MetadataFields::default()).is_none());
/// ```
pub fn build_segment(fields: &MetadataFields) -> Option<Vec<u8>> {
    let sizes = plan(fields);
    if sizes.is_empty() {
        return None;
    }
    let segment = write_segment(fields, &sizes);
    log::debug!(
        "EXIF segment: {} bytes ({} + {} tags, {} allocated)",
        segment.len(),
        sizes.ifd0_tags,
        sizes.ifd1_tags,
        sizes.capacity()
    );
    Some(segment)
}

/// Second pass: write the directories into a buffer sized by `sizes`.
///
/// `sizes` must come from [`plan`] over the same `fields`.
pub fn write_segment(fields: &MetadataFields, sizes: &DirectoryPlan) -> Vec<u8> {
    let mut buf = vec![0u8; sizes.capacity()];
    buf[..SEGMENT_PREAMBLE.len()].copy_from_slice(&SEGMENT_PREAMBLE);

    let mut w = TiffWriter::new(buf, sizes.data_start());
    write_ifd0(&mut w, fields, sizes);
    if sizes.ifd1_tags > 0 {
        write_ifd1(&mut w, fields, sizes);
    }
    debug_assert_eq!(w.position(), SEGMENT_PREAMBLE.len() + sizes.ifds_size);
    w.into_bytes()
}

// Tags must appear in ascending numeric order.
fn write_ifd0(w: &mut TiffWriter, fields: &MetadataFields, sizes: &DirectoryPlan) {
    w.put_u16(sizes.ifd0_tags as u16);

    if let Some(ref desc) = fields.description {
        w.put_string(TAG_IMAGE_DESCRIPTION, desc, true);
    }

    if let Some(ref datetime) = fields.datetime {
        w.put_string(TAG_DATETIME, datetime, true);
    }

    if sizes.ifd1_tags > 0 {
        w.put_u16(TAG_EXIF_IFD);
        w.put_u16(TYPE_LONG);
        w.put_u32(1);
        w.put_u32(sizes.ifd1_offset() as u32);
    }

    if fields.datetime.is_some() {
        let mut entry = TZ_OFFSET_ENTRY;
        put_i16(&mut entry[8..], fields.tz_offset_hours);
        w.put_raw_entry(&entry);
    }

    w.put_u32(0); // no next IFD
}

fn write_ifd1(w: &mut TiffWriter, fields: &MetadataFields, sizes: &DirectoryPlan) {
    w.put_u16(sizes.ifd1_tags as u16);
    w.put_raw_entry(&EXIF_VERSION_ENTRY);

    if let Some(ref datetime) = fields.datetime {
        w.put_string(TAG_ORIGINAL_DATETIME, datetime, true);
    }

    if let Some(ref region) = fields.region {
        w.put_entry(TAG_SUBJECT_AREA, TYPE_USHORT, 4, &region.to_be_bytes());
    }

    if let Some(ref subsec) = fields.subsec_time {
        w.put_string(TAG_ORIGINAL_DATETIME_SS, subsec, false);
    }

    w.put_u32(0);
}
