use camjpeg::codec::{self, CodecError};
use camjpeg::exif::tiff::{
    TAG_DATETIME, TAG_EXIF_VERSION, TAG_IMAGE_DESCRIPTION, TAG_ORIGINAL_DATETIME,
    TAG_ORIGINAL_DATETIME_SS,
};
use camjpeg::exif::{CaptureContext, RegionOfInterest, find_exif_segment, parse_segment};
use camjpeg::planes::PlaneLayout;
use chrono::DateTime;
use img_parts::Bytes;
use img_parts::jpeg::Jpeg;

const DHT: u8 = 0xC4;

/// Flat frame: every sample of a plane has the same value.
fn flat_frame(width: usize, height: usize, y: u8, cb: u8, cr: u8) -> Vec<u8> {
    let layout = PlaneLayout::new(width, height).unwrap();
    let mut frame = vec![y; layout.luma_len()];
    frame.extend(std::iter::repeat_n(cb, layout.chroma_len()));
    frame.extend(std::iter::repeat_n(cr, layout.chroma_len()));
    frame
}

/// Pseudo-random texture so quantisation has something to throw away.
fn noisy_frame(width: usize, height: usize) -> Vec<u8> {
    let len = PlaneLayout::new(width, height).unwrap().frame_len();
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

fn encode(frame: &[u8], width: usize, height: usize, quality: u8, ctx: Option<&CaptureContext>) -> Vec<u8> {
    let mut out = vec![0u8; frame.len() * 2 + 64 * 1024];
    let n = codec::encode_yuv420p(&mut out, frame, width, height, quality, ctx).unwrap();
    out.truncate(n);
    out
}

fn capture() -> CaptureContext {
    CaptureContext {
        timestamp: Some(DateTime::parse_from_rfc3339("2024-01-15T10:30:00.250-05:00").unwrap()),
        description_template: Some("porch camera %d/%m/%Y".into()),
        subsec: true,
        region: Some(RegionOfInterest {
            center_x: 24,
            center_y: 16,
            width: 8,
            height: 6,
        }),
    }
}

fn assert_close(actual: &[u8], expected: u8, tolerance: u8, what: &str) {
    for (i, &v) in actual.iter().enumerate() {
        assert!(
            v.abs_diff(expected) <= tolerance,
            "{what}[{i}] = {v}, expected {expected}±{tolerance}"
        );
    }
}

#[test]
fn flat_frame_survives_roundtrip() {
    let (w, h) = (48, 32);
    let frame = flat_frame(w, h, 90, 60, 200);
    let jpeg = encode(&frame, w, h, 95, None);
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    let mut decoded = vec![0u8; frame.len()];
    codec::decode_jpeg(&jpeg, w, h, &mut decoded).unwrap();

    let layout = PlaneLayout::new(w, h).unwrap();
    let (y, cb, cr) = layout.split(&decoded).unwrap();
    assert_close(y, 90, 3, "y");
    assert_close(cb, 60, 3, "cb");
    assert_close(cr, 200, 3, "cr");
}

#[test]
fn partial_final_block() {
    let (w, h) = (100, 100);
    let frame = flat_frame(w, h, 128, 128, 128);
    let jpeg = encode(&frame, w, h, 75, None);
    assert_eq!(codec::probe_dimensions(&jpeg).unwrap(), (100, 100));

    let mut decoded = vec![0u8; frame.len()];
    codec::decode_jpeg(&jpeg, w, h, &mut decoded).unwrap();
    assert_close(&decoded, 128, 3, "frame");
}

#[test]
fn odd_dimensions() {
    let (w, h) = (33, 17);
    let frame = flat_frame(w, h, 40, 100, 150);
    let jpeg = encode(&frame, w, h, 90, None);

    let mut decoded = vec![0u8; frame.len()];
    codec::decode_jpeg(&jpeg, w, h, &mut decoded).unwrap();
    let (y, _, _) = PlaneLayout::new(w, h).unwrap().split(&decoded).unwrap();
    assert_close(y, 40, 3, "y");
}

#[test]
fn exif_segment_is_embedded() {
    let (w, h) = (48, 32);
    let jpeg = encode(&flat_frame(w, h, 90, 128, 128), w, h, 80, Some(&capture()));

    let segment = find_exif_segment(&jpeg).expect("no EXIF APP1 segment");
    let parsed = parse_segment(&segment).unwrap();

    assert_eq!(
        parsed.string(TAG_IMAGE_DESCRIPTION).as_deref(),
        Some("porch camera 15/01/2024")
    );
    assert_eq!(parsed.string(TAG_DATETIME).as_deref(), Some("2024:01:15 10:30:00"));
    assert_eq!(parsed.string(TAG_ORIGINAL_DATETIME).as_deref(), Some("2024:01:15 10:30:00"));
    assert_eq!(parsed.tz_offset_hours(), Some(-5));
    assert_eq!(parsed.find(TAG_EXIF_VERSION).unwrap().value, b"0220");
    assert_eq!(parsed.find(TAG_ORIGINAL_DATETIME_SS).unwrap().value, b"250");
    assert_eq!(parsed.subject_area(), Some([24, 16, 8, 6]));

    // The frame still decodes with the segment present.
    let mut decoded = vec![0u8; PlaneLayout::new(w, h).unwrap().frame_len()];
    codec::decode_jpeg(&jpeg, w, h, &mut decoded).unwrap();
}

#[test]
fn no_context_no_exif() {
    let jpeg = encode(&flat_frame(16, 16, 0, 128, 128), 16, 16, 80, None);
    assert!(find_exif_segment(&jpeg).is_none());
}

#[test]
fn quality_changes_size() {
    let (w, h) = (64, 64);
    let frame = noisy_frame(w, h);
    let low = encode(&frame, w, h, 10, None);
    let high = encode(&frame, w, h, 95, None);
    assert!(low.len() < high.len(), "q10 {} bytes, q95 {} bytes", low.len(), high.len());
}

#[test]
fn destination_too_small() {
    let frame = noisy_frame(32, 32);
    let mut dest = [0u8; 16];
    let err = codec::encode_yuv420p(&mut dest, &frame, 32, 32, 75, None).unwrap_err();
    assert!(matches!(err, CodecError::BufferTooSmall { capacity: 16, .. }));
    assert_eq!(dest, [0u8; 16]);
}

#[test]
fn size_mismatch_rejected() {
    let jpeg = encode(&flat_frame(32, 16, 10, 128, 128), 32, 16, 75, None);

    let mut dest = vec![0x5A; PlaneLayout::new(16, 16).unwrap().frame_len()];
    let err = codec::decode_jpeg(&jpeg, 16, 16, &mut dest).unwrap_err();
    assert!(matches!(
        err,
        CodecError::DimensionMismatch {
            actual_width: 32,
            actual_height: 16,
            ..
        }
    ));
    assert!(dest.iter().all(|&b| b == 0x5A));
}

#[test]
fn decodes_stream_without_huffman_tables() {
    let (w, h) = (32, 32);
    let frame = noisy_frame(w, h);
    let jpeg = encode(&frame, w, h, 75, None);

    let mut stripped = Jpeg::from_bytes(Bytes::from(jpeg.clone())).unwrap();
    stripped.segments_mut().retain(|s| s.marker() != DHT);
    let stripped = stripped.encoder().bytes().to_vec();
    assert!(stripped.len() < jpeg.len());

    let mut expected = vec![0u8; frame.len()];
    codec::decode_jpeg(&jpeg, w, h, &mut expected).unwrap();
    let mut actual = vec![0u8; frame.len()];
    codec::decode_jpeg(&stripped, w, h, &mut actual).unwrap();
    assert_eq!(actual, expected);
}

#[test]
fn missing_end_marker_is_tolerated() {
    let (w, h) = (16, 16);
    let jpeg = encode(&flat_frame(w, h, 70, 128, 128), w, h, 75, None);
    assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);

    let mut dest = vec![0u8; PlaneLayout::new(w, h).unwrap().frame_len()];
    codec::decode_jpeg(&jpeg[..jpeg.len() - 2], w, h, &mut dest).unwrap();
}

#[test]
fn greyscale_encode() {
    let (w, h) = (24, 20);
    let luma = vec![180u8; w * h];
    let mut out = vec![0u8; 64 * 1024];
    let n = codec::encode_grey(&mut out, &luma, w, h, 85, Some(&capture())).unwrap();
    let jpeg = &out[..n];

    assert_eq!(codec::probe_dimensions(jpeg).unwrap(), (24, 20));
    assert!(find_exif_segment(jpeg).is_some());

    let img = image::load_from_memory(jpeg).unwrap();
    assert_eq!(img.color(), image::ColorType::L8);
    assert_close(img.to_luma8().as_raw(), 180, 3, "luma");
}

#[test]
fn independent_reader_sees_metadata() {
    let (w, h) = (32, 32);
    let jpeg = encode(&flat_frame(w, h, 90, 128, 128), w, h, 80, Some(&capture()));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.jpg");
    std::fs::write(&path, &jpeg).unwrap();

    let summary = camjpeg::exif::read_exif(&path).unwrap();
    assert_eq!(summary.description.as_deref(), Some("porch camera 15/01/2024"));
    assert!(summary.modify_date.is_some());
    assert!(summary.original_date.is_some());
}
