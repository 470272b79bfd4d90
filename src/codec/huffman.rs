//! Standard Huffman tables (JPEG Annex K.3, 8-bit precision).
//!
//! Motion-JPEG frames from capture devices routinely leave out their DHT
//! segment and rely on the decoder knowing these tables. Before decoding we
//! splice them back in when the stream has none.

use img_parts::Bytes;
use img_parts::jpeg::{Jpeg, JpegSegment};
use std::borrow::Cow;

const DHT: u8 = 0xC4;
const SOS: u8 = 0xDA;

/// One table: class (0 = DC, 1 = AC), destination id, code counts for
/// lengths 1..=16, then symbols.
#[derive(Debug)]
pub struct HuffmanTable {
    pub class: u8,
    pub id: u8,
    pub bits: [u8; 16],
    pub values: &'static [u8],
}

static DC_LUMINANCE_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

static DC_CHROMINANCE_VALUES: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

static AC_LUMINANCE_VALUES: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

static AC_CHROMINANCE_VALUES: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

pub static STD_HUFFMAN_TABLES: [HuffmanTable; 4] = [
    HuffmanTable {
        class: 0,
        id: 0,
        bits: [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0],
        values: &DC_LUMINANCE_VALUES,
    },
    HuffmanTable {
        class: 1,
        id: 0,
        bits: [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d],
        values: &AC_LUMINANCE_VALUES,
    },
    HuffmanTable {
        class: 0,
        id: 1,
        bits: [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0],
        values: &DC_CHROMINANCE_VALUES,
    },
    HuffmanTable {
        class: 1,
        id: 1,
        bits: [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77],
        values: &AC_CHROMINANCE_VALUES,
    },
];

/// DHT segment contents (without marker and length) holding all four
/// standard tables.
pub fn dht_contents() -> Vec<u8> {
    let mut out = Vec::new();
    for table in &STD_HUFFMAN_TABLES {
        out.push(table.class << 4 | table.id);
        out.extend_from_slice(&table.bits);
        out.extend_from_slice(table.values);
    }
    out
}

/// Return `data` unchanged when it already defines Huffman tables before
/// its first scan, otherwise a copy with the standard tables inserted.
///
/// Streams `img-parts` cannot parse are passed through untouched so the
/// decoder reports the real problem.
pub fn ensure_huffman_tables(data: &[u8]) -> Cow<'_, [u8]> {
    let Ok(mut jpeg) = Jpeg::from_bytes(Bytes::copy_from_slice(data)) else {
        return Cow::Borrowed(data);
    };

    let segments = jpeg.segments();
    let Some(sos) = segments.iter().position(|s| s.marker() == SOS) else {
        return Cow::Borrowed(data);
    };
    if segments[..sos].iter().any(|s| s.marker() == DHT) {
        return Cow::Borrowed(data);
    }

    log::debug!("JPEG stream has no DHT segment, inserting standard tables");
    let dht = JpegSegment::new_with_contents(DHT, Bytes::from(dht_contents()));
    jpeg.segments_mut().insert(sos, dht);
    Cow::Owned(jpeg.encoder().bytes().to_vec())
}
