//! Big-endian TIFF primitives used by the EXIF segment writer.
//!
//! All multi-byte values are written in Motorola byte order (`MM`), which is
//! what the segment header declares. Offsets stored in directory entries are
//! relative to the TIFF header, not to the start of the APP1 payload.

// IFD0 tags
pub const TAG_IMAGE_DESCRIPTION: u16 = 0x010E;
pub const TAG_DATETIME: u16 = 0x0132;
pub const TAG_EXIF_IFD: u16 = 0x8769;
pub const TAG_TZ_OFFSET: u16 = 0x882A;

// Exif sub-IFD tags
pub const TAG_EXIF_VERSION: u16 = 0x9000;
pub const TAG_ORIGINAL_DATETIME: u16 = 0x9003;
pub const TAG_SUBJECT_AREA: u16 = 0x9214;
pub const TAG_ORIGINAL_DATETIME_SS: u16 = 0x9291;

pub const TYPE_ASCII: u16 = 2;
pub const TYPE_USHORT: u16 = 3;
pub const TYPE_LONG: u16 = 4;
pub const TYPE_UNDEFINED: u16 = 7;
pub const TYPE_SSHORT: u16 = 8;

/// Size of one directory entry: tag, type, count, value-or-offset.
pub const ENTRY_SIZE: usize = 12;

/// Entry count (2 bytes) plus next-IFD pointer (4 bytes).
pub const IFD_OVERHEAD: usize = 6;

/// Values up to this many bytes live in the entry itself.
pub const INLINE_LIMIT: usize = 4;

/// `Exif\0\0` signature followed by the big-endian TIFF header whose first
/// IFD sits at offset 8.
pub const SEGMENT_PREAMBLE: [u8; 14] = [
    b'E', b'x', b'i', b'f', 0, 0, // APP1 signature
    b'M', b'M', 0, 42, // TIFF header, big-endian
    0, 0, 0, 8, // offset of IFD0
];

/// Offset of the TIFF header inside the segment; every stored offset is
/// relative to it.
pub const TIFF_BASE: usize = 6;

/// Length of the TIFF file header.
pub const TIFF_HEADER_LEN: usize = 8;

/// Exif version 2.2 as a four byte blob.
pub const EXIF_VERSION: [u8; 4] = *b"0220";

pub fn put_u16(buf: &mut [u8], value: u16) {
    buf[..2].copy_from_slice(&value.to_be_bytes());
}

pub fn put_i16(buf: &mut [u8], value: i16) {
    buf[..2].copy_from_slice(&value.to_be_bytes());
}

pub fn put_u32(buf: &mut [u8], value: u32) {
    buf[..4].copy_from_slice(&value.to_be_bytes());
}

/// Stateful cursor over a pre-sized segment buffer.
///
/// `pos` is the absolute write position for directory bytes; `data_offset`
/// is the TIFF-relative position where the next out-of-line value goes.
#[derive(Debug)]
pub struct TiffWriter {
    buf: Vec<u8>,
    pos: usize,
    data_offset: usize,
}

impl TiffWriter {
    /// Wrap a zeroed buffer. Directory writing starts right after the
    /// preamble; out-of-line data starts at `data_offset`.
    pub fn new(buf: Vec<u8>, data_offset: usize) -> Self {
        Self {
            buf,
            pos: SEGMENT_PREAMBLE.len(),
            data_offset,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    pub fn put_u16(&mut self, value: u16) {
        put_u16(&mut self.buf[self.pos..], value);
        self.pos += 2;
    }

    pub fn put_u32(&mut self, value: u32) {
        put_u32(&mut self.buf[self.pos..], value);
        self.pos += 4;
    }

    /// Copy a pre-formed 12-byte entry verbatim.
    pub fn put_raw_entry(&mut self, entry: &[u8; ENTRY_SIZE]) {
        self.buf[self.pos..self.pos + ENTRY_SIZE].copy_from_slice(entry);
        self.pos += ENTRY_SIZE;
    }

    /// Write a full directory entry. `count` is in units of `type_code`.
    pub fn put_entry(&mut self, tag: u16, type_code: u16, count: u32, data: &[u8]) {
        self.put_u16(tag);
        self.put_u16(type_code);
        self.put_u32(count);
        self.put_value(data);
    }

    /// Fill the 4-byte value slot: inline when it fits, otherwise at the
    /// next 4-byte aligned overflow offset.
    pub fn put_value(&mut self, data: &[u8]) {
        if data.len() <= INLINE_LIMIT {
            let slot = &mut self.buf[self.pos..self.pos + INLINE_LIMIT];
            slot.fill(0);
            slot[..data.len()].copy_from_slice(data);
        } else {
            let offset = align4(self.data_offset);
            let start = TIFF_BASE + self.data_offset;
            let at = TIFF_BASE + offset;
            debug_assert!(
                at + data.len() <= self.buf.len(),
                "segment sized too small: need {} bytes, have {}",
                at + data.len(),
                self.buf.len()
            );
            self.buf[start..at].fill(0);
            self.buf[at..at + data.len()].copy_from_slice(data);
            put_u32(&mut self.buf[self.pos..], offset as u32);
            self.data_offset = offset + data.len();
        }
        self.pos += INLINE_LIMIT;
    }

    /// ASCII entry; `with_nul` appends the terminator and counts it.
    pub fn put_string(&mut self, tag: u16, value: &str, with_nul: bool) {
        let mut data = value.as_bytes().to_vec();
        if with_nul {
            data.push(0);
        }
        self.put_entry(tag, TYPE_ASCII, data.len() as u32, &data);
    }

    /// Total bytes consumed: preamble signature plus the TIFF structure up
    /// to the end of the last out-of-line value.
    pub fn consumed(&self) -> usize {
        TIFF_BASE + self.data_offset
    }

    /// Finish writing, trimming any planner slack off the end.
    pub fn into_bytes(mut self) -> Vec<u8> {
        let len = self.consumed();
        self.buf.truncate(len);
        self.buf
    }
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}
