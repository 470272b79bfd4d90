//! Conversion between 4:2:0 planar frames and the row layouts the JPEG
//! codec consumes and produces.
//!
//! A planar frame is one buffer: the full-resolution Y plane followed by the
//! quarter-resolution Cb and Cr planes, with no padding in between.
//!
//! - Decoding hands us interleaved `Y Cb Cr` rows, three bytes per pixel.
//!   [`PlanarWriter`] scatters them into the planes, taking chroma by
//!   decimation: each chroma sample is the one from the bottom-right pixel
//!   of its 2×2 block, not an average of the four.
//! - Encoding wants raw downsampled data in blocks of 16 luma rows and 8
//!   chroma rows. [`RawBlocks`] walks the planes and yields those blocks;
//!   slots past the bottom of the image are `None`.

use std::iter::FusedIterator;

/// Luma rows per raw block (two 8×8 MCU rows at 2×2 sampling).
pub const BLOCK_ROWS: usize = 16;

/// Chroma rows per raw block.
pub const CHROMA_BLOCK_ROWS: usize = BLOCK_ROWS / 2;

/// Bytes per pixel in an interleaved decode row.
pub const RAW_COMPONENTS: usize = 3;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlaneError {
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    ZeroSize { width: usize, height: usize },
    #[error("plane buffer is {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("raw row is {actual} bytes, expected {expected}")]
    RowLength { expected: usize, actual: usize },
    #[error("more than {height} rows supplied")]
    TooManyRows { height: usize },
}

/// Geometry of a 4:2:0 planar frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub width: usize,
    pub height: usize,
}

impl PlaneLayout {
    pub fn new(width: usize, height: usize) -> Result<Self, PlaneError> {
        if width == 0 || height == 0 {
            return Err(PlaneError::ZeroSize { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn luma_len(&self) -> usize {
        self.width * self.height
    }

    pub fn chroma_width(&self) -> usize {
        self.width / 2
    }

    pub fn chroma_height(&self) -> usize {
        self.height / 2
    }

    pub fn chroma_len(&self) -> usize {
        self.chroma_width() * self.chroma_height()
    }

    /// Y plus both chroma planes.
    pub fn frame_len(&self) -> usize {
        self.luma_len() + 2 * self.chroma_len()
    }

    fn check(&self, len: usize) -> Result<(), PlaneError> {
        if len != self.frame_len() {
            return Err(PlaneError::BufferSize {
                expected: self.frame_len(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Split a frame buffer into its Y, Cb and Cr planes.
    pub fn split<'a>(&self, frame: &'a [u8]) -> Result<(&'a [u8], &'a [u8], &'a [u8]), PlaneError> {
        self.check(frame.len())?;
        let (y, chroma) = frame.split_at(self.luma_len());
        let (cb, cr) = chroma.split_at(self.chroma_len());
        Ok((y, cb, cr))
    }

    pub fn split_mut<'a>(
        &self,
        frame: &'a mut [u8],
    ) -> Result<(&'a mut [u8], &'a mut [u8], &'a mut [u8]), PlaneError> {
        self.check(frame.len())?;
        let (y, chroma) = frame.split_at_mut(self.luma_len());
        let (cb, cr) = chroma.split_at_mut(self.chroma_len());
        Ok((y, cb, cr))
    }
}

// ── decode direction ─────────────────────────────────────────────────

/// Scatters interleaved `Y Cb Cr` rows into a planar frame, one row at a
/// time, in order.
#[derive(Debug)]
pub struct PlanarWriter<'a> {
    layout: PlaneLayout,
    y: &'a mut [u8],
    cb: &'a mut [u8],
    cr: &'a mut [u8],
    row: usize,
}

impl<'a> PlanarWriter<'a> {
    pub fn new(layout: PlaneLayout, frame: &'a mut [u8]) -> Result<Self, PlaneError> {
        let (y, cb, cr) = layout.split_mut(frame)?;
        Ok(Self { layout, y, cb, cr, row: 0 })
    }

    pub fn is_complete(&self) -> bool {
        self.row == self.layout.height
    }

    pub fn push_row(&mut self, raw: &[u8]) -> Result<(), PlaneError> {
        let PlaneLayout { width, height } = self.layout;
        if raw.len() != width * RAW_COMPONENTS {
            return Err(PlaneError::RowLength {
                expected: width * RAW_COMPONENTS,
                actual: raw.len(),
            });
        }
        if self.row >= height {
            return Err(PlaneError::TooManyRows { height });
        }

        let r = self.row;
        let luma = &mut self.y[r * width..(r + 1) * width];
        for (dst, px) in luma.iter_mut().zip(raw.chunks_exact(RAW_COMPONENTS)) {
            *dst = px[0];
        }

        // Odd rows and odd columns: the last sample of each 2x2 block wins.
        let cw = self.layout.chroma_width();
        let cy = r / 2;
        if r % 2 == 1 && cy < self.layout.chroma_height() {
            let cb = &mut self.cb[cy * cw..(cy + 1) * cw];
            let cr = &mut self.cr[cy * cw..(cy + 1) * cw];
            for cx in 0..cw {
                let px = &raw[(2 * cx + 1) * RAW_COMPONENTS..];
                cb[cx] = px[1];
                cr[cx] = px[2];
            }
        }

        self.row += 1;
        Ok(())
    }
}

/// Convert `height` interleaved rows into a planar frame.
///
/// # Example
///
/// ```rust
/// use camjpeg::planes::{PlaneLayout, raw_rows_to_planar};
///
/// let layout = PlaneLayout::new(2, 2).unwrap();
/// let raw = [
///     10, 1, 2, 11, 3, 4, // row 0
///     12, 5, 6, 13, 7, 8, // row 1
/// ];
/// let mut frame = vec![0u8; layout.frame_len()];
/// raw_rows_to_planar(&raw, layout, &mut frame).unwrap();
/// assert_eq!(frame, [10, 11, 12, 13, 7, 8]);
/// ```
pub fn raw_rows_to_planar(raw: &[u8], layout: PlaneLayout, frame: &mut [u8]) -> Result<(), PlaneError> {
    let stride = layout.width * RAW_COMPONENTS;
    let expected = stride * layout.height;
    if raw.len() != expected {
        return Err(PlaneError::BufferSize { expected, actual: raw.len() });
    }
    let mut writer = PlanarWriter::new(layout, frame)?;
    for row in raw.chunks_exact(stride) {
        writer.push_row(row)?;
    }
    Ok(())
}

// ── encode direction ─────────────────────────────────────────────────

/// Row slices for one 16-row band of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawBlock<'a> {
    /// Index of the first luma row in this block.
    pub first_row: usize,
    pub y: [Option<&'a [u8]>; BLOCK_ROWS],
    pub cb: [Option<&'a [u8]>; CHROMA_BLOCK_ROWS],
    pub cr: [Option<&'a [u8]>; CHROMA_BLOCK_ROWS],
}

impl RawBlock<'_> {
    /// Number of luma rows that lie inside the image.
    pub fn luma_rows(&self) -> usize {
        self.y.iter().take_while(|r| r.is_some()).count()
    }
}

/// Iterator over the raw blocks of a planar frame, top to bottom.
#[derive(Debug, Clone)]
pub struct RawBlocks<'a> {
    layout: PlaneLayout,
    y: &'a [u8],
    cb: &'a [u8],
    cr: &'a [u8],
    next_row: usize,
}

impl<'a> Iterator for RawBlocks<'a> {
    type Item = RawBlock<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let PlaneLayout { width, height } = self.layout;
        if self.next_row >= height {
            return None;
        }

        let cw = self.layout.chroma_width();
        let ch = self.layout.chroma_height();
        let j = self.next_row;
        let mut block = RawBlock {
            first_row: j,
            y: [None; BLOCK_ROWS],
            cb: [None; CHROMA_BLOCK_ROWS],
            cr: [None; CHROMA_BLOCK_ROWS],
        };

        for i in 0..BLOCK_ROWS {
            let r = j + i;
            if r >= height {
                break;
            }
            block.y[i] = Some(&self.y[r * width..(r + 1) * width]);
            // An odd final luma row has no chroma row of its own.
            if i % 2 == 0 && r / 2 < ch {
                let c = r / 2;
                block.cb[i / 2] = Some(&self.cb[c * cw..(c + 1) * cw]);
                block.cr[i / 2] = Some(&self.cr[c * cw..(c + 1) * cw]);
            }
        }

        self.next_row += BLOCK_ROWS;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.layout.height.saturating_sub(self.next_row).div_ceil(BLOCK_ROWS);
        (left, Some(left))
    }
}

impl ExactSizeIterator for RawBlocks<'_> {}
impl FusedIterator for RawBlocks<'_> {}

/// Split a planar frame into raw blocks for the encoder.
pub fn planar_to_raw_blocks(frame: &[u8], layout: PlaneLayout) -> Result<RawBlocks<'_>, PlaneError> {
    let (y, cb, cr) = layout.split(frame)?;
    Ok(RawBlocks { layout, y, cb, cr, next_row: 0 })
}
