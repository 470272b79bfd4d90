//! The boundary to the block-based JPEG codec.
//!
//! The adapter in [`codec`](super) only talks to the codec through these
//! traits, so the entropy coder can be swapped (or faked in tests) without
//! touching the metadata or plane handling. [`NativeBackend`] is the
//! production implementation: `jpeg-encoder` on the compress side and
//! `zune-jpeg` on the decompress side.

use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use std::borrow::Cow;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_jpeg::JpegDecoder;

use super::error::CodecError;
use super::huffman::ensure_huffman_tables;
use crate::planes::{RAW_COMPONENTS, RawBlock};

const EOI: [u8; 2] = [0xFF, 0xD9];
const SOS: u8 = 0xDA;

/// Neutral chroma for rows or columns with no sample of their own.
const NEUTRAL_CHROMA: u8 = 128;

/// Pixel layout handed to the compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorKind {
    /// Three components, chroma sampled 2x2, fed as raw blocks.
    Yuv420,
    /// One component, fed as scanlines.
    Grey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressParams {
    pub width: usize,
    pub height: usize,
    pub quality: u8,
    pub color: ColorKind,
}

/// One in-progress compression.
pub trait CompressSession {
    /// Write an `APPn` segment. Only valid before any pixel data.
    fn write_marker(&mut self, app: u8, data: &[u8]) -> Result<(), CodecError>;

    /// Feed the next raw 4:2:0 block, top to bottom.
    fn write_raw_block(&mut self, block: &RawBlock<'_>) -> Result<(), CodecError>;

    /// Feed the next greyscale scanline.
    fn write_scanline(&mut self, row: &[u8]) -> Result<(), CodecError>;

    /// Flush and return the compressed stream.
    fn finish(self: Box<Self>) -> Result<Vec<u8>, CodecError>;
}

/// One in-progress decompression producing interleaved `Y Cb Cr` rows.
pub trait DecompressSession {
    /// Output dimensions from the frame header.
    fn dimensions(&self) -> (usize, usize);

    /// Fill `row` (`width * 3` bytes) with the next scanline.
    fn read_scanline(&mut self, row: &mut [u8]) -> Result<(), CodecError>;

    /// Recoverable corrupt-data warnings seen so far.
    fn warnings(&self) -> usize;
}

pub trait Backend {
    fn start_compress(&self, params: &CompressParams) -> Result<Box<dyn CompressSession>, CodecError>;

    fn start_decompress<'a>(&self, data: &'a [u8]) -> Result<Box<dyn DecompressSession + 'a>, CodecError>;
}

/// `jpeg-encoder` + `zune-jpeg`.
///
/// `zune-jpeg` does not surface its recoverable warnings, so a decompress
/// session reports at most one: a scan with no EOI after it. With this
/// backend the [`MAX_CORRUPT_WARNINGS`](super::MAX_CORRUPT_WARNINGS) check
/// never rejects a frame; only hard decoder errors do.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl Backend for NativeBackend {
    fn start_compress(&self, params: &CompressParams) -> Result<Box<dyn CompressSession>, CodecError> {
        let invalid = || CodecError::InvalidDimensions {
            width: params.width,
            height: params.height,
        };
        let width = u16::try_from(params.width).map_err(|_| invalid())?;
        let height = u16::try_from(params.height).map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }

        let components = match params.color {
            ColorKind::Yuv420 => RAW_COMPONENTS,
            ColorKind::Grey => 1,
        };

        Ok(Box::new(NativeCompress {
            params: *params,
            width,
            height,
            markers: Vec::new(),
            pixels: vec![0; params.width * params.height * components],
            rows: 0,
            last_chroma: None,
        }))
    }

    fn start_decompress<'a>(&self, data: &'a [u8]) -> Result<Box<dyn DecompressSession + 'a>, CodecError> {
        let data = ensure_huffman_tables(data);

        let mut decoder = JpegDecoder::new_with_options(&data[..], decoder_options());
        decoder.decode_headers().map_err(CodecError::fatal)?;
        let (width, height) = decoder
            .dimensions()
            .ok_or_else(|| CodecError::Fatal("no frame header".into()))?;

        // A missing EOI means the scan ended early (premature end of data).
        // Bytes after a present EOI are extraneous and ignored.
        let warnings = usize::from(!has_end_marker(&data));
        if warnings > 0 {
            log::debug!("JPEG stream has no EOI marker");
        }

        Ok(Box::new(NativeDecompress {
            data,
            width,
            height,
            pixels: None,
            row: 0,
            warnings,
        }))
    }
}

/// True when an EOI follows the first scan header. Segments before the
/// scan are skipped, since their payloads (an embedded thumbnail, say) may
/// hold `FF D9` of their own.
fn has_end_marker(data: &[u8]) -> bool {
    let from = scan_start(data).unwrap_or(0);
    data[from..].windows(2).any(|w| w == EOI)
}

/// Offset of the first entropy-coded byte, found by walking the marker
/// segments after SOI.
fn scan_start(data: &[u8]) -> Option<usize> {
    let mut pos = 2;
    loop {
        if *data.get(pos)? != 0xFF {
            return None;
        }
        let marker = *data.get(pos + 1)?;
        match marker {
            // fill byte
            0xFF => {
                pos += 1;
                continue;
            }
            // standalone markers carry no length
            0x01 | 0xD0..=0xD8 => {
                pos += 2;
                continue;
            }
            _ => {}
        }
        let len = u16::from_be_bytes([*data.get(pos + 2)?, *data.get(pos + 3)?]);
        let end = pos + 2 + usize::from(len);
        if marker == SOS {
            return Some(end.min(data.len()));
        }
        pos = end;
    }
}

fn decoder_options() -> DecoderOptions {
    DecoderOptions::default()
        .jpeg_set_out_colorspace(ColorSpace::YCbCr)
        .set_strict_mode(false)
}

struct NativeCompress {
    params: CompressParams,
    width: u16,
    height: u16,
    markers: Vec<(u8, Vec<u8>)>,
    /// Full-resolution interleaved samples; `jpeg-encoder` subsamples them
    /// back down 2x2, so replicated chroma survives unchanged.
    pixels: Vec<u8>,
    rows: usize,
    last_chroma: Option<(Vec<u8>, Vec<u8>)>,
}

impl NativeCompress {
    fn check_row(&self) -> Result<(), CodecError> {
        if self.rows >= self.params.height {
            return Err(CodecError::Fatal(format!(
                "too many scanlines for a {}-row image",
                self.params.height
            )));
        }
        Ok(())
    }
}

impl CompressSession for NativeCompress {
    fn write_marker(&mut self, app: u8, data: &[u8]) -> Result<(), CodecError> {
        if self.rows > 0 {
            return Err(CodecError::Fatal("marker written after pixel data".into()));
        }
        if !(1..=15).contains(&app) {
            return Err(CodecError::Fatal(format!("invalid APP segment number {app}")));
        }
        self.markers.push((app, data.to_vec()));
        Ok(())
    }

    fn write_raw_block(&mut self, block: &RawBlock<'_>) -> Result<(), CodecError> {
        if self.params.color != ColorKind::Yuv420 {
            return Err(CodecError::Fatal("raw blocks fed to a greyscale compressor".into()));
        }
        let width = self.params.width;
        let stride = width * RAW_COMPONENTS;

        for (i, luma) in block.y.iter().enumerate() {
            // Rows past the bottom of the image are ignored.
            let Some(luma) = luma else { continue };
            self.check_row()?;

            if let (Some(cb), Some(cr)) = (block.cb[i / 2], block.cr[i / 2]) {
                self.last_chroma = Some((cb.to_vec(), cr.to_vec()));
            }
            let (cb, cr) = match &self.last_chroma {
                Some((cb, cr)) => (cb.as_slice(), cr.as_slice()),
                None => (&[][..], &[][..]),
            };

            let out = &mut self.pixels[self.rows * stride..(self.rows + 1) * stride];
            for (x, px) in out.chunks_exact_mut(RAW_COMPONENTS).enumerate() {
                let c = x / 2;
                px[0] = luma[x];
                px[1] = cb.get(c).or(cb.last()).copied().unwrap_or(NEUTRAL_CHROMA);
                px[2] = cr.get(c).or(cr.last()).copied().unwrap_or(NEUTRAL_CHROMA);
            }
            self.rows += 1;
        }
        Ok(())
    }

    fn write_scanline(&mut self, row: &[u8]) -> Result<(), CodecError> {
        if self.params.color != ColorKind::Grey {
            return Err(CodecError::Fatal("scanlines fed to a 4:2:0 compressor".into()));
        }
        let width = self.params.width;
        if row.len() != width {
            return Err(CodecError::Fatal(format!(
                "scanline is {} bytes, expected {width}",
                row.len()
            )));
        }
        self.check_row()?;
        self.pixels[self.rows * width..(self.rows + 1) * width].copy_from_slice(row);
        self.rows += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Vec<u8>, CodecError> {
        if self.rows != self.params.height {
            return Err(CodecError::Fatal(format!(
                "compression finished after {} of {} rows",
                self.rows, self.params.height
            )));
        }

        let mut out = Vec::new();
        let mut encoder = Encoder::new(&mut out, self.params.quality);
        let color = match self.params.color {
            ColorKind::Yuv420 => {
                encoder.set_sampling_factor(SamplingFactor::F_2_2);
                ColorType::Ycbcr
            }
            ColorKind::Grey => ColorType::Luma,
        };
        for (app, data) in &self.markers {
            encoder.add_app_segment(*app, data).map_err(CodecError::fatal)?;
        }
        encoder
            .encode(&self.pixels, self.width, self.height, color)
            .map_err(CodecError::fatal)?;
        Ok(out)
    }
}

struct NativeDecompress<'a> {
    data: Cow<'a, [u8]>,
    width: usize,
    height: usize,
    pixels: Option<Vec<u8>>,
    row: usize,
    warnings: usize,
}

impl NativeDecompress<'_> {
    /// Decode the whole frame on first use and normalise it to three
    /// components per pixel.
    fn decoded(&mut self) -> Result<&[u8], CodecError> {
        if self.pixels.is_none() {
            let mut decoder = JpegDecoder::new_with_options(&self.data[..], decoder_options());
            let pixels = decoder.decode().map_err(CodecError::fatal)?;
            let n = self.width * self.height;
            let pixels = if pixels.len() == n * RAW_COMPONENTS {
                pixels
            } else if pixels.len() == n {
                pixels
                    .iter()
                    .flat_map(|&y| [y, NEUTRAL_CHROMA, NEUTRAL_CHROMA])
                    .collect()
            } else {
                return Err(CodecError::Fatal(format!(
                    "decoder produced {} bytes for a {}x{} image",
                    pixels.len(),
                    self.width,
                    self.height
                )));
            };
            self.pixels = Some(pixels);
        }
        Ok(self.pixels.as_deref().unwrap_or_default())
    }
}

impl DecompressSession for NativeDecompress<'_> {
    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn read_scanline(&mut self, row: &mut [u8]) -> Result<(), CodecError> {
        let stride = self.width * RAW_COMPONENTS;
        if row.len() != stride {
            return Err(CodecError::Fatal(format!(
                "scanline buffer is {} bytes, expected {stride}",
                row.len()
            )));
        }
        if self.row >= self.height {
            return Err(CodecError::Fatal("read past the last scanline".into()));
        }
        let r = self.row;
        let pixels = self.decoded()?;
        row.copy_from_slice(&pixels[r * stride..(r + 1) * stride]);
        self.row += 1;
        Ok(())
    }

    fn warnings(&self) -> usize {
        self.warnings
    }
}
