//! Encode and decode entry points.
//!
//! These sit between callers holding planar frames and the block-based
//! codec behind [`Backend`]. Each call is all-or-nothing: on failure the
//! destination buffer is left exactly as it was.
//!
//! ```no_run
//! use camjpeg::codec::{decode_jpeg, encode_yuv420p};
//! use camjpeg::exif::CaptureContext;
//!
//! let (w, h) = (64, 48);
//! let frame = vec![128u8; w * h * 3 / 2];
//! let mut jpeg = vec![0u8; 64 * 1024];
//! let n = encode_yuv420p(&mut jpeg, &frame, w, h, 80, Some(&CaptureContext::default()))?;
//!
//! let mut back = vec![0u8; frame.len()];
//! decode_jpeg(&jpeg[..n], w, h, &mut back)?;
//! # Ok::<(), camjpeg::codec::CodecError>(())
//! ```

mod backend;
mod error;
pub mod huffman;

pub use backend::{
    Backend, ColorKind, CompressParams, CompressSession, DecompressSession, NativeBackend,
};
pub use error::CodecError;

use std::panic::{self, AssertUnwindSafe};

use crate::exif::{CaptureContext, MetadataFields, build_segment};
use crate::planes::{PlanarWriter, PlaneLayout, RAW_COMPONENTS, planar_to_raw_blocks};

/// Decodes reporting more corrupt-data warnings than this are rejected.
pub const MAX_CORRUPT_WARNINGS: usize = 2;

/// `APPn` number carrying the EXIF segment.
const EXIF_APP_SEGMENT: u8 = 1;

/// Encode a 4:2:0 planar frame into `dest` with the native codec.
///
/// Returns the number of bytes written.
pub fn encode_yuv420p(
    dest: &mut [u8],
    src: &[u8],
    width: usize,
    height: usize,
    quality: u8,
    meta: Option<&CaptureContext>,
) -> Result<usize, CodecError> {
    encode_yuv420p_with(&NativeBackend, dest, src, width, height, quality, meta)
}

pub fn encode_yuv420p_with(
    backend: &dyn Backend,
    dest: &mut [u8],
    src: &[u8],
    width: usize,
    height: usize,
    quality: u8,
    meta: Option<&CaptureContext>,
) -> Result<usize, CodecError> {
    check_quality(quality)?;
    let layout = layout_for(width, height)?;
    let blocks = planar_to_raw_blocks(src, layout)?;
    let fields = meta.map(MetadataFields::from_capture).transpose()?;

    let params = CompressParams {
        width,
        height,
        quality,
        color: ColorKind::Yuv420,
    };
    let jpeg = guarded("encode", || {
        let mut session = backend.start_compress(&params)?;
        attach_metadata(session.as_mut(), fields.as_ref())?;
        for block in blocks {
            session.write_raw_block(&block)?;
        }
        session.finish()
    })?;

    copy_out(dest, &jpeg)
}

/// Encode a single luma plane (`width * height` bytes) into `dest`.
pub fn encode_grey(
    dest: &mut [u8],
    src: &[u8],
    width: usize,
    height: usize,
    quality: u8,
    meta: Option<&CaptureContext>,
) -> Result<usize, CodecError> {
    encode_grey_with(&NativeBackend, dest, src, width, height, quality, meta)
}

pub fn encode_grey_with(
    backend: &dyn Backend,
    dest: &mut [u8],
    src: &[u8],
    width: usize,
    height: usize,
    quality: u8,
    meta: Option<&CaptureContext>,
) -> Result<usize, CodecError> {
    check_quality(quality)?;
    let layout = layout_for(width, height)?;
    if src.len() != layout.luma_len() {
        return Err(crate::planes::PlaneError::BufferSize {
            expected: layout.luma_len(),
            actual: src.len(),
        }
        .into());
    }
    let fields = meta.map(MetadataFields::from_capture).transpose()?;

    let params = CompressParams {
        width,
        height,
        quality,
        color: ColorKind::Grey,
    };
    let jpeg = guarded("encode", || {
        let mut session = backend.start_compress(&params)?;
        attach_metadata(session.as_mut(), fields.as_ref())?;
        for row in src.chunks_exact(width) {
            session.write_scanline(row)?;
        }
        session.finish()
    })?;

    copy_out(dest, &jpeg)
}

/// Decode a JPEG of known size into a 4:2:0 planar frame.
///
/// `dest` must hold exactly one frame of `width` x `height`. Chroma is
/// decimated, see [`PlanarWriter`].
pub fn decode_jpeg(data: &[u8], width: usize, height: usize, dest: &mut [u8]) -> Result<(), CodecError> {
    decode_jpeg_with(&NativeBackend, data, width, height, dest)
}

pub fn decode_jpeg_with(
    backend: &dyn Backend,
    data: &[u8],
    width: usize,
    height: usize,
    dest: &mut [u8],
) -> Result<(), CodecError> {
    let layout = layout_for(width, height)?;
    if dest.len() != layout.frame_len() {
        return Err(crate::planes::PlaneError::BufferSize {
            expected: layout.frame_len(),
            actual: dest.len(),
        }
        .into());
    }

    let frame = guarded("decode", || {
        let mut session = backend.start_decompress(data)?;
        let (actual_width, actual_height) = session.dimensions();
        if actual_width == 0 || actual_height == 0 {
            return Err(CodecError::InvalidDimensions {
                width: actual_width,
                height: actual_height,
            });
        }
        if (actual_width, actual_height) != (width, height) {
            log::warn!(
                "JPEG image size {actual_width}x{actual_height}, expected {width}x{height}"
            );
            return Err(CodecError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                actual_width,
                actual_height,
            });
        }

        let mut frame = vec![0u8; layout.frame_len()];
        let mut writer = PlanarWriter::new(layout, &mut frame)?;
        let mut row = vec![0u8; width * RAW_COMPONENTS];
        for _ in 0..height {
            session.read_scanline(&mut row)?;
            writer.push_row(&row)?;
        }

        let count = session.warnings();
        if count > 0 {
            log::debug!("{count} corrupt-data warning(s) while decoding");
        }
        if count > MAX_CORRUPT_WARNINGS {
            return Err(CodecError::TooManyWarnings { count });
        }
        Ok(frame)
    })?;

    dest.copy_from_slice(&frame);
    Ok(())
}

/// Read the frame size from a JPEG header without decoding pixels.
pub fn probe_dimensions(data: &[u8]) -> Result<(usize, usize), CodecError> {
    probe_dimensions_with(&NativeBackend, data)
}

pub fn probe_dimensions_with(backend: &dyn Backend, data: &[u8]) -> Result<(usize, usize), CodecError> {
    guarded("probe", || Ok(backend.start_decompress(data)?.dimensions()))
}

fn check_quality(quality: u8) -> Result<(), CodecError> {
    if !(1..=100).contains(&quality) {
        return Err(CodecError::InvalidQuality(quality));
    }
    Ok(())
}

fn layout_for(width: usize, height: usize) -> Result<PlaneLayout, CodecError> {
    PlaneLayout::new(width, height).map_err(|_| CodecError::InvalidDimensions { width, height })
}

/// Hand the EXIF segment to the compressor. Runs after the session is
/// started and before any pixel data.
fn attach_metadata(
    session: &mut dyn CompressSession,
    fields: Option<&MetadataFields>,
) -> Result<(), CodecError> {
    if let Some(segment) = fields.and_then(build_segment) {
        session.write_marker(EXIF_APP_SEGMENT, &segment)?;
    }
    Ok(())
}

fn copy_out(dest: &mut [u8], jpeg: &[u8]) -> Result<usize, CodecError> {
    let Some(slot) = dest.get_mut(..jpeg.len()) else {
        return Err(CodecError::BufferTooSmall {
            needed: jpeg.len(),
            capacity: dest.len(),
        });
    };
    slot.copy_from_slice(jpeg);
    Ok(jpeg.len())
}

/// Run one codec call, turning a panic from inside the codec into
/// [`CodecError::Fatal`]. The session (and everything it owns) is dropped
/// before this returns either way.
fn guarded<T>(op: &str, f: impl FnOnce() -> Result<T, CodecError>) -> Result<T, CodecError> {
    let result = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "codec panicked".to_string());
            Err(CodecError::Fatal(msg))
        }
    };
    if let Err(CodecError::Fatal(msg)) = &result {
        log::error!("JPEG {op} aborted: {msg}");
    }
    result
}
