//! # camjpeg
//!
//! JPEG encode/decode for camera frames held as 4:2:0 planar YCbCr, with
//! capture metadata (timestamp, timezone, description, sub-second time,
//! region of interest) embedded as an EXIF APP1 segment.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use camjpeg::codec::{decode_jpeg, encode_yuv420p};
//! use camjpeg::exif::{CaptureContext, RegionOfInterest};
//!
//! # fn main() -> Result<(), camjpeg::codec::CodecError> {
//! let (width, height) = (640, 480);
//! let frame = vec![0u8; width * height * 3 / 2]; // Y, then Cb, then Cr
//!
//! let ctx = CaptureContext {
//!     description_template: Some("driveway %Y-%m-%d %H:%M:%S".into()),
//!     subsec: true,
//!     region: Some(RegionOfInterest { center_x: 320, center_y: 240, width: 64, height: 48 }),
//!     ..Default::default() // timestamp: now
//! };
//!
//! let mut jpeg = vec![0u8; 512 * 1024];
//! let n = encode_yuv420p(&mut jpeg, &frame, width, height, 80, Some(&ctx))?;
//!
//! let mut decoded = vec![0u8; frame.len()];
//! decode_jpeg(&jpeg[..n], width, height, &mut decoded)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## File Pipeline
//!
//! ```rust,no_run
//! use camjpeg::config::Config;
//! use camjpeg::pipeline::{collect_images, encode_file};
//! use std::path::PathBuf;
//!
//! let config = Config::load(Some("config.json".as_ref())).unwrap();
//! for path in collect_images(&[PathBuf::from("./captures")]) {
//!     let result = encode_file(&path, &config);
//!     if let Some(ref err) = result.error {
//!         eprintln!("Error processing {}: {err}", path.display());
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`codec`] — encode/decode entry points and the codec backend boundary
//! - [`config`] — Configuration types and loading/saving
//! - [`exif`] — EXIF segment planning, writing and reading
//! - [`pipeline`] — File-level encode/decode and image collection
//! - [`planes`] — Planar 4:2:0 layout and row/block conversion

pub mod codec;
pub mod config;
pub mod exif;
pub mod pipeline;
pub mod planes;
