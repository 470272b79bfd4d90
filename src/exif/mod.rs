//! EXIF capture metadata for JPEG APP1 segments.
//!
//! Writing is split into two passes so the buffer never grows:
//!
//! - [`plan`] counts directory entries and bounds the out-of-line data
//! - [`write_segment`] fills a buffer of exactly that size
//!
//! [`build_segment`] runs both. [`parse_segment`] decodes a segment back into
//! entries, which the tests use to check the writer against the planner.

mod fields;
mod planner;
mod reader;
pub mod tiff;
mod writer;

pub use fields::{CaptureContext, MetadataError, MetadataFields, RegionOfInterest, validate_template};
pub use planner::{DirectoryPlan, plan};
pub use reader::{ExifSummary, ParseError, ParsedEntry, ParsedExif, find_exif_segment, parse_segment, read_exif};
pub use writer::{build_segment, write_segment};
