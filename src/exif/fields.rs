use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, Timelike};
use std::fmt::Write as _;

/// EXIF requires exactly this layout for datetime tags.
const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Errors raised while deriving metadata fields from a capture context.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("invalid description template {template:?}")]
    InvalidTemplate { template: String },
    #[error("timezone offset of {seconds}s does not fit the EXIF offset tag")]
    OffsetOutOfRange { seconds: i32 },
}

/// Subject area rectangle, centre plus size, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionOfInterest {
    pub center_x: u16,
    pub center_y: u16,
    pub width: u16,
    pub height: u16,
}

impl RegionOfInterest {
    /// The four values packed as big-endian unsigned shorts.
    pub fn to_be_bytes(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        for (chunk, v) in out
            .chunks_exact_mut(2)
            .zip([self.center_x, self.center_y, self.width, self.height])
        {
            chunk.copy_from_slice(&v.to_be_bytes());
        }
        out
    }
}

/// Capture-time inputs from which [`MetadataFields`] are derived.
#[derive(Debug, Clone, Default)]
pub struct CaptureContext {
    /// Capture time. `None` means "now" in the local timezone.
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// strftime-style template expanded against the capture time.
    pub description_template: Option<String>,
    /// Write the millisecond part of the capture time.
    pub subsec: bool,
    /// Region of interest, e.g. the bounding box of detected motion.
    pub region: Option<RegionOfInterest>,
}

/// The values that end up in the EXIF segment. All are independently
/// optional; an all-`None` set produces no segment at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFields {
    pub description: Option<String>,
    pub datetime: Option<String>,
    /// Hours east of UTC. Only written alongside `datetime`.
    pub tz_offset_hours: i16,
    /// Fractional seconds; written without a NUL terminator.
    pub subsec_time: Option<String>,
    pub region: Option<RegionOfInterest>,
}

impl MetadataFields {
    /// Derive the field set for a capture.
    pub fn from_capture(ctx: &CaptureContext) -> Result<Self, MetadataError> {
        let ts = ctx
            .timestamp
            .unwrap_or_else(|| Local::now().fixed_offset());

        let seconds = ts.offset().local_minus_utc();
        let tz_offset_hours = i16::try_from(seconds / 3600)
            .map_err(|_| MetadataError::OffsetOutOfRange { seconds })?;

        let description = match ctx.description_template.as_deref() {
            Some(t) if !t.is_empty() => Some(expand_template(t, &ts)?),
            _ => None,
        };

        let subsec_time = ctx
            .subsec
            .then(|| format!("{:03}", (ts.nanosecond() % 1_000_000_000) / 1_000_000));

        Ok(Self {
            description,
            datetime: Some(ts.format(EXIF_DATETIME_FORMAT).to_string()),
            tz_offset_hours,
            subsec_time,
            region: ctx.region,
        })
    }
}

/// Expand a strftime template, rejecting unknown specifiers up front
/// instead of letting `Display` fail mid-format.
fn expand_template(template: &str, ts: &DateTime<FixedOffset>) -> Result<String, MetadataError> {
    let invalid = || MetadataError::InvalidTemplate {
        template: template.to_string(),
    };

    let items: Vec<Item<'_>> = StrftimeItems::new(template).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return Err(invalid());
    }

    let mut out = String::new();
    write!(out, "{}", ts.format_with_items(items.into_iter())).map_err(|_| invalid())?;
    Ok(out)
}

/// Check a template without a capture time; used by config validation.
pub fn validate_template(template: &str) -> Result<(), MetadataError> {
    if StrftimeItems::new(template).any(|i| matches!(i, Item::Error)) {
        return Err(MetadataError::InvalidTemplate {
            template: template.to_string(),
        });
    }
    Ok(())
}
