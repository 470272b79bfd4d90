use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::codec;
use crate::config::Config;
use crate::exif::CaptureContext;
use crate::planes::PlaneLayout;

/// Supported input extensions.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Headroom added to the raw frame size when sizing the JPEG buffer.
const JPEG_SLACK: usize = 64 * 1024;

/// Input file format, detected from the extension.
///
/// # Example
///
/// ```rust
/// use camjpeg::pipeline::ImageKind;
/// use std::path::Path;
///
/// assert_eq!(ImageKind::from_path(Path::new("frame.JPG")), Some(ImageKind::Jpeg));
/// assert_eq!(ImageKind::from_path(Path::new("frame.yuv")), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageKind {
    /// Can be encoded from and decoded to planar.
    Jpeg,
    /// Encode input only.
    Png,
}

impl ImageKind {
    /// Determine the image kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

/// The result of encoding or decoding a single file.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub path: PathBuf,
    /// Where the output went (or would go, in a dry run).
    pub output_path: Option<PathBuf>,
    pub width: usize,
    pub height: usize,
    pub bytes: usize,
    /// Whether an EXIF segment was attached.
    pub exif_written: bool,
    pub error: Option<String>,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            output_path: None,
            width: 0,
            height: 0,
            bytes: 0,
            exif_written: false,
            error: None,
        }
    }
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks).
///
/// # Example
///
/// ```rust,no_run
/// use camjpeg::pipeline::collect_images;
/// use std::path::PathBuf;
///
/// let images = collect_images(&[
///     PathBuf::from("frame.png"),    // single file
///     PathBuf::from("./captures/"),  // entire directory
/// ]);
/// println!("Found {} images", images.len());
/// ```
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported_image(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Convert RGB to a 4:2:0 planar frame with full-range BT.601 (JFIF)
/// coefficients. Each chroma sample is the mean of its 2x2 block; a trailing
/// odd row or column has no chroma sample.
pub fn rgb_to_yuv420p(img: &RgbImage) -> Result<(PlaneLayout, Vec<u8>)> {
    let layout = PlaneLayout::new(img.width() as usize, img.height() as usize)?;
    let mut frame = vec![0u8; layout.frame_len()];
    let (y_plane, cb_plane, cr_plane) = layout.split_mut(&mut frame)?;

    for (x, y, px) in img.enumerate_pixels() {
        let [r, g, b] = px.0.map(f32::from);
        y_plane[y as usize * layout.width + x as usize] = clamp(0.299 * r + 0.587 * g + 0.114 * b);
    }

    let cw = layout.chroma_width();
    for cy in 0..layout.chroma_height() {
        for cx in 0..cw {
            let (mut cb, mut cr) = (0.0f32, 0.0f32);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let [r, g, b] = img.get_pixel((2 * cx + dx) as u32, (2 * cy + dy) as u32).0.map(f32::from);
                cb += 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
                cr += 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
            }
            cb_plane[cy * cw + cx] = clamp(cb / 4.0);
            cr_plane[cy * cw + cx] = clamp(cr / 4.0);
        }
    }

    Ok((layout, frame))
}

fn clamp(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Resolve where the output for `input` goes, honoring `output_dir`.
fn output_path(input: &Path, extension: &str, config: &Config) -> Result<PathBuf> {
    let stem = input.file_stem().context("Input has no file name")?;
    let dir = match &config.output.output_dir {
        Some(dir) => dir.clone(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let out = dir.join(format!("{}.{extension}", stem.to_string_lossy()));
    if out.exists() && !config.output.overwrite && !config.output.dry_run {
        bail!("Output {} already exists (set output.overwrite to replace it)", out.display());
    }
    Ok(out)
}

/// Capture context for a file: its modification time plus the configured
/// EXIF options, or `None` when EXIF is disabled.
fn capture_context(path: &Path, config: &Config) -> Option<CaptureContext> {
    if !config.exif.enabled {
        return None;
    }
    let timestamp = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Local>::from(t).fixed_offset())
        .map_err(|e| log::debug!("No modification time for {}: {e}", path.display()))
        .ok();

    Some(CaptureContext {
        timestamp,
        description_template: config.exif.description.clone(),
        subsec: config.exif.subsec,
        region: None,
    })
}

/// Encode an image file to `<stem>.jpg` with capture metadata.
///
/// The image is converted to planar 4:2:0 (or luma only when
/// `encode.greyscale` is set) and run through [`codec`]. The file's
/// modification time becomes the capture time.
///
/// # Example
///
/// ```rust,no_run
/// use camjpeg::config::Config;
/// use camjpeg::pipeline::encode_file;
/// use std::path::Path;
///
/// let result = encode_file(Path::new("frame.png"), &Config::default());
/// if let Some(ref err) = result.error {
///     eprintln!("failed: {err}");
/// }
/// ```
pub fn encode_file(path: &Path, config: &Config) -> ProcessResult {
    let mut result = ProcessResult::new(path);
    if let Err(e) = try_encode_file(path, config, &mut result) {
        result.error = Some(format!("{e:#}"));
    }
    result
}

fn try_encode_file(path: &Path, config: &Config, result: &mut ProcessResult) -> Result<()> {
    let out = output_path(path, "jpg", config)?;
    let img = image::open(path)
        .with_context(|| format!("Failed to load {}", path.display()))?
        .to_rgb8();

    let ctx = capture_context(path, config);
    let quality = config.encode.quality;

    let (layout, frame) = rgb_to_yuv420p(&img)?;
    let mut jpeg = vec![0u8; layout.frame_len() * 2 + JPEG_SLACK];
    let n = if config.encode.greyscale {
        let luma = &frame[..layout.luma_len()];
        codec::encode_grey(&mut jpeg, luma, layout.width, layout.height, quality, ctx.as_ref())?
    } else {
        codec::encode_yuv420p(&mut jpeg, &frame, layout.width, layout.height, quality, ctx.as_ref())?
    };
    jpeg.truncate(n);

    result.width = layout.width;
    result.height = layout.height;
    result.bytes = n;
    result.exif_written = ctx.is_some();

    if config.output.dry_run {
        log::info!("  Would write {} ({n} bytes)", out.display());
    } else {
        std::fs::write(&out, &jpeg).with_context(|| format!("Failed to write {}", out.display()))?;
        log::debug!("Wrote {} ({n} bytes)", out.display());
    }
    result.output_path = Some(out);
    Ok(())
}

/// Decode a JPEG file to a raw planar `<stem>.yuv` frame.
pub fn decode_file(path: &Path, config: &Config) -> ProcessResult {
    let mut result = ProcessResult::new(path);
    if let Err(e) = try_decode_file(path, config, &mut result) {
        result.error = Some(format!("{e:#}"));
    }
    result
}

fn try_decode_file(path: &Path, config: &Config, result: &mut ProcessResult) -> Result<()> {
    if ImageKind::from_path(path) != Some(ImageKind::Jpeg) {
        bail!("Only JPEG files can be decoded to planar");
    }
    let out = output_path(path, "yuv", config)?;
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let (width, height) = codec::probe_dimensions(&data)?;
    let layout = PlaneLayout::new(width, height)?;
    let mut frame = vec![0u8; layout.frame_len()];
    codec::decode_jpeg(&data, width, height, &mut frame)?;

    result.width = width;
    result.height = height;
    result.bytes = frame.len();

    if config.output.dry_run {
        log::info!("  Would write {} ({} bytes)", out.display(), frame.len());
    } else {
        std::fs::write(&out, &frame).with_context(|| format!("Failed to write {}", out.display()))?;
        log::debug!("Wrote {} ({} bytes)", out.display(), frame.len());
    }
    result.output_path = Some(out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::tiff::TAG_IMAGE_DESCRIPTION;
    use crate::exif::{find_exif_segment, parse_segment};
    use image::Rgb;
    use std::fs;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 90]));
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    // ── ImageKind::from_path ──────────────────────────────────────────

    #[test]
    fn image_kind_jpeg() {
        assert_eq!(ImageKind::from_path(Path::new("frame.jpg")), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_path(Path::new("frame.jpeg")), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_path(Path::new("FRAME.JPG")), Some(ImageKind::Jpeg));
    }

    #[test]
    fn image_kind_png() {
        assert_eq!(ImageKind::from_path(Path::new("frame.png")), Some(ImageKind::Png));
    }

    #[test]
    fn image_kind_unsupported() {
        assert_eq!(ImageKind::from_path(Path::new("frame.yuv")), None);
        assert_eq!(ImageKind::from_path(Path::new("noext")), None);
    }

    // ── collect_images ───────────────────────────────────────────────

    #[test]
    fn collect_images_single_file() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("a.png");
        fs::write(&png, b"fake").unwrap();
        assert_eq!(collect_images(&[png.clone()]), vec![png]);
    }

    #[test]
    fn collect_images_walks_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.jpg"), b"fake").unwrap();
        fs::write(dir.path().join("notes.txt"), b"fake").unwrap();
        fs::write(dir.path().join("sub").join("b.PNG"), b"fake").unwrap();

        let images = collect_images(&[dir.path().to_path_buf()]);
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|p| is_supported_image(p)));
    }

    #[test]
    fn collect_images_missing_path() {
        let dir = TempDir::new().unwrap();
        assert!(collect_images(&[dir.path().join("gone.jpg")]).is_empty());
    }

    // ── rgb_to_yuv420p ───────────────────────────────────────────────

    #[test]
    fn grey_pixels_have_neutral_chroma() {
        let img = RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]));
        let (layout, frame) = rgb_to_yuv420p(&img).unwrap();
        let (y, cb, cr) = layout.split(&frame).unwrap();
        assert!(y.iter().all(|&v| v == 200));
        assert!(cb.iter().chain(cr).all(|&v| v == 128));
    }

    #[test]
    fn primaries() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
        let (_, frame) = rgb_to_yuv420p(&img).unwrap();
        assert_eq!(frame, [76, 76, 76, 76, 85, 255]);

        let img = RgbImage::from_pixel(2, 2, Rgb([0, 0, 255]));
        let (_, frame) = rgb_to_yuv420p(&img).unwrap();
        assert_eq!(frame, [29, 29, 29, 29, 255, 107]);
    }

    #[test]
    fn chroma_is_averaged_on_input() {
        // Left column blue, right column black: Cb is the mean of 255 and 128
        let img = RgbImage::from_fn(2, 2, |x, _| if x == 0 { Rgb([0, 0, 255]) } else { Rgb([0, 0, 0]) });
        let (layout, frame) = rgb_to_yuv420p(&img).unwrap();
        let (_, cb, _) = layout.split(&frame).unwrap();
        assert_eq!(cb, [192]);
    }

    #[test]
    fn odd_size_input() {
        let img = RgbImage::from_pixel(5, 3, Rgb([10, 20, 30]));
        let (layout, frame) = rgb_to_yuv420p(&img).unwrap();
        assert_eq!(frame.len(), 15 + 2 * 2);
        assert_eq!(layout.chroma_width(), 2);
    }

    // ── encode_file / decode_file ────────────────────────────────────

    #[test]
    fn encode_then_decode_file() {
        let dir = TempDir::new().unwrap();
        let png = write_png(dir.path(), "frame.png", 40, 24);

        let mut config = Config::default();
        config.exif.description = Some("front door".into());

        let result = encode_file(&png, &config);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert!(result.exif_written);
        let jpg = result.output_path.unwrap();
        assert_eq!(jpg, dir.path().join("frame.jpg"));

        let bytes = fs::read(&jpg).unwrap();
        assert_eq!(bytes.len(), result.bytes);
        let parsed = parse_segment(&find_exif_segment(&bytes).unwrap()).unwrap();
        assert_eq!(parsed.string(TAG_IMAGE_DESCRIPTION).as_deref(), Some("front door"));

        let result = decode_file(&jpg, &config);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!((result.width, result.height), (40, 24));
        let yuv = fs::read(result.output_path.unwrap()).unwrap();
        assert_eq!(yuv.len(), 40 * 24 + 2 * 20 * 12);
    }

    #[test]
    fn exif_disabled_writes_no_segment() {
        let dir = TempDir::new().unwrap();
        let png = write_png(dir.path(), "frame.png", 16, 16);

        let mut config = Config::default();
        config.exif.enabled = false;

        let result = encode_file(&png, &config);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert!(!result.exif_written);
        let bytes = fs::read(result.output_path.unwrap()).unwrap();
        assert!(find_exif_segment(&bytes).is_none());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let png = write_png(dir.path(), "frame.png", 16, 16);

        let mut config = Config::default();
        config.output.dry_run = true;

        let result = encode_file(&png, &config);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert!(result.bytes > 0);
        assert!(!dir.path().join("frame.jpg").exists());
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let png = write_png(dir.path(), "frame.png", 16, 16);
        fs::write(dir.path().join("frame.jpg"), b"keep me").unwrap();

        let result = encode_file(&png, &Config::default());
        assert!(result.error.unwrap().contains("already exists"));
        assert_eq!(fs::read(dir.path().join("frame.jpg")).unwrap(), b"keep me");
    }

    #[test]
    fn output_dir_is_honored() {
        let dir = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let png = write_png(dir.path(), "frame.png", 16, 16);

        let mut config = Config::default();
        config.encode.greyscale = true;
        config.output.output_dir = Some(out.path().to_path_buf());

        let result = encode_file(&png, &config);
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.output_path.unwrap(), out.path().join("frame.jpg"));
        assert!(out.path().join("frame.jpg").exists());
    }

    #[test]
    fn decode_rejects_png() {
        let dir = TempDir::new().unwrap();
        let png = write_png(dir.path(), "frame.png", 16, 16);
        let result = decode_file(&png, &Config::default());
        assert!(result.error.is_some());
        assert!(result.output_path.is_none());
    }
}
