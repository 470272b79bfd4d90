use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};

use camjpeg::exif::tiff::TAG_ORIGINAL_DATETIME_SS;
use camjpeg::{config, exif, pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "camjpeg",
    version,
    about = "Encode camera frames to JPEG with embedded capture metadata, or decode JPEG back to 4:2:0 planar"
)]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Decode JPEG files to planar .yuv instead of encoding
    #[arg(long)]
    decode: bool,

    /// Display capture metadata and exit
    #[arg(long = "show-exif")]
    show_exif: bool,

    /// JPEG quality 1-100 (overrides config)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Encode the luma plane only
    #[arg(long)]
    greyscale: bool,

    /// Run the codec but write no files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    // Handle --show-exif
    if cli.show_exif {
        if cli.json {
            let reports = images
                .iter()
                .map(|path| {
                    Ok(ExifReport {
                        file: path.clone(),
                        summary: exif::read_exif(path)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        } else {
            for image_path in &images {
                print_exif(image_path)?;
            }
        }
        return Ok(());
    }

    // Load config and apply overrides
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(q) = cli.quality {
        config.encode.quality = q;
    }
    if cli.greyscale {
        config.encode.greyscale = true;
    }
    if cli.dry_run {
        config.output.dry_run = true;
    }
    config.validate()?;

    let images: Vec<PathBuf> = if cli.decode {
        images
            .into_iter()
            .filter(|p| pipeline::ImageKind::from_path(p) == Some(pipeline::ImageKind::Jpeg))
            .collect()
    } else {
        images
    };
    if images.is_empty() {
        anyhow::bail!("No JPEG files to decode in the specified paths.");
    }

    log::info!("Found {} image(s) to process", images.len());
    if config.output.dry_run {
        log::info!("DRY RUN — no files will be written");
    }

    let mut results = Vec::new();
    let total = images.len();

    for (i, image_path) in images.iter().enumerate() {
        log::info!("[{}/{}] {}", i + 1, total, image_path.display());

        let result = if cli.decode {
            pipeline::decode_file(image_path, &config)
        } else {
            pipeline::encode_file(image_path, &config)
        };

        if let Some(ref err) = result.error {
            log::error!("  Error: {err}");
        } else if let Some(ref out) = result.output_path {
            log::info!(
                "  {}x{} → {} ({} bytes{})",
                result.width,
                result.height,
                out.display(),
                result.bytes,
                if result.exif_written { ", EXIF" } else { "" }
            );
        }

        results.push(result);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    // Summary
    let success = results.iter().filter(|r| r.error.is_none()).count();
    let failed = total - success;
    log::info!("Done: {success} succeeded, {failed} failed out of {total} images");

    Ok(())
}

/// One `--show-exif --json` record.
#[derive(serde::Serialize)]
struct ExifReport {
    file: PathBuf,
    #[serde(flatten)]
    summary: exif::ExifSummary,
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print the capture metadata of a file: the fields an independent EXIF
/// reader sees, then the camjpeg-specific tags from the raw segment.
fn print_exif(path: &Path) -> Result<()> {
    let summary = exif::read_exif(path)?;

    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    let mut rows: Vec<(&str, String)> = [
        ("ImageDescription", summary.description),
        ("DateTime", summary.modify_date),
        ("DateTimeOriginal", summary.original_date),
    ]
    .into_iter()
    .filter_map(|(tag, v)| v.map(|v| (tag, v)))
    .collect();

    let parsed = std::fs::read(path)
        .ok()
        .and_then(|bytes| exif::find_exif_segment(&bytes))
        .and_then(|segment| exif::parse_segment(&segment).ok());
    if let Some(parsed) = parsed {
        if let Some(tz) = parsed.tz_offset_hours() {
            rows.push(("TimeZoneOffset", format!("{tz:+}")));
        }
        if let Some(ss) = parsed.find(TAG_ORIGINAL_DATETIME_SS) {
            rows.push(("SubSecTimeOriginal", String::from_utf8_lossy(&ss.value).into_owned()));
        }
        if let Some([x, y, w, h]) = parsed.subject_area() {
            rows.push(("SubjectArea", format!("{w}x{h} at ({x}, {y})")));
        }
    }

    if rows.is_empty() {
        println!("  {DIM}(no EXIF metadata found){RESET}");
    } else {
        for (tag, val) in &rows {
            print_row(tag, val);
        }
    }
    println!();

    Ok(())
}

/// Print a single row in the EXIF display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
