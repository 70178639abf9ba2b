//! Page extraction: split one PDF into an ordered run of slide images.
//!
//! The rasterizer renders into a private staging directory with whatever
//! naming it likes (pdftoppm pads page numbers to the width of the page
//! count, other tools don't pad at all). Extraction then reads the page
//! number back out of every file name, sorts by that ordinal, and renames
//! each file to `slide-NN.png` with enough zero padding that lexical order
//! equals page order. Nothing downstream has to parse numbers again.

use crate::error::{TalkdeckError, ToolError};
use crate::pipeline::tools::ExternalTool;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Renders every page of a PDF to a PNG file.
///
/// Implementations write one `.png` per page into `staging_dir`; each file
/// name must end with the page's 1-based number right before `.png`
/// (`page-7.png`, `page-007.png` and `7.png` all qualify).
pub trait PageRasterizer: Send + Sync {
    /// Tool name, used in logs and errors.
    fn name(&self) -> &str;

    fn rasterize(&self, pdf: &Path, staging_dir: &Path, dpi: u32) -> Result<(), ToolError>;
}

/// [`PageRasterizer`] backed by poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct Pdftoppm {
    tool: ExternalTool,
}

impl Pdftoppm {
    pub fn new(override_path: Option<&Path>) -> Self {
        Self {
            tool: ExternalTool::resolve(
                "pdftoppm",
                override_path,
                "Install poppler-utils (apt install poppler-utils / brew install poppler) \
or pass --pdftoppm <PATH>.",
            ),
        }
    }
}

impl PageRasterizer for Pdftoppm {
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn rasterize(&self, pdf: &Path, staging_dir: &Path, dpi: u32) -> Result<(), ToolError> {
        let prefix = staging_dir.join("page");
        let dpi = dpi.to_string();
        self.tool.run(
            [
                OsStr::new("-png"),
                OsStr::new("-r"),
                OsStr::new(&dpi),
                pdf.as_os_str(),
                prefix.as_os_str(),
            ],
            pdf,
        )?;
        Ok(())
    }
}

/// Whether a slide image has been rewritten by the compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionState {
    /// As rasterised; the compressor has not run or left the file untouched.
    Raw,
    Compressed,
}

/// One page of a talk as an image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideImage {
    /// 1-based page number in the source PDF.
    pub ordinal: u32,
    pub path: PathBuf,
    pub state: CompressionState,
}

impl SlideImage {
    /// The bare file name, as referenced from the slideshow.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Zero-padded slide file name for page `ordinal` of `total`.
///
/// Padding is at least two digits and grows with the page count, so
/// `slide-09.png` < `slide-10.png` and `slide-099.png` < `slide-100.png`.
pub fn slide_file_name(ordinal: u32, total: usize) -> String {
    let width = total.to_string().len().max(2);
    format!("slide-{:0width$}.png", ordinal, width = width)
}

/// Name prefix of the rasterizer's staging directory inside `out_dir`.
pub const STAGING_PREFIX: &str = ".raster-";

static RE_RASTER_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\.png$").unwrap());
static RE_SLIDE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^slide-(\d+)\.png$").unwrap());

/// Rasterise `pdf` and place its pages into `out_dir` as `slide-NN.png`.
///
/// Returns the slides sorted by ordinal. Any failure, including a missing
/// PDF or a missing tool, is reported as [`TalkdeckError::ExtractionFailed`].
pub fn extract_pages(
    rasterizer: &dyn PageRasterizer,
    pdf: &Path,
    out_dir: &Path,
    dpi: u32,
) -> Result<Vec<SlideImage>, TalkdeckError> {
    let failed = |source: ToolError| TalkdeckError::ExtractionFailed {
        pdf: pdf.to_path_buf(),
        source,
    };

    std::fs::File::open(pdf).map_err(|e| {
        failed(ToolError::Unreadable {
            input: pdf.to_path_buf(),
            detail: e.to_string(),
        })
    })?;

    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(out_dir)
        .map_err(|e| TalkdeckError::write(out_dir, e))?;

    info!(
        "Rasterising {} with {} at {} DPI",
        pdf.display(),
        rasterizer.name(),
        dpi
    );
    rasterizer
        .rasterize(pdf, staging.path(), dpi)
        .map_err(failed)?;

    let pages = collect_pages(rasterizer.name(), pdf, staging.path()).map_err(failed)?;
    let total = pages.len();

    let mut slides = Vec::with_capacity(total);
    for (ordinal, raw_path) in pages {
        let target = out_dir.join(slide_file_name(ordinal, total));
        std::fs::rename(&raw_path, &target).map_err(|e| TalkdeckError::write(&target, e))?;
        slides.push(SlideImage {
            ordinal,
            path: target,
            state: CompressionState::Raw,
        });
    }

    debug!("Extracted {} slides into {}", slides.len(), out_dir.display());
    Ok(slides)
}

/// Read the rasterizer's output back, keyed and ordered by page number.
fn collect_pages(
    tool: &str,
    pdf: &Path,
    staging: &Path,
) -> Result<BTreeMap<u32, PathBuf>, ToolError> {
    let unexpected = |detail: String| ToolError::UnexpectedOutput {
        tool: tool.to_string(),
        input: pdf.to_path_buf(),
        detail,
    };

    let entries = std::fs::read_dir(staging).map_err(|e| unexpected(e.to_string()))?;
    let mut pages = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|e| unexpected(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".png") {
            continue;
        }
        let ordinal = RE_RASTER_NAME
            .captures(&name)
            .and_then(|c| c[1].parse::<u32>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| unexpected(format!("cannot read a page number from '{name}'")))?;
        if pages.insert(ordinal, entry.path()).is_some() {
            return Err(unexpected(format!("page {ordinal} was rendered twice")));
        }
    }

    // Pages must be exactly 1..=N.
    for (expected, ordinal) in (1u32..).zip(pages.keys()) {
        if *ordinal != expected {
            return Err(unexpected(format!("page {expected} is missing from the output")));
        }
    }
    Ok(pages)
}

/// List the `slide-NN.png` files already present in `dir`, by ordinal.
pub fn existing_slides(dir: &Path) -> Result<Vec<SlideImage>, TalkdeckError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TalkdeckError::io(dir, e)),
    };
    let mut slides = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| TalkdeckError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(ordinal) = RE_SLIDE_NAME
            .captures(&name)
            .and_then(|c| c[1].parse::<u32>().ok())
        {
            slides.push(SlideImage {
                ordinal,
                path: entry.path(),
                state: CompressionState::Compressed,
            });
        }
    }
    slides.sort_by_key(|s| s.ordinal);
    Ok(slides)
}

/// True for file names this crate writes as slides.
pub fn is_slide_file_name(name: &str) -> bool {
    RE_SLIDE_NAME.is_match(name)
}
