//! Image compression: rewrite every slide PNG in place with a lossy encoder.
//!
//! Compression is best-effort across a talk. Every slide is attempted even
//! after one fails, and the failures are returned together so the user sees
//! the whole list in one run.

use crate::config::CompressionLevel;
use crate::error::{CompressionFailure, TalkdeckError, ToolError};
use crate::pipeline::extract::{CompressionState, SlideImage};
use crate::pipeline::tools::ExternalTool;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{debug, info, warn};

/// Rewrites a single PNG in place.
pub trait ImageCompressor: Send + Sync {
    /// Tool name, used in logs and errors.
    fn name(&self) -> &str;

    /// Returns `Compressed` when the file was rewritten, or `Raw` when the
    /// tool declined and left it untouched.
    fn compress(
        &self,
        image: &Path,
        level: CompressionLevel,
    ) -> Result<CompressionState, ToolError>;
}

/// [`ImageCompressor`] backed by `pngquant`.
#[derive(Debug, Clone)]
pub struct Pngquant {
    tool: ExternalTool,
}

/// pngquant's exit code when the requested minimum quality can't be met.
/// The input file is left untouched in that case.
const PNGQUANT_QUALITY_TOO_LOW: i32 = 99;

impl Pngquant {
    pub fn new(override_path: Option<&Path>) -> Self {
        Self {
            tool: ExternalTool::resolve(
                "pngquant",
                override_path,
                "Install pngquant (apt install pngquant / brew install pngquant) \
or pass --pngquant <PATH>.",
            ),
        }
    }
}

impl ImageCompressor for Pngquant {
    fn name(&self) -> &str {
        self.tool.name()
    }

    fn compress(
        &self,
        image: &Path,
        level: CompressionLevel,
    ) -> Result<CompressionState, ToolError> {
        let (min, max) = level.quality_range();
        let quality = format!("{min}-{max}");
        let output = self.tool.output(
            [
                OsStr::new("--force"),
                OsStr::new("--ext"),
                OsStr::new(".png"),
                OsStr::new("--strip"),
                OsStr::new("--quality"),
                OsStr::new(&quality),
                OsStr::new("--"),
                image.as_os_str(),
            ],
            image,
        )?;

        if output.status.success() {
            return Ok(CompressionState::Compressed);
        }
        if output.status.code() == Some(PNGQUANT_QUALITY_TOO_LOW) {
            warn!(
                "{}: quality {} not reachable, kept the original",
                image.display(),
                quality
            );
            return Ok(CompressionState::Raw);
        }
        Err(self.tool.failure(image, &output))
    }
}

/// Compress every slide, recording the state each one ends up in.
///
/// Only `.png` files are ever handed to the compressor; anything else is
/// recorded as a failure without running the tool.
pub fn compress_slides(
    compressor: &dyn ImageCompressor,
    slides: &mut [SlideImage],
    level: CompressionLevel,
) -> Result<(), TalkdeckError> {
    info!(
        "Compressing {} slides with {} (level {})",
        slides.len(),
        compressor.name(),
        level
    );

    let mut failures = Vec::new();
    for slide in slides.iter_mut() {
        let is_png = slide
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        let result = if is_png {
            compressor.compress(&slide.path, level)
        } else {
            Err(ToolError::Refused {
                tool: compressor.name().to_string(),
                input: slide.path.clone(),
                reason: "only PNG slide images are compressed in place".into(),
            })
        };

        match result {
            Ok(state) => {
                slide.state = state;
                debug!("{}: {:?}", slide.path.display(), state);
            }
            Err(error) => {
                warn!("Compression failed for {}: {}", slide.path.display(), error);
                failures.push(CompressionFailure {
                    path: slide.path.clone(),
                    error,
                });
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(TalkdeckError::CompressionFailed { failures })
    }
}
