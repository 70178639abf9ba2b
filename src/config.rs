//! Configuration types for talk and site builds.
//!
//! Every build knob lives in [`BuildConfig`], created through its
//! [`BuildConfigBuilder`]. A single struct is shared by the single-talk and
//! batch entry points so both honour the same dpi, compression level and
//! tool overrides.

use crate::error::TalkdeckError;
use crate::pipeline::compress::ImageCompressor;
use crate::pipeline::extract::PageRasterizer;
use crate::progress::ProgressCallback;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for building one talk or a whole site.
///
/// Built via [`BuildConfig::builder()`] or [`BuildConfig::default()`].
///
/// # Example
/// ```rust
/// use talkdeck::{BuildConfig, CompressionLevel};
///
/// let config = BuildConfig::builder()
///     .dpi(120)
///     .compression(CompressionLevel::new(4).unwrap())
///     .concurrency(2)
///     .force(true)
///     .build()
///     .unwrap();
/// assert!(config.force);
/// ```
#[derive(Clone)]
pub struct BuildConfig {
    /// Rasterisation DPI handed to the page rasterizer. Range: 72–400. Default: 150.
    ///
    /// Slides are usually projected, not printed: 150 DPI gives a 16:9 deck
    /// roughly 2000 px of width, plenty for a full-screen browser.
    pub dpi: u32,

    /// Lossy compression level for slide images. Default: balanced (3).
    pub compression: CompressionLevel,

    /// Number of talks built at the same time in a batch. Default: 4.
    ///
    /// Every talk owns its output directory exclusively, so talks are
    /// independent. Set to 1 for strictly sequential builds.
    pub concurrency: usize,

    /// Rebuild even when the talk's manifest says the output is current.
    pub force: bool,

    /// Replacement for the built-in reveal.js slideshow template.
    pub slideshow_template: Option<PathBuf>,

    /// Replacement for the built-in landing-page template.
    pub landing_template: Option<PathBuf>,

    /// Replacement for the built-in landing-page stylesheet.
    pub stylesheet: Option<PathBuf>,

    /// Hero image copied next to the landing page.
    pub hero_image: Option<PathBuf>,

    /// Page-level metadata for the landing page.
    pub site: SiteInfo,

    /// Overrides for the external tool executables.
    pub tools: ToolPaths,

    /// Pre-constructed rasterizer. Takes precedence over `tools.pdftoppm`.
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,

    /// Pre-constructed compressor. Takes precedence over `tools.pngquant`.
    pub compressor: Option<Arc<dyn ImageCompressor>>,

    /// Date printed as "Last updated" on the landing page. Default: today.
    pub build_date: Option<NaiveDate>,

    /// Optional progress callback for per-talk events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            compression: CompressionLevel::default(),
            concurrency: 4,
            force: false,
            slideshow_template: None,
            landing_template: None,
            stylesheet: None,
            hero_image: None,
            site: SiteInfo::default(),
            tools: ToolPaths::default(),
            rasterizer: None,
            compressor: None,
            build_date: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BuildConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildConfig")
            .field("dpi", &self.dpi)
            .field("compression", &self.compression)
            .field("concurrency", &self.concurrency)
            .field("force", &self.force)
            .field("slideshow_template", &self.slideshow_template)
            .field("landing_template", &self.landing_template)
            .field("stylesheet", &self.stylesheet)
            .field("hero_image", &self.hero_image)
            .field("site", &self.site)
            .field("tools", &self.tools)
            .field(
                "rasterizer",
                &self.rasterizer.as_ref().map(|r| r.name().to_string()),
            )
            .field(
                "compressor",
                &self.compressor.as_ref().map(|c| c.name().to_string()),
            )
            .field("build_date", &self.build_date)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BuildProgressCallback>"),
            )
            .finish()
    }
}

impl BuildConfig {
    /// Create a new builder for `BuildConfig`.
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder {
            config: Self::default(),
        }
    }

    /// The "last updated" date, falling back to today's local date.
    pub fn effective_build_date(&self) -> NaiveDate {
        self.build_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

/// Builder for [`BuildConfig`].
#[derive(Debug)]
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn compression(mut self, level: CompressionLevel) -> Self {
        self.config.compression = level;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn force(mut self, v: bool) -> Self {
        self.config.force = v;
        self
    }

    pub fn slideshow_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.slideshow_template = Some(path.into());
        self
    }

    pub fn landing_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.landing_template = Some(path.into());
        self
    }

    pub fn stylesheet(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.stylesheet = Some(path.into());
        self
    }

    pub fn hero_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.hero_image = Some(path.into());
        self
    }

    pub fn site(mut self, site: SiteInfo) -> Self {
        self.config.site = site;
        self
    }

    pub fn tools(mut self, tools: ToolPaths) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn compressor(mut self, compressor: Arc<dyn ImageCompressor>) -> Self {
        self.config.compressor = Some(compressor);
        self
    }

    pub fn build_date(mut self, date: NaiveDate) -> Self {
        self.config.build_date = Some(date);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BuildConfig, TalkdeckError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(TalkdeckError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(TalkdeckError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if let Some(ref base) = c.site.base_url {
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(TalkdeckError::InvalidConfig(format!(
                    "Base URL must start with http:// or https://, got '{base}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Value types ──────────────────────────────────────────────────────────

/// Lossy PNG compression level, from 1 (best quality) to 5 (smallest files).
///
/// | Level | pngquant quality | Use case |
/// |-------|------------------|----------|
/// | 1 | 90–100 | Photo-heavy decks, screenshots with fine gradients |
/// | 2 | 80–95  | High quality |
/// | 3 | 65–80  | Balanced (default) |
/// | 4 | 50–70  | Text-heavy decks |
/// | 5 | 30–50  | Smallest output, visible banding |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;
    pub const BALANCED: CompressionLevel = CompressionLevel(3);

    /// Create a level, rejecting values outside 1–5.
    pub fn new(level: u8) -> Result<Self, TalkdeckError> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(TalkdeckError::InvalidConfig(format!(
                "Compression level must be {}–{}, got {level}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// The `--quality min-max` range this level maps to.
    pub fn quality_range(self) -> (u8, u8) {
        match self.0 {
            1 => (90, 100),
            2 => (80, 95),
            3 => (65, 80),
            4 => (50, 70),
            _ => (30, 50),
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::BALANCED
    }
}

impl TryFrom<u8> for CompressionLevel {
    type Error = TalkdeckError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CompressionLevel> for u8 {
    fn from(level: CompressionLevel) -> Self {
        level.0
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Landing-page metadata that does not come from any single talk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    /// `<title>` and `og:title` of the landing page.
    pub title: String,

    /// Fixed sharing description. If None, derived from the most recent talk.
    pub description: Option<String>,

    /// Absolute site URL, used to make sharing image URLs absolute.
    pub base_url: Option<String>,

    /// Fixed sharing image (relative to the output root or absolute URL).
    /// If None, the most recent talk's highlight slide is used.
    pub share_image: Option<String>,
}

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            title: "Talks".to_string(),
            description: None,
            base_url: None,
            share_image: None,
        }
    }
}

/// Paths to external executables. `None` means "look it up on PATH".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    pub pdftoppm: Option<PathBuf>,
    pub pngquant: Option<PathBuf>,
}
