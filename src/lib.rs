//! # talkdeck
//!
//! Turn a directory of conference talks (one PDF plus a `metadata.yml` each)
//! into static reveal.js slideshows and a landing page listing them all.
//!
//! ## Pipeline Overview
//!
//! ```text
//! talks/
//!  ├─ rust-at-scale/  metadata.yml  slides.pdf
//!  └─ zero-copy/      metadata.yml  deck.pdf
//!        │
//!        ├─ 1. Discover  non-hidden dirs with a metadata record
//!        ├─ 2. Validate  metadata.yml → TalkMetadata
//!        ├─ 3. Extract   pdftoppm → slide-01.png … (spawn_blocking)
//!        ├─ 4. Compress  pngquant, in place, best-effort per image
//!        ├─ 5. Assemble  slideshow template → <handle>/index.html
//!        └─ 6. Landing   newest first, grouped by year → index.html
//! ```
//!
//! Each talk's output directory carries a manifest fingerprinting its
//! inputs; an unchanged talk is skipped on the next run unless forced.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use talkdeck::{build_site, BuildConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BuildConfig::default();
//!     let report = build_site("talks", "public", &config).await?;
//!     print!("{}", report.summary());
//!     Ok(())
//! }
//! ```
//!
//! A single PDF without metadata:
//!
//! ```rust,no_run
//! use talkdeck::{build_talk_sync, BuildConfig};
//!
//! let build = build_talk_sync("deck.pdf", None, Some("My Talk"), &BuildConfig::default())?;
//! println!("{} slides → {}", build.slides.len(), build.slideshow.display());
//! # Ok::<(), talkdeck::TalkdeckError>(())
//! ```
//!
//! ## External Tools
//!
//! | Tool | Package | Used for |
//! |------|---------|----------|
//! | `pdftoppm` | poppler-utils | rasterising PDF pages |
//! | `pngquant` | pngquant | lossy PNG compression |
//!
//! Both are looked up on `PATH` unless [`ToolPaths`] overrides them, or
//! replaced entirely by injecting a [`PageRasterizer`] / [`ImageCompressor`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `talkdeck` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! talkdeck = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod landing;
pub mod manifest;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod talk;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{build_site, build_site_sync, discover_talks, BatchReport};
pub use config::{BuildConfig, BuildConfigBuilder, CompressionLevel, SiteInfo, ToolPaths};
pub use error::{MetadataError, TalkFailure, TalkdeckError, ToolError};
pub use metadata::{load_metadata, TalkMetadata};
pub use pipeline::compress::{ImageCompressor, Pngquant};
pub use pipeline::extract::{CompressionState, PageRasterizer, Pdftoppm, SlideImage};
pub use progress::{BuildProgressCallback, NoopProgressCallback, ProgressCallback};
pub use talk::{build_talk, build_talk_sync, BuildStage, TalkBuild, TalkState};
