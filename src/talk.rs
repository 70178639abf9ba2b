//! Per-talk build: the `TalkBuilder` state machine and its entry points.
//!
//! ```text
//! unbuilt ──▶ extracting ──▶ compressing ──▶ assembling ──▶ built
//!    │             │               │               │
//!    └──▶ skipped  └───────────────┴───────────────┴──▶ failed(stage)
//! ```
//!
//! A talk is `skipped` only when its manifest fingerprint matches the
//! current inputs and force is off. Every other build starts by clearing
//! what the previous one produced, so a rebuild replaces output instead of
//! merging with it.

use crate::config::BuildConfig;
use crate::error::{TalkdeckError, ToolError};
use crate::manifest::{clear_previous_build, write_atomic, BuildLock, BuildManifest, InputFingerprint};
use crate::pipeline::assemble::assemble_slideshow;
use crate::pipeline::compress::{compress_slides, ImageCompressor, Pngquant};
use crate::pipeline::extract::{existing_slides, extract_pages, PageRasterizer, Pdftoppm, SlideImage};
use crate::pipeline::template::Templates;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// File name of the generated slideshow inside a talk's output directory.
pub const SLIDESHOW_FILE: &str = "index.html";

/// The step a talk was in when something happened to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStage {
    /// Metadata or highlight validation.
    Validating,
    /// Locking the output directory and fingerprinting inputs.
    Preparing,
    Extracting,
    Compressing,
    Assembling,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStage::Validating => "validating",
            BuildStage::Preparing => "preparing",
            BuildStage::Extracting => "extracting",
            BuildStage::Compressing => "compressing",
            BuildStage::Assembling => "assembling",
        };
        f.write_str(s)
    }
}

/// Where a talk is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TalkState {
    Unbuilt,
    Extracting,
    Compressing,
    Assembling,
    Built,
    Skipped,
    Failed(BuildStage),
}

impl TalkState {
    pub fn failed_stage(self) -> Option<BuildStage> {
        match self {
            TalkState::Failed(stage) => Some(stage),
            _ => None,
        }
    }
}

/// What to build for one talk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TalkJob {
    /// Talk handle, used in logs, progress events and failures.
    pub name: String,
    pub pdf: PathBuf,
    pub output_dir: PathBuf,
    /// Replaces the slideshow template's default title.
    pub title: Option<String>,
    /// 1-based slide that must exist once pages are extracted.
    pub highlight: Option<u32>,
    /// Copy the PDF to this path (relative to `output_dir`).
    pub publish_pdf_as: Option<PathBuf>,
}

impl TalkJob {
    /// A standalone talk: output defaults to the PDF's own directory.
    pub fn single(
        pdf: &Path,
        output_dir: Option<&Path>,
        title: Option<&str>,
    ) -> Result<Self, TalkdeckError> {
        if !pdf.is_file() {
            return Err(pdf_not_found(pdf));
        }
        let output_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => pdf
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf(),
        };
        let name = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "talk".to_string());
        Ok(Self {
            name,
            pdf: pdf.to_path_buf(),
            output_dir,
            title: title.map(str::to_string),
            highlight: None,
            publish_pdf_as: None,
        })
    }
}

/// The external tools and templates shared by every talk of a run.
#[derive(Clone)]
pub struct Pipeline {
    rasterizer: Arc<dyn PageRasterizer>,
    compressor: Arc<dyn ImageCompressor>,
    templates: Arc<Templates>,
}

impl Pipeline {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        compressor: Arc<dyn ImageCompressor>,
        templates: Arc<Templates>,
    ) -> Self {
        Self {
            rasterizer,
            compressor,
            templates,
        }
    }

    /// Resolve tools and load templates once for the whole run.
    ///
    /// Injected trait objects in `config` win over the tool paths.
    pub fn from_config(config: &BuildConfig) -> Result<Self, TalkdeckError> {
        let rasterizer: Arc<dyn PageRasterizer> = match config.rasterizer {
            Some(ref r) => Arc::clone(r),
            None => Arc::new(Pdftoppm::new(config.tools.pdftoppm.as_deref())),
        };
        let compressor: Arc<dyn ImageCompressor> = match config.compressor {
            Some(ref c) => Arc::clone(c),
            None => Arc::new(Pngquant::new(config.tools.pngquant.as_deref())),
        };
        let templates = Arc::new(Templates::load(config)?);
        debug!(
            "Pipeline: rasterizer={}, compressor={}",
            rasterizer.name(),
            compressor.name()
        );
        Ok(Self::new(rasterizer, compressor, templates))
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("rasterizer", &self.rasterizer.name())
            .field("compressor", &self.compressor.name())
            .finish()
    }
}

/// The result of a finished (built or skipped) talk.
#[derive(Debug, Clone)]
pub struct TalkBuild {
    pub name: String,
    pub output_dir: PathBuf,
    pub slideshow: PathBuf,
    /// Slides in page order.
    pub slides: Vec<SlideImage>,
    pub state: TalkState,
}

impl TalkBuild {
    /// The slide at 1-based position `highlight`.
    pub fn slide(&self, highlight: u32) -> Option<&SlideImage> {
        self.slides.iter().find(|s| s.ordinal == highlight)
    }
}

/// Drives one talk through its states.
pub struct TalkBuilder {
    job: TalkJob,
    pipeline: Pipeline,
    config: BuildConfig,
    state: TalkState,
    stage: BuildStage,
}

impl TalkBuilder {
    pub fn new(job: TalkJob, pipeline: Pipeline, config: BuildConfig) -> Self {
        Self {
            job,
            pipeline,
            config,
            state: TalkState::Unbuilt,
            stage: BuildStage::Preparing,
        }
    }

    pub fn state(&self) -> TalkState {
        self.state
    }

    /// Run to a terminal state. Blocking: call from a worker thread.
    ///
    /// On error the builder is left in `Failed(stage)`.
    pub fn run(&mut self) -> Result<TalkBuild, TalkdeckError> {
        let start = Instant::now();
        match self.try_run() {
            Ok(build) => {
                debug!(
                    "Talk '{}' finished as {:?} in {}ms",
                    self.job.name,
                    build.state,
                    start.elapsed().as_millis()
                );
                Ok(build)
            }
            Err(e) => {
                self.state = TalkState::Failed(self.stage);
                warn!("Talk '{}' failed while {}: {}", self.job.name, self.stage, e);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_talk_error(&self.job.name, self.stage, &e.to_string());
                }
                Err(e)
            }
        }
    }

    fn try_run(&mut self) -> Result<TalkBuild, TalkdeckError> {
        let dir = self.job.output_dir.clone();
        let pdf = self.job.pdf.clone();

        // ── Prepare: lock + fingerprint ──────────────────────────────────
        self.stage = BuildStage::Preparing;
        if !pdf.is_file() {
            return Err(pdf_not_found(&pdf));
        }
        std::fs::create_dir_all(&dir).map_err(|e| TalkdeckError::write(&dir, e))?;
        let _lock = BuildLock::acquire(&dir)?;

        let fingerprint = InputFingerprint::compute(
            &pdf,
            self.job.title.as_deref(),
            self.config.dpi,
            self.config.compression,
            &self.pipeline.templates.slideshow.fingerprint(),
        )
        .map_err(|e| TalkdeckError::ExtractionFailed {
            pdf: pdf.clone(),
            source: ToolError::Unreadable {
                input: pdf.clone(),
                detail: e.to_string(),
            },
        })?;

        let previous = BuildManifest::read(&dir);

        // ── Skip when current ────────────────────────────────────────────
        if !self.config.force {
            if let Some(ref manifest) = previous {
                if manifest.is_current(&dir, &fingerprint, SLIDESHOW_FILE) {
                    return self.finish_skipped(&dir, manifest);
                }
            }
        }

        let removed = clear_previous_build(&dir, previous.as_ref(), SLIDESHOW_FILE)?;
        if removed > 0 {
            debug!("Talk '{}': removed {} stale files", self.job.name, removed);
        }

        // ── Extract ──────────────────────────────────────────────────────
        self.enter(TalkState::Extracting, BuildStage::Extracting);
        let mut slides = extract_pages(&*self.pipeline.rasterizer, &pdf, &dir, self.config.dpi)?;
        info!("Talk '{}': {} pages extracted", self.job.name, slides.len());

        self.stage = BuildStage::Validating;
        self.check_highlight(slides.len())?;

        // ── Compress ─────────────────────────────────────────────────────
        self.enter(TalkState::Compressing, BuildStage::Compressing);
        compress_slides(&*self.pipeline.compressor, &mut slides, self.config.compression)?;

        // ── Assemble ─────────────────────────────────────────────────────
        self.enter(TalkState::Assembling, BuildStage::Assembling);
        let html = assemble_slideshow(
            &self.pipeline.templates.slideshow,
            &slides,
            self.job.title.as_deref(),
        )?;
        let slideshow = dir.join(SLIDESHOW_FILE);
        write_atomic(&slideshow, html.as_bytes())?;
        self.publish_pdf(&dir, false)?;

        let names = slides.iter().map(SlideImage::file_name).collect();
        BuildManifest::new(fingerprint, names).write(&dir)?;

        self.state = TalkState::Built;
        info!("Talk '{}': built {} slides", self.job.name, slides.len());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_talk_built(&self.job.name, slides.len());
        }
        Ok(TalkBuild {
            name: self.job.name.clone(),
            output_dir: dir,
            slideshow,
            slides,
            state: self.state,
        })
    }

    fn finish_skipped(
        &mut self,
        dir: &Path,
        manifest: &BuildManifest,
    ) -> Result<TalkBuild, TalkdeckError> {
        // The highlight is not part of the fingerprint, so check it again.
        self.stage = BuildStage::Validating;
        let slides: Vec<SlideImage> = existing_slides(dir)?
            .into_iter()
            .filter(|s| manifest.slides.contains(&s.file_name()))
            .collect();
        self.check_highlight(slides.len())?;

        self.stage = BuildStage::Preparing;
        self.publish_pdf(dir, true)?;

        self.state = TalkState::Skipped;
        info!("Talk '{}': up to date, skipped", self.job.name);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_talk_skipped(&self.job.name);
        }
        Ok(TalkBuild {
            name: self.job.name.clone(),
            output_dir: dir.to_path_buf(),
            slideshow: dir.join(SLIDESHOW_FILE),
            slides,
            state: self.state,
        })
    }

    fn enter(&mut self, state: TalkState, stage: BuildStage) {
        self.state = state;
        self.stage = stage;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_talk_stage(&self.job.name, stage);
        }
    }

    fn check_highlight(&self, total: usize) -> Result<(), TalkdeckError> {
        match self.job.highlight {
            Some(h) if h as usize > total => Err(TalkdeckError::HighlightOutOfRange {
                talk_dir: self.job.output_dir.clone(),
                highlight: h,
                total,
            }),
            _ => Ok(()),
        }
    }

    /// Copy the source PDF into the output directory when requested.
    fn publish_pdf(&self, dir: &Path, only_if_missing: bool) -> Result<(), TalkdeckError> {
        let Some(ref rel) = self.job.publish_pdf_as else {
            return Ok(());
        };
        let target = dir.join(rel);
        if same_file(&self.job.pdf, &target) || (only_if_missing && target.is_file()) {
            return Ok(());
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TalkdeckError::write(parent, e))?;
        }
        std::fs::copy(&self.job.pdf, &target).map_err(|e| TalkdeckError::write(&target, e))?;
        debug!("Published {} → {}", self.job.pdf.display(), target.display());
        Ok(())
    }
}

/// A missing PDF is an extraction failure like any other unreadable input.
fn pdf_not_found(pdf: &Path) -> TalkdeckError {
    TalkdeckError::ExtractionFailed {
        pdf: pdf.to_path_buf(),
        source: ToolError::Unreadable {
            input: pdf.to_path_buf(),
            detail: "file not found".into(),
        },
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Build one talk from a PDF.
///
/// `output_dir` defaults to the PDF's directory. Returns the build on
/// success, including a skip when the output is already current.
///
/// # Errors
/// Any stage failure: missing PDF, rasterizer or compressor failure,
/// invalid template, or a locked output directory.
pub async fn build_talk(
    pdf: impl AsRef<Path>,
    output_dir: Option<&Path>,
    title: Option<&str>,
    config: &BuildConfig,
) -> Result<TalkBuild, TalkdeckError> {
    let job = TalkJob::single(pdf.as_ref(), output_dir, title)?;
    let pipeline = Pipeline::from_config(config)?;
    run_blocking(TalkBuilder::new(job, pipeline, config.clone())).await
}

/// Synchronous wrapper around [`build_talk`].
///
/// Creates a temporary tokio runtime internally.
pub fn build_talk_sync(
    pdf: impl AsRef<Path>,
    output_dir: Option<&Path>,
    title: Option<&str>,
    config: &BuildConfig,
) -> Result<TalkBuild, TalkdeckError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TalkdeckError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(build_talk(pdf, output_dir, title, config))
}

/// Run a builder on the blocking pool.
pub(crate) async fn run_blocking(mut builder: TalkBuilder) -> Result<TalkBuild, TalkdeckError> {
    tokio::task::spawn_blocking(move || builder.run())
        .await
        .map_err(|e| TalkdeckError::Internal(format!("talk build task failed: {}", e)))?
}
