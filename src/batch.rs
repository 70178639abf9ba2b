//! Batch builds: every talk under a root directory, then one landing page.
//!
//! ## Flow
//!
//! 1. Discover talk directories (non-hidden, containing a metadata record),
//!    sorted by name. That order is the discovery order.
//! 2. Build each talk on the blocking pool, at most `concurrency` at once.
//!    A failing talk is recorded and the batch moves on.
//! 3. Re-sort outcomes by discovery order, so the result does not depend on
//!    which talk finished first.
//! 4. Write the landing page over every built or skipped talk. This always
//!    happens, even when every talk failed.

use crate::config::BuildConfig;
use crate::error::{TalkFailure, TalkdeckError};
use crate::landing::{write_landing_page, PublishedTalk};
use crate::metadata::{find_metadata_file, load_metadata};
use crate::talk::{BuildStage, Pipeline, TalkBuilder, TalkJob, TalkState};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A talk directory found under the talks root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTalk {
    /// Directory name; also the output subdirectory name.
    pub handle: String,
    pub dir: PathBuf,
    /// Position in discovery order.
    pub index: usize,
}

/// List talk directories under `root`, sorted by name.
///
/// Hidden directories and directories without a metadata record are
/// ignored.
pub fn discover_talks(root: &Path) -> Result<Vec<DiscoveredTalk>, TalkdeckError> {
    if !root.is_dir() {
        return Err(TalkdeckError::TalksRootNotFound {
            path: root.to_path_buf(),
        });
    }
    let mut found = Vec::new();
    for entry in std::fs::read_dir(root).map_err(|e| TalkdeckError::io(root, e))? {
        let entry = entry.map_err(|e| TalkdeckError::io(root, e))?;
        let path = entry.path();
        let handle = entry.file_name().to_string_lossy().into_owned();
        if handle.starts_with('.') || !path.is_dir() {
            continue;
        }
        if find_metadata_file(&path).is_none() {
            debug!("Ignoring {}: no metadata record", path.display());
            continue;
        }
        found.push((handle, path));
    }
    found.sort();
    Ok(found
        .into_iter()
        .enumerate()
        .map(|(index, (handle, dir))| DiscoveredTalk { handle, dir, index })
        .collect())
}

/// Summary of a batch build.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Talks rebuilt in this run, in discovery order.
    pub built: Vec<String>,
    /// Talks whose output was already current.
    pub skipped: Vec<String>,
    /// Talks that failed, with the stage and reason.
    pub failed: Vec<TalkFailure>,
    pub landing_page: PathBuf,
    /// Handles on the landing page, in display order.
    pub listed: Vec<String>,
    pub duration_ms: u64,
}

impl BatchReport {
    /// True when no talk failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Human-readable summary grouped by outcome.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let section = |out: &mut String, title: &str, items: &[String]| {
            if !items.is_empty() {
                let _ = writeln!(out, "{title} ({}):", items.len());
                for item in items {
                    let _ = writeln!(out, "  - {item}");
                }
            }
        };
        section(&mut out, "Built", &self.built);
        section(&mut out, "Skipped (up to date)", &self.skipped);
        let failures: Vec<String> = self.failed.iter().map(|f| f.to_string()).collect();
        section(&mut out, "Failed", &failures);
        if self.built.is_empty() && self.skipped.is_empty() && self.failed.is_empty() {
            out.push_str("No talks found.\n");
        }
        let _ = writeln!(
            out,
            "Landing page: {} ({} talks listed)",
            self.landing_page.display(),
            self.listed.len()
        );
        out
    }
}

enum TalkOutcome {
    Published { talk: PublishedTalk, state: TalkState },
    Failed(TalkFailure),
}

/// Build every talk under `talks_root` into `output_root`, then the
/// landing page.
///
/// Individual talk failures are collected in the report, not returned.
///
/// # Errors
/// Only run-level problems: a missing talks root, an invalid template, or
/// a landing page that cannot be written.
pub async fn build_site(
    talks_root: impl AsRef<Path>,
    output_root: impl AsRef<Path>,
    config: &BuildConfig,
) -> Result<BatchReport, TalkdeckError> {
    let start = Instant::now();
    let talks_root = talks_root.as_ref();
    let output_root = output_root.as_ref().to_path_buf();
    info!(
        "Building site: {} → {}",
        talks_root.display(),
        output_root.display()
    );

    let pipeline = Pipeline::from_config(config)?;
    let discovered = discover_talks(talks_root)?;
    info!("Discovered {} talks", discovered.len());
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(discovered.len());
    }
    std::fs::create_dir_all(&output_root).map_err(|e| TalkdeckError::write(&output_root, e))?;

    let mut outcomes: Vec<(usize, TalkOutcome)> = stream::iter(discovered.into_iter().map(|talk| {
        let pipeline = pipeline.clone();
        let config = config.clone();
        let output_root = output_root.clone();
        async move {
            let index = talk.index;
            let handle = talk.handle.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                process_talk(talk, &output_root, pipeline, config)
            })
            .await
            .unwrap_or_else(|e| {
                let error = TalkdeckError::Internal(format!("talk build task failed: {e}"));
                TalkOutcome::Failed(TalkFailure::new(handle, BuildStage::Preparing, &error))
            });
            (index, outcome)
        }
    }))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;
    outcomes.sort_by_key(|(index, _)| *index);

    let mut built = Vec::new();
    let mut skipped = Vec::new();
    let mut failed = Vec::new();
    let mut published = Vec::new();
    for (_, outcome) in outcomes {
        match outcome {
            TalkOutcome::Published { talk, state } => {
                if state == TalkState::Skipped {
                    skipped.push(talk.handle.clone());
                } else {
                    built.push(talk.handle.clone());
                }
                published.push(talk);
            }
            TalkOutcome::Failed(failure) => {
                warn!("Excluded from landing page: {}", failure);
                failed.push(failure);
            }
        }
    }

    let landing = write_landing_page(&output_root, pipeline.templates(), published, config)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(built.len(), skipped.len(), failed.len());
    }
    let report = BatchReport {
        built,
        skipped,
        failed,
        landing_page: landing.path,
        listed: landing.listed,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Site complete: {} built, {} skipped, {} failed in {}ms",
        report.built.len(),
        report.skipped.len(),
        report.failed.len(),
        report.duration_ms
    );
    Ok(report)
}

/// Synchronous wrapper around [`build_site`].
///
/// Creates a temporary tokio runtime internally.
pub fn build_site_sync(
    talks_root: impl AsRef<Path>,
    output_root: impl AsRef<Path>,
    config: &BuildConfig,
) -> Result<BatchReport, TalkdeckError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| TalkdeckError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(build_site(talks_root, output_root, config))
}

/// Load metadata, build, and pair the result for the landing page.
fn process_talk(
    talk: DiscoveredTalk,
    output_root: &Path,
    pipeline: Pipeline,
    config: BuildConfig,
) -> TalkOutcome {
    let handle = talk.handle;
    let metadata = match load_metadata(&talk.dir) {
        Ok(m) => m,
        Err(e) => {
            let error = TalkdeckError::from(e);
            warn!("Talk '{}' has invalid metadata: {}", handle, error);
            if let Some(ref cb) = config.progress_callback {
                cb.on_talk_error(&handle, BuildStage::Validating, &error.to_string());
            }
            return TalkOutcome::Failed(TalkFailure::new(handle, BuildStage::Validating, &error));
        }
    };

    let job = TalkJob {
        name: handle.clone(),
        pdf: talk.dir.join(&metadata.pdf),
        output_dir: output_root.join(&handle),
        title: Some(metadata.title.clone()),
        highlight: Some(metadata.highlight),
        publish_pdf_as: Some(metadata.pdf.clone()),
    };
    let mut builder = TalkBuilder::new(job, pipeline, config);
    match builder.run() {
        Ok(build) => match PublishedTalk::new(handle.clone(), metadata, &build, talk.index) {
            Ok(published) => TalkOutcome::Published {
                talk: published,
                state: build.state,
            },
            Err(e) => TalkOutcome::Failed(TalkFailure::new(handle, BuildStage::Validating, &e)),
        },
        Err(e) => {
            let stage = builder
                .state()
                .failed_stage()
                .unwrap_or(BuildStage::Preparing);
            TalkOutcome::Failed(TalkFailure::new(handle, stage, &e))
        }
    }
}
