//! Error types for the talkdeck library.
//!
//! Two tiers mirror the two scopes of a build:
//!
//! * [`TalkdeckError`] — **Fatal for one talk** (or for a single-talk run):
//!   bad metadata, a missing tool, a rasterizer that exited non-zero, a
//!   highlight pointing past the last slide. Returned as `Err` from
//!   [`crate::talk::build_talk`] and friends.
//!
//! * [`TalkFailure`] — **Recorded, not propagated**: the batch orchestrator
//!   turns each talk's `TalkdeckError` into a `TalkFailure` and keeps going.
//!   All failures are listed in [`crate::batch::BatchReport`] at the end.
//!
//! [`MetadataError`] and [`ToolError`] are the two leaf classes that feed
//! into `TalkdeckError`: configuration problems in `metadata.yml`, and
//! problems running the external rasterizer/compressor.

use crate::talk::BuildStage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All errors that abort a single talk build.
#[derive(Debug, Error)]
pub enum TalkdeckError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The talks root handed to a batch build does not exist.
    #[error("Talks directory not found: '{path}'")]
    TalksRootNotFound { path: PathBuf },

    /// The talk's metadata record is missing or invalid.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Page extraction failed; the cause names the tool and exit status.
    #[error("Extraction failed for '{pdf}': {source}")]
    ExtractionFailed {
        pdf: PathBuf,
        #[source]
        source: ToolError,
    },

    /// At least one slide image could not be compressed.
    ///
    /// Compression is best-effort: every image is attempted before this is
    /// raised, so `failures` lists all of them.
    #[error("Compression failed for {} image(s):\n{}", .failures.len(), CompressionFailures(.failures))]
    CompressionFailed { failures: Vec<CompressionFailure> },

    /// The highlight slide does not exist after extraction.
    #[error("Talk '{talk_dir}': highlight slide {highlight} is out of range (talk has {total} slides)")]
    HighlightOutOfRange {
        talk_dir: PathBuf,
        highlight: u32,
        total: usize,
    },

    /// A template is missing a required placeholder or repeats a unique one.
    #[error("Template '{name}' is invalid: {detail}")]
    Template { name: String, detail: String },

    // ── Output / state errors ─────────────────────────────────────────────
    /// Another build currently owns the output directory.
    #[error("Output directory '{dir}' is locked by another running build (lock file {lock:?})")]
    BuildLocked { dir: PathBuf, lock: PathBuf },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure, tagged with the path involved.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TalkdeckError {
    /// Wrap an `io::Error` with the path it happened on.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TalkdeckError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a write failure with its target path.
    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TalkdeckError::OutputWriteFailed {
            path: path.into(),
            source,
        }
    }
}

/// Configuration errors in a talk's metadata record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// The talk directory has no `metadata.yml` / `metadata.yaml`.
    #[error("No metadata record found in '{talk_dir}'")]
    NotFound { talk_dir: PathBuf },

    /// The record exists but could not be read or parsed as YAML.
    #[error("Malformed metadata in '{talk_dir}': {detail}")]
    Malformed { talk_dir: PathBuf, detail: String },

    /// A required field is absent.
    #[error("Talk '{talk_dir}': missing required field '{field}'")]
    MissingField {
        talk_dir: PathBuf,
        field: &'static str,
    },

    /// A field is present but has the wrong shape.
    #[error("Talk '{talk_dir}': invalid field '{field}': {detail}")]
    InvalidField {
        talk_dir: PathBuf,
        field: &'static str,
        detail: String,
    },

    /// The `pdf` field points at a file that does not exist.
    #[error("Talk '{talk_dir}': PDF '{pdf}' does not exist")]
    PdfMissing { talk_dir: PathBuf, pdf: PathBuf },
}

/// A failure running an external tool (rasterizer or compressor).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// The executable is not on `PATH` (and no override was given).
    #[error("required tool '{tool}' was not found on PATH\n{hint}")]
    NotFound { tool: String, hint: String },

    /// The executable exists but could not be started.
    #[error("could not run '{tool}' on '{input}': {detail}")]
    Spawn {
        tool: String,
        input: PathBuf,
        detail: String,
    },

    /// The tool ran and exited unsuccessfully.
    #[error("'{tool}' failed on '{input}' ({status}){}", stderr_suffix(.stderr))]
    Failed {
        tool: String,
        input: PathBuf,
        status: String,
        stderr: String,
    },

    /// The input file is missing or unreadable, so the tool was never run.
    #[error("cannot read input '{input}': {detail}")]
    Unreadable { input: PathBuf, detail: String },

    /// The input was refused before running the tool.
    #[error("'{tool}' refused input '{input}': {reason}")]
    Refused {
        tool: String,
        input: PathBuf,
        reason: String,
    },

    /// The tool succeeded but its output was not what we expected.
    #[error("'{tool}' produced unexpected output for '{input}': {detail}")]
    UnexpectedOutput {
        tool: String,
        input: PathBuf,
        detail: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// One image that the compressor could not rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionFailure {
    pub path: PathBuf,
    pub error: ToolError,
}

struct CompressionFailures<'a>(&'a [CompressionFailure]);

impl fmt::Display for CompressionFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {}: {}", failure.path.display(), failure.error)?;
        }
        Ok(())
    }
}

/// A talk that did not make it, as recorded in the batch report.
///
/// Stored rather than propagated so one broken talk never takes the
/// landing page down with it.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("{talk} [{stage}]: {message}")]
pub struct TalkFailure {
    /// Talk handle (directory name).
    pub talk: String,
    /// The stage that was active when the talk failed.
    pub stage: BuildStage,
    /// Human-readable error.
    pub message: String,
}

impl TalkFailure {
    pub fn new(talk: impl Into<String>, stage: BuildStage, error: &TalkdeckError) -> Self {
        Self {
            talk: talk.into(),
            stage,
            message: error.to_string(),
        }
    }
}
