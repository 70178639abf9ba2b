//! Progress-callback trait for per-talk build events.
//!
//! Inject an [`Arc<dyn BuildProgressCallback>`] via
//! [`crate::config::BuildConfigBuilder::progress_callback`] to follow a batch
//! as it moves through discovery, per-talk stages and the landing page.
//!
//! # Example
//!
//! ```rust
//! use talkdeck::{BuildConfig, BuildProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     built: AtomicUsize,
//! }
//!
//! impl BuildProgressCallback for CountingCallback {
//!     fn on_talk_built(&self, talk: &str, slides: usize) {
//!         self.built.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{talk}: {slides} slides");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { built: AtomicUsize::new(0) });
//!
//! let config = BuildConfig::builder()
//!     .progress_callback(counter as Arc<dyn BuildProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::talk::BuildStage;
use std::sync::Arc;

/// Called by the build pipeline as talks move through their stages.
///
/// With `concurrency > 1` several talks are in flight at once, so methods
/// may be called concurrently from different threads. All methods default
/// to no-ops.
pub trait BuildProgressCallback: Send + Sync {
    /// Called once after discovery, before any talk is built.
    fn on_batch_start(&self, total_talks: usize) {
        let _ = total_talks;
    }

    /// Called when a talk enters a new active stage.
    fn on_talk_stage(&self, talk: &str, stage: BuildStage) {
        let _ = (talk, stage);
    }

    /// Called when a talk finishes building.
    fn on_talk_built(&self, talk: &str, slides: usize) {
        let _ = (talk, slides);
    }

    /// Called when a talk's output is current and the build is skipped.
    fn on_talk_skipped(&self, talk: &str) {
        let _ = talk;
    }

    /// Called when a talk fails at `stage`.
    fn on_talk_error(&self, talk: &str, stage: BuildStage, error: &str) {
        let _ = (talk, stage, error);
    }

    /// Called once after the landing page is written.
    fn on_batch_complete(&self, built: usize, skipped: usize, failed: usize) {
        let _ = (built, skipped, failed);
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl BuildProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BuildConfig`].
pub type ProgressCallback = Arc<dyn BuildProgressCallback>;
