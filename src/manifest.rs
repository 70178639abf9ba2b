//! Per-talk build manifest and output-directory lock.
//!
//! The manifest records a fingerprint of every input that affects a talk's
//! output (the PDF bytes, title override, DPI, compression level and the
//! slideshow template) together with the slide files it produced. A talk is
//! skipped only when that fingerprint still matches and every listed file
//! is present, so an edited PDF or a changed setting always rebuilds.
//!
//! It is written last, after `index.html`, so an interrupted build never
//! leaves a manifest that claims the output is complete.

use crate::config::CompressionLevel;
use crate::error::TalkdeckError;
use crate::pipeline::extract::{is_slide_file_name, STAGING_PREFIX};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Manifest file name inside a talk's output directory.
pub const MANIFEST_FILE: &str = ".talkdeck-manifest.json";

/// Lock file name inside a talk's output directory.
pub const LOCK_FILE: &str = ".talkdeck.lock";

const MANIFEST_VERSION: u32 = 1;

/// Everything that decides what a talk build produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFingerprint {
    pub pdf_sha256: String,
    pub title: Option<String>,
    pub dpi: u32,
    pub compression: CompressionLevel,
    pub template_sha256: String,
}

impl InputFingerprint {
    pub fn compute(
        pdf: &Path,
        title: Option<&str>,
        dpi: u32,
        compression: CompressionLevel,
        template_sha256: &str,
    ) -> io::Result<Self> {
        Ok(Self {
            pdf_sha256: sha256_file(pdf)?,
            title: title.map(str::to_string),
            dpi,
            compression,
            template_sha256: template_sha256.to_string(),
        })
    }
}

/// Hex SHA-256 of a file, streamed.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// The record left behind by a completed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub version: u32,
    pub fingerprint: InputFingerprint,
    /// Slide file names, in slide order.
    pub slides: Vec<String>,
}

impl BuildManifest {
    pub fn new(fingerprint: InputFingerprint, slides: Vec<String>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            fingerprint,
            slides,
        }
    }

    /// Read the manifest in `dir`.
    ///
    /// Absent or unreadable manifests yield `None`; an unparsable one is
    /// logged and treated as absent, which forces a rebuild.
    pub fn read(dir: &Path) -> Option<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<Self>(&text) {
            Ok(m) if m.version == MANIFEST_VERSION => Some(m),
            Ok(m) => {
                debug!("Ignoring manifest version {} in {}", m.version, dir.display());
                None
            }
            Err(e) => {
                warn!("Ignoring unreadable manifest {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write the manifest into `dir` atomically.
    pub fn write(&self, dir: &Path) -> Result<(), TalkdeckError> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| TalkdeckError::Internal(format!("manifest serialisation: {e}")))?;
        write_atomic(&dir.join(MANIFEST_FILE), &json)
    }

    /// True when this manifest describes a complete build of `fingerprint`
    /// whose files are all still on disk.
    pub fn is_current(&self, dir: &Path, fingerprint: &InputFingerprint, slideshow: &str) -> bool {
        &self.fingerprint == fingerprint
            && dir.join(slideshow).is_file()
            && self.slides.iter().all(|s| dir.join(s).is_file())
    }
}

/// Replace `path` with `contents` via a temporary file in the same directory.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), TalkdeckError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(dir)
        .map_err(|e| TalkdeckError::write(path, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.flush())
        .map_err(|e| TalkdeckError::write(path, e))?;
    tmp.persist(path)
        .map_err(|e| TalkdeckError::write(path, e.error))?;
    Ok(())
}

/// Remove everything a previous build of this directory produced.
///
/// Deletes the slides the old manifest lists, any other `slide-NN.png`,
/// the slideshow, the manifest itself and rasterizer staging directories
/// left by an interrupted run. Source PDFs and unrelated files are left
/// alone.
pub fn clear_previous_build(
    dir: &Path,
    previous: Option<&BuildManifest>,
    slideshow: &str,
) -> Result<usize, TalkdeckError> {
    let mut targets: Vec<PathBuf> = previous
        .map(|m| m.slides.iter().map(|s| dir.join(s)).collect())
        .unwrap_or_default();

    let mut staging_dirs = Vec::new();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(TalkdeckError::io(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| TalkdeckError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_slide_file_name(&name) {
            targets.push(entry.path());
        } else if name.starts_with(STAGING_PREFIX) && entry.path().is_dir() {
            staging_dirs.push(entry.path());
        }
    }
    targets.push(dir.join(slideshow));
    targets.push(dir.join(MANIFEST_FILE));
    targets.sort();
    targets.dedup();

    let mut removed = 0;
    for path in staging_dirs {
        match std::fs::remove_dir_all(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(TalkdeckError::write(&path, e)),
        }
    }
    for path in targets {
        let is_pdf = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(TalkdeckError::write(&path, e)),
        }
    }
    debug!("Cleared {} entries from {}", removed, dir.display());
    Ok(removed)
}

/// Exclusive claim on a talk's output directory for one build.
///
/// Held as an OS advisory lock on the open lock file, so the claim ends
/// with the process even when it is killed before `Drop` runs. A lock file
/// left behind that way is simply locked again by the next build.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
    _file: File,
}

/// Bound on reopen attempts when the lock file is replaced under us.
const LOCK_ATTEMPTS: usize = 8;

impl BuildLock {
    pub fn acquire(dir: &Path) -> Result<Self, TalkdeckError> {
        let path = dir.join(LOCK_FILE);
        let locked = |lock: &Path| TalkdeckError::BuildLocked {
            dir: dir.to_path_buf(),
            lock: lock.to_path_buf(),
        };
        for _ in 0..LOCK_ATTEMPTS {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| TalkdeckError::write(&path, e))?;
            match file.try_lock() {
                Ok(()) => {}
                Err(TryLockError::WouldBlock) => return Err(locked(&path)),
                Err(TryLockError::Error(e)) => return Err(TalkdeckError::write(&path, e)),
            }
            // The previous holder unlinks the file on release; a handle
            // opened just before that locks a file nobody else can see.
            if !still_linked(&file, &path) {
                debug!("Lock file {} was replaced, retrying", path.display());
                continue;
            }
            // Best-effort note for whoever inspects the directory.
            let _ = file
                .set_len(0)
                .and_then(|()| writeln!(file, "pid {}", std::process::id()));
            return Ok(Self { path, _file: file });
        }
        Err(locked(&path))
    }
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), std::fs::metadata(path)) {
        (Ok(held), Ok(named)) => held.dev() == named.dev() && held.ino() == named.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool {
    path.is_file()
}

impl Drop for BuildLock {
    // Unlink while still locked; the handle closes after this runs.
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Could not remove lock file {}: {}", self.path.display(), e);
        }
    }
}
