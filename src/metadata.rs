//! Talk metadata: parse and validate one `metadata.yml` record.
//!
//! ```yaml
//! talk:
//!   title: "Zero-copy parsing in Rust"
//!   pdf: slides.pdf
//!   description: |
//!     How we cut **allocation** out of a hot path.
//!   highlight: 7
//!   date: 2025-03-01
//!   video: https://youtu.be/example   # optional
//! ```
//!
//! Fields are validated one by one into a fully-typed [`TalkMetadata`];
//! the first problem found is returned and no partial value escapes.

use crate::error::MetadataError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File names recognised as a talk's metadata record, in lookup order.
pub const METADATA_FILE_NAMES: [&str; 2] = ["metadata.yml", "metadata.yaml"];

/// Validated metadata for one talk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalkMetadata {
    pub title: String,
    /// PDF path relative to the talk directory.
    pub pdf: PathBuf,
    /// Markdown description.
    pub description: String,
    /// 1-based number of the slide used as the preview image.
    pub highlight: u32,
    pub date: NaiveDate,
    /// Opaque video URL; never fetched.
    pub video: Option<String>,
}

impl TalkMetadata {
    /// The PDF path as a URL path segment (`/`-separated).
    pub fn pdf_href(&self) -> String {
        self.pdf
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Locate the metadata record inside `talk_dir`.
pub fn find_metadata_file(talk_dir: &Path) -> Option<PathBuf> {
    METADATA_FILE_NAMES
        .iter()
        .map(|name| talk_dir.join(name))
        .find(|p| p.is_file())
}

/// Load and validate the metadata record of `talk_dir`.
///
/// Also checks that the referenced PDF exists inside the talk directory.
pub fn load_metadata(talk_dir: &Path) -> Result<TalkMetadata, MetadataError> {
    let file = find_metadata_file(talk_dir).ok_or_else(|| MetadataError::NotFound {
        talk_dir: talk_dir.to_path_buf(),
    })?;
    let text = std::fs::read_to_string(&file).map_err(|e| MetadataError::Malformed {
        talk_dir: talk_dir.to_path_buf(),
        detail: format!("cannot read {}: {e}", file.display()),
    })?;

    let metadata = parse_metadata(&text, talk_dir)?;

    let pdf = talk_dir.join(&metadata.pdf);
    if !pdf.is_file() {
        return Err(MetadataError::PdfMissing {
            talk_dir: talk_dir.to_path_buf(),
            pdf,
        });
    }

    debug!("Loaded metadata for {}: {:?}", talk_dir.display(), metadata.title);
    Ok(metadata)
}

/// Parse and validate a metadata document. Does not touch the filesystem.
pub fn parse_metadata(text: &str, talk_dir: &Path) -> Result<TalkMetadata, MetadataError> {
    let doc: Value = serde_yaml::from_str(text).map_err(|e| MetadataError::Malformed {
        talk_dir: talk_dir.to_path_buf(),
        detail: e.to_string(),
    })?;
    let talk = doc
        .get("talk")
        .and_then(Value::as_mapping)
        .ok_or_else(|| MetadataError::Malformed {
            talk_dir: talk_dir.to_path_buf(),
            detail: "missing top-level 'talk' section".into(),
        })?;

    let fields = Fields { talk, talk_dir };

    let title = fields.string("title")?;
    if title.trim().is_empty() {
        return Err(fields.invalid("title", "must not be empty".into()));
    }
    let pdf = fields.relative_path("pdf")?;
    let description = fields.string("description")?;
    let highlight = fields.positive_int("highlight")?;
    let date = fields.date("date")?;
    let video = fields.optional_string("video")?;

    Ok(TalkMetadata {
        title,
        pdf,
        description,
        highlight,
        date,
        video,
    })
}

/// Typed accessors over the `talk:` mapping.
struct Fields<'a> {
    talk: &'a Mapping,
    talk_dir: &'a Path,
}

impl Fields<'_> {
    fn required(&self, field: &'static str) -> Result<&Value, MetadataError> {
        match self.talk.get(field) {
            None | Some(Value::Null) => Err(MetadataError::MissingField {
                talk_dir: self.talk_dir.to_path_buf(),
                field,
            }),
            Some(v) => Ok(v),
        }
    }

    fn invalid(&self, field: &'static str, detail: String) -> MetadataError {
        MetadataError::InvalidField {
            talk_dir: self.talk_dir.to_path_buf(),
            field,
            detail,
        }
    }

    fn string(&self, field: &'static str) -> Result<String, MetadataError> {
        match self.required(field)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.invalid(field, format!("expected a string, got {}", kind(other)))),
        }
    }

    fn optional_string(&self, field: &'static str) -> Result<Option<String>, MetadataError> {
        match self.talk.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(other) => {
                Err(self.invalid(field, format!("expected a string, got {}", kind(other))))
            }
        }
    }

    fn relative_path(&self, field: &'static str) -> Result<PathBuf, MetadataError> {
        let raw = self.string(field)?;
        let path = PathBuf::from(raw.trim());
        if path.as_os_str().is_empty() {
            return Err(self.invalid(field, "must not be empty".into()));
        }
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(self.invalid(
                field,
                format!("'{raw}' must be a relative path inside the talk directory"),
            ));
        }
        Ok(path)
    }

    fn positive_int(&self, field: &'static str) -> Result<u32, MetadataError> {
        let value = self.required(field)?;
        value
            .as_u64()
            .filter(|n| *n > 0)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                self.invalid(
                    field,
                    format!("expected a positive integer, got {}", render(value)),
                )
            })
    }

    fn date(&self, field: &'static str) -> Result<NaiveDate, MetadataError> {
        let value = self.required(field)?;
        let text = value.as_str().ok_or_else(|| {
            self.invalid(field, format!("expected an ISO date, got {}", kind(value)))
        })?;
        NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|e| {
            self.invalid(field, format!("'{text}' is not a YYYY-MM-DD date: {e}"))
        })
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        Value::Number(n) => n.to_string(),
        other => kind(other).to_string(),
    }
}
