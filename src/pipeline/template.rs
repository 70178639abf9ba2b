//! Named-placeholder templates for the slideshow and the landing page.
//!
//! A placeholder is `{{name}}` or `{{name:default text}}`. Placeholders are
//! found by name, never by line number, so a template can be reformatted
//! freely. Each template declares which placeholders it must contain, and
//! [`Templates::load`] rejects a template that lacks one (or repeats one
//! that must be unique) before any talk is built.
//!
//! Values are inserted verbatim; callers escape text with [`escape_html`].

use crate::config::BuildConfig;
use crate::error::TalkdeckError;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

const BUILTIN_SLIDESHOW: &str = include_str!("../../templates/slideshow.html");
const BUILTIN_LANDING: &str = include_str!("../../templates/landing.html");
const BUILTIN_STYLESHEET: &str = include_str!("../../templates/style.css");

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([a-z][a-z0-9_]*)\s*(?::([^}]*))?\}\}").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
struct Placeholder {
    span: Range<usize>,
    key: String,
    default: Option<String>,
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    source: String,
    placeholders: Vec<Placeholder>,
}

impl Template {
    /// Parse `source`. `name` is only used in error messages.
    pub fn parse(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let placeholders = RE_PLACEHOLDER
            .captures_iter(&source)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some(Placeholder {
                    span: whole.range(),
                    key: caps[1].to_string(),
                    default: caps.get(2).map(|d| d.as_str().trim().to_string()),
                })
            })
            .collect();
        Self {
            name: name.into(),
            source,
            placeholders,
        }
    }

    /// Read and parse a template file.
    pub fn from_file(path: &Path) -> Result<Self, TalkdeckError> {
        let source =
            std::fs::read_to_string(path).map_err(|e| TalkdeckError::io(path, e))?;
        Ok(Self::parse(path.display().to_string(), source))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// How many times `key` appears.
    pub fn count(&self, key: &str) -> usize {
        self.placeholders.iter().filter(|p| p.key == key).count()
    }

    /// The default text of the first `key` placeholder, if it has one.
    pub fn default_for(&self, key: &str) -> Option<&str> {
        self.placeholders
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.default.as_deref())
    }

    /// Require `key` to appear at least once.
    pub fn require(&self, key: &str) -> Result<(), TalkdeckError> {
        if self.count(key) == 0 {
            return Err(self.invalid(format!("missing placeholder {{{{{key}}}}}")));
        }
        Ok(())
    }

    /// Require `key` to appear exactly once.
    pub fn require_unique(&self, key: &str) -> Result<(), TalkdeckError> {
        match self.count(key) {
            1 => Ok(()),
            0 => Err(self.invalid(format!("missing placeholder {{{{{key}}}}}"))),
            n => Err(self.invalid(format!(
                "placeholder {{{{{key}}}}} must appear exactly once, found {n}"
            ))),
        }
    }

    /// Substitute every placeholder.
    ///
    /// A placeholder without a value falls back to its default; one with
    /// neither is an error.
    pub fn render(&self, values: &HashMap<&str, String>) -> Result<String, TalkdeckError> {
        let mut out = String::with_capacity(self.source.len() + 1024);
        let mut cursor = 0;
        for p in &self.placeholders {
            out.push_str(&self.source[cursor..p.span.start]);
            let value = values
                .get(p.key.as_str())
                .map(String::as_str)
                .or(p.default.as_deref())
                .ok_or_else(|| self.invalid(format!("no value for placeholder {{{{{}}}}}", p.key)))?;
            out.push_str(value);
            cursor = p.span.end;
        }
        out.push_str(&self.source[cursor..]);
        Ok(out)
    }

    /// SHA-256 of the template source, for the build manifest.
    pub fn fingerprint(&self) -> String {
        format!("{:x}", Sha256::digest(self.source.as_bytes()))
    }

    fn invalid(&self, detail: String) -> TalkdeckError {
        TalkdeckError::Template {
            name: self.name.clone(),
            detail,
        }
    }
}

/// Placeholder keys shared between the templates and the renderers.
pub mod keys {
    pub const TITLE: &str = "title";
    pub const SLIDES: &str = "slides";

    pub const PAGE_TITLE: &str = "page_title";
    pub const PAGE_DESCRIPTION: &str = "page_description";
    pub const PREVIEW_IMAGE: &str = "preview_image";
    pub const TALKS: &str = "talks";
    pub const HERO: &str = "hero";
    pub const LAST_UPDATED: &str = "last_updated";
}

/// The validated template set for one run.
#[derive(Debug, Clone)]
pub struct Templates {
    pub slideshow: Template,
    pub landing: Template,
    pub stylesheet: Vec<u8>,
}

impl Templates {
    /// Load built-in templates, replacing any that `config` overrides, and
    /// validate the placeholder contract of each.
    pub fn load(config: &BuildConfig) -> Result<Self, TalkdeckError> {
        let slideshow = match config.slideshow_template {
            Some(ref path) => Template::from_file(path)?,
            None => Template::parse("built-in slideshow", BUILTIN_SLIDESHOW),
        };
        let landing = match config.landing_template {
            Some(ref path) => Template::from_file(path)?,
            None => Template::parse("built-in landing page", BUILTIN_LANDING),
        };
        let stylesheet = match config.stylesheet {
            Some(ref path) => std::fs::read(path).map_err(|e| TalkdeckError::io(path, e))?,
            None => BUILTIN_STYLESHEET.as_bytes().to_vec(),
        };

        slideshow.require_unique(keys::TITLE)?;
        slideshow.require_unique(keys::SLIDES)?;

        landing.require_unique(keys::TALKS)?;
        landing.require(keys::PAGE_TITLE)?;
        landing.require(keys::PAGE_DESCRIPTION)?;
        landing.require(keys::PREVIEW_IMAGE)?;

        debug!(
            "Templates loaded: slideshow='{}', landing='{}'",
            slideshow.name(),
            landing.name()
        );
        Ok(Self {
            slideshow,
            landing,
            stylesheet,
        })
    }
}

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
