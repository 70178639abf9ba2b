//! Slideshow assembly: template + ordered slides + optional title → HTML.
//!
//! The output is a pure function of its inputs. Slides are sorted by their
//! ordinal here, whatever order the caller passes them in, and each slide
//! references its image by bare file name so the talk directory can be
//! moved or served from any prefix.

use crate::error::TalkdeckError;
use crate::pipeline::extract::SlideImage;
use crate::pipeline::template::{escape_html, keys, Template};
use std::collections::HashMap;
use tracing::debug;

/// Render the slideshow document.
///
/// With `title = None` the template's own `{{title:default}}` text stays.
/// Zero slides produce a valid document with an empty slide container.
pub fn assemble_slideshow(
    template: &Template,
    slides: &[SlideImage],
    title: Option<&str>,
) -> Result<String, TalkdeckError> {
    let mut ordered: Vec<&SlideImage> = slides.iter().collect();
    ordered.sort_by_key(|s| s.ordinal);

    let sections = ordered
        .iter()
        .map(|s| slide_section(&s.file_name()))
        .collect::<Vec<_>>()
        .join("\n");

    let mut values = HashMap::new();
    values.insert(keys::SLIDES, sections);
    if let Some(title) = title {
        values.insert(keys::TITLE, escape_html(title));
    }

    debug!(
        "Assembling slideshow: {} slides, title override: {}",
        ordered.len(),
        title.is_some()
    );
    template.render(&values)
}

fn slide_section(file_name: &str) -> String {
    format!(
        "        <section data-background-image=\"{}\" data-background-size=\"contain\"></section>",
        escape_html(file_name)
    )
}
