//! Landing page: every published talk, newest first, grouped by year.
//!
//! Talks are ordered by date descending; talks on the same date keep
//! discovery order (ascending directory name). The page also carries
//! sharing metadata (`og:` / `twitter:` tags) taken from the site
//! configuration or, failing that, from the most recent talk.

use crate::config::{BuildConfig, SiteInfo};
use crate::error::TalkdeckError;
use crate::manifest::write_atomic;
use crate::metadata::TalkMetadata;
use crate::pipeline::template::{escape_html, keys, Templates};
use crate::talk::{TalkBuild, SLIDESHOW_FILE};
use chrono::Datelike;
use pulldown_cmark::{html, Event, Options, Parser, TagEnd};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Landing page file name at the output root.
pub const LANDING_FILE: &str = "index.html";

/// Stylesheet file name at the output root.
pub const STYLESHEET_FILE: &str = "style.css";

/// A talk with complete output, ready to be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedTalk {
    pub handle: String,
    pub metadata: TalkMetadata,
    /// File name of the highlight slide inside the talk's output directory.
    pub preview: String,
    /// Position in discovery order, used to break date ties.
    pub discovery_index: usize,
}

impl PublishedTalk {
    /// Pair validated metadata with a finished build.
    ///
    /// Fails when the highlight slide is not among the built slides.
    pub fn new(
        handle: impl Into<String>,
        metadata: TalkMetadata,
        build: &TalkBuild,
        discovery_index: usize,
    ) -> Result<Self, TalkdeckError> {
        let preview = build
            .slide(metadata.highlight)
            .map(|s| s.file_name())
            .ok_or_else(|| TalkdeckError::HighlightOutOfRange {
                talk_dir: build.output_dir.clone(),
                highlight: metadata.highlight,
                total: build.slides.len(),
            })?;
        Ok(Self {
            handle: handle.into(),
            metadata,
            preview,
            discovery_index,
        })
    }

    /// Relative URL of `file` (a `/`-separated path) inside this talk's
    /// output directory.
    fn href(&self, file: &str) -> String {
        std::iter::once(self.handle.as_str())
            .chain(file.split('/'))
            .map(encode_path_segment)
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Percent-encode one URL path segment.
///
/// Unreserved characters pass through; every other byte of the UTF-8
/// encoding becomes `%XX`, so `#`, `?` and spaces in directory names keep
/// links intact.
fn encode_path_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Sort for display: newest first, then discovery order.
pub fn order_talks(talks: &mut [PublishedTalk]) {
    talks.sort_by(|a, b| {
        b.metadata
            .date
            .cmp(&a.metadata.date)
            .then(a.discovery_index.cmp(&b.discovery_index))
    });
}

/// Split ordered talks into `(year, talks)` runs, newest year first.
pub fn group_by_year(talks: &[PublishedTalk]) -> Vec<(i32, Vec<&PublishedTalk>)> {
    let mut groups: Vec<(i32, Vec<&PublishedTalk>)> = Vec::new();
    for talk in talks {
        let year = talk.metadata.date.year();
        match groups.last_mut() {
            Some((y, members)) if *y == year => members.push(talk),
            _ => groups.push((year, vec![talk])),
        }
    }
    groups
}

/// Render a markdown description for inline use.
///
/// A description that renders to a single paragraph loses its `<p>`
/// wrapper, since it is placed inside the entry's own paragraph.
pub fn markdown_to_html(text: &str) -> String {
    let mut out = String::new();
    html::push_html(&mut out, Parser::new_ext(text, markdown_options()));
    let trimmed = out.trim();
    match trimmed
        .strip_prefix("<p>")
        .and_then(|s| s.strip_suffix("</p>"))
    {
        Some(inner) if !inner.contains("<p>") => inner.to_string(),
        _ => trimmed.to_string(),
    }
}

/// The description's text content on one line, for meta tags.
pub fn markdown_to_plain_text(text: &str) -> String {
    let mut plain = String::new();
    for event in Parser::new_ext(text, markdown_options()) {
        match event {
            Event::Text(t) | Event::Code(t) => plain.push_str(&t),
            Event::SoftBreak
            | Event::HardBreak
            | Event::End(TagEnd::Paragraph | TagEnd::Item | TagEnd::Heading(_) | TagEnd::CodeBlock) => {
                plain.push(' ')
            }
            _ => {}
        }
    }
    plain.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn markdown_options() -> Options {
    Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES
}

/// The `<ol>` listing every talk with a heading item per year.
pub fn render_talk_list(talks: &[PublishedTalk]) -> String {
    let mut items = Vec::new();
    for (year, members) in group_by_year(talks) {
        items.push(format!("            <li class=\"year-heading\">{year}</li>"));
        for talk in members {
            items.push(render_entry(talk));
        }
    }
    format!("        <ol type=\"1\">\n{}\n        </ol>", items.join("\n"))
}

fn render_entry(talk: &PublishedTalk) -> String {
    let m = &talk.metadata;
    let slideshow = escape_html(&talk.href(SLIDESHOW_FILE));
    let title = escape_html(&m.title);

    let mut links = format!(
        "<a href=\"{}\">PDF</a>",
        escape_html(&talk.href(&m.pdf_href()))
    );
    if let Some(ref video) = m.video {
        links.push_str(&format!(", <a href=\"{}\">Video</a>", escape_html(video)));
    }

    format!(
        r#"            <li class="talk-entry">
                <a href="{slideshow}">{title}</a>  ({links})
                <span class="talk-date">{date}</span>
                <p class="talk-desc">
                    {description}
                </p>
                <figure>
                    <a href="{slideshow}" class="img-link"><img src="{preview}" alt="{title}"></a>
                </figure>
            </li>"#,
        date = m.date.format("%B %-d, %Y"),
        description = markdown_to_html(&m.description),
        preview = escape_html(&talk.href(&talk.preview)),
    )
}

/// Page-level sharing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareMetadata {
    pub title: String,
    pub description: String,
    /// Preview image URL; absolute when a base URL is configured.
    pub image: Option<String>,
}

impl ShareMetadata {
    /// Configured values win; otherwise use the most recent talk, and for
    /// the image, the hero as a last resort.
    ///
    /// `talks` must already be in display order.
    pub fn derive(site: &SiteInfo, talks: &[PublishedTalk], hero_file: Option<&str>) -> Self {
        let latest = talks.first();
        let description = site
            .description
            .clone()
            .or_else(|| latest.map(|t| markdown_to_plain_text(&t.metadata.description)))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| site.title.clone());
        let image = site
            .share_image
            .clone()
            .or_else(|| latest.map(|t| t.href(&t.preview)))
            .or_else(|| hero_file.map(str::to_string))
            .map(|img| absolute_url(site.base_url.as_deref(), &img));
        Self {
            title: site.title.clone(),
            description,
            image,
        }
    }
}

fn absolute_url(base: Option<&str>, path: &str) -> String {
    match base {
        Some(base) if !path.starts_with("http://") && !path.starts_with("https://") => {
            format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
        }
        _ => path.to_string(),
    }
}

/// What [`write_landing_page`] produced.
#[derive(Debug, Clone, Serialize)]
pub struct LandingPage {
    pub path: PathBuf,
    /// Handles listed, in display order.
    pub listed: Vec<String>,
    pub share: ShareMetadata,
}

/// Write the landing page, its stylesheet and the hero image to `output_root`.
///
/// `talks` may be in any order; they are sorted here.
pub fn write_landing_page(
    output_root: &Path,
    templates: &Templates,
    mut talks: Vec<PublishedTalk>,
    config: &BuildConfig,
) -> Result<LandingPage, TalkdeckError> {
    std::fs::create_dir_all(output_root).map_err(|e| TalkdeckError::write(output_root, e))?;
    order_talks(&mut talks);

    let hero_file = publish_hero(output_root, config.hero_image.as_deref())?;
    let share = ShareMetadata::derive(&config.site, &talks, hero_file.as_deref());

    let mut values: HashMap<&str, String> = HashMap::new();
    values.insert(keys::PAGE_TITLE, escape_html(&share.title));
    values.insert(keys::PAGE_DESCRIPTION, escape_html(&share.description));
    values.insert(
        keys::PREVIEW_IMAGE,
        share.image.as_deref().map(escape_html).unwrap_or_default(),
    );
    values.insert(keys::TALKS, render_talk_list(&talks));
    if let Some(ref hero) = hero_file {
        values.insert(
            keys::HERO,
            format!("      <img class=\"hero\" src=\"{}\" alt=\"\">", escape_html(hero)),
        );
    }
    values.insert(
        keys::LAST_UPDATED,
        config.effective_build_date().format("%a %b %d %Y").to_string(),
    );

    let html = templates.landing.render(&values)?;
    let path = output_root.join(LANDING_FILE);
    write_atomic(&path, html.as_bytes())?;
    write_atomic(&output_root.join(STYLESHEET_FILE), &templates.stylesheet)?;

    let listed: Vec<String> = talks.iter().map(|t| t.handle.clone()).collect();
    info!(
        "Landing page written to {} ({} talks)",
        path.display(),
        listed.len()
    );
    Ok(LandingPage {
        path,
        listed,
        share,
    })
}

/// Copy the hero image next to the landing page; returns its file name.
fn publish_hero(output_root: &Path, hero: Option<&Path>) -> Result<Option<String>, TalkdeckError> {
    let Some(hero) = hero else {
        return Ok(None);
    };
    let Some(name) = hero.file_name() else {
        warn!("Hero image path {} has no file name, skipping", hero.display());
        return Ok(None);
    };
    if !hero.is_file() {
        warn!("Hero image {} not found, skipping", hero.display());
        return Ok(None);
    }
    let target = output_root.join(name);
    let same = matches!(
        (hero.canonicalize(), target.canonicalize()),
        (Ok(a), Ok(b)) if a == b
    );
    if !same {
        std::fs::copy(hero, &target).map_err(|e| TalkdeckError::write(&target, e))?;
        debug!("Copied hero image to {}", target.display());
    }
    Ok(Some(name.to_string_lossy().into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn talk(handle: &str, date: (i32, u32, u32), index: usize) -> PublishedTalk {
        PublishedTalk {
            handle: handle.to_string(),
            metadata: TalkMetadata {
                title: format!("Talk {handle}"),
                pdf: PathBuf::from("slides.pdf"),
                description: format!("About *{handle}*."),
                highlight: 1,
                date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
                video: None,
            },
            preview: "slide-01.png".to_string(),
            discovery_index: index,
        }
    }

    #[test]
    fn talks_are_newest_first_and_grouped_by_year() {
        let mut talks = vec![
            talk("winter", (2024, 12, 20), 0),
            talk("spring", (2025, 3, 1), 1),
            talk("january", (2025, 1, 10), 2),
        ];
        order_talks(&mut talks);
        let handles: Vec<_> = talks.iter().map(|t| t.handle.as_str()).collect();
        assert_eq!(handles, ["spring", "january", "winter"]);

        let groups = group_by_year(&talks);
        let years: Vec<i32> = groups.iter().map(|(y, _)| *y).collect();
        assert_eq!(years, [2025, 2024]);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn same_date_keeps_discovery_order() {
        let mut talks = vec![
            talk("b-second", (2025, 5, 5), 1),
            talk("a-first", (2025, 5, 5), 0),
        ];
        order_talks(&mut talks);
        assert_eq!(talks[0].handle, "a-first");
    }

    #[test]
    fn single_paragraph_loses_its_wrapper() {
        assert_eq!(
            markdown_to_html("Hello **world**"),
            "Hello <strong>world</strong>"
        );
        let two = markdown_to_html("One.\n\nTwo.");
        assert!(two.starts_with("<p>One.</p>"), "{two}");
        assert!(two.ends_with("<p>Two.</p>"), "{two}");
    }

    #[test]
    fn plain_text_flattens_markup() {
        assert_eq!(
            markdown_to_plain_text("Fast *and* `safe`\ncode.\n\n- one\n- two"),
            "Fast and safe code. one two"
        );
    }

    #[test]
    fn entry_links_slideshow_pdf_video_and_preview() {
        let mut t = talk("rustconf", (2025, 9, 2), 0);
        t.metadata.video = Some("https://youtu.be/x".into());
        t.preview = "slide-07.png".into();
        let html = render_talk_list(&[t]);

        assert!(html.contains(r#"<li class="year-heading">2025</li>"#));
        assert!(html.contains(r#"<a href="rustconf/index.html">Talk rustconf</a>"#));
        assert!(html.contains(r#"<a href="rustconf/slides.pdf">PDF</a>"#));
        assert!(html.contains(r#", <a href="https://youtu.be/x">Video</a>"#));
        assert!(html.contains(r#"<img src="rustconf/slide-07.png""#));
        assert!(html.contains("About <em>rustconf</em>."));
        assert!(html.contains("September 2, 2025"));
    }

    #[test]
    fn link_paths_are_percent_encoded() {
        let mut t = talk("Q&A #1?", (2025, 9, 2), 0);
        t.metadata.pdf = PathBuf::from("deck files/final é.pdf");
        let html = render_talk_list(&[t]);

        assert!(html.contains(r#"<a href="Q%26A%20%231%3F/index.html">"#), "{html}");
        assert!(html.contains(r#"href="Q%26A%20%231%3F/deck%20files/final%20%C3%A9.pdf""#), "{html}");
        assert!(html.contains(r#"src="Q%26A%20%231%3F/slide-01.png""#), "{html}");
    }

    #[test]
    fn share_metadata_prefers_configuration() {
        let talks = vec![talk("latest", (2025, 3, 1), 0)];
        let site = SiteInfo {
            title: "My Talks".into(),
            description: Some("Fixed".into()),
            base_url: Some("https://talks.example/".into()),
            share_image: Some("card.png".into()),
        };
        let share = ShareMetadata::derive(&site, &talks, None);
        assert_eq!(share.description, "Fixed");
        assert_eq!(share.image.as_deref(), Some("https://talks.example/card.png"));
    }

    #[test]
    fn share_metadata_falls_back_to_latest_talk_then_hero() {
        let talks = vec![talk("latest", (2025, 3, 1), 0)];
        let share = ShareMetadata::derive(&SiteInfo::default(), &talks, Some("hero.jpg"));
        assert_eq!(share.description, "About latest.");
        assert_eq!(share.image.as_deref(), Some("latest/slide-01.png"));

        let empty = ShareMetadata::derive(&SiteInfo::default(), &[], Some("hero.jpg"));
        assert_eq!(empty.description, "Talks");
        assert_eq!(empty.image.as_deref(), Some("hero.jpg"));
    }

    #[test]
    fn landing_page_is_written_with_assets() {
        let tmp = TempDir::new().unwrap();
        let hero = tmp.path().join("hero.jpg");
        std::fs::write(&hero, b"jpeg").unwrap();
        let out = tmp.path().join("public");

        let config = BuildConfig::builder()
            .hero_image(&hero)
            .build_date(NaiveDate::from_ymd_opt(2025, 3, 4).unwrap())
            .build()
            .unwrap();
        let templates = Templates::load(&config).unwrap();
        let talks = vec![talk("old", (2024, 1, 1), 0), talk("new", (2025, 1, 1), 1)];

        let page = write_landing_page(&out, &templates, talks, &config).unwrap();
        assert_eq!(page.listed, ["new", "old"]);

        let html = std::fs::read_to_string(out.join(LANDING_FILE)).unwrap();
        assert!(html.contains("Last updated: Tue Mar 04 2025"), "{html}");
        assert!(html.contains(r#"<img class="hero" src="hero.jpg""#));
        assert!(html.find("Talk new").unwrap() < html.find("Talk old").unwrap());
        assert!(!html.contains("{{"), "unrendered placeholder in {html}");
        assert!(out.join(STYLESHEET_FILE).is_file());
        assert_eq!(std::fs::read(out.join("hero.jpg")).unwrap(), b"jpeg");
    }

    #[test]
    fn missing_hero_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let config = BuildConfig::builder()
            .hero_image(tmp.path().join("absent.png"))
            .build()
            .unwrap();
        let templates = Templates::load(&config).unwrap();
        write_landing_page(tmp.path(), &templates, Vec::new(), &config).unwrap();
        let html = std::fs::read_to_string(tmp.path().join(LANDING_FILE)).unwrap();
        assert!(!html.contains("class=\"hero\""));
    }
}
