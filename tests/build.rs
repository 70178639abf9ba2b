//! Integration tests for talk and site builds.
//!
//! External tools are replaced by in-process fakes injected through
//! `BuildConfig`, so these tests run anywhere. A fake PDF is a text file
//! ending in `pages=N`; the fake rasterizer writes N images for it.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use talkdeck::{
    build_site, build_site_sync, build_talk, BuildConfig, BuildProgressCallback, BuildStage,
    CompressionLevel, CompressionState, ImageCompressor, PageRasterizer, TalkState,
    TalkdeckError, ToolError,
};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Writes one `p<N>.png` per page, unpadded, like a naive rasterizer.
#[derive(Default)]
struct FakeRasterizer {
    calls: AtomicUsize,
}

impl PageRasterizer for FakeRasterizer {
    fn name(&self) -> &str {
        "fake-raster"
    }

    fn rasterize(&self, pdf: &Path, staging: &Path, _dpi: u32) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = std::fs::read_to_string(pdf).map_err(|e| ToolError::Unreadable {
            input: pdf.to_path_buf(),
            detail: e.to_string(),
        })?;
        let pages: u32 = text
            .trim()
            .rsplit('=')
            .next()
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| ToolError::Failed {
                tool: "fake-raster".into(),
                input: pdf.to_path_buf(),
                status: "exit status: 1".into(),
                stderr: "not a fake PDF".into(),
            })?;
        for n in 1..=pages {
            std::fs::write(staging.join(format!("p{n}.png")), format!("page {n}")).unwrap();
        }
        Ok(())
    }
}

/// Appends a marker so compressed images are recognisable.
struct FakeCompressor;

impl ImageCompressor for FakeCompressor {
    fn name(&self) -> &str {
        "fake-quant"
    }

    fn compress(
        &self,
        image: &Path,
        _level: CompressionLevel,
    ) -> Result<CompressionState, ToolError> {
        let mut bytes = std::fs::read(image).unwrap();
        bytes.extend_from_slice(b" [q]");
        std::fs::write(image, bytes).unwrap();
        Ok(CompressionState::Compressed)
    }
}

fn config(rasterizer: Arc<FakeRasterizer>, force: bool) -> BuildConfig {
    BuildConfig::builder()
        .rasterizer(rasterizer)
        .compressor(Arc::new(FakeCompressor))
        .force(force)
        .build_date(NaiveDate::from_ymd_opt(2025, 3, 4).unwrap())
        .build()
        .unwrap()
}

fn write_pdf(path: &Path, pages: u32) {
    std::fs::write(path, format!("%PDF-fake pages={pages}")).unwrap();
}

/// Create `root/handle` with a metadata record and a PDF.
fn add_talk(root: &Path, handle: &str, date: &str, pages: u32, highlight: Option<u32>) {
    let dir = root.join(handle);
    std::fs::create_dir_all(&dir).unwrap();
    write_pdf(&dir.join("slides.pdf"), pages);
    let highlight = highlight
        .map(|h| format!("  highlight: {h}\n"))
        .unwrap_or_default();
    std::fs::write(
        dir.join("metadata.yml"),
        format!(
            "talk:\n  title: \"Talk {handle}\"\n  pdf: slides.pdf\n  description: \"About *{handle}*\"\n{highlight}  date: {date}\n"
        ),
    )
    .unwrap();
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn slide_names(dir: &Path) -> Vec<String> {
    file_names(dir)
        .into_iter()
        .filter(|n| n.starts_with("slide-"))
        .collect()
}

/// Every regular file under `dir`, with its bytes.
fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(d) = stack.pop() {
        for entry in std::fs::read_dir(&d).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push((path.clone(), std::fs::read(&path).unwrap()));
            }
        }
    }
    out.sort();
    out
}

// ── Single talk ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_slide_count_equals_page_count() {
    let tmp = TempDir::new().unwrap();
    let pdf = tmp.path().join("deck.pdf");
    write_pdf(&pdf, 12);

    let cfg = config(Arc::new(FakeRasterizer::default()), false);
    let build = build_talk(&pdf, None, None, &cfg).await.unwrap();

    assert_eq!(build.state, TalkState::Built);
    assert_eq!(build.slides.len(), 12);
    assert_eq!(slide_names(tmp.path()).len(), 12);
}

#[tokio::test]
async fn test_lexical_order_is_page_order() {
    let tmp = TempDir::new().unwrap();
    let pdf = tmp.path().join("deck.pdf");
    write_pdf(&pdf, 11);
    let out = tmp.path().join("out");

    let cfg = config(Arc::new(FakeRasterizer::default()), false);
    build_talk(&pdf, Some(&out), None, &cfg).await.unwrap();

    let names = slide_names(&out);
    for (i, name) in names.iter().enumerate() {
        let content = std::fs::read_to_string(out.join(name)).unwrap();
        assert_eq!(content, format!("page {} [q]", i + 1), "{name}");
    }

    // The slideshow references the images in the same order, by name only.
    let html = std::fs::read_to_string(out.join("index.html")).unwrap();
    let positions: Vec<usize> = names.iter().map(|n| html.find(n.as_str()).unwrap()).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(!html.contains(out.to_str().unwrap()));
}

#[tokio::test]
async fn test_second_unforced_build_is_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let pdf = tmp.path().join("deck.pdf");
    write_pdf(&pdf, 3);
    let out = tmp.path().join("out");
    let rasterizer = Arc::new(FakeRasterizer::default());
    let cfg = config(rasterizer.clone(), false);

    build_talk(&pdf, Some(&out), Some("Deck"), &cfg).await.unwrap();
    let before = snapshot(&out);

    let second = build_talk(&pdf, Some(&out), Some("Deck"), &cfg).await.unwrap();
    assert_eq!(second.state, TalkState::Skipped);
    assert_eq!(snapshot(&out), before);
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_force_leaves_no_stale_slides() {
    let tmp = TempDir::new().unwrap();
    let pdf = tmp.path().join("deck.pdf");
    let out = tmp.path().join("out");
    let rasterizer = Arc::new(FakeRasterizer::default());

    write_pdf(&pdf, 12);
    build_talk(&pdf, Some(&out), None, &config(rasterizer.clone(), false))
        .await
        .unwrap();
    assert_eq!(slide_names(&out).len(), 12);

    write_pdf(&pdf, 4);
    let build = build_talk(&pdf, Some(&out), None, &config(rasterizer, true))
        .await
        .unwrap();
    assert_eq!(build.slides.len(), 4);
    assert_eq!(
        slide_names(&out),
        ["slide-01.png", "slide-02.png", "slide-03.png", "slide-04.png"]
    );
    let html = std::fs::read_to_string(out.join("index.html")).unwrap();
    assert_eq!(html.matches("<section").count(), 4);
    assert!(!html.contains("slide-05.png"));
}

#[tokio::test]
async fn test_title_substituted_once_or_default_kept() {
    let tmp = TempDir::new().unwrap();
    let pdf = tmp.path().join("deck.pdf");
    write_pdf(&pdf, 1);
    let cfg = config(Arc::new(FakeRasterizer::default()), true);

    let plain = tmp.path().join("plain");
    build_talk(&pdf, Some(&plain), None, &cfg).await.unwrap();
    let html = std::fs::read_to_string(plain.join("index.html")).unwrap();
    assert!(html.contains("<title>Slides</title>"), "{html}");

    let titled = tmp.path().join("titled");
    build_talk(&pdf, Some(&titled), Some("Fearless <Concurrency>"), &cfg)
        .await
        .unwrap();
    let html = std::fs::read_to_string(titled.join("index.html")).unwrap();
    assert!(html.contains("<title>Fearless &lt;Concurrency&gt;</title>"));
    assert_eq!(html.matches("Fearless").count(), 1);
}

#[tokio::test]
async fn test_missing_pdf_is_an_extraction_failure() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(Arc::new(FakeRasterizer::default()), false);
    let err = build_talk(tmp.path().join("absent.pdf"), None, None, &cfg)
        .await
        .unwrap_err();
    match err {
        TalkdeckError::ExtractionFailed { pdf, source } => {
            assert!(pdf.ends_with("absent.pdf"));
            assert!(matches!(source, ToolError::Unreadable { .. }), "{source:?}");
        }
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rasterizer_failure_names_the_pdf() {
    let tmp = TempDir::new().unwrap();
    let pdf = tmp.path().join("broken.pdf");
    std::fs::write(&pdf, "garbage").unwrap();
    let cfg = config(Arc::new(FakeRasterizer::default()), false);

    let err = build_talk(&pdf, None, None, &cfg).await.unwrap_err();
    match err {
        TalkdeckError::ExtractionFailed { pdf: p, source } => {
            assert_eq!(p, pdf);
            assert!(source.to_string().contains("fake-raster"));
        }
        other => panic!("expected ExtractionFailed, got {other:?}"),
    }
}

// ── Site ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_landing_page_orders_and_groups_by_year() {
    let tmp = TempDir::new().unwrap();
    let talks = tmp.path().join("talks");
    let public = tmp.path().join("public");
    add_talk(&talks, "a-winter", "2024-12-20", 3, Some(1));
    add_talk(&talks, "b-spring", "2025-03-01", 3, Some(2));
    add_talk(&talks, "c-january", "2025-01-10", 3, Some(3));

    let cfg = config(Arc::new(FakeRasterizer::default()), false);
    let report = build_site(&talks, &public, &cfg).await.unwrap();

    assert!(report.is_success(), "{}", report.summary());
    assert_eq!(report.built, ["a-winter", "b-spring", "c-january"]);
    assert_eq!(report.listed, ["b-spring", "c-january", "a-winter"]);

    let html = std::fs::read_to_string(public.join("index.html")).unwrap();
    let pos = |needle: &str| html.find(needle).unwrap_or_else(|| panic!("{needle} in {html}"));
    assert!(pos("2025</li>") < pos("Talk b-spring"));
    assert!(pos("Talk b-spring") < pos("Talk c-january"));
    assert!(pos("Talk c-january") < pos("2024</li>"));
    assert!(pos("2024</li>") < pos("Talk a-winter"));

    assert!(html.contains(r#"<img src="b-spring/slide-02.png""#));
    assert!(html.contains(r#"<a href="c-january/slides.pdf">PDF</a>"#));
    assert!(html.contains("About <em>a-winter</em>"));
    assert!(html.contains(r#"content="b-spring/slide-02.png""#), "og:image");
    assert!(html.contains("Last updated: Tue Mar 04 2025"));

    assert!(public.join("style.css").is_file());
    assert!(public.join("b-spring/slides.pdf").is_file());
    assert!(public.join("b-spring/index.html").is_file());
}

#[tokio::test]
async fn test_missing_highlight_fails_only_that_talk() {
    let tmp = TempDir::new().unwrap();
    let talks = tmp.path().join("talks");
    let public = tmp.path().join("public");
    add_talk(&talks, "good", "2025-01-01", 2, Some(1));
    add_talk(&talks, "no-highlight", "2025-02-01", 2, None);

    let cfg = config(Arc::new(FakeRasterizer::default()), false);
    let report = build_site(&talks, &public, &cfg).await.unwrap();

    assert_eq!(report.built, ["good"]);
    assert_eq!(report.failed.len(), 1);
    let failure = &report.failed[0];
    assert_eq!(failure.talk, "no-highlight");
    assert_eq!(failure.stage, BuildStage::Validating);
    assert!(failure.message.contains("highlight"), "{}", failure.message);

    let html = std::fs::read_to_string(public.join("index.html")).unwrap();
    assert!(html.contains("Talk good"));
    assert!(!html.contains("Talk no-highlight"));
    assert!(!public.join("no-highlight").exists());
}

#[tokio::test]
async fn test_highlight_past_page_count_fails_only_that_talk() {
    let tmp = TempDir::new().unwrap();
    let talks = tmp.path().join("talks");
    let public = tmp.path().join("public");
    add_talk(&talks, "fine", "2025-01-01", 5, Some(5));
    add_talk(&talks, "too-far", "2025-02-01", 3, Some(9));

    let cfg = config(Arc::new(FakeRasterizer::default()), false);
    let report = build_site(&talks, &public, &cfg).await.unwrap();

    assert_eq!(report.built, ["fine"]);
    assert_eq!(report.listed, ["fine"]);
    assert_eq!(report.failed[0].talk, "too-far");
    assert_eq!(report.failed[0].stage, BuildStage::Validating);
    assert!(report.failed[0].message.contains("out of range"));
}

#[tokio::test]
async fn test_second_site_build_skips_current_talks() {
    let tmp = TempDir::new().unwrap();
    let talks = tmp.path().join("talks");
    let public = tmp.path().join("public");
    add_talk(&talks, "one", "2025-01-01", 2, Some(1));
    add_talk(&talks, "two", "2025-01-02", 2, Some(2));
    let rasterizer = Arc::new(FakeRasterizer::default());
    let cfg = config(rasterizer.clone(), false);

    build_site(&talks, &public, &cfg).await.unwrap();
    let before = snapshot(&public);

    let report = build_site(&talks, &public, &cfg).await.unwrap();
    assert!(report.built.is_empty());
    assert_eq!(report.skipped, ["one", "two"]);
    assert_eq!(report.listed, ["two", "one"]);
    assert_eq!(snapshot(&public), before);
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_talks_root_still_writes_landing_page() {
    let tmp = TempDir::new().unwrap();
    let talks = tmp.path().join("talks");
    std::fs::create_dir_all(talks.join(".git")).unwrap();
    let public = tmp.path().join("public");

    let cfg = config(Arc::new(FakeRasterizer::default()), false);
    let report = build_site(&talks, &public, &cfg).await.unwrap();
    assert!(report.listed.is_empty());
    assert!(public.join("index.html").is_file());
    assert!(report.summary().contains("No talks found"));
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl BuildProgressCallback for RecordingCallback {
    fn on_batch_start(&self, total_talks: usize) {
        self.events.lock().unwrap().push(format!("start {total_talks}"));
    }

    fn on_talk_built(&self, talk: &str, slides: usize) {
        self.events.lock().unwrap().push(format!("built {talk} {slides}"));
    }

    fn on_talk_error(&self, talk: &str, stage: BuildStage, _error: &str) {
        self.events.lock().unwrap().push(format!("error {talk} {stage}"));
    }

    fn on_batch_complete(&self, built: usize, skipped: usize, failed: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {built}/{skipped}/{failed}"));
    }
}

#[test]
fn test_progress_events_with_sync_entry_point() {
    let tmp = TempDir::new().unwrap();
    let talks = tmp.path().join("talks");
    add_talk(&talks, "ok", "2025-01-01", 2, Some(1));
    add_talk(&talks, "bad", "2025-01-02", 2, None);

    let recorder = Arc::new(RecordingCallback::default());
    let cfg = BuildConfig::builder()
        .rasterizer(Arc::new(FakeRasterizer::default()))
        .compressor(Arc::new(FakeCompressor))
        .concurrency(1)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    build_site_sync(&talks, tmp.path().join("public"), &cfg).unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("start 2"));
    assert!(events.contains(&"built ok 2".to_string()), "{events:?}");
    assert!(events.contains(&"error bad validating".to_string()), "{events:?}");
    assert_eq!(events.last().map(String::as_str), Some("done 1/0/1"));
}

#[test]
fn test_invalid_template_fails_before_any_talk() {
    let tmp = TempDir::new().unwrap();
    let talks = tmp.path().join("talks");
    add_talk(&talks, "ok", "2025-01-01", 2, Some(1));
    let template = tmp.path().join("broken.html");
    std::fs::write(&template, "<html>{{title}}</html>").unwrap();

    let rasterizer = Arc::new(FakeRasterizer::default());
    let cfg = BuildConfig::builder()
        .rasterizer(rasterizer.clone())
        .compressor(Arc::new(FakeCompressor))
        .slideshow_template(&template)
        .build()
        .unwrap();

    let err = tokio_test::block_on(build_site(&talks, tmp.path().join("public"), &cfg)).unwrap_err();
    assert!(matches!(err, TalkdeckError::Template { .. }), "{err:?}");
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 0);
}
