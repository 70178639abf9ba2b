//! CLI binary for talkdeck.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `BuildConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use talkdeck::{
    build_site, build_talk, BatchReport, BuildConfig, BuildProgressCallback, BuildStage,
    CompressionLevel, ProgressCallback, SiteInfo, TalkState, ToolPaths,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar over talks, one log line per finished talk.
/// Talks finish out of order when built concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_batch_start` reports how many talks there are.
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} talks  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Building");
    }
}

impl BuildProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_talks: usize) {
        self.activate_bar(total_talks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Building {total_talks} talks…"))
        ));
    }

    fn on_talk_stage(&self, talk: &str, stage: BuildStage) {
        self.bar.set_message(format!("{talk}: {stage}"));
    }

    fn on_talk_built(&self, talk: &str, slides: usize) {
        self.bar.println(format!(
            "  {} {:<40} {}",
            green("✓"),
            talk,
            dim(&format!("{slides} slides"))
        ));
        self.bar.inc(1);
    }

    fn on_talk_skipped(&self, talk: &str) {
        self.bar
            .println(format!("  {} {:<40} {}", dim("⊘"), talk, dim("up to date")));
        self.bar.inc(1);
    }

    fn on_talk_error(&self, talk: &str, stage: BuildStage, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {:<40} {} {}",
            red("✗"),
            talk,
            dim(&format!("[{stage}]")),
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, built: usize, skipped: usize, failed: usize) {
        self.bar.finish_and_clear();
        let mark = if failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{} {} built, {} skipped, {} failed",
            mark,
            bold(&built.to_string()),
            skipped,
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One slideshow next to the PDF
  talkdeck talk slides.pdf

  # Separate output directory and a custom title
  talkdeck talk slides.pdf -o public/rustconf -t "Zero-copy parsing"

  # A whole site from talks/ into public/
  talkdeck site talks public

  # Rebuild everything, 8 talks at a time, smaller images
  talkdeck site talks public --force -j 8 --compression 4

TALK LAYOUT:
  talks/
    2025-rustconf/
      metadata.yml
      slides.pdf

  metadata.yml:
    talk:
      title: "Zero-copy parsing"
      pdf: slides.pdf
      description: "How we cut **allocation** out of a hot path."
      highlight: 7          # slide used as the preview image
      date: 2025-03-01
      video: https://...    # optional

EXTERNAL TOOLS:
  pdftoppm   poppler-utils   rasterises PDF pages (override: --pdftoppm)
  pngquant   pngquant        compresses slide images (override: --pngquant)

ENVIRONMENT VARIABLES:
  Every option can be set as TALKDECK_<OPTION>, e.g. TALKDECK_DPI=200.
  RUST_LOG overrides the log filter.
"#;

/// Build reveal.js slideshows and a landing page from talk PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "talkdeck",
    version,
    about = "Build reveal.js slideshows and a landing page from talk PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TALKDECK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TALKDECK_QUIET")]
    quiet: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "TALKDECK_NO_PROGRESS")]
    no_progress: bool,

    /// Print the result as JSON on stdout.
    #[arg(long, global = true, env = "TALKDECK_JSON")]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build one slideshow from a PDF.
    Talk {
        /// The PDF to convert.
        pdf: PathBuf,

        /// Output directory. Default: the PDF's directory.
        #[arg(short, long, env = "TALKDECK_OUTPUT")]
        output: Option<PathBuf>,

        /// Slideshow title. Default: the template's title.
        #[arg(short, long, env = "TALKDECK_TITLE")]
        title: Option<String>,

        #[command(flatten)]
        build: BuildArgs,
    },

    /// Build every talk under TALKS_DIR and the landing page.
    Site {
        /// Directory holding one subdirectory per talk.
        talks_dir: PathBuf,

        /// Where the site is written.
        output_dir: PathBuf,

        /// Talks built at the same time.
        #[arg(short = 'j', long, env = "TALKDECK_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,

        /// Landing page title.
        #[arg(long, env = "TALKDECK_SITE_TITLE", default_value = "Talks")]
        site_title: String,

        /// Fixed sharing description. Default: the most recent talk's.
        #[arg(long, env = "TALKDECK_SITE_DESCRIPTION")]
        site_description: Option<String>,

        /// Public site URL, used to make sharing image links absolute.
        #[arg(long, env = "TALKDECK_BASE_URL")]
        base_url: Option<String>,

        /// Fixed sharing image. Default: the most recent talk's highlight.
        #[arg(long, env = "TALKDECK_SHARE_IMAGE")]
        share_image: Option<String>,

        /// Landing page template.
        #[arg(long, env = "TALKDECK_LANDING_TEMPLATE")]
        landing_template: Option<PathBuf>,

        /// Landing page stylesheet.
        #[arg(long, env = "TALKDECK_STYLESHEET")]
        stylesheet: Option<PathBuf>,

        /// Image shown at the top of the landing page.
        #[arg(long, env = "TALKDECK_HERO_IMAGE")]
        hero_image: Option<PathBuf>,

        #[command(flatten)]
        build: BuildArgs,
    },
}

/// Options shared by both subcommands.
#[derive(Args, Debug)]
struct BuildArgs {
    /// Rebuild even if the output is up to date.
    #[arg(short, long, env = "TALKDECK_FORCE")]
    force: bool,

    /// Rasterisation DPI (72–400).
    #[arg(long, env = "TALKDECK_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Compression level: 1 (best quality) to 5 (smallest files).
    #[arg(long, env = "TALKDECK_COMPRESSION", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(1..=5))]
    compression: u8,

    /// Slideshow template.
    #[arg(long, env = "TALKDECK_SLIDESHOW_TEMPLATE")]
    slideshow_template: Option<PathBuf>,

    /// Path to the pdftoppm executable.
    #[arg(long, env = "TALKDECK_PDFTOPPM")]
    pdftoppm: Option<PathBuf>,

    /// Path to the pngquant executable.
    #[arg(long, env = "TALKDECK_PNGQUANT")]
    pngquant: Option<PathBuf>,
}

impl BuildArgs {
    fn apply(&self, builder: talkdeck::BuildConfigBuilder) -> Result<talkdeck::BuildConfigBuilder> {
        let mut builder = builder
            .force(self.force)
            .dpi(self.dpi)
            .compression(CompressionLevel::new(self.compression)?)
            .tools(ToolPaths {
                pdftoppm: self.pdftoppm.clone(),
                pngquant: self.pngquant.clone(),
            });
        if let Some(ref path) = self.slideshow_template {
            builder = builder.slideshow_template(path);
        }
        Ok(builder)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are suppressed while the progress bar is up.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BuildProgressCallback>)
    } else {
        None
    };

    match cli.command {
        Command::Talk {
            ref pdf,
            ref output,
            ref title,
            ref build,
        } => {
            let mut builder = build.apply(BuildConfig::builder())?;
            if let Some(cb) = progress.clone() {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;

            let result = build_talk(pdf, output.as_deref(), title.as_deref(), &config).await;
            if let Some(ref cb) = progress {
                // A single talk never sees on_batch_complete.
                let (built, skipped) = match result {
                    Ok(ref b) if b.state == TalkState::Skipped => (0, 1),
                    Ok(_) => (1, 0),
                    Err(_) => (0, 0),
                };
                cb.on_batch_complete(built, skipped, usize::from(result.is_err()));
            }
            let build = result.with_context(|| format!("Failed to build {}", pdf.display()))?;

            if cli.json {
                let json = serde_json::json!({
                    "talk": build.name,
                    "state": build.state,
                    "slideshow": build.slideshow,
                    "slides": build.slides.iter().map(|s| s.file_name()).collect::<Vec<_>>(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json).context("Failed to serialise result")?
                );
            } else if !cli.quiet {
                let verb = if build.state == TalkState::Skipped {
                    "up to date"
                } else {
                    "built"
                };
                eprintln!(
                    "{}  {} slides {}  →  {}",
                    green("✔"),
                    build.slides.len(),
                    verb,
                    bold(&build.slideshow.display().to_string())
                );
            }
            Ok(())
        }

        Command::Site {
            ref talks_dir,
            ref output_dir,
            concurrency,
            ref site_title,
            ref site_description,
            ref base_url,
            ref share_image,
            ref landing_template,
            ref stylesheet,
            ref hero_image,
            ref build,
        } => {
            let mut builder = build
                .apply(BuildConfig::builder())?
                .concurrency(concurrency)
                .site(SiteInfo {
                    title: site_title.clone(),
                    description: site_description.clone(),
                    base_url: base_url.clone(),
                    share_image: share_image.clone(),
                });
            if let Some(ref path) = landing_template {
                builder = builder.landing_template(path);
            }
            if let Some(ref path) = stylesheet {
                builder = builder.stylesheet(path);
            }
            if let Some(ref path) = hero_image {
                builder = builder.hero_image(path);
            }
            if let Some(cb) = progress {
                builder = builder.progress_callback(cb);
            }
            let config = builder.build().context("Invalid configuration")?;

            let report = build_site(talks_dir, output_dir, &config)
                .await
                .context("Site build failed")?;
            print_report(&report, cli.json, cli.quiet)?;

            if !report.is_success() {
                anyhow::bail!("{} talk(s) failed", report.failed.len());
            }
            Ok(())
        }
    }
}

fn print_report(report: &BatchReport, json: bool, quiet: bool) -> Result<()> {
    if json {
        let json = serde_json::to_string_pretty(report).context("Failed to serialise report")?;
        println!("{json}");
        return Ok(());
    }
    if quiet {
        return Ok(());
    }
    let rule = "=".repeat(60);
    eprintln!("\n{rule}\n{}\n{rule}", bold("SUMMARY"));
    eprint!("{}", report.summary());
    eprintln!("{}", dim(&format!("{}ms total", report.duration_ms)));
    Ok(())
}
