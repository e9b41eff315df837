//! CLI parsing and orchestration. Loads config and a book recipe, runs the pipeline,
//! maps errors to exit codes.

use crate::config::{self, Config};
use crate::epublifier::{CreateError, Epublifier, Paced, Stage, UrlList, UrlSource};
use crate::fetch::FetchStrategy;
use crate::recipe::{Recipe, RecipeError};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Recipe(#[from] RecipeError),

    #[error("{0}")]
    Create(#[from] CreateError),

    #[error("{0}")]
    Validation(String),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Recipe(_) => 1,
            CliRunError::Create(e) => match e.stage() {
                Stage::Validating => 1,
                Stage::Iterating => 2,
                _ => 3,
            },
            CliRunError::Validation(_) => 3,
        }
    }
}

/// Run epubcheck on the given EPUB path. Requires epubcheck on PATH.
fn validate_epub(path: &Path) -> Result<(), CliRunError> {
    let output = std::process::Command::new("epubcheck")
        .arg(path)
        .output()
        .map_err(|e| {
            CliRunError::Validation(format!(
                "Could not run epubcheck: {}. Is epubcheck installed and on PATH?",
                e
            ))
        })?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let msg = if stderr.is_empty() { stdout } else { stderr };
        Err(CliRunError::Validation(format!(
            "epubcheck reported errors:\n{}",
            msg.trim()
        )))
    }
}

#[derive(Parser, Debug)]
#[command(name = "epublify")]
#[command(about = "Fetch a list of web articles and bind them into one EPUB")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, timeout_secs, render_timeout_secs, browser_executable, scratch_dir, ncx, toc_page) are read from ./epublifier.toml or the user config dir. CLI flags override the recipe and config."
)]
pub struct Args {
    /// Book recipe: TOML, or JSON when the file name ends in .json.
    pub recipe: PathBuf,

    /// Output path. Default: the recipe's `output`, else {output_dir}/{sanitized-title}.epub.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fetch pages with a headless browser so their scripts run.
    #[arg(long)]
    pub js: bool,

    /// Delay between fetches in seconds (overrides the recipe).
    #[arg(long)]
    pub delay: Option<u64>,

    /// HTTP request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// User-Agent for HTTP and the browser (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug logging and the full error chain.
    #[arg(long)]
    pub verbose: bool,

    /// Print the chapter URLs and output path without fetching anything.
    #[arg(long)]
    pub dry_run: bool,

    /// After writing, run epubcheck on the result (epubcheck must be on PATH).
    #[arg(long)]
    pub validate: bool,
}

/// Sanitize book title to a safe filename: lowercase, replace spaces/special with `-`.
fn sanitize_title(title: &str) -> String {
    let mut s = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>();
    while s.contains("--") {
        s = s.replace("--", "-");
    }
    s = s.trim_matches('-').to_string();
    if s.is_empty() {
        s = "book".to_string();
    }
    s
}

/// -o, then the recipe's `output`, then `{output_dir}/{sanitized-title}.epub`.
fn resolve_output_path(args: &Args, recipe: &Recipe, config: &Config) -> PathBuf {
    if let Some(p) = args.output.clone().or_else(|| recipe.output.clone()) {
        return p;
    }
    let dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(format!("{}.epub", sanitize_title(&recipe.title)))
}

/// Ensure output path parent exists.
fn validate_output_path(path: &Path) -> Result<(), CliRunError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(CliRunError::InvalidInput(format!(
                "Cannot write output: {}: parent directory does not exist.",
                path.display()
            )));
        }
    }
    Ok(())
}

fn progress_bar(total: usize) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new(total as u64);
    if let Ok(style) =
        indicatif::ProgressStyle::with_template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
    {
        bar.set_style(
            style
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
    }
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Wrap `inner` so every pulled URL moves the bar.
fn with_progress(mut inner: impl UrlSource + 'static, bar: indicatif::ProgressBar) -> impl UrlSource {
    let mut pulled = 0u64;
    move || {
        let url = inner.next_url();
        bar.set_position(pulled);
        if !url.is_empty() {
            pulled += 1;
            bar.set_message(format!("Fetching chapter {}: {}", pulled, url));
        }
        url
    }
}

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config()
        .map_err(CliRunError::InvalidInput)?
        .unwrap_or_default();
    let mut recipe = Recipe::load(&args.recipe)?;
    if args.js {
        recipe.requires_js = true;
    }
    if let Some(delay) = args.delay {
        recipe.delay_secs = delay;
    }

    let mut options = config.pipeline_options();
    if let Some(timeout) = args.timeout {
        options.fetch.timeout_secs = timeout;
    }
    if let Some(ref ua) = args.user_agent {
        options.fetch.user_agent = ua.clone();
    }

    let urls = recipe.urls()?;
    let output_path = resolve_output_path(args, &recipe, &config);

    if args.dry_run {
        let strategy = match FetchStrategy::for_scripted(recipe.requires_js) {
            FetchStrategy::DirectHttp => "direct HTTP",
            FetchStrategy::RenderedBrowser => "headless browser",
        };
        for url in &urls {
            println!("{}", url);
        }
        eprintln!("Chapters: {}", urls.len());
        eprintln!("Fetch: {}", strategy);
        eprintln!("Output: {}", output_path.display());
        return Ok(());
    }

    validate_output_path(&output_path)?;

    let total = urls.len();
    let source = Paced::new(UrlList::new(urls), Duration::from_secs(recipe.delay_secs));
    let bar = (!args.quiet).then(|| progress_bar(total));
    let source: Box<dyn UrlSource> = match &bar {
        Some(bar) => Box::new(with_progress(source, bar.clone())),
        None => Box::new(source),
    };
    let spec = recipe.into_spec(source, output_path.clone())?;

    let result = Epublifier::new(options).create(spec);
    if let Some(bar) = bar {
        bar.disable_steady_tick();
        bar.finish_and_clear();
    }
    let summary = result?;

    if args.validate {
        validate_epub(&summary.path)?;
    }
    if !args.quiet {
        eprintln!(
            "Wrote {} ({} chapters)",
            summary.path.display(),
            summary.chapters.len()
        );
    }
    Ok(())
}
