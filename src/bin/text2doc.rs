//! CLI binary for edgequake-text2doc.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_text2doc::{
    convert, convert_to_files, write_docx, ConversionProgressCallback, ConversionStats,
    FailurePolicy, PipelineConfig, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
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

/// Live progress bar plus one log line per finished page. Pages finish out of
/// order, so start times are tracked per page number.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving provider…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&page_num)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting conversion of {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, body_len: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{body_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages converted  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Form-feed separated text (pdftotext output) to HTML on stdout
  text2doc scan.txt

  # HTML and DOCX files
  text2doc scan.txt -o scan.html --docx scan.docx

  # One page per file, in name order
  text2doc pages/ -o book.html

  # Gentler on a rate-limited key
  text2doc scan.txt -c 2 --rate-limit-cooldown 90 -o scan.html

  # Fail whole pages instead of dropping single chunks
  text2doc scan.txt --failure-policy propagate --json > result.json

INPUT:
  A UTF-8 text file with pages separated by form feed (\f), a directory of
  *.txt files (one page each), or an http(s) URL to a text file.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (GOOGLE_API_KEY also accepted)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter, e.g. edgequake_text2doc=debug
"#;

/// Rebuild extracted page text into formatted HTML and DOCX with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "text2doc",
    version,
    about = "Rebuild extracted page text into formatted HTML and DOCX with an LLM",
    long_about = "Send extracted page text, chunk by chunk, to a text-generation service that \
restores headings, lists and tables as HTML, then reassemble the pages in order. Supports \
Google Gemini directly and OpenAI, Anthropic, Ollama and others through edgequake-llm.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Text file, directory of *.txt pages, or HTTP/HTTPS URL.
    input: String,

    /// Write the HTML to this file instead of stdout.
    #[arg(short, long, env = "TEXT2DOC_OUTPUT")]
    output: Option<PathBuf>,

    /// Also write a DOCX document to this path.
    #[arg(long, env = "TEXT2DOC_DOCX")]
    docx: Option<PathBuf>,

    /// Provider: gemini, openai, anthropic, ollama, azure, …
    #[arg(
        long,
        env = "TEXT2DOC_PROVIDER",
        long_help = "Generation provider. Auto-detected from API key env vars if not set.\n\
          'gemini' uses the built-in Gemini client; other names go through edgequake-llm."
    )]
    provider: Option<String>,

    /// Model ID (e.g. gemini-1.5-flash, gpt-4.1-nano).
    #[arg(long, env = "TEXT2DOC_MODEL")]
    model: Option<String>,

    /// API key for the built-in Gemini client.
    #[arg(long, env = "TEXT2DOC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL override for the built-in Gemini client.
    #[arg(long, env = "TEXT2DOC_ENDPOINT")]
    endpoint: Option<String>,

    /// Number of pages processed concurrently.
    #[arg(short, long, env = "TEXT2DOC_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Maximum chunk size in characters.
    #[arg(long, env = "TEXT2DOC_CHUNK_SIZE", default_value_t = 2000)]
    chunk_size: usize,

    /// Calls per chunk, first attempt included.
    #[arg(long, env = "TEXT2DOC_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Base exponential backoff delay in milliseconds.
    #[arg(long, env = "TEXT2DOC_RETRY_BACKOFF_MS", default_value_t = 1000)]
    retry_backoff_ms: u64,

    /// Pause after a rate-limit response, in seconds.
    #[arg(long, env = "TEXT2DOC_RATE_LIMIT_COOLDOWN", default_value_t = 60)]
    rate_limit_cooldown: u64,

    /// Per-call generation timeout in seconds.
    #[arg(long, env = "TEXT2DOC_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "TEXT2DOC_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// What to do with a chunk that failed every attempt.
    #[arg(long, env = "TEXT2DOC_FAILURE_POLICY", value_enum, default_value = "degrade")]
    failure_policy: FailurePolicyArg,

    /// Path to a text file replacing the default formatting instructions.
    #[arg(long, env = "TEXT2DOC_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// Document title for the HTML <title>.
    #[arg(long, env = "TEXT2DOC_TITLE")]
    title: Option<String>,

    /// Output structured JSON (ConversionOutput) to stdout instead of HTML.
    #[arg(long, env = "TEXT2DOC_JSON", conflicts_with = "output")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "TEXT2DOC_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TEXT2DOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TEXT2DOC_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FailurePolicyArg {
    Degrade,
    Propagate,
}

impl From<FailurePolicyArg> for FailurePolicy {
    fn from(v: FailurePolicyArg) -> Self {
        match v {
            FailurePolicyArg::Degrade => FailurePolicy::Degrade,
            FailurePolicyArg::Propagate => FailurePolicy::Propagate,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs unless -v is given.
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let stats = convert_to_files(&cli.input, output_path, cli.docx.as_deref(), &config)
            .await
            .context("Conversion failed")?;

        if !cli.quiet {
            print_summary(&stats);
            eprintln!("   →  {}", bold(&output_path.display().to_string()));
            if let Some(ref docx) = cli.docx {
                eprintln!("   →  {}", bold(&docx.display().to_string()));
            }
        }
    } else {
        let output = convert(&cli.input, &config)
            .await
            .context("Conversion failed")?;

        if let Some(ref docx) = cli.docx {
            write_docx(&output.document, docx)
                .await
                .context("Failed to write DOCX")?;
        }

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.markup.as_str().as_bytes())
                .context("Failed to write to stdout")?;
        }

        if !cli.quiet && !cli.json {
            print_summary(&output.stats);
        }
    }

    Ok(())
}

fn print_summary(stats: &ConversionStats) {
    eprintln!(
        "{}  {}/{} pages  {} chunks ({} failed)  {}ms",
        if stats.failed_pages == 0 && stats.failed_chunks == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.processed_pages,
        stats.total_pages,
        stats.total_chunks,
        stats.failed_chunks,
        stats.total_duration_ms,
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&stats.total_input_tokens.to_string()),
        dim(&stats.total_output_tokens.to_string()),
    );
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .concurrency(cli.concurrency)
        .max_chunk_chars(cli.chunk_size)
        .max_attempts(cli.max_attempts)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .rate_limit_cooldown_secs(cli.rate_limit_cooldown)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .failure_policy(cli.failure_policy.into());

    if let Some(ref path) = cli.instructions {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instructions from {:?}", path))?;
        builder = builder.instructions(text);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref endpoint) = cli.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if let Some(ref title) = cli.title {
        builder = builder.title(title);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
