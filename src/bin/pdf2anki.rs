//! CLI binary for pdf2anki.
//!
//! `serve` runs the upload/download web app; `convert` turns one local file
//! into a deck without the server. Both map their flags onto the library's
//! config types.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2anki::config::DEFAULT_MAX_UPLOAD_BYTES;
use pdf2anki::{
    convert_file, serve, AppState, ConversionConfig, NoopProgress, ProgressSink, ServerConfig,
    VisionExtractor,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

// ── Terminal progress sink ───────────────────────────────────────────────────

/// Renders pipeline stages as a 0–100 progress bar.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:42.green/238}] {pos:>3}%  {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, status: &str, progress: u8) {
        self.bar.set_position(u64::from(progress.min(100)));
        self.bar.set_message(status.to_string());
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the web app on http://127.0.0.1:5000
  pdf2anki serve

  # Listen on all interfaces, decks written to ./decks
  pdf2anki serve --bind 0.0.0.0:8080 --output-dir decks

  # Convert one file without the server
  pdf2anki convert quiz.pdf -o decks

  # Use a specific model
  pdf2anki --model gpt-4o --provider openai convert scan.png

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium (otherwise the system library is used)
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Turn images and PDFs of multiple-choice questions into Anki decks.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2anki",
    version,
    about = "Turn images and PDFs of multiple-choice questions into Anki decks using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    llm: LlmArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2ANKI_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2ANKI_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web app.
    Serve(ServeArgs),
    /// Convert one image or PDF into an .apkg deck.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// LLM model ID (e.g. gpt-4o-mini, gpt-4o, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max LLM output tokens per request.
    #[arg(long, global = true, env = "PDF2ANKI_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "PDF2ANKI_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Longest edge, in pixels, of each image sent to the model.
    #[arg(long, global = true, env = "PDF2ANKI_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// JPEG quality (1–100) of images sent to the model.
    #[arg(long, global = true, env = "PDF2ANKI_JPEG_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, global = true, env = "PDF2ANKI_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "PDF2ANKI_PASSWORD")]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "PDF2ANKI_BIND", default_value = "127.0.0.1:5000")]
    bind: SocketAddr,

    /// Directory finished decks are written to and served from.
    #[arg(long, env = "PDF2ANKI_OUTPUT_DIR", default_value = "uploads")]
    output_dir: PathBuf,

    /// Upload size limit in bytes.
    #[arg(long, env = "PDF2ANKI_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: usize,

    /// Interval between progress events, in milliseconds.
    #[arg(long, env = "PDF2ANKI_PROGRESS_INTERVAL_MS", default_value_t = 500)]
    progress_interval_ms: u64,

    /// Seconds a finished upload's progress stream stays available.
    #[arg(long, env = "PDF2ANKI_PROGRESS_RETENTION_SECS", default_value_t = 60)]
    progress_retention_secs: u64,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// PNG, JPEG or PDF file to convert.
    input: PathBuf,

    /// Directory to write the deck into.
    #[arg(short, long, env = "PDF2ANKI_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Seed for the deck and model ids (reproducible packages).
    #[arg(long, env = "PDF2ANKI_SEED")]
    seed: Option<u64>,

    /// Print the cards as JSON on stdout.
    #[arg(long, env = "PDF2ANKI_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2ANKI_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // A progress bar replaces INFO logs for `convert`.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Serve(_) => false,
    };
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

    let seed = match &cli.command {
        Command::Convert(args) => args.seed,
        Command::Serve(_) => None,
    };
    let config = build_config(&cli.llm, seed).await?;
    let extractor =
        VisionExtractor::from_config(&config).context("Failed to set up the vision model")?;

    match cli.command {
        Command::Serve(args) => {
            let server = ServerConfig {
                bind: args.bind,
                output_dir: args.output_dir,
                max_upload_bytes: args.max_upload_bytes,
                progress_interval: Duration::from_millis(args.progress_interval_ms),
                progress_retention: Duration::from_secs(args.progress_retention_secs),
            };
            server.validate().context("Invalid server configuration")?;
            if !cli.quiet {
                eprintln!(
                    "{} {}",
                    cyan("◆"),
                    bold(&format!("pdf2anki listening on http://{}", server.bind))
                );
            }
            let state = AppState::new(Arc::new(extractor), config, server);
            serve(state).await.context("Server failed")?;
        }
        Command::Convert(args) => {
            let result = if show_progress {
                let bar = BarProgress::new();
                let result =
                    convert_file(&args.input, &extractor, &config, &args.output_dir, &bar).await;
                bar.finish();
                result
            } else {
                convert_file(
                    &args.input,
                    &extractor,
                    &config,
                    &args.output_dir,
                    &NoopProgress,
                )
                .await
            };
            let output = result
                .with_context(|| format!("Conversion of {} failed", args.input.display()))?;

            if args.json {
                let json = serde_json::to_string_pretty(&output)
                    .context("Failed to serialise output")?;
                println!("{json}");
            } else if !cli.quiet {
                eprintln!(
                    "{}  {} cards from {} page(s)  →  {}",
                    green("✔"),
                    output.cards.len(),
                    output.pages,
                    bold(&output.deck.path.display().to_string()),
                );
                if output.dropped > 0 {
                    eprintln!(
                        "   {}",
                        dim(&format!(
                            "{} of {} entries in the model reply were unusable",
                            output.dropped, output.candidates
                        ))
                    );
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(llm: &LlmArgs, seed: Option<u64>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .max_rendered_pixels(llm.max_pixels)
        .jpeg_quality(llm.jpeg_quality)
        .max_tokens(llm.max_tokens)
        .temperature(llm.temperature);

    if let Some(ref path) = llm.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = llm.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = llm.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = llm.password {
        builder = builder.password(password.clone());
    }
    if let Some(seed) = seed {
        builder = builder.id_seed(seed);
    }

    builder.build().context("Invalid configuration")
}
