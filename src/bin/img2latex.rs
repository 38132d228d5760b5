//! CLI binary for img2latex.
//!
//! A thin shim over the library crate that maps CLI flags onto
//! `ServiceConfig`, then either hosts the HTTP service or recognises a
//! single local image file.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use img2latex::{
    normalize_bytes, serve, AppState, LastResort, LocalModelConfig, RecognitionPipeline,
    RemoteApiConfig, ServiceConfig, StrategyKind,
};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI definition ───────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"STRATEGIES:
  local-model   recognizer executable given by --model-command (skipped if unset)
  remote-api    Pix2Text-compatible web API at --api-endpoint
  heuristic     pixel-density guess, always available, marked advisory

EXAMPLES:
  img2latex serve --port 8080
  img2latex serve --strategies remote-api,heuristic --strict
  IMG2LATEX_MODEL_COMMAND=p2t img2latex recognize formula.png --json
"#;

/// Convert images of mathematical formulas to LaTeX.
#[derive(Parser, Debug)]
#[command(
    name = "img2latex",
    version,
    about = "Convert images of mathematical formulas to LaTeX",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "IMG2LATEX_VERBOSE")]
    verbose: bool,

    /// Suppress all logs except errors.
    #[arg(short, long, global = true, env = "IMG2LATEX_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (`POST /convert`, `GET /health`).
    Serve {
        /// Interface to bind.
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on.
        #[arg(short, long, env = "PORT", default_value_t = 5000)]
        port: u16,

        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Recognise one PNG or JPEG file and print the LaTeX.
    Recognize {
        /// Image file to recognise.
        file: PathBuf,

        /// Print the full recognition result as JSON.
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        service: ServiceArgs,
    },
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Largest width or height after normalisation.
    #[arg(long, env = "IMG2LATEX_MAX_DIMENSION", default_value_t = 1024)]
    max_dimension: u32,

    /// Ceiling on the base64 payload in bytes.
    #[arg(long, env = "IMG2LATEX_MAX_ENCODED_BYTES", default_value_t = 8 * 1024 * 1024)]
    max_encoded_bytes: usize,

    /// Ceiling on the HTTP request body in bytes.
    #[arg(long, env = "IMG2LATEX_MAX_BODY_BYTES", default_value_t = 16 * 1024 * 1024)]
    max_body_bytes: usize,

    /// Resample images to multiples of 32 pixels.
    #[arg(long, env = "IMG2LATEX_ALIGN")]
    align: bool,

    /// Strategy order, comma separated.
    #[arg(
        long,
        env = "IMG2LATEX_STRATEGIES",
        value_delimiter = ',',
        default_value = "local-model,remote-api,heuristic"
    )]
    strategies: Vec<StrategyKind>,

    /// Local recognizer executable; enables the local-model strategy.
    #[arg(long, env = "IMG2LATEX_MODEL_COMMAND")]
    model_command: Option<PathBuf>,

    /// Extra argument for the local recognizer (repeatable).
    #[arg(long = "model-arg", allow_hyphen_values = true)]
    model_args: Vec<String>,

    /// Executable tried when --model-command cannot be found.
    #[arg(long, env = "IMG2LATEX_MODEL_FALLBACK")]
    model_fallback: Option<PathBuf>,

    /// Per-inference timeout for the local model, in seconds.
    #[arg(long, env = "IMG2LATEX_MODEL_TIMEOUT", default_value_t = 120)]
    model_timeout: u64,

    /// Remote OCR API endpoint.
    #[arg(long, env = "IMG2LATEX_API_ENDPOINT", default_value = img2latex::config::DEFAULT_REMOTE_ENDPOINT)]
    api_endpoint: String,

    /// Remote OCR API timeout, in seconds.
    #[arg(long, env = "IMG2LATEX_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// Fail the request instead of returning a placeholder when every strategy fails.
    #[arg(long, env = "IMG2LATEX_STRICT")]
    strict: bool,

    /// Output shorter than this counts as a failed recognition.
    #[arg(long, env = "IMG2LATEX_MIN_CHARS", default_value_t = 3)]
    min_chars: usize,
}

impl ServiceArgs {
    fn to_config(&self) -> Result<ServiceConfig> {
        let mut builder = ServiceConfig::builder()
            .max_dimension(self.max_dimension)
            .max_encoded_bytes(self.max_encoded_bytes)
            .max_body_bytes(self.max_body_bytes)
            .pad_to_alignment(self.align)
            .strategy_order(self.strategies.clone())
            .remote_api(RemoteApiConfig {
                endpoint: self.api_endpoint.clone(),
                timeout_secs: self.api_timeout,
            })
            .min_latex_chars(self.min_chars)
            .last_resort(if self.strict {
                LastResort::Error
            } else {
                LastResort::Placeholder
            });

        if let Some(program) = &self.model_command {
            let mut local = LocalModelConfig::new(program);
            local.args = self.model_args.clone();
            local.fallback_program = self.model_fallback.clone();
            local.inference_timeout_secs = self.model_timeout;
            builder = builder.local_model(local);
        }

        builder.build().context("Invalid configuration")
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    match cli.command {
        Command::Serve {
            host,
            port,
            service,
        } => {
            let config = service.to_config()?;
            let state = AppState::from_config(config).context("Failed to build recognizer chain")?;
            let addr = SocketAddr::new(host, port);
            serve(state, addr)
                .await
                .with_context(|| format!("Server on {addr} failed"))?;
        }
        Command::Recognize {
            file,
            json,
            service,
        } => {
            let config = service.to_config()?;
            let pipeline =
                RecognitionPipeline::from_config(&config).context("Failed to build recognizer chain")?;

            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let opts = config.normalize_options();
            let image = tokio::task::spawn_blocking(move || normalize_bytes(&bytes, &opts))
                .await
                .context("Normalisation task panicked")?
                .with_context(|| format!("Failed to load image {}", file.display()))?;

            let result = pipeline
                .recognize(&image)
                .await
                .context("Recognition failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result).context("Failed to serialize result")?
                );
            } else {
                println!("{}", result.latex);
                if !cli.quiet {
                    let label = format!("via {} in {}ms", result.strategy, result.duration_ms);
                    if result.advisory {
                        eprintln!("{}", yellow(&label));
                    } else {
                        eprintln!("{}", green(&label));
                    }
                    if let Some(note) = result.note() {
                        eprintln!("{}", dim(note));
                    }
                    for attempt in &result.attempts {
                        eprintln!("{}", dim(&format!("  {} failed: {}", attempt.strategy, attempt.error)));
                    }
                }
            }
        }
    }

    Ok(())
}
