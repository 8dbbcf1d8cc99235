//! CLI binary for molpreview.
//!
//! A thin shim over the library crate that maps CLI flags to `RenderConfig`
//! and prints results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use molpreview::{
    extract_file_metadata, inspect, render_file, FsArtifactStore, MolHandler, RenderConfig,
    ThumbnailParams, TransformError,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
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

const AFTER_HELP: &str = r#"EXAMPLES:
  molpreview sniff upload.tmp structures/*.mol
  molpreview render caffeine.mol -o caffeine.png --width 300
  molpreview --converter babel render ethanol.mol -o ethanol.png --height 200
  molpreview metadata reaction.rxn --json
  molpreview --config molpreview.json converters

CONFIG FILE (JSON, every key optional):
  {
    "converter": "indigo",
    "converters": {
      "indigo": { "command": "$path/indigo-depict $input $output",
                  "supported_formats": ["mol", "rxn"] }
    },
    "tool_dir": "/usr/bin",
    "timeout_secs": 60
  }

LOGGING:
  RUST_LOG overrides --verbose / --quiet, e.g. RUST_LOG=molpreview=debug.
"#;

/// Preview MDL chemical table files (MOL, RXN) as PNG images.
#[derive(Parser, Debug)]
#[command(
    name = "molpreview",
    version,
    about = "Detect and render MDL chemical table files",
    long_about = "Detect MDL chemical table files (MOL, SDF, RXN, RD, RG) by content and \
render molfiles and reaction files to PNG through an external depiction tool \
(Indigo or Open Babel) and an SVG rasterizer.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file.
    #[arg(long, global = true, env = "MOLPREVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Active converter (e.g. indigo, babel).
    #[arg(long, global = true, env = "MOLPREVIEW_CONVERTER")]
    converter: Option<String>,

    /// Directory holding the depiction tool; empty to resolve through PATH.
    #[arg(long, global = true, env = "MOLPREVIEW_TOOL_DIR")]
    tool_dir: Option<PathBuf>,

    /// Wall-clock limit per external process, in seconds.
    #[arg(long, global = true, env = "MOLPREVIEW_TIMEOUT")]
    timeout: Option<u64>,

    /// Debug logging.
    #[arg(short, long, global = true, env = "MOLPREVIEW_VERBOSE")]
    verbose: bool,

    /// Errors only; no spinner.
    #[arg(short, long, global = true, env = "MOLPREVIEW_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the detected MIME type of each file.
    Sniff {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// One JSON object per line.
        #[arg(long)]
        json: bool,
    },
    /// Render a MOL or RXN file to PNG.
    Render {
        input: PathBuf,
        /// Destination PNG.
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// Where intermediate SVGs are cached between runs.
        #[arg(long, env = "MOLPREVIEW_CACHE_DIR")]
        cache_dir: Option<PathBuf>,
    },
    /// Print the dimensions of the depicted structure.
    Metadata {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List configured converters and their formats.
    Converters,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = Arc::new(build_config(&cli)?);

    match cli.command {
        Command::Sniff { ref files, json } => {
            for path in files {
                let report =
                    inspect(path).with_context(|| format!("Cannot read {}", path.display()))?;
                if json {
                    println!(
                        "{}",
                        serde_json::to_string(&report).context("Failed to serialise report")?
                    );
                } else {
                    let tag = if report.renderable {
                        green("renderable")
                    } else {
                        dim("-")
                    };
                    println!("{}\t{}\t{}", report.path.display(), report.mime, tag);
                }
            }
        }

        Command::Render {
            ref input,
            ref output,
            width,
            height,
            ref cache_dir,
        } => {
            if width.is_none() && height.is_none() {
                bail!("--width or --height is required");
            }
            let params = ThumbnailParams { width, height };
            let cache_root = match cache_dir {
                Some(dir) => dir.clone(),
                None => std::env::temp_dir().join("molpreview-cache"),
            };

            let spinner = (!cli.quiet).then(|| spinner(&format!("{}", input.display())));
            let start = Instant::now();

            let (input_c, output_c, config_c) = (input.clone(), output.clone(), config.clone());
            let result = tokio::task::spawn_blocking(move || {
                let store = FsArtifactStore::new(cache_root);
                render_file(&input_c, &output_c, &params, &store, config_c)
            })
            .await
            .context("Render task panicked")?
            .with_context(|| format!("Cannot render {}", input.display()))?;

            match result {
                Ok(thumb) => {
                    let msg = format!(
                        "{} {}×{} → {} {}",
                        green("✓"),
                        thumb.width,
                        thumb.height,
                        bold(&thumb.path.display().to_string()),
                        dim(&format!("({} ms)", start.elapsed().as_millis()))
                    );
                    finish(spinner, &msg, cli.quiet);
                }
                Err(e) => {
                    finish(spinner, &format!("{} {}", red("✗"), e), false);
                    std::process::exit(match e {
                        TransformError::InvalidParams { .. } => 2,
                        TransformError::Failed { .. } => 1,
                    });
                }
            }
        }

        Command::Metadata { ref input, json } => {
            let report =
                inspect(input).with_context(|| format!("Cannot read {}", input.display()))?;
            let handler = MolHandler::with_default_rasterizer(
                config.clone(),
                molpreview::handler_for_mime(&report.mime)
                    .with_context(|| format!("{} ({}) cannot be depicted", input.display(), report.mime))?,
            );

            let spinner = (!cli.quiet && !json).then(|| spinner("extracting metadata"));
            let meta = tokio::task::block_in_place(|| extract_file_metadata(&handler, input))
                .context("Metadata extraction failed")?;
            if let Some(bar) = spinner {
                bar.finish_and_clear();
            }

            match meta {
                Ok(meta) if json => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
                    );
                }
                Ok(meta) => {
                    println!("{}\t{} × {} px", input.display(), meta.width, meta.height);
                    if let Some(err) = meta.error {
                        eprintln!("{} {}", red("✗"), err.message);
                    }
                }
                Err(e) => {
                    eprintln!("{} {}", red("✗"), e);
                    std::process::exit(1);
                }
            }
        }

        Command::Converters => {
            let registry = &config.registry;
            for (id, spec) in registry.iter() {
                let formats: Vec<&str> = spec.supported_formats.iter().map(|f| f.as_str()).collect();
                let marker = if id == registry.active_id() {
                    green("*")
                } else {
                    " ".to_string()
                };
                println!("{marker} {}\t[{}]\t{}", bold(id), formats.join(", "), dim(&spec.command));
            }
        }
    }

    Ok(())
}

/// Map CLI args and the optional config file to `RenderConfig`.
fn build_config(cli: &Cli) -> Result<RenderConfig> {
    let mut config = match &cli.config {
        Some(path) => RenderConfig::from_json_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => RenderConfig::default(),
    };

    if let Some(id) = &cli.converter {
        config.registry.set_active(id.clone());
    }
    if let Some(dir) = &cli.tool_dir {
        config.tool_dir = if dir.as_os_str().is_empty() {
            None
        } else {
            Some(dir.clone())
        };
    }
    if let Some(secs) = cli.timeout {
        config.timeout_secs = secs;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn spinner(prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix(prefix.to_string());
    bar.set_message("converting…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn finish(bar: Option<ProgressBar>, msg: &str, quiet: bool) {
    match bar {
        Some(bar) => bar.finish_with_message(msg.to_string()),
        None if !quiet => eprintln!("{msg}"),
        None => {}
    }
}
