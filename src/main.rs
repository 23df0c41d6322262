use clap::{Parser, Subcommand};
use last_call::acquire::{AcquireError, Acquirer, PipelineEvent, RunState, SystemClock};
use last_call::assets::AssetStore;
use last_call::config::{self, GuideConfig};
use last_call::export::{self, ExportOptions};
use last_call::generation::GeminiClient;
use last_call::imaging::{Quality, RustCodec};
use last_call::{check, guide, output, server};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "last-call")]
#[command(about = "The bartender's survival guide: render it, illustrate it, export it")]
#[command(long_about = "\
The bartender's survival guide: render it, illustrate it, export it

The content directory holds the guide text; the image directory holds its
illustrations. Missing illustrations are generated from the prompts in the
asset catalog, with retries, pacing and a placeholder when generation keeps
failing.

Content structure:

  content/
  ├── config.toml          # Settings + asset catalog (optional)
  ├── guide.toml           # Cover text (optional)
  ├── 000-intro.md         # Chapters, ordered by number prefix
  ├── 010-rule-1.md        # ![alt](bar_scheme.webp \"Fig. 1: caption\")
  └── notes.md             # No number prefix = draft, not rendered

  images/
  ├── cover.webp           # Reused as-is when present
  └── bar_scheme.png       # Converted to bar_scheme.webp before generating

The API key is read from GEMINI_API_KEY (configurable). Log verbosity
follows RUST_LOG.

Run 'last-call gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Content directory
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    /// Image directory (overrides `images.dir` from config.toml)
    #[arg(long, global = true)]
    images: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Make sure every catalog image exists, generating the missing ones
    GenerateImages {
        /// Regenerate every image, even ones already present
        #[arg(long)]
        force: bool,
    },
    /// Write the guide as index.html plus its images
    Render {
        #[arg(long, default_value = "dist")]
        output: PathBuf,
    },
    /// Write a downloadable copy of the guide
    Export {
        #[arg(long, default_value = "exports")]
        output: PathBuf,
        /// Embed images in the HTML file
        #[arg(long)]
        inline: bool,
        /// Only these chapters (number or slug); repeatable
        #[arg(long = "chapter")]
        chapters: Vec<String>,
        /// Print to PDF with a local Chrome (requires the `pdf` feature)
        #[arg(long)]
        pdf: bool,
    },
    /// Serve the live guide and the image API
    Serve {
        /// Port (overrides `server.port`)
        #[arg(long)]
        port: Option<u16>,
        /// Run the image pipeline in the background while serving
        #[arg(long)]
        generate: bool,
        /// With --generate: regenerate every image
        #[arg(long)]
        force: bool,
    },
    /// Validate config and content, report the state of every image
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(&cli.source)?;
    let store = AssetStore::new(image_dir(&cli, &config));

    match cli.command {
        Command::GenerateImages { force } => {
            let (tx, rx) = mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_acquire_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let state = acquire(&config, &store, force, tx);
            printer.join().map_err(|_| "output thread panicked")?;
            output::print_run_summary(&state?);
        }
        Command::Render { output: out } => {
            let guide = guide::load_guide(&cli.source)?;
            let options = ExportOptions {
                file_name: "index.html".to_string(),
                ..ExportOptions::for_config(&config, out)
            };
            let summary = export::export_html(&guide, &config, &store, &options)?;
            output::print_export_output(&summary);
        }
        Command::Export {
            output: out,
            inline,
            chapters,
            pdf,
        } => {
            let guide = guide::load_guide(&cli.source)?;
            let options = ExportOptions {
                inline,
                chapters,
                ..ExportOptions::for_config(&config, out)
            };
            let summary = if pdf {
                export_pdf(&guide, &config, &store, &options)?
            } else {
                export::export_html(&guide, &config, &store, &options)?
            };
            output::print_export_output(&summary);
        }
        Command::Serve {
            port,
            generate,
            force,
        } => {
            guide::load_guide(&cli.source)?;
            let host = config.server.host.clone();
            let port = port.unwrap_or(config.server.port);
            let state = Arc::new(server::AppState::new(
                config.clone(),
                store.clone(),
                cli.source.clone(),
            ));

            let pipeline = if generate {
                let (tx, rx) = mpsc::channel();
                let board = state.board.clone();
                let tracker = std::thread::spawn(move || server::track(&board, rx));
                let (config, store) = (config.clone(), store.clone());
                Some(std::thread::spawn(move || {
                    match acquire(&config, &store, force, tx) {
                        Ok(state) => output::print_run_summary(&state),
                        Err(e) => tracing::error!(error = %e, "image pipeline failed"),
                    }
                    let _ = tracker.join();
                }))
            } else {
                None
            };

            println!(
                "Serving {} on http://{}:{}",
                cli.source.display(),
                host,
                port
            );
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(state, &host, port))?;
            if let Some(handle) = pipeline {
                let _ = handle.join();
            }
        }
        Command::Check => {
            println!("==> Checking {}", cli.source.display());
            config.validate()?;
            let guide = guide::load_guide(&cli.source)?;
            let inventory = check::survey(&config, &store, &guide)?;
            output::print_check_output(&inventory, &guide);
            println!("==> Content is valid");
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// `--images` wins; otherwise `images.dir` relative to the working directory.
fn image_dir(cli: &Cli, config: &GuideConfig) -> PathBuf {
    cli.images
        .clone()
        .unwrap_or_else(|| Path::new(&config.images.dir).to_path_buf())
}

/// Run the pipeline with the real codec, clock and generation client.
fn acquire(
    config: &GuideConfig,
    store: &AssetStore,
    force: bool,
    events: mpsc::Sender<PipelineEvent>,
) -> Result<RunState, AcquireError> {
    let codec = RustCodec::new(Quality::new(config.images.quality));
    let clock = SystemClock::new();
    Acquirer::new(config, store, &codec, &clock)
        .with_events(Some(events))
        .run(
            force,
            |var| std::env::var(var).ok(),
            |key| GeminiClient::new(key, &config.generation),
        )
}

#[cfg(feature = "pdf")]
fn export_pdf(
    guide: &guide::Guide,
    config: &GuideConfig,
    store: &AssetStore,
    options: &ExportOptions,
) -> Result<export::ExportSummary, export::ExportError> {
    export::export_pdf(guide, config, store, options)
}

#[cfg(not(feature = "pdf"))]
fn export_pdf(
    _guide: &guide::Guide,
    _config: &GuideConfig,
    _store: &AssetStore,
    _options: &ExportOptions,
) -> Result<export::ExportSummary, Box<dyn std::error::Error>> {
    Err("PDF export needs the `pdf` feature: cargo install last-call --features pdf".into())
}
