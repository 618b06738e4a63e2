use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use textlens_core::config_file::{self, ConfigFile, HistoryConfig, OcrConfig};
use textlens_core::history::default_history_path;
use textlens_core::{HistoryStore, JsonHistoryStore, MemoryHistoryStore, PipelineEvent};
use textlens_ingest::BackendSettings;

mod output;

use output::ColorMode;

const HISTORY_ENV: &str = "TEXTLENS_HISTORY";
const TESSERACT_CMD_ENV: &str = "TESSERACT_CMD";

/// TextLens - Extract text from PDFs and images and analyze its content
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract text from a PDF or image and analyze it
    Extract(ExtractArgs),

    /// Browse or edit the extraction history
    History {
        #[command(subcommand)]
        action: HistoryCommand,

        /// Path to the history file
        #[arg(long, global = true)]
        history: Option<PathBuf>,

        /// Disable colored output
        #[arg(long, global = true)]
        no_color: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Path to the PDF or image file
    file: PathBuf,

    /// Media type to use instead of guessing from the extension
    #[arg(long)]
    media_type: Option<String>,

    /// Path to the history file
    #[arg(long, conflicts_with = "no_history")]
    history: Option<PathBuf>,

    /// Do not record this run in the history
    #[arg(long)]
    no_history: bool,

    /// Print only the extracted text
    #[arg(long, conflicts_with = "json")]
    text_only: bool,

    /// Print the resulting record as JSON
    #[arg(long)]
    json: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// OCR language (tesseract language code, e.g. eng, deu)
    #[arg(long)]
    lang: Option<String>,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List stored records
    List,
    /// Show one record in full
    Show {
        /// Record number as shown by `history list`
        index: usize,
    },
    /// Delete one record
    Delete {
        /// Record number as shown by `history list`
        index: usize,
    },
    /// Delete all records
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the resolved configuration as TOML
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config_file::load_config();

    match cli.command {
        Command::Extract(args) => extract(args, &config).await,
        Command::History {
            action,
            history,
            no_color,
        } => {
            history_command(action, history, ColorMode(!no_color), &config)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config {
            action: ConfigCommand::Show,
        } => {
            config_show(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn extract(args: ExtractArgs, config: &ConfigFile) -> anyhow::Result<ExitCode> {
    let color = ColorMode(!args.no_color);

    if !args.file.exists() {
        anyhow::bail!("File not found: {}", args.file.display());
    }
    let input = textlens_ingest::load_input(&args.file, args.media_type.as_deref())?;

    // Resolve configuration: CLI flags > env vars > config file > defaults
    let history: Arc<dyn HistoryStore> = if args.no_history {
        Arc::new(MemoryHistoryStore::new())
    } else {
        let path = resolve_history_path(args.history, config)?;
        Arc::new(JsonHistoryStore::open(&path)?)
    };
    let mut settings = BackendSettings::from_config(config);
    if let Ok(cmd) = std::env::var(TESSERACT_CMD_ENV) {
        settings.tesseract_cmd = Some(cmd);
    }
    if let Some(lang) = args.lang {
        settings.ocr_language = lang;
    }

    if !args.json && !args.text_only {
        output::print_extraction_header(
            &mut std::io::stdout(),
            &input.name,
            &input.media_type,
            color,
        )?;
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg:<10} [{bar:40.cyan/dim}] {pos:>3}%")
            .unwrap()
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let observer = {
        let bar = bar.clone();
        move |event: &PipelineEvent| match event {
            PipelineEvent::Progress { phase, percent } => {
                bar.set_message(phase.to_string());
                bar.set_position(u64::from(*percent));
            }
            PipelineEvent::HistoryWriteFailed { message } => {
                bar.suspend(|| {
                    let _ = output::print_warning(
                        &mut std::io::stderr(),
                        &format!("could not save to history: {}", message),
                        color,
                    );
                });
            }
            PipelineEvent::Completed { .. } | PipelineEvent::Failed { .. } => {
                bar.finish_and_clear();
            }
        }
    };

    let mut pipeline =
        textlens_ingest::build_pipeline(&settings, Arc::clone(&history)).with_observer(observer);

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let result = pipeline.submit(input, &cancel).await;
    bar.finish_and_clear();

    let record = match result {
        Ok(record) => record,
        Err(e) => {
            output::print_error(&mut std::io::stderr(), &e.to_string(), color)?;
            return Ok(ExitCode::FAILURE);
        }
    };

    if let Err(e) = history.flush() {
        tracing::warn!(error = %e, "failed to flush history");
    }

    let mut out = std::io::stdout().lock();
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
    } else if args.text_only {
        write!(out, "{}", record.text)?;
    } else {
        writeln!(out)?;
        output::print_text(&mut out, &record.text, color)?;
        if let Some(ref analysis) = record.analysis {
            output::print_analysis(&mut out, analysis, color)?;
        }
    }
    out.flush()?;

    Ok(ExitCode::SUCCESS)
}

fn history_command(
    action: HistoryCommand,
    history: Option<PathBuf>,
    color: ColorMode,
    config: &ConfigFile,
) -> anyhow::Result<()> {
    let path = resolve_history_path(history, config)?;
    let store = JsonHistoryStore::open(&path)?;
    let mut out = std::io::stdout().lock();

    match action {
        HistoryCommand::List => {
            let records = store.read_all()?;
            output::print_history_list(&mut out, &records, color)?;
        }
        HistoryCommand::Show { index } => {
            let records = store.read_all()?;
            let record = records
                .get(record_offset(index)?)
                .ok_or_else(|| no_such_record(index, records.len()))?;
            output::print_record(&mut out, index, record, color)?;
        }
        HistoryCommand::Delete { index } => {
            let offset = record_offset(index)?;
            let len = store.read_all()?.len();
            if offset >= len {
                return Err(no_such_record(index, len));
            }
            store.delete_at(offset)?;
            writeln!(out, "Deleted record {}.", index)?;
        }
        HistoryCommand::Clear => {
            store.clear()?;
            writeln!(out, "History cleared.")?;
        }
    }
    store.flush()?;
    Ok(())
}

/// Convert a 1-based record number into an index into the log.
fn record_offset(index: usize) -> anyhow::Result<usize> {
    index
        .checked_sub(1)
        .ok_or_else(|| anyhow::anyhow!("Record numbers start at 1"))
}

fn no_such_record(index: usize, len: usize) -> anyhow::Error {
    anyhow::anyhow!("No record {} (history has {} record(s))", index, len)
}

fn resolve_history_path(flag: Option<PathBuf>, config: &ConfigFile) -> anyhow::Result<PathBuf> {
    flag.or_else(|| std::env::var(HISTORY_ENV).ok().map(PathBuf::from))
        .or_else(|| config.history_path())
        .or_else(default_history_path)
        .ok_or_else(|| {
            anyhow::anyhow!("Could not determine a data directory; pass --history PATH")
        })
}

/// Apply environment overrides on top of the loaded config file.
fn resolved_config(config: &ConfigFile) -> ConfigFile {
    let mut resolved = config.clone();
    if let Ok(path) = std::env::var(HISTORY_ENV) {
        resolved.history = Some(HistoryConfig { path: Some(path) });
    }
    if let Ok(cmd) = std::env::var(TESSERACT_CMD_ENV) {
        let ocr = resolved.ocr.get_or_insert_with(OcrConfig::default);
        ocr.tesseract_cmd = Some(cmd);
    }
    resolved
}

fn config_show(config: &ConfigFile) -> anyhow::Result<()> {
    let resolved = resolved_config(config);
    let mut out = std::io::stdout().lock();

    match config_file::config_path() {
        Some(path) => writeln!(out, "# config file: {}", path.display())?,
        None => writeln!(out, "# config file: (no config directory)")?,
    }
    if let Ok(path) = resolve_history_path(None, config) {
        writeln!(out, "# history: {}", path.display())?;
    }
    write!(out, "{}", toml::to_string_pretty(&resolved)?)?;
    Ok(())
}
