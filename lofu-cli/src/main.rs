//! Lofu CLI - foot-arch capture pipeline driver.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "Exit codes:
  0   Success
  1   General error
  64  Usage error (bad flags or configuration)
  65  Data error (undecodable image, malformed backend response)
  66  Input error (image file not found)
  69  Service unavailable (backend, store or camera)
  74  I/O error (cannot write output)";

#[derive(Parser)]
#[command(name = "lofu")]
#[command(author, version, about = "Foot-arch detection and classification", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Base URL of the detect/classify/report backend
    #[arg(long, global = true, env = "LOFU_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Base URL of the capture history store
    #[arg(long, global = true, env = "LOFU_STORE_URL")]
    pub store_url: Option<String>,

    /// User whose capture history is read and written
    #[arg(long, global = true, env = "LOFU_USER_ID")]
    pub user: Option<String>,

    /// Keep up to four detections (review mode) instead of two
    #[arg(long, global = true)]
    pub review: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// When to use colors
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect feet in an image and draw the overlay
    Detect {
        /// Path to the foot photograph
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Write the annotated overlay PNG here
        #[arg(short, long, value_name = "PATH")]
        overlay: Option<PathBuf>,
    },

    /// Detect and classify the arch type of each foot
    Classify {
        /// Path to the foot photograph
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Write the annotated overlay PNG here
        #[arg(short, long, value_name = "PATH")]
        overlay: Option<PathBuf>,

        /// Also fetch the report of each classified foot
        #[arg(long)]
        report: bool,
    },

    /// Run live detection on an image used as a camera
    Preview {
        /// Image streamed as the camera frame
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Number of detection ticks
        #[arg(long, default_value_t = 3)]
        ticks: u64,

        /// Interval between ticks in milliseconds (defaults to LOFU_PREVIEW_INTERVAL_MS or 1500)
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
    },

    /// Browse or delete stored captures
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List stored captures, newest first
    List {
        /// Page size
        #[arg(long)]
        limit: Option<usize>,

        /// Continue after this capture id
        #[arg(long)]
        cursor: Option<String>,
    },

    /// Delete a stored capture
    Delete {
        /// Capture id
        #[arg(value_name = "ID")]
        id: String,
    },
}

fn init_tracing(global: &GlobalArgs) {
    let default_level = match (global.quiet, global.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let ansi = match global.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .init();
}

fn apply_color(choice: ColorChoice) {
    match choice {
        ColorChoice::Auto => {}
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let global = cli.global;
    match cli.command {
        Commands::Detect { image, overlay } => commands::detect::execute(&global, image, overlay).await,
        Commands::Classify {
            image,
            overlay,
            report,
        } => commands::classify::execute(&global, image, overlay, report).await,
        Commands::Preview {
            image,
            ticks,
            interval_ms,
        } => commands::preview::execute(&global, image, ticks, interval_ms).await,
        Commands::History { action } => match action {
            HistoryAction::List { limit, cursor } => commands::history::list(&global, limit, cursor).await,
            HistoryAction::Delete { id } => commands::history::delete(&global, id).await,
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.global);
    apply_color(cli.global.color);

    let exit = match run(cli).await {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };

    if let Some(message) = &exit.message {
        eprintln!("{} {}", "error:".red().bold(), message);
    }
    std::process::exit(exit.code);
}
