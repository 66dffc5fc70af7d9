//! commitwake CLI
//!
//! Command-line tools for exercising cross-process commit notification by
//! hand. Run `watch` in one terminal and `notify` in another.
//!
//! # Commands
//!
//! - `channel` - Print the wake channel location for a database
//! - `notify` - Announce commits to every handle on a database
//! - `watch` - Print wake cycles as they arrive

#[cfg(any(target_os = "linux", target_os = "android"))]
mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// commitwake command-line tools.
#[derive(Parser)]
#[command(name = "commitwake")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory for wake channels that cannot live beside the database
    #[arg(global = true, long)]
    fallback_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the wake channel location for a database
    Channel {
        /// Path to the database file
        db: PathBuf,
    },

    /// Announce commits to every handle on a database
    Notify {
        /// Path to the database file
        db: PathBuf,

        /// Number of commits to announce
        #[arg(short, long, default_value = "1")]
        count: u64,
    },

    /// Print one line per wake cycle
    Watch {
        /// Path to the database file
        db: PathBuf,

        /// Exit after this many wake cycles
        #[arg(short, long)]
        count: Option<u64>,

        /// Give up after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show version information
    Version,
}

/// Output format for `watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays parseable.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(cli)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    use commitwake_core::Config;
    use std::time::Duration;

    let mut config = Config::default();
    if let Some(dir) = cli.fallback_dir {
        config = config.fallback_dir(dir);
    }

    match cli.command {
        Commands::Channel { db } => commands::channel::run(&db, &config)?,
        Commands::Notify { db, count } => commands::notify::run(&db, &config, count)?,
        Commands::Watch {
            db,
            count,
            timeout,
            format,
        } => {
            let timeout = timeout.map(Duration::from_secs);
            commands::watch::run(&db, &config, count, timeout, format == Format::Json)?;
        }
        Commands::Version => print_version(),
    }

    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        _ => Err("commit notification requires Linux or Android".into()),
    }
}

fn print_version() {
    println!("commitwake CLI v{}", env!("CARGO_PKG_VERSION"));
}
