//! file-expiry: schedule a file for deletion via at(1)
//!
//! Subcommands:
//! - `at`, `after`, `schedule`, `preset`: set (or replace) a file's expiry
//! - `cancel`, `status`, `dedupe`: inspect and manage an existing expiry
//! - `reap`: the helper a queued job runs to delete the file

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use file_expiry_scheduler::ExpiryPreset;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "file-expiry")]
#[command(about = "Schedule inode-checked file deletion", long_about = None)]
struct Cli {
    /// Command prefix embedded in every job; it receives `<path> <inode> [minutes]`
    #[arg(
        long,
        env = "FILE_EXPIRY_HELPER",
        default_value = file_expiry_scheduler::DEFAULT_HELPER,
        global = true
    )]
    helper: String,

    /// at executable
    #[arg(long, env = "FILE_EXPIRY_AT", default_value = "at", global = true)]
    at_bin: String,

    /// atq executable
    #[arg(long, env = "FILE_EXPIRY_ATQ", default_value = "atq", global = true)]
    atq_bin: String,

    /// atrm executable
    #[arg(long, env = "FILE_EXPIRY_ATRM", default_value = "atrm", global = true)]
    atrm_bin: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expire a file at an at(1) time spec (e.g. `14:00`, `noon tomorrow`)
    At {
        /// File to expire
        path: PathBuf,

        /// Time spec, passed to at unchanged
        #[arg(required = true, trailing_var_arg = true, num_args = 1..)]
        when: Vec<String>,
    },

    /// Expire a file after a number of minutes
    After {
        /// File to expire
        path: PathBuf,

        /// Minutes from now (positive)
        minutes: u64,
    },

    /// Expire a file using exactly one of --at or --after
    Schedule {
        /// File to expire
        path: PathBuf,

        /// Time spec in at(1) format
        #[arg(long)]
        at: Option<String>,

        /// Minutes from now
        #[arg(long)]
        after: Option<String>,
    },

    /// Expire a file using a preset (in-one-hour, in-one-day, in-one-week,
    /// in-one-month, after-one-week, after-one-month)
    Preset {
        /// File to expire
        path: PathBuf,

        /// Preset name
        preset: ExpiryPreset,
    },

    /// Cancel a file's expiry
    Cancel {
        /// File whose expiry to cancel
        path: PathBuf,
    },

    /// Show when a file will expire
    Status {
        /// File to check
        path: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Remove duplicate expiry jobs for a file, keeping the newest
    Dedupe {
        /// File to clean up
        path: PathBuf,
    },

    /// Delete a file if its inode still matches (run by queued jobs)
    Reap {
        /// File to delete
        path: PathBuf,

        /// Inode recorded when the expiry was scheduled
        inode: u64,

        /// Duration the job was scheduled with, if any
        minutes: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "file_expiry=info,file_expiry_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let scheduler = commands::build_scheduler(&cli.helper, &cli.at_bin, &cli.atq_bin, &cli.atrm_bin);

    match cli.command {
        Commands::At { path, when } => commands::at(&scheduler, &path, &when.join(" ")).await,
        Commands::After { path, minutes } => commands::after(&scheduler, &path, minutes).await,
        Commands::Schedule { path, at, after } => {
            commands::schedule(&scheduler, &path, at.as_deref(), after.as_deref()).await
        }
        Commands::Preset { path, preset } => commands::preset(&scheduler, &path, preset).await,
        Commands::Cancel { path } => commands::cancel(&scheduler, &path).await,
        Commands::Status { path, json } => commands::status(&scheduler, &path, json).await,
        Commands::Dedupe { path } => commands::dedupe(&scheduler, &path).await,
        Commands::Reap {
            path,
            inode,
            minutes,
        } => commands::reap(&path, inode, minutes).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn at_joins_trailing_words() {
        let cli = Cli::try_parse_from(["file-expiry", "at", "/tmp/f", "now", "+", "1", "hour"])
            .unwrap();
        match cli.command {
            Commands::At { path, when } => {
                assert_eq!(path, PathBuf::from("/tmp/f"));
                assert_eq!(when.join(" "), "now + 1 hour");
            }
            _ => panic!("expected at"),
        }
    }

    #[test]
    fn preset_names_parse() {
        let cli =
            Cli::try_parse_from(["file-expiry", "preset", "/tmp/f", "after-one-month"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Preset {
                preset: ExpiryPreset::AfterOneMonth,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["file-expiry", "preset", "/tmp/f", "soonish"]).is_err());
    }

    #[test]
    fn helper_defaults_to_installed_script() {
        let cli = Cli::try_parse_from(["file-expiry", "cancel", "/tmp/f"]).unwrap();
        assert_eq!(cli.helper, file_expiry_scheduler::DEFAULT_HELPER);
    }
}
