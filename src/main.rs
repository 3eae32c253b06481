use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cybermods::config::Paths;
use cybermods::{App, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cybermods")]
#[command(author, version, about = "A command-line mod installer for Cyberpunk 2077")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Keep config, ledger and caches under this directory instead of the
    /// XDG locations
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Only write logs to the log file
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install archives (downloaded file names or paths to archives)
    Install {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Uninstall previously installed archives
    Uninstall {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// List installed .archive files
    Archives,

    /// Rename an installed .archive file (e.g. to change load order)
    RenameArchive { old_name: String, new_name: String },

    /// Show download and install status of a file
    Status { file: String },

    /// Manage downloaded archives
    Downloads {
        #[command(subcommand)]
        action: DownloadCommands,
    },

    /// Nexus Mods operations
    Nexus {
        #[command(subcommand)]
        action: NexusCommands,
    },

    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum DownloadCommands {
    /// List downloaded files
    List,
    /// Delete a downloaded file and forget it
    Delete { file: String },
}

#[derive(Subcommand)]
enum NexusCommands {
    /// List tracked mods grouped by category
    Tracked {
        /// Use the cached list instead of fetching
        #[arg(long)]
        cached: bool,
    },
    /// List the files of a mod
    Files { mod_id: i64 },
    /// Download files of a mod
    Download {
        mod_id: i64,
        #[arg(required = true)]
        file_ids: Vec<i64>,
        /// Install the files after downloading
        #[arg(long)]
        install: bool,
    },
    /// Refresh upload dates of downloaded files
    CheckUpdates,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set the game installation folder
    SetGameDir { path: String },
    /// Set the downloads folder
    SetOutputDir { path: String },
    /// Set the Nexus Mods API key
    SetApiKey { key: String },
}

fn setup_logging(log_file: &std::path::Path, verbosity: u8, also_stderr: bool) -> Result<()> {
    let filter = match verbosity {
        0 => "cybermods=info",
        1 => "cybermods=debug",
        2 => "cybermods=trace",
        _ => "trace",
    };

    if let Some(parent) = log_file.parent() {
        std::fs::create_dir_all(parent).context("Failed to create log directory")?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::sync::Arc::new(file));

    if also_stderr {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match &cli.data_root {
        Some(root) => Paths::rooted_at(root.clone()),
        None => Paths::new(),
    };
    setup_logging(&paths.log_file(), cli.verbose, !cli.quiet)?;

    // Load configuration
    let config = Config::load_from(paths).await?;

    // Initialize app
    let mut app = App::new(config).await?;

    match cli.command {
        Commands::Install { files } => app.cmd_install(&files).await?,
        Commands::Uninstall { files } => app.cmd_uninstall(&files).await?,
        Commands::Archives => app.cmd_archives().await?,
        Commands::RenameArchive { old_name, new_name } => {
            app.cmd_rename_archive(&old_name, &new_name).await?
        }
        Commands::Status { file } => app.cmd_status(&file).await?,
        Commands::Downloads { action } => match action {
            DownloadCommands::List => app.cmd_downloads_list().await?,
            DownloadCommands::Delete { file } => app.cmd_downloads_delete(&file).await?,
        },
        Commands::Nexus { action } => match action {
            NexusCommands::Tracked { cached } => app.cmd_nexus_tracked(cached).await?,
            NexusCommands::Files { mod_id } => app.cmd_nexus_files(mod_id).await?,
            NexusCommands::Download {
                mod_id,
                file_ids,
                install,
            } => app.cmd_nexus_download(mod_id, &file_ids, install).await?,
            NexusCommands::CheckUpdates => app.cmd_nexus_check_updates().await?,
        },
        Commands::Config { action } => match action {
            ConfigCommands::Show => app.cmd_config_show().await?,
            ConfigCommands::SetGameDir { path } => app.cmd_config_set_game_dir(&path).await?,
            ConfigCommands::SetOutputDir { path } => app.cmd_config_set_output_dir(&path).await?,
            ConfigCommands::SetApiKey { key } => app.cmd_config_set_api_key(&key).await?,
        },
    }

    Ok(())
}
