mod app;
mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "marksync-cli", about = "Back up and restore bookmarks through GitHub Gists", version)]
struct Cli {
    /// Local bookmark file (default: <data dir>/marksync/bookmarks.json)
    #[arg(long, global = true)]
    bookmarks: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum Direction {
    Push,
    Pull,
}

#[derive(Subcommand)]
enum Command {
    /// Manage backup profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Store the GitHub token for a profile
    Login {
        #[arg(long)]
        profile: String,
        /// Personal access token with the gist scope (use "-" to read from stdin)
        #[arg(long)]
        token: String,
    },

    /// Show the GitHub account a profile's token belongs to
    Whoami {
        #[arg(long)]
        profile: String,
    },

    /// Preview what a push or pull would change
    Diff {
        #[arg(long)]
        profile: String,
        #[arg(long, default_value = "push")]
        direction: Direction,
    },

    /// Upload local bookmarks to the backup
    Push {
        #[arg(long, conflicts_with = "all")]
        profile: Option<String>,
        /// Every enabled profile
        #[arg(long)]
        all: bool,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Apply the backup to local bookmarks
    Pull {
        #[arg(long, conflicts_with = "all")]
        profile: Option<String>,
        /// Every enabled profile
        #[arg(long)]
        all: bool,
        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
        /// Clear the local scope and recreate it instead of reconciling
        #[arg(long, conflicts_with = "all")]
        full_replace: bool,
    },

    /// Inspect or release the sync lock
    #[command(subcommand)]
    Lock(LockCommand),

    /// Print the local bookmark tree
    Tree,
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Add a backup profile
    Add {
        name: String,
        /// Id of an existing Gist
        #[arg(long)]
        gist: String,
        /// File inside the Gist
        #[arg(long)]
        file: Option<String>,
        /// Back up a single folder, e.g. "Bookmarks Bar/Work"
        #[arg(long)]
        folder: Option<String>,
    },

    /// List backup profiles
    List,

    /// Remove a backup profile and its stored token
    Remove { name: String },
}

#[derive(Subcommand)]
enum LockCommand {
    /// Show who holds the lock
    Status,
    /// Force the lock free
    Release,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut app = app::App::new(cli.bookmarks)?;

    match cli.command {
        Command::Profile(subcmd) => match subcmd {
            ProfileCommand::Add { name, gist, file, folder } => {
                commands::profile::run_add(&mut app, &name, &gist, file, folder, &cli.format)?;
            }
            ProfileCommand::List => commands::profile::run_list(&app, &cli.format)?,
            ProfileCommand::Remove { name } => commands::profile::run_remove(&mut app, &name)?,
        },
        Command::Login { profile, token } => {
            commands::auth::run_login(&app, &profile, &token).await?;
        }
        Command::Whoami { profile } => {
            commands::auth::run_whoami(&app, &profile, &cli.format).await?;
        }
        Command::Diff { profile, direction } => {
            commands::sync::run_diff(&app, &profile, direction, &cli.format).await?;
        }
        Command::Push { profile, all, yes } => {
            commands::sync::run_push(&mut app, profile.as_deref(), all, yes, &cli.format).await?;
        }
        Command::Pull { profile, all, yes, full_replace } => {
            commands::sync::run_pull(&mut app, profile.as_deref(), all, yes, full_replace, &cli.format).await?;
        }
        Command::Lock(subcmd) => match subcmd {
            LockCommand::Status => commands::lock::run_status(&app, &cli.format).await?,
            LockCommand::Release => commands::lock::run_release(&app).await?,
        },
        Command::Tree => commands::tree::run(&app, &cli.format)?,
    }

    Ok(())
}
