use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use std::path::PathBuf;

mod cmd;
mod config;
mod helpers;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// which profile this command should use
    #[arg(short, long, value_name = "NAME", default_value = "local")]
    profile: String,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the profile's config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    #[command(flatten)]
    Drive(DriveCmd),
}

/// Commands that operate on the profile's drive.
#[derive(Subcommand)]
enum DriveCmd {
    /// Manage the user record of this wallet
    User {
        #[command(subcommand)]
        cmd: UserCmd,
    },
    /// Request lamports on a development cluster
    Airdrop {
        /// Amount in lamports, or SOL with a `sol` suffix
        #[arg(default_value = "1sol")]
        amount: String,
    },
    /// Show the wallet balance
    Balance,
    /// Show what storing BYTES would cost on each backend
    Cost { bytes: u64 },
    /// List a folder (the top level by default)
    Ls {
        #[arg(default_value_t = 0)]
        folder: u32,
    },
    /// Create a folder
    Mkdir {
        name: String,
        #[arg(long, value_name = "ID", default_value_t = 0)]
        parent: u32,
    },
    /// Rename a folder
    RenameFolder { id: u32, name: String },
    /// Remove a folder
    Rmdir { id: u32 },
    /// Upload a local file
    Put {
        path: PathBuf,
        #[arg(long, value_name = "ID", default_value_t = 0)]
        parent: u32,
        /// private, publicRead or publicReadWrite
        #[arg(long, default_value = "private")]
        access: String,
        /// Capacity to reserve for later updates
        #[arg(long, value_name = "BYTES")]
        max_size: Option<u32>,
        /// solana, arweave or cheapest; defaults to the profile's policy
        #[arg(long)]
        backend: Option<String>,
    },
    /// Download a file
    Get {
        id: u32,
        /// Output path; defaults to the file's name in the current directory
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Change a file's name, access or content
    Update {
        id: u32,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        access: Option<String>,
        /// Replace the content with this local file
        #[arg(long, value_name = "PATH")]
        content: Option<PathBuf>,
    },
    /// Remove a file
    Rm { id: u32 },
    /// Move files and folders into another folder in one transaction
    Mv {
        #[arg(long = "file", value_name = "ID")]
        files: Vec<u32>,
        #[arg(long = "folder", value_name = "ID")]
        folders: Vec<u32>,
        #[arg(long, value_name = "ID")]
        to: u32,
    },
}

#[derive(Subcommand)]
enum UserCmd {
    /// Create the user record for this wallet
    Create,
    /// Show the user record and sign-in state
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    // Profiles live under the config dir:
    // - Default profile: ~/.config/soldrive/local.toml
    // - Others:          ~/.config/soldrive/<name>.toml
    // with the wallet keypair next to each profile.
    let dirs = ProjectDirs::from("", "", "soldrive")
        .context("failed to determine config directory path")?;
    let profile_file = dirs
        .config_dir()
        .join(&cli.profile)
        .with_extension("toml");

    match cli.cmd {
        Commands::Config { cmd } => cmd.run(&profile_file),
        Commands::Drive(cmd) => cmd::run_command(&profile_file, cmd).await,
    }
}
