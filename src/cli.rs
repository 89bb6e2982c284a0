use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// lodestar - post-install software selection for Fedora-family systems
#[derive(Parser)]
#[command(name = "lodestar")]
#[command(about = "Select and install optional software components")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the components available in the catalog
    List {
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply a selection of components
    Apply {
        /// Component ids to install (comma-separated, as shown by `list`)
        #[arg(short, long, value_delimiter = ',', required = true)]
        select: Vec<String>,

        /// Component ids whose binary option should be switched on
        #[arg(long, value_delimiter = ',')]
        enable_option: Vec<String>,

        /// Print the execution plan without running anything
        #[arg(long)]
        dry_run: bool,

        /// Run script payloads inside this chroot instead of on the host
        #[arg(long)]
        chroot: Option<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
