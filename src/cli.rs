//! Command-line interface definitions and parsing
//!
//! This module defines the CLI structure for slugshot using the `clap` crate.
//! Every command maps onto one library operation; the handlers live in
//! `main.rs`.
//!
//! # Commands
//!
//! - **import**: Copy files into the storage root and register them
//! - **item**: Create, list, show and retitle content items
//! - **save**: Raise a content-saved event (renames the featured image)
//! - **regenerate**: Rebuild attachment metadata and WebP siblings
//! - **bulk-rename**: Rename every eligible featured image in batches
//! - **update**: Query the release registry
//! - **settings**, **notices**: Option flags and persistent notices
//! - **token**, **serve-request**: Scoped tokens and raw endpoint requests
//!
//! # Examples
//!
//! ```no_run
//! use slugshot::cli::{Cli, Commands};
//!
//! let cli = Cli::parse_args();
//! if let Commands::BulkRename { yes, .. } = cli.command {
//!     println!("unattended: {yes}");
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::library::ContentStatus;

fn parse_status(s: &str) -> Result<ContentStatus, String> {
    s.parse().map_err(|e: crate::library::LibraryError| e.to_string())
}

/// Main CLI structure for parsing command-line arguments
#[derive(Parser, Debug)]
#[command(name = "slugshot")]
#[command(about = "Name featured images after their content", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Use this config file instead of the default (created with defaults if missing)
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Suppress informational output (only print results)
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// Log debug output to stderr
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Parse command-line arguments
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Copy files into the storage root and register them as attachments
    #[command(visible_alias = "i")]
    Import {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Manage content items
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },

    /// Save an item, renaming its featured image if enabled
    Save {
        #[arg(value_name = "ITEM_ID")]
        id: u64,

        /// Treat the save as an autosave
        #[arg(long)]
        autosave: bool,

        /// Treat the save as a revision
        #[arg(long)]
        revision: bool,
    },

    /// Regenerate metadata (and WebP siblings) for attachments
    Regenerate {
        #[arg(value_name = "ATTACHMENT_ID", required = true)]
        ids: Vec<u64>,
    },

    /// Rename the featured image of every eligible item
    #[command(visible_alias = "bulk")]
    BulkRename {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,

        /// User the bulk requests are made as
        #[arg(long, default_value = "admin")]
        user: String,
    },

    /// Print the URL to serve for an attachment
    Src {
        #[arg(value_name = "ATTACHMENT_ID")]
        id: u64,

        /// URL of the size being rendered (defaults to the original)
        #[arg(value_name = "URL")]
        url: Option<String>,
    },

    /// Check the release registry for updates
    Update {
        #[command(subcommand)]
        command: UpdateCommands,
    },

    /// Manage option flags
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },

    /// Show or dismiss persistent notices
    Notices {
        #[command(subcommand)]
        command: NoticesCommands,
    },

    /// Mint a token for an endpoint action
    Token {
        /// `prepare_bulk` or `process_bulk`
        #[arg(value_name = "ACTION")]
        action: String,

        #[arg(long, default_value = "admin")]
        user: String,
    },

    /// Dispatch a JSON request to the endpoints and print the response
    ServeRequest {
        /// Request body; read from stdin when omitted
        #[arg(value_name = "JSON")]
        request: Option<String>,

        #[arg(long, default_value = "admin")]
        user: String,

        /// Make the request without the library management capability
        #[arg(long)]
        unprivileged: bool,
    },
}

/// Content item subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ItemCommands {
    /// Create an item
    Add {
        title: String,

        #[arg(short = 's', long, default_value = "draft", value_parser = parse_status)]
        status: ContentStatus,

        /// Featured image
        #[arg(long = "image", value_name = "ATTACHMENT_ID")]
        image: Option<u64>,
    },

    /// List items
    #[command(visible_alias = "ls")]
    List,

    /// Show an item and its featured image
    Show {
        #[arg(value_name = "ITEM_ID")]
        id: u64,
    },

    /// Change an item's title and save it
    Retitle {
        #[arg(value_name = "ITEM_ID")]
        id: u64,

        title: String,
    },
}

/// Release registry subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum UpdateCommands {
    /// Report whether a newer release exists
    Check {
        /// Ignore the cached release
        #[arg(long)]
        refresh: bool,
    },

    /// Show details of the latest release
    Info,

    /// Show whether unattended updates are allowed
    Auto,
}

/// Option flag subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommands {
    /// Print a flag
    Get {
        #[arg(value_name = "KEY")]
        key: String,
    },

    /// Set a flag (`1`/`0`, `true`/`false`, `on`/`off`)
    Set {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// List all flags
    #[command(visible_alias = "ls")]
    List,
}

/// Notice subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum NoticesCommands {
    #[command(visible_alias = "ls")]
    List,

    Clear,
}
