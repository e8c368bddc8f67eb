//! CLI argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use kc_model::DEFAULT_PAGE_SIZE;
use uuid::Uuid;

use crate::config::OutputFormat;

/// Keycloak admin audit CLI: inspect and revert audited admin changes.
#[derive(Debug, Parser)]
#[command(name = "kc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Server URL (overrides config).
    #[arg(short, long, env = "KC_SERVER_URL")]
    pub server: Option<String>,

    /// Bearer token (overrides config).
    #[arg(short, long, env = "KC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Output format (overrides config).
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Change log queries and reverts.
    #[command(subcommand)]
    Audit(AuditCommand),

    /// Compute the reconciliation checksum of a JSON listing.
    Checksum(ChecksumArgs),

    /// Configuration management.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Server status check.
    Status,
}

/// Paging flags shared by the listing commands.
#[derive(Debug, Clone, Copy, Args)]
pub struct PageArgs {
    /// Zero-based page index.
    #[arg(long, default_value_t = 0)]
    pub page: u32,

    /// Page size (1-200).
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub size: u32,
}

/// Audit commands.
#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// List changes made by the authenticated caller.
    Mine {
        /// Paging.
        #[command(flatten)]
        page: PageArgs,
    },

    /// List changes in one realm.
    Realm {
        /// Realm name.
        realm: String,
        /// Paging.
        #[command(flatten)]
        page: PageArgs,
    },

    /// List changes across all realms.
    All {
        /// Paging.
        #[command(flatten)]
        page: PageArgs,
    },

    /// Show the history of one entity.
    Entity {
        /// Entity type (client, realm, role, group, idp, user).
        entity_type: String,
        /// Local entity id.
        entity_id: Uuid,
        /// Paging.
        #[command(flatten)]
        page: PageArgs,
    },

    /// Show one change record.
    Show {
        /// Record id.
        id: Uuid,
    },

    /// Check whether a change can be reverted.
    CanRevert {
        /// Record id.
        id: Uuid,
    },

    /// Undo a change.
    Revert {
        /// Record id.
        id: Uuid,
        /// Why the change is being undone.
        #[arg(long)]
        reason: String,
        /// Skip confirmation.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Kind of records in a checksum listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordKind {
    /// User representations.
    Users,
    /// Group representations.
    Groups,
}

/// Checksum arguments.
#[derive(Debug, Args)]
pub struct ChecksumArgs {
    /// Kind of records in the file.
    #[arg(value_enum)]
    pub kind: RecordKind,

    /// JSON file holding an array of entity representations.
    pub file: PathBuf,
}

/// Config commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration.
    Show,

    /// Set a configuration value.
    Set {
        /// Configuration key.
        key: String,
        /// Configuration value.
        value: String,
    },

    /// Initialize configuration interactively.
    Init,
}
