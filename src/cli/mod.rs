//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "threatgalaxy",
    version,
    about = "Local MISP galaxy cache with uuid, tag and keyword lookup",
    long_about = "Threatgalaxy maintains a local snapshot of the public MISP galaxy cluster corpus \
                  and serves identifier, tag and wildcard-keyword lookups over it, expanding one \
                  hop of cluster relations for graph-rendering consumers."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/threatgalaxy/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Look up a single cluster by uuid, tag name or display name
    Lookup {
        /// Cluster uuid, tag name (misp-galaxy:type="value"), or name
        selector: String,

        /// Also print one hop of related clusters in both directions
        #[arg(short, long)]
        related: bool,

        /// Show the result in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Search clusters by keyword; "%" at either end controls matching
    Search {
        /// Keyword, optionally wildcard-decorated (%suffix, prefix%)
        keyword: String,

        /// Maximum number of results to return
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List clusters that declare a relation to the given uuid
    Related {
        /// Destination cluster uuid
        uuid: String,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Refresh the local snapshot from the upstream archive
    Refresh {
        /// Rebuild even if the snapshot is within the freshness window
        #[arg(short, long)]
        force: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
