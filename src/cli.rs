//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Rebalancer - move items between accounts until the target account
/// reaches its value threshold
///
/// Values every configured account, computes a transfer plan, asks for
/// confirmation and then sends the items, one login per donor and recipient.
///
/// Examples:
///   rebalancer
///   rebalancer --yes --gateway-url http://10.0.0.5:8780
///   rebalancer --snapshots snapshots.json --dry-run
///   rebalancer --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .rebalancer.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Read account snapshots from a JSON file instead of the gateway
    #[arg(long, value_name = "FILE")]
    pub snapshots: Option<PathBuf>,

    /// Transfer gateway base URL
    #[arg(long, value_name = "URL", env = "REBALANCER_GATEWAY")]
    pub gateway_url: Option<String>,

    /// Gateway request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Number of inventories fetched concurrently
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Execute the plan without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Compute and report the plan without sending anything
    #[arg(long)]
    pub dry_run: bool,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Ledger file that every transfer result is appended to
    #[arg(long, value_name = "FILE")]
    pub ledger: Option<PathBuf>,

    /// List every planned item in the report
    #[arg(long)]
    pub include_items: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .rebalancer.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.gateway_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Gateway URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(concurrency) = self.concurrency {
            if concurrency == 0 {
                return Err("Concurrency must be at least 1".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref path) = self.snapshots {
            if !path.is_file() {
                return Err(format!("Snapshot file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
