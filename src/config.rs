//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.rebalancer.toml` files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".rebalancer.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Transfer gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Valuation and threshold settings.
    #[serde(default)]
    pub valuation: ValuationConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Accounts taking part in the run.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default report file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Append-only ledger of transfer results.
    #[serde(default = "default_ledger")]
    pub ledger: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            ledger: default_ledger(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "rebalance_report.md".to_string()
}

fn default_ledger() -> String {
    "transfer_ledger.jsonl".to_string()
}

/// Transfer gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the gateway.
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Inventories fetched at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            timeout_seconds: default_timeout(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_gateway_url() -> String {
    "http://localhost:8780".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_concurrency() -> usize {
    5
}

/// How snapshots are valued and thresholds derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationConfig {
    /// Scales every common-currency item price.
    #[serde(default = "default_price_multiplier")]
    pub price_multiplier: Decimal,

    /// Units bought per batch when computing thresholds.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Marketplace fee applied on top of the threshold.
    #[serde(default = "default_tax_multiplier")]
    pub tax_multiplier: Decimal,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            price_multiplier: default_price_multiplier(),
            batch_size: default_batch_size(),
            tax_multiplier: default_tax_multiplier(),
        }
    }
}

fn default_price_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_batch_size() -> u32 {
    5
}

fn default_tax_multiplier() -> Decimal {
    Decimal::new(115, 2)
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// List every planned item in the report.
    #[serde(default)]
    pub include_items: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_items: false,
        }
    }
}

/// One account taking part in the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Login name.
    pub id: String,

    /// Wallet currency.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Trade link other accounts send items to.
    #[serde(default)]
    pub destination: Option<String>,

    /// Batches the account must be able to buy.
    #[serde(default)]
    pub threshold_units: u32,

    /// Price of one unit in the account's currency.
    #[serde(default)]
    pub unit_value: Decimal,

    /// Starts the run as the target account.
    #[serde(default)]
    pub target: bool,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.gateway_url {
            self.gateway.url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.gateway.timeout_seconds = timeout;
        }
        if let Some(concurrency) = args.concurrency {
            self.gateway.concurrency = concurrency;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(ref ledger) = args.ledger {
            self.general.ledger = ledger.display().to_string();
        }

        if args.include_items {
            self.report.include_items = true;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Log level after merging. `--quiet` beats `verbose = true` in the file.
    pub fn log_level(&self, args: &crate::cli::Args) -> tracing::Level {
        if !args.quiet && self.general.verbose {
            tracing::Level::DEBUG
        } else {
            args.log_level()
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let mut config = Config::default();
        config.accounts = vec![
            AccountConfig {
                id: "main".to_string(),
                currency: default_currency(),
                destination: Some("https://trade.example/main".to_string()),
                threshold_units: 1,
                unit_value: Decimal::new(1500, 2),
                target: true,
            },
            AccountConfig {
                id: "farm01".to_string(),
                currency: default_currency(),
                destination: Some("https://trade.example/farm01".to_string()),
                threshold_units: 1,
                unit_value: Decimal::new(1500, 2),
                target: false,
            },
        ];
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
