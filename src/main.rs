//! Rebalancer - multi-account item rebalancing
//!
//! A CLI tool that values a set of accounts, plans which items each donor
//! account should send so the target account reaches its value threshold,
//! and executes that plan through a transfer gateway.
//!
//! Exit codes:
//!   0 - Success (all transfers sent, plan declined, or nothing to do)
//!   1 - Runtime error (configuration, gateway, cancellation, etc.)
//!   2 - At least one transfer failed

mod analysis;
mod cli;
mod config;
mod error;
mod executor;
mod gateway;
mod models;
mod planner;
mod report;
mod session;
mod sink;
mod valuation;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::Config;
use error::ExecuteError;
use executor::TransferExecutor;
use gateway::GatewayClient;
use models::{AccountSnapshot, ExecutionSummary, Plan, RunMetadata, RunReport, TransferResult};
use session::{SessionHandle, SessionManager};
use sink::{LedgerSink, SinkSet};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use valuation::{FileCollector, GatewayCollector, ValuationCollector, ValuationPolicy};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so `[general].verbose` applies
    let (mut config, config_note) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(config.log_level(&args));

    info!("Rebalancer v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match config_note {
        ConfigNote::Loaded(message) => info!("{}", message),
        ConfigNote::Defaults => debug!("No config file found, using defaults"),
        ConfigNote::Unreadable(message) => warn!("Failed to load config: {}", message),
    }

    match run_rebalance(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Rebalance failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .rebalancer.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            config::CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", config::CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", config::CONFIG_FILE);
    println!("   Edit it to list your accounts, thresholds and gateway URL.");
    Ok(())
}

/// Initialize logging at the merged verbosity.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete rebalance workflow. Returns the exit code.
async fn run_rebalance(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    if config.accounts.is_empty() && args.snapshots.is_none() {
        anyhow::bail!(
            "No accounts configured. Run with --init-config to create {}",
            config::CONFIG_FILE
        );
    }

    let client = Arc::new(GatewayClient::new(
        &config.gateway.url,
        config.gateway.timeout_seconds,
    )?);

    // Step 1: Value every account
    println!("💰 Valuing {} accounts...", config.accounts.len());
    let (snapshots, source, warm) = collect_snapshots(&args, &config, &client).await?;
    print_snapshots(&snapshots);

    // Step 2: Plan and confirm
    let autoconfirm = args.yes || args.dry_run;
    let plan = match planner::plan(&snapshots, autoconfirm, &confirm_on_stdin) {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            release_unused(&client, warm).await;
            println!("\n🛑 Plan declined. Nothing was sent.");
            return Ok(0);
        }
        Err(e) => {
            release_unused(&client, warm).await;
            return Err(e.into());
        }
    };

    if autoconfirm {
        println!("\n{}", report::generate_plan_preview(&plan));
    }

    for transition in &plan.role_transitions {
        info!("Target role moved from {} to {}", transition.from, transition.to);
    }
    if let Some(ref shortfall) = plan.shortfall {
        warn!(
            "{} remains {:.2} short of its threshold",
            shortfall.account, shortfall.remaining
        );
    }

    // Step 3: Execute
    let mut cancelled = false;
    let results = if args.dry_run || plan.is_empty() {
        release_unused(&client, warm).await;
        if plan.is_empty() {
            println!("\n✅ Nothing to transfer.");
        } else {
            println!("\n🔍 Dry run: no transfers were sent.");
        }
        Vec::new()
    } else {
        println!("\n🚚 Executing {} transfers...", plan.entries.len());
        match execute_plan(&config, &client, &plan, &snapshots, warm).await {
            Ok(results) => results,
            Err(ExecuteError::Cancelled { completed }) => {
                cancelled = true;
                completed
            }
        }
    };

    // Step 4: Build and save the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let summary = ExecutionSummary::from_results(&results);

    let report = RunReport {
        metadata: RunMetadata {
            run_date: Utc::now(),
            source,
            accounts: snapshots.len(),
            dry_run: args.dry_run,
            duration_seconds: duration,
        },
        plan,
        results,
        summary: summary.clone(),
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&report, config.report.include_items)
        }
    };

    std::fs::write(&config.general.output, &output)
        .with_context(|| format!("Failed to write report to {}", config.general.output))?;

    if !args.dry_run && !report.plan.is_empty() {
        print_summary(&summary, duration);
    }
    println!(
        "\n✅ Rebalance complete! Report saved to: {}",
        config.general.output
    );

    if cancelled {
        eprintln!("\n⛔ Execution was cancelled before every transfer was attempted.");
        return Ok(1);
    }

    if summary.has_failures() {
        eprintln!(
            "\n⛔ {} of {} transfers failed (exit code 2).",
            summary.failed, summary.total
        );
        return Ok(2);
    }

    Ok(0)
}

/// Value the accounts from the snapshot file or the gateway.
async fn collect_snapshots(
    args: &Args,
    config: &Config,
    client: &Arc<GatewayClient>,
) -> Result<(Vec<AccountSnapshot>, String, Vec<SessionHandle>)> {
    let collector: Box<dyn ValuationCollector> = match args.snapshots {
        Some(ref path) => Box::new(FileCollector::new(path.clone())),
        None => Box::new(GatewayCollector::new(
            client.clone(),
            ValuationPolicy::from(&config.valuation),
            config.gateway.concurrency,
            !args.quiet,
        )),
    };

    let (snapshots, warm) =
        valuation::collect_with_sessions(collector.as_ref(), client.clone(), &config.accounts)
            .await?;
    Ok((snapshots, collector.source(), warm))
}

/// Execute a confirmed plan against the gateway.
async fn execute_plan(
    config: &Config,
    client: &Arc<GatewayClient>,
    plan: &Plan,
    snapshots: &[AccountSnapshot],
    warm: Vec<SessionHandle>,
) -> Result<Vec<TransferResult>, ExecuteError> {
    let sessions = SessionManager::with_warm(client.clone(), warm);
    debug!("{} warm sessions available", sessions.warm_sessions());

    let mut sinks = SinkSet::default();
    if !config.general.ledger.is_empty() {
        match LedgerSink::open(Path::new(&config.general.ledger)) {
            Ok(ledger) => sinks = sinks.with(ledger),
            Err(e) => warn!("Transfer ledger disabled: {:#}", e),
        }
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current transfer");
            signal_token.cancel();
        }
    });

    let mut executor = TransferExecutor::new(
        sessions,
        sinks,
        executor::destinations_from(snapshots),
        cancel,
    );

    executor.execute(&plan.entries).await
}

/// Log out sessions left open by valuation when nothing will be sent.
async fn release_unused(client: &Arc<GatewayClient>, warm: Vec<SessionHandle>) {
    if warm.is_empty() {
        return;
    }

    SessionManager::with_warm(client.clone(), warm)
        .release_warm()
        .await;
}

/// Interactive confirmation: print the plan and ask y/n on stdin.
fn confirm_on_stdin(plan: &Plan) -> bool {
    println!("\n{}", report::generate_plan_preview(plan));

    if plan.is_empty() {
        return true;
    }

    print!("Proceed with these transfers? [y/N] ");
    if std::io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }

    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Print each account's valuation.
fn print_snapshots(snapshots: &[AccountSnapshot]) {
    println!("\n📊 Account values:");
    for snapshot in snapshots {
        println!(
            "   {} [{}] total {:.2} {} | free {:.2} | threshold {:.2} | {} tradable items ({:.2})",
            snapshot.id,
            snapshot.role,
            snapshot.total_value_native,
            snapshot.currency,
            snapshot.free_value_native(),
            snapshot.threshold_value,
            snapshot.items.len(),
            snapshot.tradable_value()
        );
    }
}

/// Print the execution summary.
fn print_summary(summary: &ExecutionSummary, duration: f64) {
    println!("\n📊 Transfer Summary:");
    println!(
        "   ✅ Succeeded: {} | ❌ Failed: {}",
        summary.succeeded, summary.failed
    );
    println!(
        "   Items sent: {} of {} (value {:.2} of {:.2})",
        summary.items_transferred,
        summary.items_planned,
        summary.value_transferred,
        summary.value_planned
    );
    println!("   Duration: {:.1}s", duration);

    if !summary.pending_acceptance.is_empty() {
        println!("\n📬 Accept the incoming trades:");
        for (receiver, count) in &summary.pending_acceptance {
            let word = if *count == 1 { "trade" } else { "trades" };
            println!("   {} {} sent to {}", count, word, receiver);
        }
    }

    for failure in &summary.failures {
        let recipient = failure
            .recipient
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unassigned".to_string());
        println!(
            "   ⚠️  {} → {}: {} items failed",
            failure.donor, recipient, failure.item_count
        );
    }
}

/// How the configuration was found, logged once logging is up.
enum ConfigNote {
    Loaded(String),
    Defaults,
    Unreadable(String),
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigNote)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        let note = ConfigNote::Loaded(format!("Loaded config from: {}", config_path.display()));
        return Ok((config, note));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            let note = ConfigNote::Loaded(format!("Loaded default config from {}", config::CONFIG_FILE));
            Ok((config, note))
        }
        Ok(None) => Ok((Config::default(), ConfigNote::Defaults)),
        Err(e) => Ok((Config::default(), ConfigNote::Unreadable(format!("{:#}", e)))),
    }
}
