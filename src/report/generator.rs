//! Markdown report generation.
//!
//! This module renders the transfer plan (for review before execution)
//! and the full run report (plan, results and summary).

use crate::analysis::{distinct_references, incoming_by_recipient, route_totals};
use crate::models::{ExecutionSummary, Plan, RunMetadata, RunReport, TransferResult};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &RunReport, include_items: bool) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Rebalance Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_plan_section(&report.plan, include_items));

    if !report.metadata.dry_run {
        output.push_str(&generate_summary_section(&report.summary, &report.results));
        output.push_str(&generate_results_section(&report.results));
        output.push_str(&generate_failures_section(&report.summary));
        output.push_str(&generate_acceptance_section(&report.summary));
    }

    output.push_str(&generate_footer());

    output
}

/// Render just the plan, as shown before asking for confirmation.
pub fn generate_plan_preview(plan: &Plan) -> String {
    generate_plan_section(plan, false)
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &RunMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Run Date:** {}\n",
        metadata.run_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Valuation Source:** {}\n", metadata.source));
    section.push_str(&format!("- **Accounts:** {}\n", metadata.accounts));
    if metadata.dry_run {
        section.push_str("- **Mode:** dry run (nothing was sent)\n");
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the plan section.
fn generate_plan_section(plan: &Plan, include_items: bool) -> String {
    let mut section = String::new();

    section.push_str("## Transfer Plan\n\n");

    if plan.is_empty() {
        section.push_str("Nothing to transfer.\n\n");
    } else {
        section.push_str(&format!(
            "Total items to transfer: **{}** (value {:.2})\n\n",
            plan.item_count(),
            plan.total_value()
        ));

        section.push_str("| Donor | Recipient | Items | Value |\n");
        section.push_str("|:---|:---|:---:|---:|\n");
        for route in route_totals(plan) {
            let recipient = route
                .recipient
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            section.push_str(&format!(
                "| {} | {} | {} | {:.2} |\n",
                route.donor, recipient, route.items, route.value
            ));
        }
        section.push('\n');

        let incoming = incoming_by_recipient(plan);
        if incoming.len() > 1 {
            section.push_str("### Incoming per Target\n\n");
            for (recipient, (items, value)) in &incoming {
                section.push_str(&format!("- `{}`: {} items ({:.2})\n", recipient, items, value));
            }
            section.push('\n');
        }

        if include_items {
            section.push_str("### Items\n\n");
            for entry in &plan.entries {
                for item in &entry.items {
                    section.push_str(&format!(
                        "- `{}` {} ({:.2}) from {}\n",
                        item.id, item.name, item.native_price, entry.donor
                    ));
                }
            }
            section.push('\n');
        }
    }

    if !plan.role_transitions.is_empty() {
        section.push_str("### Target Changes\n\n");
        for transition in &plan.role_transitions {
            section.push_str(&format!("- {} → {}\n", transition.from, transition.to));
        }
        section.push('\n');
    }

    if let Some(ref shortfall) = plan.shortfall {
        section.push_str(&format!(
            "> ⚠️ **Shortfall:** `{}` is still {:.2} below its threshold after all donors were used.\n\n",
            shortfall.account, shortfall.remaining
        ));
    }

    section
}

/// Generate the summary section.
fn generate_summary_section(summary: &ExecutionSummary, results: &[TransferResult]) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| ✅ Succeeded | ❌ Failed | Items Sent | Value Sent | Offers |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} / {} | {:.2} / {:.2} | {} |\n\n",
        summary.succeeded,
        summary.failed,
        summary.items_transferred,
        summary.items_planned,
        summary.value_transferred,
        summary.value_planned,
        distinct_references(results).len()
    ));

    section
}

/// Generate the per-entry results table.
fn generate_results_section(results: &[TransferResult]) -> String {
    let mut section = String::new();

    section.push_str("## Results\n\n");

    if results.is_empty() {
        section.push_str("No transfers were attempted.\n\n");
        return section;
    }

    section.push_str("| | Route | Items | Value | Reference |\n");
    section.push_str("|:---:|:---|:---:|---:|:---|\n");
    for result in results {
        section.push_str(&format!(
            "| {} | {} | {} | {:.2} | {} |\n",
            result.outcome.emoji(),
            result.route(),
            result.item_count,
            result.value,
            result.reference.as_deref().unwrap_or("-")
        ));
    }
    section.push('\n');

    section
}

/// Generate the failures section.
fn generate_failures_section(summary: &ExecutionSummary) -> String {
    if summary.failures.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Failed Transfers\n\n");
    for failure in &summary.failures {
        let recipient = failure
            .recipient
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unassigned".to_string());
        section.push_str(&format!(
            "### {} → {}\n\n*Entries: {} | Items: {} | Value: {:.2}*\n\n",
            failure.donor, recipient, failure.entries, failure.item_count, failure.value
        ));
        for reason in &failure.reasons {
            section.push_str(&format!("- {}\n", reason));
        }
        section.push('\n');
    }

    section
}

/// Generate the acceptance instructions.
fn generate_acceptance_section(summary: &ExecutionSummary) -> String {
    if summary.pending_acceptance.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Awaiting Acceptance\n\n");
    for (receiver, count) in &summary.pending_acceptance {
        let word = if *count == 1 { "transfer" } else { "transfers" };
        section.push_str(&format!("- {} {} sent to `{}`\n", count, word, receiver));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    "---\n\n*Report generated by rebalancer*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
