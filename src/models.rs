//! Data models for the rebalancer.
//!
//! This module contains the core data structures shared by the planner,
//! the executor and the reporter: account snapshots, plan entries and
//! transfer results.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of an account (its login name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role of an account during planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Contributes items.
    #[default]
    Donor,
    /// Currently being filled up to its threshold.
    Target,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Donor => write!(f, "donor"),
            Role::Target => write!(f, "target"),
        }
    }
}

/// Whether an item can still be handed to a plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationState {
    #[default]
    Free,
    /// Already promised elsewhere (e.g. an outstanding offer).
    Committed,
}

/// A single tradable item in an account inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Transport-level identifier of the item.
    pub id: String,
    /// Human readable market name.
    #[serde(default)]
    pub name: String,
    /// Price in the common reporting currency.
    pub price: Decimal,
    /// Price in the owning account's currency.
    pub native_price: Decimal,
    /// Account that holds the item.
    pub owner: AccountId,
    #[serde(default)]
    pub state: AllocationState,
}

impl InventoryItem {
    pub fn is_free(&self) -> bool {
        self.state == AllocationState::Free
    }
}

/// Priced view of one account, taken once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub currency: String,
    /// Total value (items, untradable items and wallet) in the common currency.
    pub total_value: Decimal,
    /// Same total in the account's own currency.
    pub total_value_native: Decimal,
    /// Native value the account must hold once it is the target.
    pub threshold_value: Decimal,
    #[serde(default)]
    pub role: Role,
    /// Where other accounts send items to reach this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    /// Tradable items only.
    #[serde(default)]
    pub items: Vec<InventoryItem>,
}

impl AccountSnapshot {
    /// Snapshot of an account whose valuation failed.
    pub fn zero(
        id: AccountId,
        currency: String,
        threshold_value: Decimal,
        role: Role,
        destination: Option<String>,
    ) -> Self {
        Self {
            id,
            currency,
            total_value: Decimal::ZERO,
            total_value_native: Decimal::ZERO,
            threshold_value,
            role,
            destination,
            items: Vec::new(),
        }
    }

    /// Sum of native prices of free items.
    pub fn free_value_native(&self) -> Decimal {
        self.items
            .iter()
            .filter(|i| i.is_free())
            .map(|i| i.native_price)
            .sum()
    }

    /// Sum of common-currency prices of tradable items.
    pub fn tradable_value(&self) -> Decimal {
        self.items.iter().map(|i| i.price).sum()
    }
}

/// A committed donor to recipient transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPlanEntry {
    pub donor: AccountId,
    pub recipient: Option<AccountId>,
    pub items: Vec<InventoryItem>,
    /// Accumulated native value of `items`.
    pub value: Decimal,
}

impl TransferPlanEntry {
    pub fn new(donor: AccountId, recipient: AccountId) -> Self {
        Self {
            donor,
            recipient: Some(recipient),
            items: Vec::new(),
            value: Decimal::ZERO,
        }
    }

    pub fn commit(&mut self, item: InventoryItem) {
        self.value += item.native_price;
        self.items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Emitted whenever the target role moves to another account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTransition {
    pub from: AccountId,
    pub to: AccountId,
}

/// The last target could not be filled from the remaining donors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortfallWarning {
    pub account: AccountId,
    /// Native value still missing.
    pub remaining: Decimal,
}

/// Output of the allocation planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub entries: Vec<TransferPlanEntry>,
    pub role_transitions: Vec<RoleTransition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<ShortfallWarning>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.entries.iter().map(|e| e.items.len()).sum()
    }

    pub fn total_value(&self) -> Decimal {
        self.entries.iter().map(|e| e.value).sum()
    }
}

/// Outcome of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "Success"),
            Outcome::Failure => write!(f, "Failure"),
        }
    }
}

impl Outcome {
    /// Returns an emoji representation of the outcome.
    pub fn emoji(&self) -> &'static str {
        match self {
            Outcome::Success => "✅",
            Outcome::Failure => "❌",
        }
    }
}

/// Result of executing one plan entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub donor: AccountId,
    pub recipient: Option<AccountId>,
    pub item_count: usize,
    pub value: Decimal,
    pub outcome: Outcome,
    /// Reference returned by the transport (offer id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TransferResult {
    pub fn success(entry: &TransferPlanEntry, reference: String) -> Self {
        Self {
            donor: entry.donor.clone(),
            recipient: entry.recipient.clone(),
            item_count: entry.items.len(),
            value: entry.value,
            outcome: Outcome::Success,
            reference: Some(reference),
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failure(entry: &TransferPlanEntry, error: String) -> Self {
        Self {
            donor: entry.donor.clone(),
            recipient: entry.recipient.clone(),
            item_count: entry.items.len(),
            value: entry.value,
            outcome: Outcome::Failure,
            reference: None,
            error: Some(error),
            recorded_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// "donor → recipient" label used in logs and reports.
    pub fn route(&self) -> String {
        match &self.recipient {
            Some(r) => format!("{} → {}", self.donor, r),
            None => format!("{} → unassigned", self.donor),
        }
    }
}

/// Failed transfers between one donor and one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRoute {
    pub donor: AccountId,
    pub recipient: Option<AccountId>,
    /// Number of plan entries that failed on this route.
    pub entries: usize,
    pub item_count: usize,
    pub value: Decimal,
    /// Distinct failure reasons, in the order first seen.
    pub reasons: Vec<String>,
}

/// Summary of an execution run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Number of recorded results.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items and value of every recorded result.
    pub items_planned: usize,
    pub value_planned: Decimal,
    /// Items and value of successful results only.
    pub items_transferred: usize,
    pub value_transferred: Decimal,
    pub failures: Vec<FailedRoute>,
    /// Successful transfers waiting to be accepted, per receiving account.
    pub pending_acceptance: BTreeMap<AccountId, usize>,
}

impl ExecutionSummary {
    /// Creates a summary from a list of results.
    pub fn from_results(results: &[TransferResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            failures: crate::analysis::failed_routes(results),
            pending_acceptance: crate::analysis::pending_acceptance(results),
            ..Self::default()
        };

        for result in results {
            summary.items_planned += result.item_count;
            summary.value_planned += result.value;

            if result.is_success() {
                summary.succeeded += 1;
                summary.items_transferred += result.item_count;
                summary.value_transferred += result.value;
            } else {
                summary.failed += 1;
            }
        }

        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Metadata about a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_date: DateTime<Utc>,
    /// Gateway URL or snapshot file the valuation came from.
    pub source: String,
    pub accounts: usize,
    /// Whether execution was skipped.
    pub dry_run: bool,
    pub duration_seconds: f64,
}

/// Everything a run produced, as written to the report file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub plan: Plan,
    pub results: Vec<TransferResult>,
    pub summary: ExecutionSummary,
}
