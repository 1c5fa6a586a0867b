//! Greedy multi-round allocation.
//!
//! Each round fills the current target from donors taken in descending
//! native value, each donor giving its most valuable free items first.
//! Once the target's threshold is met the role moves to the account with the
//! highest snapshot value that has not been a target yet.

use crate::error::PlanError;
use crate::models::{
    AccountSnapshot, InventoryItem, Plan, Role, RoleTransition, ShortfallWarning,
    TransferPlanEntry,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// Free items of one account, most valuable first, consumed from the front.
struct FreePool<'a> {
    items: Vec<&'a InventoryItem>,
    cursor: usize,
}

impl<'a> FreePool<'a> {
    fn new(snapshot: &'a AccountSnapshot) -> Self {
        let mut items: Vec<&InventoryItem> = snapshot
            .items
            .iter()
            .filter(|i| i.is_free() && i.native_price > Decimal::ZERO)
            .collect();
        // Stable: equal prices keep inventory order.
        items.sort_by(|a, b| b.native_price.cmp(&a.native_price));

        Self { items, cursor: 0 }
    }

    fn has_items(&self) -> bool {
        self.cursor < self.items.len()
    }

    fn next_item(&mut self) -> Option<&'a InventoryItem> {
        let item = self.items.get(self.cursor).copied();
        if item.is_some() {
            self.cursor += 1;
        }
        item
    }

    fn remaining_value(&self) -> Decimal {
        self.items[self.cursor..].iter().map(|i| i.native_price).sum()
    }
}

/// Per-call planning state. Never outlives a single `plan` invocation.
struct Allocation<'a> {
    snapshots: &'a [AccountSnapshot],
    pools: Vec<FreePool<'a>>,
    /// Native value after planned receipts and donations.
    running: Vec<Decimal>,
    processed: Vec<bool>,
    /// Account indices by descending snapshot value.
    donor_order: Vec<usize>,
    entries: Vec<TransferPlanEntry>,
}

impl<'a> Allocation<'a> {
    fn new(snapshots: &'a [AccountSnapshot]) -> Self {
        let mut donor_order: Vec<usize> = (0..snapshots.len()).collect();
        donor_order.sort_by(|&a, &b| {
            snapshots[b]
                .total_value_native
                .cmp(&snapshots[a].total_value_native)
        });

        Self {
            snapshots,
            pools: snapshots.iter().map(FreePool::new).collect(),
            running: snapshots.iter().map(|s| s.total_value_native).collect(),
            processed: vec![false; snapshots.len()],
            donor_order,
            entries: Vec::new(),
        }
    }

    fn shortfall(&self, target: usize) -> Decimal {
        self.snapshots[target].threshold_value - self.running[target]
    }

    /// Fill `target` from the donors. Returns the shortfall left over.
    fn fill(&mut self, target: usize) -> Decimal {
        let snapshots = self.snapshots;
        let target_id = &snapshots[target].id;
        let mut shortfall = self.shortfall(target);

        info!(
            "Filling target {}: shortfall {:.2} {}",
            target_id, shortfall, snapshots[target].currency
        );

        let mut allocated = 0usize;
        for position in 0..self.donor_order.len() {
            if shortfall <= Decimal::ZERO {
                break;
            }

            let donor = self.donor_order[position];
            if donor == target || self.processed[donor] || !self.pools[donor].has_items() {
                continue;
            }

            let mut entry =
                TransferPlanEntry::new(snapshots[donor].id.clone(), target_id.clone());
            while shortfall > Decimal::ZERO {
                let Some(item) = self.pools[donor].next_item() else {
                    break;
                };
                shortfall -= item.native_price;
                entry.commit(item.clone());
            }

            if entry.is_empty() {
                continue;
            }

            debug!(
                "{} → {}: {} items ({:.2})",
                entry.donor,
                target_id,
                entry.items.len(),
                entry.value
            );
            allocated += entry.items.len();
            self.running[donor] -= entry.value;
            self.running[target] += entry.value;
            self.entries.push(entry);
        }

        info!("Allocated {} items to {}", allocated, target_id);
        shortfall
    }

    /// Highest snapshot value among accounts that have not been a target.
    fn next_target(&self) -> Option<usize> {
        self.donor_order.iter().copied().find(|&i| !self.processed[i])
    }

    /// Whether any account other than `target` could still donate to it.
    fn donors_remaining(&self, target: usize) -> bool {
        (0..self.snapshots.len())
            .any(|i| i != target && !self.processed[i] && self.pools[i].has_items())
    }
}

/// Turn account snapshots into an ordered transfer plan.
///
/// Exactly one snapshot must carry [`Role::Target`]. The result is fully
/// determined by the input: equal values keep their input order.
pub fn allocate(snapshots: &[AccountSnapshot]) -> Result<Plan, PlanError> {
    let targets: Vec<usize> = snapshots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.role == Role::Target)
        .map(|(i, _)| i)
        .collect();

    if targets.len() != 1 {
        return Err(PlanError::Configuration {
            found: targets.len(),
        });
    }

    let mut state = Allocation::new(snapshots);
    let mut current = targets[0];
    let mut plan = Plan::default();

    let free_total: Decimal = state.pools.iter().map(|p| p.remaining_value()).sum();
    if free_total <= Decimal::ZERO {
        info!("No free items with a price across all accounts, nothing to allocate");
        let shortfall = state.shortfall(current);
        if shortfall > Decimal::ZERO {
            plan.shortfall = Some(ShortfallWarning {
                account: snapshots[current].id.clone(),
                remaining: shortfall,
            });
        }
        return Ok(plan);
    }

    loop {
        let shortfall = state.fill(current);

        if shortfall > Decimal::ZERO {
            warn!(
                "Threshold not reached for {}: donors exhausted, still short by {:.2} {}",
                snapshots[current].id, shortfall, snapshots[current].currency
            );
            plan.shortfall = Some(ShortfallWarning {
                account: snapshots[current].id.clone(),
                remaining: shortfall,
            });
            break;
        }

        info!("Threshold met for {}", snapshots[current].id);
        state.processed[current] = true;

        let Some(next) = state.next_target() else {
            debug!("Every account has been a target");
            break;
        };

        if !state.donors_remaining(next) {
            info!("No free items left for another target");
            break;
        }

        info!(
            "Target role moves from {} to {}",
            snapshots[current].id, snapshots[next].id
        );
        plan.role_transitions.push(RoleTransition {
            from: snapshots[current].id.clone(),
            to: snapshots[next].id.clone(),
        });
        current = next;
    }

    plan.entries = state.entries.into_iter().filter(|e| !e.is_empty()).collect();
    Ok(plan)
}
