//! Allocation planning.
//!
//! Planning is synchronous and pure: the same snapshots always produce the
//! same plan. Approval of the plan is left to an injected [`ConfirmationGate`]
//! so interactive and unattended callers share one code path.

pub mod allocation;

pub use allocation::allocate;

use crate::error::PlanError;
use crate::models::{AccountSnapshot, Plan};
use tracing::info;

/// Decides whether a computed plan may be executed.
pub trait ConfirmationGate {
    fn approve(&self, plan: &Plan) -> bool;
}

impl<F> ConfirmationGate for F
where
    F: Fn(&Plan) -> bool,
{
    fn approve(&self, plan: &Plan) -> bool {
        self(plan)
    }
}

/// Compute a plan and pass it through the gate.
///
/// Returns `Ok(None)` when the gate declines. With `autoconfirm` the gate is
/// never consulted.
pub fn plan(
    snapshots: &[AccountSnapshot],
    autoconfirm: bool,
    gate: &dyn ConfirmationGate,
) -> Result<Option<Plan>, PlanError> {
    let plan = allocate(snapshots)?;

    info!(
        "Plan ready: {} entries, {} items, {:.2} total",
        plan.entries.len(),
        plan.item_count(),
        plan.total_value()
    );

    if autoconfirm || gate.approve(&plan) {
        Ok(Some(plan))
    } else {
        info!("Plan declined");
        Ok(None)
    }
}
