//! Result aggregation and statistics.
//!
//! This module provides utilities for grouping plan entries and transfer
//! results for the summary and the report. Nothing here mutates its input.

use crate::models::{AccountId, FailedRoute, Plan, TransferResult};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Items and value moving along one donor → recipient route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteTotal {
    pub donor: AccountId,
    pub recipient: Option<AccountId>,
    pub items: usize,
    pub value: Decimal,
}

/// Collapse plan entries into one total per route, in plan order.
pub fn route_totals(plan: &Plan) -> Vec<RouteTotal> {
    let mut totals: Vec<RouteTotal> = Vec::new();

    for entry in &plan.entries {
        match totals
            .iter_mut()
            .find(|t| t.donor == entry.donor && t.recipient == entry.recipient)
        {
            Some(total) => {
                total.items += entry.items.len();
                total.value += entry.value;
            }
            None => totals.push(RouteTotal {
                donor: entry.donor.clone(),
                recipient: entry.recipient.clone(),
                items: entry.items.len(),
                value: entry.value,
            }),
        }
    }

    totals
}

/// Items and value each recipient is planned to receive.
pub fn incoming_by_recipient(plan: &Plan) -> BTreeMap<AccountId, (usize, Decimal)> {
    let mut incoming: BTreeMap<AccountId, (usize, Decimal)> = BTreeMap::new();

    for entry in &plan.entries {
        if let Some(recipient) = &entry.recipient {
            let slot = incoming.entry(recipient.clone()).or_default();
            slot.0 += entry.items.len();
            slot.1 += entry.value;
        }
    }

    incoming
}

/// Group failed results by route, keeping the first-seen order and
/// distinct reasons.
pub fn failed_routes(results: &[TransferResult]) -> Vec<FailedRoute> {
    let mut routes: Vec<FailedRoute> = Vec::new();

    for result in results.iter().filter(|r| !r.is_success()) {
        let reason = result
            .error
            .clone()
            .unwrap_or_else(|| "unknown error".to_string());

        let route = match routes
            .iter()
            .position(|f| f.donor == result.donor && f.recipient == result.recipient)
        {
            Some(i) => &mut routes[i],
            None => {
                routes.push(FailedRoute {
                    donor: result.donor.clone(),
                    recipient: result.recipient.clone(),
                    entries: 0,
                    item_count: 0,
                    value: Decimal::ZERO,
                    reasons: Vec::new(),
                });
                let last = routes.len() - 1;
                &mut routes[last]
            }
        };

        route.entries += 1;
        route.item_count += result.item_count;
        route.value += result.value;
        if !route.reasons.contains(&reason) {
            route.reasons.push(reason);
        }
    }

    routes
}

/// Count successful transfers per receiving account.
pub fn pending_acceptance(results: &[TransferResult]) -> BTreeMap<AccountId, usize> {
    let mut counts: BTreeMap<AccountId, usize> = BTreeMap::new();

    for result in results.iter().filter(|r| r.is_success()) {
        if let Some(recipient) = &result.recipient {
            *counts.entry(recipient.clone()).or_default() += 1;
        }
    }

    counts
}

/// Distinct transport references, one per successful send.
pub fn distinct_references(results: &[TransferResult]) -> Vec<&str> {
    let mut refs: Vec<&str> = Vec::new();

    for reference in results.iter().filter_map(|r| r.reference.as_deref()) {
        if !refs.contains(&reference) {
            refs.push(reference);
        }
    }

    refs
}
