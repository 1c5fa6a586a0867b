//! Account valuation.
//!
//! Turns configured accounts into [`AccountSnapshot`]s for the planner,
//! either by pricing live inventories through the gateway or by loading a
//! snapshot file.

pub mod collector;

pub use collector::{FileCollector, GatewayCollector};

use crate::config::{AccountConfig, ValuationConfig};
use crate::gateway::Inventory;
use crate::models::{AccountId, AccountSnapshot, AllocationState, InventoryItem, Role};
use crate::session::{SessionHandle, SessionManager, SessionTransport};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Produces one snapshot per configured account, in configuration order.
#[async_trait]
pub trait ValuationCollector: Send + Sync {
    /// Where the valuation comes from (URL or file path).
    fn source(&self) -> String;

    async fn collect(&self, accounts: &[AccountConfig]) -> Result<Vec<AccountSnapshot>>;

    /// Sessions left open while collecting. Each is handed out once.
    fn take_sessions(&self) -> Vec<SessionHandle> {
        Vec::new()
    }
}

/// Collect snapshots together with the sessions valuation left open.
///
/// If collection fails those sessions are logged out before the error is
/// returned, since nothing will be sent on them.
pub async fn collect_with_sessions<C, T>(
    collector: &C,
    transport: Arc<T>,
    accounts: &[AccountConfig],
) -> Result<(Vec<AccountSnapshot>, Vec<SessionHandle>)>
where
    C: ValuationCollector + ?Sized,
    T: SessionTransport,
{
    match collector.collect(accounts).await {
        Ok(snapshots) => Ok((snapshots, collector.take_sessions())),
        Err(e) => {
            let open = collector.take_sessions();
            if !open.is_empty() {
                SessionManager::with_warm(transport, open).release_warm().await;
            }
            Err(e)
        }
    }
}

/// Anything that can return a priced inventory for an account.
#[async_trait]
pub trait InventorySource: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn fetch_inventory(&self, account: &AccountId) -> Result<Inventory>;
}

/// Pricing and threshold rules applied to every account.
#[derive(Debug, Clone)]
pub struct ValuationPolicy {
    price_multiplier: Decimal,
    batch_size: u32,
    tax_multiplier: Decimal,
}

impl From<&ValuationConfig> for ValuationPolicy {
    fn from(config: &ValuationConfig) -> Self {
        Self {
            price_multiplier: config.price_multiplier,
            batch_size: config.batch_size,
            tax_multiplier: config.tax_multiplier,
        }
    }
}

impl ValuationPolicy {
    /// Native value the account must hold to buy its batches, fees included.
    pub fn threshold(&self, account: &AccountConfig) -> Decimal {
        Decimal::from(account.threshold_units)
            * Decimal::from(self.batch_size)
            * account.unit_value
            * self.tax_multiplier
    }

    fn role(account: &AccountConfig) -> Role {
        if account.target {
            Role::Target
        } else {
            Role::Donor
        }
    }

    /// Snapshot used when an account could not be valued.
    pub fn zero_snapshot(&self, account: &AccountConfig) -> AccountSnapshot {
        AccountSnapshot::zero(
            AccountId::new(account.id.as_str()),
            account.currency.clone(),
            self.threshold(account),
            Self::role(account),
            account.destination.clone(),
        )
    }

    /// Price an inventory. Untradable items count towards the totals only.
    pub fn build_snapshot(&self, account: &AccountConfig, inventory: &Inventory) -> AccountSnapshot {
        let id = AccountId::new(account.id.as_str());
        let rate = inventory.exchange_rate;

        let mut total_value = Decimal::ZERO;
        let mut total_value_native = Decimal::ZERO;
        let mut items = Vec::new();

        for priced in &inventory.items {
            let price = priced.price * self.price_multiplier;
            let native_price = (price * rate).round_dp(2);
            total_value += price;
            total_value_native += native_price;

            if priced.tradable {
                items.push(InventoryItem {
                    id: priced.id.clone(),
                    name: priced.name.clone(),
                    price,
                    native_price,
                    owner: id.clone(),
                    state: if priced.committed {
                        AllocationState::Committed
                    } else {
                        AllocationState::Free
                    },
                });
            }
        }

        total_value_native += inventory.wallet_balance;
        if !rate.is_zero() {
            total_value += inventory.wallet_balance / rate;
        }

        AccountSnapshot {
            id,
            currency: inventory
                .currency
                .clone()
                .unwrap_or_else(|| account.currency.clone()),
            total_value: total_value.round_dp(2),
            total_value_native,
            threshold_value: self.threshold(account),
            role: Self::role(account),
            destination: account.destination.clone(),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::PricedItem;
    use crate::session::mock::MockTransport;
    use rust_decimal_macros::dec;

    fn account(target: bool) -> AccountConfig {
        AccountConfig {
            id: "farm01".to_string(),
            currency: "INR".to_string(),
            destination: Some("https://trade.example/farm01".to_string()),
            threshold_units: 2,
            unit_value: dec!(100),
            target,
        }
    }

    fn priced(id: &str, price: Decimal, tradable: bool, committed: bool) -> PricedItem {
        PricedItem {
            id: id.to_string(),
            name: format!("Item {}", id),
            price,
            tradable,
            committed,
        }
    }

    #[test]
    fn test_threshold_formula() {
        let policy = ValuationPolicy::from(&ValuationConfig::default());
        // 2 units * batch of 5 * 100 * 1.15
        assert_eq!(policy.threshold(&account(false)), dec!(1150));
    }

    #[test]
    fn test_build_snapshot() {
        let config = ValuationConfig {
            price_multiplier: dec!(0.9),
            ..ValuationConfig::default()
        };
        let policy = ValuationPolicy::from(&config);
        let inventory = Inventory {
            currency: None,
            wallet_balance: dec!(40),
            exchange_rate: dec!(80),
            items: vec![
                priced("1", dec!(2), true, false),
                priced("2", dec!(1), false, false),
                priced("3", dec!(10), true, true),
            ],
            session_id: None,
        };

        let snapshot = policy.build_snapshot(&account(true), &inventory);

        assert_eq!(snapshot.role, Role::Target);
        assert_eq!(snapshot.currency, "INR");
        assert_eq!(snapshot.items.len(), 2);
        assert_eq!(snapshot.items[0].price, dec!(1.8));
        assert_eq!(snapshot.items[0].native_price, dec!(144));
        assert_eq!(snapshot.items[1].state, AllocationState::Committed);
        // 144 + 72 + 720 from items, 40 from the wallet
        assert_eq!(snapshot.total_value_native, dec!(976));
        assert_eq!(snapshot.free_value_native(), dec!(144));
        assert_eq!(snapshot.tradable_value(), dec!(10.8));
        assert_eq!(snapshot.total_value, dec!(12.2));
    }

    #[test]
    fn test_zero_snapshot_keeps_account_settings() {
        let policy = ValuationPolicy::from(&ValuationConfig::default());
        let snapshot = policy.zero_snapshot(&account(false));

        assert_eq!(snapshot.id, AccountId::from("farm01"));
        assert_eq!(snapshot.total_value_native, dec!(0));
        assert_eq!(snapshot.threshold_value, dec!(1150));
        assert!(snapshot.destination.is_some());
        assert!(snapshot.items.is_empty());
    }

    /// Leaves two sessions open, then succeeds or fails.
    struct StubCollector {
        fail: bool,
        open: std::sync::Mutex<Vec<SessionHandle>>,
    }

    impl StubCollector {
        fn new(fail: bool) -> Self {
            let open = ["farm01", "farm02"]
                .iter()
                .map(|id| SessionHandle {
                    id: format!("s-{}", id),
                    account: AccountId::from(*id),
                })
                .collect();
            Self {
                fail,
                open: std::sync::Mutex::new(open),
            }
        }
    }

    #[async_trait]
    impl ValuationCollector for StubCollector {
        fn source(&self) -> String {
            "stub".to_string()
        }

        async fn collect(&self, _accounts: &[AccountConfig]) -> Result<Vec<AccountSnapshot>> {
            if self.fail {
                anyhow::bail!("valuation aborted");
            }
            Ok(Vec::new())
        }

        fn take_sessions(&self) -> Vec<SessionHandle> {
            std::mem::take(&mut *self.open.lock().unwrap())
        }
    }

    #[tokio::test]
    async fn test_failed_collection_logs_out_open_sessions() {
        let transport = Arc::new(MockTransport::new());
        let collector = StubCollector::new(true);

        let err = collect_with_sessions(&collector, transport.clone(), &[])
            .await
            .unwrap_err();

        assert!(err.to_string().contains("valuation aborted"));
        assert_eq!(transport.release_count(), 2);
        assert!(collector.take_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_successful_collection_hands_sessions_over() {
        let transport = Arc::new(MockTransport::new());
        let collector = StubCollector::new(false);

        let (_, sessions) = collect_with_sessions(&collector, transport.clone(), &[])
            .await
            .unwrap();

        assert_eq!(sessions.len(), 2);
        assert_eq!(transport.release_count(), 0);
    }
}
