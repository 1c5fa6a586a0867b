//! Snapshot collectors.

use super::{InventorySource, ValuationCollector, ValuationPolicy};
use crate::config::AccountConfig;
use crate::models::{AccountId, AccountSnapshot};
use crate::session::SessionHandle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Prices live inventories, a bounded number of accounts at a time.
pub struct GatewayCollector<S: InventorySource> {
    source: Arc<S>,
    policy: ValuationPolicy,
    concurrency: usize,
    show_progress: bool,
    warm: Mutex<Vec<SessionHandle>>,
}

impl<S: InventorySource> GatewayCollector<S> {
    pub fn new(source: Arc<S>, policy: ValuationPolicy, concurrency: usize, show_progress: bool) -> Self {
        Self {
            source,
            policy,
            concurrency: concurrency.max(1),
            show_progress,
            warm: Mutex::new(Vec::new()),
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }

    async fn value_account(&self, account: &AccountConfig) -> AccountSnapshot {
        let id = AccountId::new(account.id.as_str());

        match self.source.fetch_inventory(&id).await {
            Ok(inventory) => {
                if let Some(ref session_id) = inventory.session_id {
                    if let Ok(mut warm) = self.warm.lock() {
                        warm.push(SessionHandle {
                            id: session_id.clone(),
                            account: id.clone(),
                        });
                    }
                }

                let snapshot = self.policy.build_snapshot(account, &inventory);
                debug!(
                    "Valued {}: {} tradable items, {:.2} {} total",
                    id,
                    snapshot.items.len(),
                    snapshot.total_value_native,
                    snapshot.currency
                );
                snapshot
            }
            Err(e) => {
                warn!("Failed to value {}: {}. Using zero value.", id, e);
                self.policy.zero_snapshot(account)
            }
        }
    }
}

#[async_trait]
impl<S: InventorySource> ValuationCollector for GatewayCollector<S> {
    fn source(&self) -> String {
        self.source.endpoint().to_string()
    }

    async fn collect(&self, accounts: &[AccountConfig]) -> Result<Vec<AccountSnapshot>> {
        info!(
            "Valuing {} accounts via {} ({} at a time)",
            accounts.len(),
            self.source.endpoint(),
            self.concurrency
        );

        let pb = self.progress_bar(accounts.len());

        let mut snapshots = Vec::with_capacity(accounts.len());
        for chunk in accounts.chunks(self.concurrency) {
            let futures: Vec<_> = chunk
                .iter()
                .map(|account| {
                    let pb = &pb;
                    async move {
                        let snapshot = self.value_account(account).await;
                        pb.set_message(account.id.clone());
                        pb.inc(1);
                        snapshot
                    }
                })
                .collect();

            snapshots.extend(futures::future::join_all(futures).await);
        }

        pb.finish_and_clear();

        Ok(snapshots)
    }

    fn take_sessions(&self) -> Vec<SessionHandle> {
        match self.warm.lock() {
            Ok(mut warm) => std::mem::take(&mut *warm),
            Err(_) => Vec::new(),
        }
    }
}

/// Loads snapshots that were valued elsewhere.
pub struct FileCollector {
    path: PathBuf,
}

impl FileCollector {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ValuationCollector for FileCollector {
    fn source(&self) -> String {
        self.path.display().to_string()
    }

    async fn collect(&self, accounts: &[AccountConfig]) -> Result<Vec<AccountSnapshot>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot file: {}", self.path.display()))?;

        let snapshots: Vec<AccountSnapshot> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot file: {}", self.path.display()))?;

        for account in accounts {
            if !snapshots.iter().any(|s| s.id.as_str() == account.id) {
                warn!("Configured account {} is missing from {}", account.id, self.path.display());
            }
        }

        info!("Loaded {} snapshots from {}", snapshots.len(), self.path.display());
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValuationConfig;
    use crate::gateway::{Inventory, PricedItem};
    use crate::models::Role;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves one free item per account; "broken" always fails.
    struct FakeSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InventorySource for FakeSource {
        fn endpoint(&self) -> &str {
            "fake://gateway"
        }

        async fn fetch_inventory(&self, account: &AccountId) -> Result<Inventory> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if account.as_str() == "broken" {
                anyhow::bail!("Gateway error 502");
            }
            // Finish out of order to prove ordering is preserved.
            tokio::time::sleep(Duration::from_millis(20 / (n as u64 + 1))).await;

            Ok(Inventory {
                currency: Some("USD".to_string()),
                wallet_balance: Decimal::ZERO,
                exchange_rate: Decimal::ONE,
                items: vec![PricedItem {
                    id: format!("{}-1", account),
                    name: String::new(),
                    price: dec!(4),
                    tradable: true,
                    committed: false,
                }],
                session_id: Some(format!("s-{}", account)),
            })
        }
    }

    fn account(id: &str, target: bool) -> AccountConfig {
        AccountConfig {
            id: id.to_string(),
            currency: "USD".to_string(),
            destination: None,
            threshold_units: 1,
            unit_value: dec!(2),
            target,
        }
    }

    fn collector() -> GatewayCollector<FakeSource> {
        let source = Arc::new(FakeSource {
            calls: AtomicUsize::new(0),
        });
        GatewayCollector::new(source, ValuationPolicy::from(&ValuationConfig::default()), 3, false)
    }

    #[tokio::test]
    async fn test_collect_preserves_account_order() {
        let collector = collector();
        let accounts = vec![account("main", true), account("farm01", false), account("farm02", false)];

        let snapshots = collector.collect(&accounts).await.unwrap();

        let ids: Vec<&str> = snapshots.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["main", "farm01", "farm02"]);
        assert_eq!(snapshots[0].role, Role::Target);
        assert_eq!(snapshots[1].free_value_native(), dec!(4));
        assert_eq!(collector.source(), "fake://gateway");
    }

    #[tokio::test]
    async fn test_failed_account_gets_zero_snapshot() {
        let collector = collector();
        let accounts = vec![account("main", true), account("broken", false)];

        let snapshots = collector.collect(&accounts).await.unwrap();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1].total_value_native, Decimal::ZERO);
        assert!(snapshots[1].items.is_empty());
    }

    #[tokio::test]
    async fn test_open_sessions_are_handed_over_once() {
        let collector = collector();
        let accounts = vec![account("main", true), account("broken", false)];
        collector.collect(&accounts).await.unwrap();

        let sessions = collector.take_sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "s-main");
        assert!(collector.take_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_file_collector() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");
        let snapshot = ValuationPolicy::from(&ValuationConfig::default()).zero_snapshot(&account("main", true));
        std::fs::write(&path, serde_json::to_string(&vec![snapshot.clone()]).unwrap()).unwrap();

        let collector = FileCollector::new(path);
        let loaded = collector
            .collect(&[account("main", true), account("farm01", false)])
            .await
            .unwrap();

        assert_eq!(loaded, vec![snapshot]);
    }

    #[tokio::test]
    async fn test_file_collector_missing_file() {
        let collector = FileCollector::new(PathBuf::from("/definitely/not/here.json"));
        assert!(collector.collect(&[]).await.is_err());
    }
}
