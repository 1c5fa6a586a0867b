//! HTTP transfer gateway.
//!
//! The gateway owns the actual account logins and trade offers. This module
//! holds its wire types and [`GatewayClient`], the production
//! [`SessionTransport`](crate::session::SessionTransport).

pub mod client;

pub use client::GatewayClient;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Priced inventory of one account as reported by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Inventory {
    /// Wallet currency, when the gateway knows it.
    #[serde(default)]
    pub currency: Option<String>,
    /// Wallet balance in the account's own currency.
    #[serde(default)]
    pub wallet_balance: Decimal,
    /// Native currency units per common unit.
    #[serde(default = "default_exchange_rate")]
    pub exchange_rate: Decimal,
    #[serde(default)]
    pub items: Vec<PricedItem>,
    /// Set when valuing the account left a login open that can be reused.
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_exchange_rate() -> Decimal {
    Decimal::ONE
}

/// One inventory item with its market price in the common currency.
#[derive(Debug, Clone, Deserialize)]
pub struct PricedItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub price: Decimal,
    #[serde(default = "default_true")]
    pub tradable: bool,
    /// Already part of an outstanding offer.
    #[serde(default)]
    pub committed: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    account: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct OfferRequest<'a> {
    destination: &'a str,
    items: Vec<OfferItem<'a>>,
    message: String,
}

#[derive(Debug, Serialize)]
struct OfferItem<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct OfferResponse {
    offer_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_inventory_defaults() {
        let inventory: Inventory = serde_json::from_str(
            r#"{"items": [{"id": "7", "price": 2.5}, {"id": "8", "price": 1, "tradable": false}]}"#,
        )
        .unwrap();

        assert!(inventory.currency.is_none());
        assert_eq!(inventory.wallet_balance, dec!(0));
        assert_eq!(inventory.exchange_rate, dec!(1));
        assert!(inventory.session_id.is_none());
        assert!(inventory.items[0].tradable);
        assert!(!inventory.items[0].committed);
        assert!(!inventory.items[1].tradable);
    }

    #[test]
    fn test_offer_request_shape() {
        let request = OfferRequest {
            destination: "https://trade.example/main",
            items: vec![OfferItem { id: "1" }, OfferItem { id: "2" }],
            message: "rebalance".to_string(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["destination"], "https://trade.example/main");
        assert_eq!(json["items"][1]["id"], "2");
    }
}
