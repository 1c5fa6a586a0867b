//! reqwest client for the transfer gateway.

use super::{
    Inventory, OfferItem, OfferRequest, OfferResponse, SessionRequest, SessionResponse,
};
use crate::error::{AuthError, TransferError};
use crate::models::{AccountId, InventoryItem};
use crate::session::{SessionHandle, SessionTransport};
use crate::valuation::InventorySource;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Non-standard status some gateways use for an expired login.
const LOGIN_TIMEOUT: u16 = 440;

/// Client for one gateway instance.
pub struct GatewayClient {
    base_url: String,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_seconds,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Describe a failed request the way users need to see it.
    fn request_failure(&self, e: &reqwest::Error) -> String {
        if e.is_timeout() {
            format!("Request timed out after {}s", self.timeout_seconds)
        } else if e.is_connect() {
            format!("Cannot connect to gateway at {}", self.base_url)
        } else {
            format!("Failed to send request: {}", e)
        }
    }
}

/// Map a non-success login response.
fn login_status_error(status: StatusCode, body: &str) -> AuthError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AuthError::Rejected(format!("{} {}", status, body).trim().to_string())
        }
        s if s.is_server_error() => AuthError::Unreachable(format!("Gateway error {}", status)),
        _ => AuthError::Rejected(format!("Unexpected gateway response {}", status)),
    }
}

/// Map a non-success offer response.
fn offer_status_error(status: StatusCode, body: &str) -> TransferError {
    let detail = format!("{} {}", status, body).trim().to_string();
    if status == StatusCode::UNAUTHORIZED || status.as_u16() == LOGIN_TIMEOUT {
        TransferError::SessionExpired(detail)
    } else {
        TransferError::Rejected(detail)
    }
}

/// A 404 on logout means the session is already gone.
fn logout_status_result(status: StatusCode) -> Result<(), TransferError> {
    if status.is_success() || status == StatusCode::NOT_FOUND {
        Ok(())
    } else {
        Err(TransferError::Rejected(format!("Logout failed with {}", status)))
    }
}

fn offer_message(items: &[InventoryItem]) -> String {
    let word = if items.len() == 1 { "item" } else { "items" };
    format!("Rebalance: {} {}", items.len(), word)
}

#[async_trait]
impl SessionTransport for GatewayClient {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn acquire(&self, account: &AccountId) -> Result<SessionHandle, AuthError> {
        let response = self
            .http_client
            .post(self.url("sessions"))
            .json(&SessionRequest {
                account: account.as_str(),
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::Timeout(self.timeout_seconds)
                } else {
                    AuthError::Unreachable(self.request_failure(&e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(login_status_error(status, &body));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Rejected(format!("Invalid login response: {}", e)))?;

        debug!("Gateway session {} opened for {}", session.session_id, account);

        Ok(SessionHandle {
            id: session.session_id,
            account: account.clone(),
        })
    }

    async fn release(&self, session: &SessionHandle) -> Result<(), TransferError> {
        let response = self
            .http_client
            .delete(self.url(&format!("sessions/{}", session.id)))
            .send()
            .await
            .map_err(|e| TransferError::Unreachable(self.request_failure(&e)))?;

        logout_status_result(response.status())
    }

    async fn send(
        &self,
        session: &SessionHandle,
        items: &[InventoryItem],
        destination: &str,
    ) -> Result<String, TransferError> {
        let request = OfferRequest {
            destination,
            items: items.iter().map(|i| OfferItem { id: &i.id }).collect(),
            message: offer_message(items),
        };

        let response = self
            .http_client
            .post(self.url(&format!("sessions/{}/offers", session.id)))
            .json(&request)
            .send()
            .await
            .map_err(|e| TransferError::Unreachable(self.request_failure(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(offer_status_error(status, &body));
        }

        let offer: OfferResponse = response
            .json()
            .await
            .map_err(|e| TransferError::Rejected(format!("Invalid offer response: {}", e)))?;

        Ok(offer.offer_id)
    }
}

#[async_trait]
impl InventorySource for GatewayClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn fetch_inventory(&self, account: &AccountId) -> Result<Inventory> {
        let response = self
            .http_client
            .get(self.url(&format!("accounts/{}/inventory", account)))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!(self.request_failure(&e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Gateway error {}: {}", status, body));
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse inventory of {}", account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_base_url_is_normalized() {
        let client = GatewayClient::new("http://localhost:8780/", 5).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8780");
        assert_eq!(client.url("sessions"), "http://localhost:8780/sessions");
    }

    #[test]
    fn test_login_status_mapping() {
        assert!(matches!(
            login_status_error(StatusCode::UNAUTHORIZED, "bad guard code"),
            AuthError::Rejected(msg) if msg.contains("bad guard code")
        ));
        assert!(matches!(
            login_status_error(StatusCode::FORBIDDEN, ""),
            AuthError::Rejected(_)
        ));
        assert!(matches!(
            login_status_error(StatusCode::BAD_GATEWAY, ""),
            AuthError::Unreachable(_)
        ));
    }

    #[test]
    fn test_offer_status_mapping() {
        assert!(offer_status_error(StatusCode::UNAUTHORIZED, "").invalidates_session());

        let login_timeout = StatusCode::from_u16(LOGIN_TIMEOUT).unwrap();
        assert!(offer_status_error(login_timeout, "").invalidates_session());

        let err = offer_status_error(StatusCode::CONFLICT, "escrow hold");
        assert!(matches!(err, TransferError::Rejected(ref msg) if msg.contains("escrow hold")));
        assert!(!err.invalidates_session());
    }

    #[test]
    fn test_logout_tolerates_missing_session() {
        assert!(logout_status_result(StatusCode::NO_CONTENT).is_ok());
        assert!(logout_status_result(StatusCode::NOT_FOUND).is_ok());
        assert!(logout_status_result(StatusCode::INTERNAL_SERVER_ERROR).is_err());
    }

    #[test]
    fn test_offer_message() {
        let item = InventoryItem {
            id: "1".to_string(),
            name: String::new(),
            price: Decimal::ONE,
            native_price: Decimal::ONE,
            owner: "a".into(),
            state: Default::default(),
        };
        assert_eq!(offer_message(&[item.clone()]), "Rebalance: 1 item");
        assert_eq!(offer_message(&[item.clone(), item]), "Rebalance: 2 items");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_maps_to_auth_error() {
        // Port 9 (discard) is closed on test machines.
        let client = GatewayClient::new("http://127.0.0.1:9", 2).unwrap();
        let err = client.acquire(&"farm01".into()).await.unwrap_err();
        assert!(matches!(err, AuthError::Unreachable(_) | AuthError::Timeout(_)));
    }
}
