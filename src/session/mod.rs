//! Per-account session lifecycle.
//!
//! A session is scoped to one recipient for sending: the transport binds
//! recipient confirmation state at login, so switching recipients means
//! releasing the session and acquiring a fresh one.

#[cfg(test)]
pub mod mock;

use crate::error::{AcquireError, AuthError, SendError, TransferError};
use crate::models::{AccountId, InventoryItem};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opaque login handle returned by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub id: String,
    pub account: AccountId,
}

/// External transport that logs accounts in and sends items.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &'static str;

    async fn acquire(&self, account: &AccountId) -> Result<SessionHandle, AuthError>;

    /// Must tolerate being called for a session that is already gone.
    async fn release(&self, session: &SessionHandle) -> Result<(), TransferError>;

    /// Send `items` to `destination`, returning the transport reference.
    async fn send(
        &self,
        session: &SessionHandle,
        items: &[InventoryItem],
        destination: &str,
    ) -> Result<String, TransferError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Active,
    Invalid,
    Released,
}

/// An acquired session. Hand it back through [`SessionManager::release`].
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    recipient: Option<AccountId>,
    state: SessionState,
}

impl Session {
    fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            recipient: None,
            state: SessionState::Active,
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.handle.account
    }

    /// Recipient this session has been used for, if any.
    pub fn recipient(&self) -> Option<&AccountId> {
        self.recipient.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn is_released(&self) -> bool {
        self.state == SessionState::Released
    }

    /// Whether sending to `recipient` needs a fresh session.
    pub fn needs_switch(&self, recipient: &AccountId) -> bool {
        self.recipient.as_ref().is_some_and(|bound| bound != recipient)
    }
}

/// Owns acquire/release against a transport.
pub struct SessionManager<T: SessionTransport> {
    transport: Arc<T>,
    warm: HashMap<AccountId, SessionHandle>,
}

impl<T: SessionTransport> SessionManager<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            warm: HashMap::new(),
        }
    }

    /// Manager that starts out holding the given warm handles.
    pub fn with_warm(transport: Arc<T>, handles: Vec<SessionHandle>) -> Self {
        let mut manager = Self::new(transport);
        for handle in handles {
            manager.adopt(handle);
        }
        manager
    }

    /// Keep an already authenticated handle for the next `acquire` of its account.
    pub fn adopt(&mut self, handle: SessionHandle) {
        debug!("Adopting warm session for {}", handle.account);
        self.warm.insert(handle.account.clone(), handle);
    }

    /// Establish a session, reusing a warm one when available. Never retries.
    pub async fn acquire(&mut self, account: &AccountId) -> Result<Session, AcquireError> {
        if let Some(handle) = self.warm.remove(account) {
            debug!("Reusing warm session for {}", account);
            return Ok(Session::new(handle));
        }

        debug!("Logging into {} via {}", account, self.transport.name());
        let handle = self
            .transport
            .acquire(account)
            .await
            .map_err(|source| AcquireError {
                account: account.clone(),
                source,
            })?;

        Ok(Session::new(handle))
    }

    /// Release a session. Safe to call more than once.
    pub async fn release(&mut self, session: &mut Session) {
        if session.is_released() {
            return;
        }

        if let Err(e) = self.transport.release(&session.handle).await {
            warn!("Error during logout for {}: {}", session.account(), e);
        }
        session.state = SessionState::Released;
        debug!("Logged out from {}", session.account());
    }

    /// Send items to `recipient`, binding the session to it.
    pub async fn send(
        &self,
        session: &mut Session,
        recipient: &AccountId,
        destination: &str,
        items: &[InventoryItem],
    ) -> Result<String, SendError> {
        if !session.is_valid() {
            return Err(SendError::SessionInvalid(session.account().clone()));
        }
        if let Some(bound) = session.recipient.as_ref().filter(|b| *b != recipient) {
            return Err(SendError::RecipientMismatch {
                account: session.account().clone(),
                bound: bound.clone(),
                requested: recipient.clone(),
            });
        }

        session.recipient = Some(recipient.clone());

        match self.transport.send(&session.handle, items, destination).await {
            Ok(reference) => Ok(reference),
            Err(e) => {
                if e.invalidates_session() {
                    session.state = SessionState::Invalid;
                }
                Err(e.into())
            }
        }
    }

    pub fn warm_sessions(&self) -> usize {
        self.warm.len()
    }

    /// Log out every warm session that was never used.
    pub async fn release_warm(&mut self) {
        for (_, handle) in self.warm.drain() {
            if let Err(e) = self.transport.release(&handle).await {
                warn!("Error releasing unused session for {}: {}", handle.account, e);
            }
        }
    }
}
