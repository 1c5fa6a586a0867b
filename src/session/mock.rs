//! Mock transport for testing.

use super::{SessionHandle, SessionTransport};
use crate::error::{AuthError, TransferError};
use crate::models::{AccountId, InventoryItem};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Transport call, in the order it reached the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Acquire(AccountId),
    Send {
        account: AccountId,
        destination: String,
        items: usize,
    },
    Release(AccountId),
}

pub struct MockTransport {
    events: Mutex<Vec<Event>>,
    acquire_count: AtomicUsize,
    send_count: AtomicUsize,
    release_count: AtomicUsize,
    next_id: AtomicUsize,
    fail_acquire: Mutex<HashSet<AccountId>>,
    fail_send: Mutex<HashSet<String>>,
    expire_send: Mutex<HashSet<String>>,
    /// 1-based acquire call that fails, regardless of account.
    fail_acquire_call: Mutex<Option<usize>>,
    cancel_on_send: Mutex<Option<CancellationToken>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            acquire_count: AtomicUsize::new(0),
            send_count: AtomicUsize::new(0),
            release_count: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
            fail_acquire: Mutex::new(HashSet::new()),
            fail_send: Mutex::new(HashSet::new()),
            expire_send: Mutex::new(HashSet::new()),
            fail_acquire_call: Mutex::new(None),
            cancel_on_send: Mutex::new(None),
        }
    }

    pub fn fail_acquire(&self, account: &str) {
        self.fail_acquire.lock().unwrap().insert(account.into());
    }

    /// Fail only the `n`th acquire call.
    pub fn fail_nth_acquire(&self, n: usize) {
        *self.fail_acquire_call.lock().unwrap() = Some(n);
    }

    /// Cancel `token` from inside every send, before it completes.
    pub fn cancel_during_send(&self, token: CancellationToken) {
        *self.cancel_on_send.lock().unwrap() = Some(token);
    }

    pub fn fail_send_to(&self, destination: &str) {
        self.fail_send.lock().unwrap().insert(destination.to_string());
    }

    pub fn expire_session_on_send_to(&self, destination: &str) {
        self.expire_send
            .lock()
            .unwrap()
            .insert(destination.to_string());
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn acquire_count(&self) -> usize {
        self.acquire_count.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionTransport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn acquire(&self, account: &AccountId) -> Result<SessionHandle, AuthError> {
        let call = self.acquire_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.events
            .lock()
            .unwrap()
            .push(Event::Acquire(account.clone()));

        if *self.fail_acquire_call.lock().unwrap() == Some(call) {
            return Err(AuthError::Rejected("mock login failure".to_string()));
        }
        if self.fail_acquire.lock().unwrap().contains(account) {
            return Err(AuthError::Rejected("mock login failure".to_string()));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(SessionHandle {
            id: format!("mock-{}", n),
            account: account.clone(),
        })
    }

    async fn release(&self, session: &SessionHandle) -> Result<(), TransferError> {
        self.release_count.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(Event::Release(session.account.clone()));
        Ok(())
    }

    async fn send(
        &self,
        session: &SessionHandle,
        items: &[InventoryItem],
        destination: &str,
    ) -> Result<String, TransferError> {
        let n = self.send_count.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(Event::Send {
            account: session.account.clone(),
            destination: destination.to_string(),
            items: items.len(),
        });

        if let Some(token) = self.cancel_on_send.lock().unwrap().as_ref() {
            token.cancel();
        }

        if self.expire_send.lock().unwrap().contains(destination) {
            return Err(TransferError::SessionExpired("mock expiry".to_string()));
        }
        if self.fail_send.lock().unwrap().contains(destination) {
            return Err(TransferError::Rejected("mock send failure".to_string()));
        }

        Ok(format!("offer-{}", n + 1))
    }
}
