//! In-flight call tracking.
//!
//! Each outstanding request owns one entry keyed by its call id. The read
//! loop resolves entries as responses arrive; callers wait on the matching
//! [`PendingCall`].

use crate::error::ClientError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tinyrpc_protocol::Response;
use tokio::sync::oneshot;

/// What a waiting caller eventually receives.
pub type CallOutcome = Result<Response, ClientError>;

/// Correlates responses with the callers waiting for them.
pub struct PendingCallTable {
    inner: Mutex<TableState>,
}

struct TableState {
    next_id: u64,
    calls: HashMap<u64, oneshot::Sender<CallOutcome>>,
    /// Set once the owning connection is gone.
    closed: Option<String>,
}

/// Receiving half of a registered call.
#[derive(Debug)]
pub struct PendingCall {
    call_id: u64,
    rx: oneshot::Receiver<CallOutcome>,
}

impl PendingCall {
    pub fn call_id(&self) -> u64 {
        self.call_id
    }
}

impl PendingCallTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableState {
                next_id: 1,
                calls: HashMap::new(),
                closed: None,
            }),
        }
    }

    /// Allocates a fresh call id and the slot its response will land in.
    ///
    /// Fails with `ConnectionClosed` once [`fail_all`](Self::fail_all) has run.
    pub fn register(&self) -> Result<PendingCall, ClientError> {
        let mut state = self.inner.lock();
        if let Some(reason) = &state.closed {
            return Err(ClientError::closed(reason.clone()));
        }

        // Skip ids still outstanding after the counter wraps
        let mut call_id = state.next_id;
        while state.calls.contains_key(&call_id) {
            call_id = call_id.wrapping_add(1);
        }
        state.next_id = call_id.wrapping_add(1);

        let (tx, rx) = oneshot::channel();
        state.calls.insert(call_id, tx);
        Ok(PendingCall { call_id, rx })
    }

    /// Delivers a response to the caller registered under `call_id`.
    ///
    /// Returns `false` if no such call is pending (already resolved, timed
    /// out, or never issued); the response is dropped.
    pub fn resolve(&self, call_id: u64, response: Response) -> bool {
        let sender = self.inner.lock().calls.remove(&call_id);
        match sender {
            Some(tx) => {
                if tx.send(Ok(response)).is_err() {
                    tracing::debug!(call_id, "caller went away before its response arrived");
                }
                true
            }
            None => {
                tracing::warn!(call_id, "discarding response for unknown call id");
                false
            }
        }
    }

    /// Removes a call without resolving it.
    pub fn cancel(&self, call_id: u64) -> bool {
        self.inner.lock().calls.remove(&call_id).is_some()
    }

    /// Fails every outstanding call with `ConnectionClosed` and refuses new
    /// registrations. Returns how many calls were failed.
    ///
    /// Calling it again fails nothing and keeps the first reason.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<_> = {
            let mut state = self.inner.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.to_string());
            }
            state.calls.drain().collect()
        };

        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(ClientError::closed(reason)));
        }
        if count > 0 {
            tracing::debug!(count, reason, "failed pending calls");
        }
        count
    }

    /// Waits for `call` to be resolved, for at most `timeout`.
    ///
    /// On timeout the entry is removed so a late response cannot reach this
    /// caller, and `CallTimeout` is returned.
    pub async fn wait(&self, call: PendingCall, timeout: Duration) -> CallOutcome {
        let PendingCall { call_id, mut rx } = call;

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::closed("call abandoned")),
            Err(_) => {
                if !self.cancel(call_id) {
                    // Resolved between the deadline and the cancel
                    if let Ok(outcome) = rx.try_recv() {
                        return outcome;
                    }
                }
                tracing::debug!(call_id, ?timeout, "call timed out");
                Err(ClientError::CallTimeout { call_id, timeout })
            }
        }
    }

    /// Returns the number of calls awaiting a response.
    pub fn len(&self) -> usize {
        self.inner.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed.is_some()
    }
}

impl Default for PendingCallTable {
    fn default() -> Self {
        Self::new()
    }
}
