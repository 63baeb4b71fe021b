//! Session management.

use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting requests.
    Open,
    /// No longer reading; remaining work is being abandoned.
    Closing,
}

/// Server-side bookkeeping for one client connection.
///
/// Owned by the connection task.
#[derive(Debug)]
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    state: SessionState,

    /// Requests received.
    request_count: u64,

    /// Requests dispatched whose responses have not been written yet.
    in_flight: usize,

    created_at: Instant,

    last_activity: Instant,
}

impl Session {
    pub fn new(remote_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            state: SessionState::Open,
            request_count: 0,
            in_flight: 0,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Records bytes or a request arriving from the peer.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Records a dispatched request.
    pub fn record_request(&mut self) {
        self.request_count += 1;
        self.in_flight += 1;
        self.touch();
    }

    /// Records a response written back to the peer.
    pub fn record_response(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.touch();
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Returns the time since last activity.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Whether the session has been quiet for longer than `timeout` with
    /// nothing left to answer.
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.in_flight == 0 && self.idle_duration() >= timeout
    }

    /// Returns the session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 12345)
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(test_addr());
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.request_count(), 0);
        assert_eq!(session.remote_addr, test_addr());
        assert_ne!(session.id, Session::new(test_addr()).id);
    }

    #[test]
    fn test_request_accounting() {
        let mut session = Session::new(test_addr());
        session.record_request();
        session.record_request();
        assert_eq!(session.request_count(), 2);
        assert_eq!(session.in_flight(), 2);

        session.record_response();
        assert_eq!(session.in_flight(), 1);
        session.record_response();
        session.record_response();
        assert_eq!(session.in_flight(), 0);
        assert_eq!(session.request_count(), 2);
    }

    #[test]
    fn test_idle_requires_no_work_in_flight() {
        let mut session = Session::new(test_addr());
        assert!(session.is_idle(Duration::ZERO));

        session.record_request();
        assert!(!session.is_idle(Duration::ZERO));

        session.record_response();
        assert!(session.is_idle(Duration::ZERO));
        assert!(!session.is_idle(Duration::from_secs(3600)));
    }
}
