//! # tinyrpc-client
//!
//! Client library for tinyrpc.
//!
//! This crate provides:
//! - Async TCP connection with a background read loop
//! - Call-id correlation, so many calls can share one connection
//! - Per-call timeouts and fail-fast on connection loss
//! - [`InvocationGateway`] for blocking calls from ordinary threads

pub mod client;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod pending;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
pub use gateway::InvocationGateway;
pub use pending::{PendingCall, PendingCallTable};
