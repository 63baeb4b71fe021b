//! # tinyrpc-server
//!
//! TCP server for tinyrpc.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - Frame decoding and request dispatch by route
//! - Handlers on the blocking worker pool, bounded per connection
//! - Session bookkeeping and server statistics
//! - YAML and environment configuration

pub mod config;
pub mod error;
pub mod handler;
pub mod server;
pub mod session;

pub use config::{Config, ConfigError, NetworkConfig, ProtocolConfig, WorkerConfig};
pub use error::ServerError;
pub use handler::{HandlerError, RequestHandler, Router};
pub use server::{Server, ServerConfig, ServerStats};
pub use session::{Session, SessionState};
