//! Blocking invocation over the async client.
//!
//! [`InvocationGateway`] owns a small I/O runtime that drives the connection
//! and its read loop. Ordinary threads call [`invoke`](InvocationGateway::invoke)
//! and block until the matching response arrives, the call times out, or the
//! connection goes away. Any number of threads may invoke concurrently; their
//! calls are multiplexed on the single connection.

use crate::client::Client;
use crate::connection::ConnectionConfig;
use crate::error::ClientError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tinyrpc_protocol::Method;
use tokio::runtime::{Builder, Runtime};

/// Name given to the gateway's I/O threads.
pub const IO_THREAD_NAME: &str = "tinyrpc-io";

/// Synchronous call surface over one connection.
pub struct InvocationGateway {
    /// Taken only by `Drop`.
    runtime: Option<Runtime>,
    client: Client,
}

impl InvocationGateway {
    /// Starts the I/O runtime and connects to `config.addr`.
    pub fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        ensure_blocking_context()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(IO_THREAD_NAME)
            .enable_all()
            .build()?;

        let client = Client::new(config);
        runtime.block_on(client.connect())?;
        tracing::info!("Gateway connected to {}", client.connection().config().addr);

        Ok(Self {
            runtime: Some(runtime),
            client,
        })
    }

    /// Calls `route` and blocks the current thread until the outcome is known.
    ///
    /// Exactly one of the following comes back: the result value, the
    /// server's error as `Remote`, `CallTimeout` once `timeout` elapses, or
    /// `ConnectionClosed` if the connection is lost first. A response that
    /// shows up after the timeout is discarded.
    pub fn invoke(
        &self,
        route: &str,
        argument: Value,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        ensure_blocking_context()?;
        self.runtime()?
            .block_on(self.client.call_with_timeout(route, argument, timeout))
    }

    /// Like [`invoke`](Self::invoke) with the configured request timeout.
    pub fn invoke_default(&self, route: &str, argument: Value) -> Result<Value, ClientError> {
        let timeout = self.client.connection().config().request_timeout;
        self.invoke(route, argument, timeout)
    }

    /// Blocking typed call.
    pub fn invoke_json<A, R>(&self, route: &str, argument: &A) -> Result<R, ClientError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let argument = serde_json::to_value(argument)?;
        let result = self.invoke_default(route, argument)?;
        Ok(serde_json::from_value(result)?)
    }

    /// Blocking call of a statically typed [`Method`].
    pub fn invoke_method<M: Method>(&self, argument: &M::Argument) -> Result<M::Output, ClientError> {
        self.invoke_json(M::ROUTE, argument)
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Number of invocations currently waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.client.pending_count()
    }

    /// Closes the connection. Blocked invokers wake with `ConnectionClosed`.
    pub fn close(&self) -> Result<(), ClientError> {
        ensure_blocking_context()?;
        self.runtime()?.block_on(self.client.close())
    }

    fn runtime(&self) -> Result<&Runtime, ClientError> {
        self.runtime
            .as_ref()
            .ok_or_else(|| ClientError::Runtime("gateway runtime stopped".into()))
    }
}

impl Drop for InvocationGateway {
    /// Stops the I/O threads without blocking, so a gateway may be dropped
    /// anywhere, async code included. The socket closes with them.
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for InvocationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationGateway")
            .field("addr", &self.client.connection().config().addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Blocking on a runtime from inside another runtime's worker would panic.
fn ensure_blocking_context() -> Result<(), ClientError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(ClientError::Runtime(
            "blocking invocation from within an async runtime; use Client instead".into(),
        ));
    }
    Ok(())
}
