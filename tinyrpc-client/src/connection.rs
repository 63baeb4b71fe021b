//! Connection management.

use crate::error::ClientError;
use crate::pending::PendingCallTable;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tinyrpc_protocol::{
    FrameCodec, Message, MessageCodec, MessageKind, Request, Response, SerializerKind,
    DEFAULT_MAX_FRAME_SIZE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Default per-call timeout.
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    /// Largest frame payload sent or accepted.
    pub max_frame_size: u32,
    /// Payload serializer; must match the server's.
    pub serializer: SerializerKind,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            serializer: SerializerKind::default(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_max_frame_size(mut self, size: u32) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }
}

/// A client connection to a tinyrpc server.
///
/// One connection is one session: once closed, locally or by the peer, it
/// stays closed and every later call fails with `ConnectionClosed`.
pub struct Connection {
    config: ConnectionConfig,
    codec: MessageCodec,
    /// Write half of the stream (for sending requests).
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Read half, taken by `read_loop` once it starts.
    reader: Mutex<Option<OwnedReadHalf>>,
    /// Calls waiting for responses.
    pending: PendingCallTable,
    connected: AtomicBool,
    closed: AtomicBool,
    /// Flipped to `true` to stop the read loop.
    shutdown: watch::Sender<bool>,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        let codec = MessageCodec::new(
            FrameCodec::new(config.max_frame_size),
            config.serializer.build(),
        );
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            codec,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            pending: PendingCallTable::new(),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Connects to the server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::closed("connection closed"));
        }
        tracing::debug!("Connecting to {}...", self.config.addr);

        let tcp_stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::ConnectTimeout(self.config.connect_timeout)
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

        tcp_stream.set_nodelay(true).ok();

        let (read_half, write_half) = tcp_stream.into_split();
        *self.writer.lock().await = Some(write_half);
        *self.reader.lock().await = Some(read_half);

        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(
            "Connected to {} ({} payloads)",
            self.config.addr,
            self.codec.serializer_name()
        );
        Ok(())
    }

    /// Writes one request frame.
    ///
    /// Fails fast with `ConnectionClosed` once the connection is closed.
    /// Write failures are reported as `ClientError::Send`.
    pub async fn send(&self, request: Request) -> Result<(), ClientError> {
        self.ensure_open()?;

        let call_id = request.call_id;
        let encoded = self.codec.encode(&Message::Request(request))?;

        // Neither the lock wait nor a stalled write may outlive `close`
        let mut shutdown = self.shutdown.subscribe();
        let mut writer_guard = tokio::select! {
            guard = self.writer.lock() => guard,
            _ = wait_closed(&mut shutdown) => return Err(ClientError::closed("connection closed")),
        };
        let writer = writer_guard
            .as_mut()
            .ok_or_else(|| ClientError::closed("connection closed"))?;
        tokio::select! {
            result = writer.write_all(&encoded) => result.map_err(ClientError::Send)?,
            _ = wait_closed(&mut shutdown) => {
                tracing::debug!("Request id={} abandoned mid-write", call_id);
                return Err(ClientError::closed("connection closed"));
            }
        }

        tracing::debug!("Request id={} sent ({} bytes)", call_id, encoded.len());
        Ok(())
    }

    /// Sends a request and waits up to `timeout` for its response.
    ///
    /// Any number of calls may be in flight at once; responses are matched
    /// by call id regardless of arrival order.
    pub async fn request(
        &self,
        route: &str,
        argument: Value,
        timeout: Duration,
    ) -> Result<Response, ClientError> {
        self.ensure_open()?;

        let call = self.pending.register()?;
        let call_id = call.call_id();
        tracing::debug!("Sending request id={} route={}", call_id, route);

        let request = Request::new(call_id, route).with_argument(argument);
        if let Err(e) = self.send(request).await {
            self.pending.cancel(call_id);
            return Err(e);
        }

        self.pending.wait(call, timeout).await
    }

    /// Reads and dispatches responses until the connection ends.
    ///
    /// Runs as a background task. However it stops (peer close, read error,
    /// fatal protocol error, or [`close`](Self::close)), every pending call is
    /// failed before it returns.
    pub async fn read_loop(&self) -> Result<(), ClientError> {
        let mut reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or(ClientError::NotConnected)?;

        tracing::debug!("read_loop started");
        let mut decoder = self.codec.decoder(MessageKind::Response);
        let mut buf = vec![0u8; self.config.read_buffer_size];
        let mut shutdown = self.shutdown.subscribe();

        let result = loop {
            if *shutdown.borrow_and_update() {
                break Ok(());
            }

            let n = tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        tracing::debug!("read_loop: connection closed by peer");
                        break Err(ClientError::closed("connection closed by peer"));
                    }
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!("read_loop: read error: {}", e);
                        break Err(ClientError::Io(e));
                    }
                },
                _ = shutdown.changed() => break Ok(()),
            };

            tracing::debug!("read_loop: received {} bytes", n);

            // Responses ahead of a bad frame are still delivered
            decoder.push(&buf[..n]);
            let fatal = loop {
                match decoder.next_message() {
                    Ok(Some(Message::Response(response))) => {
                        tracing::debug!("read_loop: dispatching response id={}", response.call_id);
                        self.pending.resolve(response.call_id, response);
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => break None,
                    Err(e) => break Some(e),
                }
            };
            if let Some(e) = fatal {
                tracing::warn!("read_loop: closing connection on protocol error: {}", e);
                break Err(ClientError::Protocol(e));
            }
        };

        let reason = match &result {
            Ok(()) => "connection closed".to_string(),
            Err(e) => e.to_string(),
        };
        self.shutdown_internal(&reason).await;
        result
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Returns whether the connection reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the connection, failing any pending calls.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.shutdown_internal("connection closed").await;
        Ok(())
    }

    /// Returns the number of pending requests.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::closed("connection closed"));
        }
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }

    async fn shutdown_internal(&self, reason: &str) {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);

        // Waiters wake before any socket teardown
        let failed = self.pending.fail_all(reason);
        if first {
            tracing::debug!("Connection closed ({}), {} pending call(s) failed", reason, failed);
        }

        // An in-flight send sees the shutdown signal and releases the lock
        if let Some(mut writer) = self.writer.lock().await.take() {
            tracing::debug!("Shutting down writer");
            let _ = writer.shutdown().await;
        }
        let _ = self.reader.lock().await.take();
    }
}

/// Resolves once the shutdown flag is set.
async fn wait_closed(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
