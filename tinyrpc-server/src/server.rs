//! TCP server implementation.

use crate::config::Config;
use crate::error::ServerError;
use crate::handler::Router;
use crate::session::{Session, SessionState};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tinyrpc_protocol::{
    FrameCodec, Message, MessageCodec, MessageKind, Request, Response, SerializerKind,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_PORT,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest accepted frame payload.
    pub max_frame_size: u32,
    /// Payload serializer.
    pub serializer: SerializerKind,
    /// Requests one connection may have executing at once.
    pub max_inflight: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            serializer: SerializerKind::default(),
            max_inflight: 64,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds the runtime configuration from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            idle_timeout: config.network.idle_timeout(),
            max_connections: config.network.max_connections,
            max_frame_size: config.protocol.max_frame_size,
            serializer: config.protocol.serializer,
            max_inflight: config.workers.max_inflight,
        }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
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

    pub fn with_max_inflight(mut self, max: usize) -> Self {
        self.max_inflight = max.max(1);
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for tinyrpc.
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
    codec: MessageCodec,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, router: Router) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let codec = MessageCodec::new(
            FrameCodec::new(config.max_frame_size),
            config.serializer.build(),
        );
        Self {
            config,
            router: Arc::new(router),
            codec,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
            local_addr: Mutex::new(None),
        }
    }

    /// Binds the configured address and runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the server on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(local_addr);

        let mut shutdown_rx = self.shutdown.subscribe();
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            "Server listening on {} ({} payloads, routes: {:?})",
            local_addr,
            self.codec.serializer_name(),
            self.router.routes()
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let router = self.router.clone();
                            let codec = self.codec.clone();
                            let stats = self.stats.clone();
                            let config = self.config.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = Self::handle_connection(
                                    tcp_stream,
                                    addr,
                                    router,
                                    codec,
                                    &config,
                                    &stats,
                                    &mut conn_shutdown,
                                )
                                .await;

                                match result {
                                    Ok(()) | Err(ServerError::ShuttingDown) => {}
                                    Err(e) => {
                                        tracing::debug!("Connection {} error: {}", addr, e);
                                        stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                    }
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Serves one connection until the peer leaves, it idles out, a fatal
    /// protocol error occurs, or the server shuts down.
    ///
    /// Requests run on the blocking pool, at most `max_inflight` at a time.
    /// Responses are written in the order handlers finish.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        router: Arc<Router>,
        codec: MessageCodec,
        config: &ServerConfig,
        stats: &ServerStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!("Client connected: {}", addr);
        stream.set_nodelay(true).ok();

        let mut session = Session::new(addr);
        let mut decoder = codec.decoder(MessageKind::Request);
        let mut buf = [0u8; 8192];

        let max_inflight = config.max_inflight.max(1);
        let permits = Arc::new(Semaphore::new(max_inflight));
        let (response_tx, mut response_rx) = mpsc::channel::<Response>(max_inflight);

        loop {
            let n = tokio::select! {
                biased;

                // Completed requests
                Some(response) = response_rx.recv() => {
                    Self::write_response(&mut stream, &codec, &mut session, response).await?;
                    continue;
                }

                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            session.set_state(SessionState::Closing);
                            return Ok(());
                        }
                        Ok(n) => {
                            tracing::debug!("[{}] Received {} bytes", addr, n);
                            session.touch();
                            n
                        }
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            session.set_state(SessionState::Closing);
                            return Err(ServerError::Io(e));
                        }
                    }
                }

                _ = tokio::time::sleep(config.idle_timeout) => {
                    if session.is_idle(config.idle_timeout) {
                        tracing::debug!("[{}] Idle timeout", addr);
                        session.set_state(SessionState::Closing);
                        return Ok(());
                    }
                    continue;
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    session.set_state(SessionState::Closing);
                    return Err(ServerError::ShuttingDown);
                }
            };

            decoder.push(&buf[..n]);
            loop {
                let request = match decoder.next_message() {
                    Ok(Some(Message::Request(request))) => request,
                    Ok(Some(_)) => continue,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("[{}] Closing connection: {}", addr, e);
                        session.set_state(SessionState::Closing);
                        // Requests decoded ahead of the bad frame still get answered
                        drop(response_tx);
                        Self::finish_in_flight(
                            &mut stream,
                            &codec,
                            &mut session,
                            &mut response_rx,
                            shutdown,
                        )
                        .await;
                        return Err(e.into());
                    }
                };
                tracing::debug!(
                    "[{}] Request: {} (id={})",
                    addr,
                    request.route,
                    request.call_id
                );
                session.record_request();
                stats.requests_total.fetch_add(1, Ordering::Relaxed);

                // Keep draining finished work while waiting for a free slot
                let permit = loop {
                    tokio::select! {
                        biased;
                        Some(response) = response_rx.recv() => {
                            Self::write_response(&mut stream, &codec, &mut session, response).await?;
                        }
                        permit = permits.clone().acquire_owned() => break permit,
                    }
                };
                let permit = permit.map_err(|_| ServerError::ShuttingDown)?;

                Self::spawn_dispatch(router.clone(), request, permit, response_tx.clone());
            }
        }
    }

    /// Writes the responses of requests already dispatched, stopping early on
    /// shutdown or a write failure.
    async fn finish_in_flight(
        stream: &mut TcpStream,
        codec: &MessageCodec,
        session: &mut Session,
        response_rx: &mut mpsc::Receiver<Response>,
        shutdown: &mut broadcast::Receiver<()>,
    ) {
        while session.in_flight() > 0 {
            tokio::select! {
                response = response_rx.recv() => {
                    let Some(response) = response else { return };
                    if let Err(e) = Self::write_response(stream, codec, session, response).await {
                        tracing::debug!("[{}] Dropping remaining responses: {}", session.remote_addr, e);
                        return;
                    }
                }
                _ = shutdown.recv() => return,
            }
        }
    }

    /// Runs one request on the blocking pool and queues its response.
    fn spawn_dispatch(
        router: Arc<Router>,
        request: Request,
        permit: OwnedSemaphorePermit,
        tx: mpsc::Sender<Response>,
    ) {
        tokio::spawn(async move {
            let call_id = request.call_id;
            let route = request.route.clone();

            let response = match tokio::task::spawn_blocking(move || router.dispatch(request)).await
            {
                Ok(response) => response,
                Err(e) if e.is_panic() => {
                    tracing::error!("Handler for '{}' panicked (id={})", route, call_id);
                    Response::error(call_id, "handler panicked")
                }
                Err(_) => Response::error(call_id, "handler cancelled"),
            };

            // Fails only once the connection is gone
            let _ = tx.send(response).await;
            drop(permit);
        });
    }

    async fn write_response(
        stream: &mut TcpStream,
        codec: &MessageCodec,
        session: &mut Session,
        response: Response,
    ) -> Result<(), ServerError> {
        let call_id = response.call_id;
        let ok = response.is_ok();

        let bytes = match codec.encode(&Message::Response(response)) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to encode response (id={}): {}", call_id, e);
                codec.encode(&Message::Response(Response::error(call_id, e.to_string())))?
            }
        };

        tracing::debug!(
            "[{}] Response: {} (id={}, {} bytes)",
            session.remote_addr,
            if ok { "OK" } else { "ERROR" },
            call_id,
            bytes.len()
        );
        stream.write_all(&bytes).await?;
        session.record_response();
        Ok(())
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, once serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}
