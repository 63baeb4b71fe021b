//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tinyrpc_protocol::Method;
use tokio::task::JoinHandle;

/// Async client for tinyrpc.
pub struct Client {
    conn: Arc<Connection>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
            read_task: Mutex::new(None),
        }
    }

    /// Connects to the server and starts the background read loop.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await?;

        let conn = self.conn.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = conn.read_loop().await {
                tracing::debug!("read loop ended: {}", e);
            }
        });
        *self.read_task.lock() = Some(handle);
        Ok(())
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection, failing any calls still in flight.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await?;
        let task = self.read_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        Ok(())
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Number of calls awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.conn.pending_count()
    }

    /// Calls `route` using the configured request timeout.
    pub async fn call(&self, route: &str, argument: Value) -> Result<Value, ClientError> {
        let timeout = self.conn.config().request_timeout;
        self.call_with_timeout(route, argument, timeout).await
    }

    /// Calls `route` and waits at most `timeout` for the result.
    ///
    /// An error carried in the response surfaces as `ClientError::Remote`.
    pub async fn call_with_timeout(
        &self,
        route: &str,
        argument: Value,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let response = self.conn.request(route, argument, timeout).await?;
        let call_id = response.call_id;
        response
            .into_result()
            .map_err(|message| ClientError::Remote { call_id, message })
    }

    /// Calls `route` with a serializable argument and decodes the result.
    pub async fn call_json<A, R>(&self, route: &str, argument: &A) -> Result<R, ClientError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let argument = serde_json::to_value(argument)?;
        let result = self.call(route, argument).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Calls a statically typed [`Method`].
    pub async fn call_method<M: Method>(
        &self,
        argument: &M::Argument,
    ) -> Result<M::Output, ClientError> {
        self.call_json(M::ROUTE, argument).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tinyrpc_protocol::{
        FrameCodec, Message, MessageCodec, MessageKind, Response, SerializerKind,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct Hello;

    impl Method for Hello {
        const ROUTE: &'static str = "hello";
        type Argument = String;
        type Output = String;
    }

    /// Answers `hello` with `echo:<arg>` and everything else with an error.
    async fn spawn_server(serializer: SerializerKind) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let codec = MessageCodec::new(FrameCodec::default(), serializer.build());
            let mut decoder = codec.decoder(MessageKind::Request);
            let mut buf = vec![0u8; 4096];
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for message in decoder.feed(&buf[..n]).unwrap() {
                    let Message::Request(req) = message else {
                        continue;
                    };
                    let response = match req.route.as_str() {
                        "hello" => Response::ok(
                            req.call_id,
                            json!(format!("echo:{}", req.argument.as_str().unwrap_or_default())),
                        ),
                        other => Response::error(req.call_id, format!("unknown route: {}", other)),
                    };
                    let bytes = codec.encode(&Message::Response(response)).unwrap();
                    stream.write_all(&bytes).await.unwrap();
                }
            }
        });
        addr
    }

    #[test]
    fn test_client_creation() {
        let config = ConnectionConfig::new("127.0.0.1:7000".parse().unwrap());
        let client = Client::new(config);
        assert!(!client.is_connected());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_and_remote_error() {
        let addr = spawn_server(SerializerKind::Json).await;
        let client = Client::new(ConnectionConfig::new(addr));
        client.connect().await.unwrap();

        let result = client.call("hello", json!("hi")).await.unwrap();
        assert_eq!(result, json!("echo:hi"));

        let err = client.call("nope", Value::Null).await.unwrap_err();
        match err {
            ClientError::Remote { message, .. } => assert_eq!(message, "unknown route: nope"),
            other => panic!("expected Remote, got {:?}", other),
        }
        // Remote errors do not close the connection
        assert!(client.is_connected());

        client.close().await.unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_typed_calls_over_msgpack() {
        let addr = spawn_server(SerializerKind::MsgPack).await;
        let config = ConnectionConfig::new(addr).with_serializer(SerializerKind::MsgPack);
        let client = Client::new(config);
        client.connect().await.unwrap();

        let output: String = client.call_json("hello", "typed").await.unwrap();
        assert_eq!(output, "echo:typed");

        let output = client
            .call_method::<Hello>(&"method".to_string())
            .await
            .unwrap();
        assert_eq!(output, "echo:method");
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_connection() {
        let addr = spawn_server(SerializerKind::Json).await;
        let client = Arc::new(Client::new(ConnectionConfig::new(addr)));
        client.connect().await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move {
                client.call("hello", json!(format!("n{}", i))).await
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            let result = task.await.unwrap().unwrap();
            assert_eq!(result, json!(format!("echo:n{}", i)));
        }
        assert_eq!(client.pending_count(), 0);
    }
}
