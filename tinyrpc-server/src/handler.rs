//! Request handlers and route dispatch.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tinyrpc_protocol::{Method, Request, Response};

/// Error a handler reports back to its caller.
///
/// The display text becomes the `error` field of the response.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Application logic behind a route.
///
/// Handlers run on the blocking worker pool and may block freely.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, argument: Value) -> Result<Value, HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, argument: Value) -> Result<Value, HandlerError> {
        self(argument)
    }
}

/// Maps route names to handlers.
#[derive(Clone, Default)]
pub struct Router {
    routes: HashMap<String, Arc<dyn RequestHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a closure under `route`, replacing any previous handler.
    pub fn route<F>(self, route: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.handler(route, handler)
    }

    /// Registers any [`RequestHandler`] under `route`.
    pub fn handler(mut self, route: impl Into<String>, handler: impl RequestHandler) -> Self {
        self.routes.insert(route.into(), Arc::new(handler));
        self
    }

    /// Registers a typed handler for a [`Method`].
    pub fn method<M, F>(self, handler: F) -> Self
    where
        M: Method,
        M::Argument: DeserializeOwned,
        M::Output: Serialize,
        F: Fn(M::Argument) -> Result<M::Output, HandlerError> + Send + Sync + 'static,
    {
        self.route(M::ROUTE, move |argument: Value| {
            let argument: M::Argument = serde_json::from_value(argument)
                .map_err(|e| HandlerError::InvalidArgument(e.to_string()))?;
            let output = handler(argument)?;
            serde_json::to_value(output).map_err(|e| HandlerError::failed(e.to_string()))
        })
    }

    /// Returns whether `route` has a handler.
    pub fn contains(&self, route: &str) -> bool {
        self.routes.contains_key(route)
    }

    /// Registered route names, sorted.
    pub fn routes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the handler for `request` and builds its response.
    ///
    /// Unknown routes and handler errors become error responses; this never
    /// fails the connection.
    pub fn dispatch(&self, request: Request) -> Response {
        let Request {
            call_id,
            route,
            argument,
        } = request;

        let Some(handler) = self.routes.get(&route) else {
            tracing::debug!("Unknown route '{}' (id={})", route, call_id);
            return Response::error(call_id, format!("unknown route: {}", route));
        };

        match handler.handle(argument) {
            Ok(result) => Response::ok(call_id, result),
            Err(e) => {
                tracing::debug!("Handler for '{}' failed (id={}): {}", route, call_id, e);
                Response::error(call_id, e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .finish()
    }
}
