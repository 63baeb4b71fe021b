//! Statically typed routes.
//!
//! A [`Method`] binds a route name to its argument and output types, so a
//! call site can be checked at compile time instead of going through a
//! dynamic proxy.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A remotely invocable method.
///
/// ```
/// use tinyrpc_protocol::Method;
///
/// struct Hello;
///
/// impl Method for Hello {
///     const ROUTE: &'static str = "hello";
///     type Argument = String;
///     type Output = String;
/// }
///
/// assert_eq!(Hello::ROUTE, "hello");
/// ```
pub trait Method {
    /// Route the server dispatches on.
    const ROUTE: &'static str;

    type Argument: Serialize;

    type Output: DeserializeOwned;
}
