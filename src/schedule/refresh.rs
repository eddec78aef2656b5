use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::BoxError;

pub type RefreshFuture = Pin<Box<dyn Future<Output = Result<String, BoxError>> + Send + 'static>>;

/// The caller-supplied refresh operation.
pub type RefreshFn = Arc<dyn Fn() -> Refreshed + Send + Sync>;

/// What a refresh operation hands back: a token it already has, a future
/// that will produce one, or a failure.
pub enum Refreshed {
    Ready(String),
    Pending(RefreshFuture),
    Failed(BoxError),
}

impl Refreshed {
    pub fn ready(token: impl Into<String>) -> Self {
        Refreshed::Ready(token.into())
    }

    pub fn pending<F, E>(future: F) -> Self
    where
        F: Future<Output = Result<String, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Refreshed::Pending(Box::pin(async move { future.await.map_err(Into::into) }))
    }

    pub fn failed(err: impl Into<BoxError>) -> Self {
        Refreshed::Failed(err.into())
    }
}

impl fmt::Debug for Refreshed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refreshed::Ready(token) => f
                .debug_struct("Ready")
                .field("len", &token.len())
                .finish(),
            Refreshed::Pending(_) => f.write_str("Pending"),
            Refreshed::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

impl From<String> for Refreshed {
    fn from(token: String) -> Self {
        Refreshed::Ready(token)
    }
}

impl From<&str> for Refreshed {
    fn from(token: &str) -> Self {
        Refreshed::Ready(token.to_owned())
    }
}

impl<E: Into<BoxError>> From<Result<String, E>> for Refreshed {
    fn from(result: Result<String, E>) -> Self {
        match result {
            Ok(token) => Refreshed::Ready(token),
            Err(err) => Refreshed::Failed(err.into()),
        }
    }
}
