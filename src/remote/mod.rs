//! Boundary to the hosted backend-as-a-service.
//!
//! Three concerns sit behind traits: row storage ([`DataClient`]), file
//! storage ([`ObjectStorage`]) and session auth ([`AuthClient`]). Rows cross
//! the boundary as JSON objects; typed decoding happens in the application
//! layer through [`decode_rows`] and [`decode_maybe_single`].

mod memory;
mod rest;
mod session;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

pub use folio_types::Collection;
pub use memory::MemoryBackend;
pub use rest::RestClient;
pub use session::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("not authorised: {message}")]
    Auth { message: String },
    #[error("backend rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("transport error: {message}")]
    Transport { message: String },
    #[error("failed to decode backend response: {message}")]
    Decode { message: String },
    #[error("remote backend is not configured: {message}")]
    NotConfigured { message: String },
}

impl RemoteError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn transport(err: impl fmt::Display) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }

    pub fn decode(err: impl fmt::Display) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }

    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::NotConfigured {
            message: message.into(),
        }
    }
}

/// Equality condition on one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        row.get(&self.column).unwrap_or(&Value::Null) == &self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }
}

/// Row selection: equality filters, an optional order and row limit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Select {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<u32>,
}

impl Select {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait DataClient: Send + Sync {
    async fn select(&self, collection: Collection, query: &Select)
    -> Result<Vec<Value>, RemoteError>;

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, RemoteError>;

    async fn insert(
        &self,
        collection: Collection,
        rows: Vec<Value>,
    ) -> Result<Vec<Value>, RemoteError>;

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, RemoteError>;

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<(), RemoteError>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `bucket/path` and return its public URL.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, RemoteError>;
}

#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, RemoteError>;

    fn session(&self) -> Option<Session>;

    /// Receiver observing every session change; the current value is the live session.
    fn on_session_change(&self) -> watch::Receiver<Option<Session>>;

    async fn sign_out(&self) -> Result<(), RemoteError>;
}

/// The backend's three facets, shared by the application layer.
#[derive(Clone)]
pub struct Remote {
    pub data: Arc<dyn DataClient>,
    pub storage: Arc<dyn ObjectStorage>,
    pub auth: Arc<dyn AuthClient>,
}

impl Remote {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: DataClient + ObjectStorage + AuthClient + 'static,
    {
        Self {
            data: backend.clone(),
            storage: backend.clone(),
            auth: backend,
        }
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote")
            .field("signed_in", &self.auth.session().is_some())
            .finish_non_exhaustive()
    }
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, RemoteError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(RemoteError::decode))
        .collect()
}

/// First row decoded, or `None` when the selection matched nothing.
pub fn decode_maybe_single<T: DeserializeOwned>(
    rows: Vec<Value>,
) -> Result<Option<T>, RemoteError> {
    rows.into_iter()
        .next()
        .map(|row| serde_json::from_value(row).map_err(RemoteError::decode))
        .transpose()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn filter_matches_missing_column_as_null() {
        let row = json!({"slug": "pixel-notes"});
        assert!(Filter::eq("slug", "pixel-notes").matches(&row));
        assert!(Filter::eq("is_featured", Value::Null).matches(&row));
        assert!(!Filter::eq("slug", "other").matches(&row));
    }

    #[test]
    fn maybe_single_is_none_for_zero_rows() {
        let decoded: Option<Value> = decode_maybe_single(Vec::new()).expect("decodes");
        assert!(decoded.is_none());
    }

    #[test]
    fn decode_failure_maps_to_decode_error() {
        let err = decode_rows::<folio_types::AppRecord>(vec![json!({"name": 1})])
            .expect_err("bad row");
        assert!(matches!(err, RemoteError::Decode { .. }));
    }
}
