//! Entry state and the snapshots handed to subscribers.

use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::keys::QueryKey;

/// Type-erased payload stored in an entry.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Type-erased fetch failure, kept as reported by the fetch function.
pub type FetchError = Arc<dyn StdError + Send + Sync>;

pub(crate) type FetchFuture = BoxFuture<'static, Result<Payload, FetchError>>;
pub(crate) type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

pub(crate) type SubscriberId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Idle => "idle",
            QueryStatus::Loading => "loading",
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
        }
    }
}

/// Untyped view of an entry, sent through subscriber channels.
#[derive(Clone)]
pub(crate) struct RawSnapshot {
    pub status: QueryStatus,
    pub data: Option<Payload>,
    pub error: Option<FetchError>,
    pub stale: bool,
    pub updated_at: Option<OffsetDateTime>,
}

impl RawSnapshot {
    pub(crate) fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            stale: false,
            updated_at: None,
        }
    }
}

/// State of one query as observed by a typed handle.
pub struct QueryState<T> {
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<FetchError>,
    pub is_stale: bool,
    pub updated_at: Option<OffsetDateTime>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            is_stale: self.is_stale,
            updated_at: self.updated_at,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QueryState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("status", &self.status)
            .field("data", &self.data)
            .field("error", &self.error.as_ref().map(|err| err.to_string()))
            .field("is_stale", &self.is_stale)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl<T: Any + Send + Sync> QueryState<T> {
    /// A payload of a different type under the same key reads as absent.
    pub(crate) fn from_raw(raw: &RawSnapshot) -> Self {
        Self {
            status: raw.status,
            data: raw
                .data
                .clone()
                .and_then(|payload| payload.downcast::<T>().ok()),
            error: raw.error.clone(),
            is_stale: raw.stale,
            updated_at: raw.updated_at,
        }
    }
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|err| err.to_string())
    }

    /// Downcast the fetch failure back to the error type the fetcher returned.
    pub fn error_as<E: StdError + 'static>(&self) -> Option<&E> {
        self.error.as_deref().and_then(|err| err.downcast_ref::<E>())
    }
}

pub(crate) struct Subscriber {
    pub enabled: bool,
    pub tx: mpsc::UnboundedSender<RawSnapshot>,
}

pub(crate) struct QueryEntry {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub data: Option<Payload>,
    pub error: Option<FetchError>,
    pub stale: bool,
    /// Invalidated again while a fetch was in flight; survives that fetch.
    pub reinvalidated: bool,
    /// Bumped by every fetch start and every direct write.
    pub generation: u64,
    /// Generation of the fetch whose result will be accepted.
    pub in_flight: Option<u64>,
    pub fetch_task: Option<AbortHandle>,
    pub fetcher: Option<Fetcher>,
    pub subscribers: HashMap<SubscriberId, Subscriber>,
    pub gc_token: Option<u64>,
    pub gc_task: Option<AbortHandle>,
    pub updated_at: Option<OffsetDateTime>,
}

impl QueryEntry {
    pub(crate) fn new(key: QueryKey) -> Self {
        Self {
            key,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            stale: false,
            reinvalidated: false,
            generation: 0,
            in_flight: None,
            fetch_task: None,
            fetcher: None,
            subscribers: HashMap::new(),
            gc_token: None,
            gc_task: None,
            updated_at: None,
        }
    }

    pub(crate) fn snapshot(&self) -> RawSnapshot {
        RawSnapshot {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            stale: self.stale,
            updated_at: self.updated_at,
        }
    }

    pub(crate) fn notify(&self) {
        let snapshot = self.snapshot();
        for subscriber in self.subscribers.values() {
            // A closed receiver belongs to a handle that is being dropped.
            let _ = subscriber.tx.send(snapshot.clone());
        }
    }

    pub(crate) fn has_enabled_subscribers(&self) -> bool {
        self.subscribers.values().any(|subscriber| subscriber.enabled)
    }

    /// No data yet, a failed or invalidated entry, and nothing already in flight.
    pub(crate) fn needs_fetch(&self) -> bool {
        self.in_flight.is_none()
            && (self.stale || matches!(self.status, QueryStatus::Idle | QueryStatus::Error))
    }

    pub(crate) fn cancel_gc(&mut self) {
        self.gc_token = None;
        if let Some(task) = self.gc_task.take() {
            task.abort();
        }
    }

    pub(crate) fn abort_tasks(&mut self) {
        self.cancel_gc();
        self.in_flight = None;
        if let Some(task) = self.fetch_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_downcasts_matching_payload() {
        let raw = RawSnapshot {
            status: QueryStatus::Success,
            data: Some(Arc::new(vec![1_u32, 2, 3]) as Payload),
            error: None,
            stale: false,
            updated_at: None,
        };

        let typed = QueryState::<Vec<u32>>::from_raw(&raw);
        assert_eq!(typed.data.as_deref(), Some(&vec![1, 2, 3]));

        let mismatched = QueryState::<String>::from_raw(&raw);
        assert!(mismatched.data.is_none());
        assert!(mismatched.is_success());
    }

    #[test]
    fn fresh_entry_needs_fetch_until_loaded() {
        let mut entry = QueryEntry::new(QueryKey::root("apps"));
        assert!(entry.needs_fetch());

        entry.in_flight = Some(1);
        assert!(!entry.needs_fetch());

        entry.in_flight = None;
        entry.status = QueryStatus::Success;
        assert!(!entry.needs_fetch());

        entry.stale = true;
        assert!(entry.needs_fetch());
    }
}
