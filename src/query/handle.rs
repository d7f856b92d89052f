use std::marker::PhantomData;
use std::sync::Weak;

use tokio::sync::mpsc;

use super::cache::Shared;
use super::error::QueryError;
use super::keys::QueryKey;
use super::state::{QueryState, QueryStatus, RawSnapshot, SubscriberId};

/// One subscriber's interest in a query.
///
/// The handle holds only a weak reference to the cache. Dropping it
/// unsubscribes; once the cache is disposed the change channel closes.
pub struct QueryHandle<T> {
    shared: Weak<Shared>,
    key: QueryKey,
    id: SubscriberId,
    enabled: bool,
    rx: mpsc::UnboundedReceiver<RawSnapshot>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> QueryHandle<T> {
    pub(crate) fn new(
        shared: Weak<Shared>,
        key: QueryKey,
        id: SubscriberId,
        enabled: bool,
        rx: mpsc::UnboundedReceiver<RawSnapshot>,
    ) -> Self {
        Self {
            shared,
            key,
            id,
            enabled,
            rx,
            _payload: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<T: Send + Sync + 'static> QueryHandle<T> {
    /// Current state of the entry. Reads as idle once the cache is gone.
    pub fn state(&self) -> QueryState<T> {
        let raw = self
            .shared
            .upgrade()
            .and_then(|shared| shared.read(&self.key))
            .unwrap_or_else(RawSnapshot::idle);
        QueryState::from_raw(&raw)
    }

    /// Next change notification, in the order changes were applied.
    ///
    /// Returns `None` after the cache has been disposed.
    pub async fn changed(&mut self) -> Option<QueryState<T>> {
        self.rx.recv().await.map(|raw| QueryState::from_raw(&raw))
    }

    /// Wait until the entry holds a result or an error.
    ///
    /// A disabled handle on an idle entry returns immediately.
    pub async fn settled(&mut self) -> QueryState<T> {
        loop {
            let current = self.state();
            match current.status {
                QueryStatus::Success | QueryStatus::Error => return current,
                QueryStatus::Idle if !self.enabled => return current,
                QueryStatus::Idle | QueryStatus::Loading => {}
            }
            if self.changed().await.is_none() {
                return self.state();
            }
        }
    }

    /// Toggle whether this subscription may trigger fetches.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), QueryError> {
        let shared = self.shared.upgrade().ok_or(QueryError::Disposed)?;
        shared.set_enabled(&self.key, self.id, enabled)?;
        self.enabled = enabled;
        Ok(())
    }
}

impl<T> Drop for QueryHandle<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(&self.key, self.id);
        }
    }
}
