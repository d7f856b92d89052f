//! Declarative cache of asynchronous query results.
//!
//! ## Model
//!
//! - A [`QueryKey`] names a read by intent (`["app", slug]`). Structurally
//!   equal keys share one entry, one in-flight fetch and one result.
//! - Views [`QueryCache::subscribe`] with a key and a fetch function and get
//!   a [`QueryHandle`] that exposes the entry state and an ordered stream of
//!   changes.
//! - Writes go through [`QueryCache::mutate`], which invalidates the keys
//!   (or key prefixes) the write affects. Observed entries refetch at once;
//!   unobserved ones refetch on their next subscription.
//! - Entries with no subscribers are evicted after an idle window.
//!
//! Fetch and mutation failures are passed through untouched; the cache
//! never retries.

mod cache;
mod config;
mod error;
mod handle;
mod keys;
mod lock;
mod state;

pub(crate) use lock::mutex_lock;

pub use cache::{QueryCache, QueryOptions};
pub use config::QueryCacheConfig;
pub use error::QueryError;
pub use handle::QueryHandle;
pub use keys::{IntoQueryKey, KeyPart, QueryKey};
pub use state::{FetchError, Payload, QueryState, QueryStatus};
