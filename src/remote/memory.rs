//! In-process backend with the hosted backend's access rule.
//!
//! Used by the test suites and by local runs without a configured backend
//! URL. Inserted rows get an `id` and, where the collection has one, a
//! `created_at` timestamp. Anonymous callers may read every collection except
//! `contact_messages` and may only write by inserting a contact message.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::query::mutex_lock;

use super::{
    AuthClient, Collection, DataClient, Direction, Filter, ObjectStorage, RemoteError, Select,
    Session, SessionStore,
};

const SOURCE: &str = "remote::memory";
const DEFAULT_PUBLIC_BASE: &str = "memory://folio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Insert,
    Write,
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<Collection, Vec<Value>>,
    objects: HashMap<String, (Bytes, String)>,
    failures: HashMap<Collection, RemoteError>,
    selects: HashMap<Collection, usize>,
}

#[derive(Debug)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    admin: Option<(String, String)>,
    session: SessionStore,
    latency: Option<Duration>,
    public_base: String,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            admin: None,
            session: SessionStore::new(),
            latency: None,
            public_base: DEFAULT_PUBLIC_BASE.to_string(),
        }
    }

    /// Accept `email` / `password` as the single admin account.
    pub fn with_admin(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin = Some((email.into(), password.into()));
        self
    }

    /// Delay every call, so callers can observe in-flight states.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Insert rows without the access check, filling `id` / `created_at`.
    pub fn seed(&self, collection: Collection, rows: Vec<Value>) -> Vec<Value> {
        let stamped: Vec<Value> = rows
            .into_iter()
            .map(|row| stamp_row(collection, row))
            .collect();
        mutex_lock(&self.tables, SOURCE, "seed")
            .rows
            .entry(collection)
            .or_default()
            .extend(stamped.iter().cloned());
        stamped
    }

    /// All rows of a collection, in insertion order.
    pub fn rows(&self, collection: Collection) -> Vec<Value> {
        mutex_lock(&self.tables, SOURCE, "rows")
            .rows
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every select on `collection` fail with `error` until cleared.
    pub fn fail_selects(&self, collection: Collection, error: RemoteError) {
        mutex_lock(&self.tables, SOURCE, "fail_selects")
            .failures
            .insert(collection, error);
    }

    pub fn clear_failures(&self) {
        mutex_lock(&self.tables, SOURCE, "clear_failures")
            .failures
            .clear();
    }

    /// Number of selects served for `collection`, failed ones included.
    pub fn select_count(&self, collection: Collection) -> usize {
        mutex_lock(&self.tables, SOURCE, "select_count")
            .selects
            .get(&collection)
            .copied()
            .unwrap_or(0)
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<(Bytes, String)> {
        mutex_lock(&self.tables, SOURCE, "object")
            .objects
            .get(&format!("{bucket}/{path}"))
            .cloned()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn authorize(&self, collection: Collection, access: Access) -> Result<(), RemoteError> {
        let public = match access {
            Access::Read => collection != Collection::ContactMessages,
            Access::Insert => collection == Collection::ContactMessages,
            Access::Write => false,
        };
        if public || self.session.current().is_some() {
            Ok(())
        } else {
            Err(RemoteError::auth(format!(
                "row-level policy denies anonymous access to {collection}"
            )))
        }
    }
}

fn has_created_at(collection: Collection) -> bool {
    matches!(
        collection,
        Collection::Apps | Collection::Projects | Collection::BlogPosts | Collection::ContactMessages
    )
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn stamp_row(collection: Collection, mut row: Value) -> Value {
    if let Value::Object(fields) = &mut row {
        if fields.get("id").is_none_or(Value::is_null) {
            fields.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        if has_created_at(collection) && fields.get("created_at").is_none_or(Value::is_null) {
            fields.insert("created_at".to_string(), Value::String(now_rfc3339()));
        }
    }
    row
}

fn matches_all(filters: &[Filter], row: &Value) -> bool {
    filters.iter().all(|filter| filter.matches(row))
}

/// Column ordering with nulls sorting after every value, as Postgres does for `asc`.
fn compare_column(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|value| !value.is_null());
    let b = b.filter(|value| !value.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::String(a), Value::String(b)) => {
            match (
                OffsetDateTime::parse(a, &Rfc3339),
                OffsetDateTime::parse(b, &Rfc3339),
            ) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            }
        }
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl DataClient for MemoryBackend {
    async fn select(
        &self,
        collection: Collection,
        query: &Select,
    ) -> Result<Vec<Value>, RemoteError> {
        self.simulate_latency().await;
        let mut tables = mutex_lock(&self.tables, SOURCE, "select");
        *tables.selects.entry(collection).or_default() += 1;
        if let Some(error) = tables.failures.get(&collection) {
            return Err(error.clone());
        }
        self.authorize(collection, Access::Read)?;

        let mut rows: Vec<Value> = tables
            .rows
            .get(&collection)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(&query.filters, row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_column(a.get(&order.column), b.get(&order.column));
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }

        debug!(collection = %collection, rows = rows.len(), "Selected rows");
        Ok(rows)
    }

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, RemoteError> {
        self.simulate_latency().await;
        self.authorize(collection, Access::Read)?;
        let tables = mutex_lock(&self.tables, SOURCE, "count");
        let count = tables.rows.get(&collection).map_or(0, |rows| {
            rows.iter().filter(|row| matches_all(filters, row)).count()
        });
        Ok(count as u64)
    }

    async fn insert(
        &self,
        collection: Collection,
        rows: Vec<Value>,
    ) -> Result<Vec<Value>, RemoteError> {
        self.simulate_latency().await;
        self.authorize(collection, Access::Insert)?;
        if let Some(row) = rows.iter().find(|row| !row.is_object()) {
            return Err(RemoteError::Rejected {
                status: 400,
                message: format!("expected an object row, got `{row}`"),
            });
        }

        let stamped: Vec<Value> = rows
            .into_iter()
            .map(|row| stamp_row(collection, row))
            .collect();
        mutex_lock(&self.tables, SOURCE, "insert")
            .rows
            .entry(collection)
            .or_default()
            .extend(stamped.iter().cloned());
        Ok(stamped)
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, RemoteError> {
        self.simulate_latency().await;
        self.authorize(collection, Access::Write)?;
        let Value::Object(patch) = patch else {
            return Err(RemoteError::Rejected {
                status: 400,
                message: "update payload must be an object".to_string(),
            });
        };

        let mut tables = mutex_lock(&self.tables, SOURCE, "update");
        let mut updated = Vec::new();
        for row in tables.rows.entry(collection).or_default().iter_mut() {
            if !matches_all(filters, row) {
                continue;
            }
            if let Value::Object(fields) = &mut *row {
                for (column, value) in &patch {
                    fields.insert(column.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<(), RemoteError> {
        self.simulate_latency().await;
        self.authorize(collection, Access::Write)?;
        mutex_lock(&self.tables, SOURCE, "delete")
            .rows
            .entry(collection)
            .or_default()
            .retain(|row| !matches_all(filters, row));
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, RemoteError> {
        self.simulate_latency().await;
        if self.session.current().is_none() {
            return Err(RemoteError::auth("storage policy denies anonymous uploads"));
        }
        mutex_lock(&self.tables, SOURCE, "upload").objects.insert(
            format!("{bucket}/{path}"),
            (bytes, content_type.to_string()),
        );
        Ok(format!(
            "{}/storage/v1/object/public/{bucket}/{path}",
            self.public_base
        ))
    }
}

#[async_trait]
impl AuthClient for MemoryBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, RemoteError> {
        self.simulate_latency().await;
        let Some((admin_email, admin_password)) = &self.admin else {
            return Err(RemoteError::auth("no account is configured"));
        };
        if admin_email != email || admin_password != password {
            return Err(RemoteError::auth("Invalid login credentials"));
        }

        let session = Session {
            access_token: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
        };
        self.session.set(Some(session.clone()));
        Ok(session)
    }

    fn session(&self) -> Option<Session> {
        self.session.current()
    }

    fn on_session_change(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.session.set(None);
        Ok(())
    }
}
