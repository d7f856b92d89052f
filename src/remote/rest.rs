//! PostgREST / Supabase wire mapping over reqwest.
//!
//! Tables live under `rest/v1`, auth under `auth/v1`, files under
//! `storage/v1`. Every request carries the project `apikey`; the bearer token
//! is the current session's access token or, without a session, the anon key.

use async_trait::async_trait;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{
    AuthClient, Collection, DataClient, Filter, ObjectStorage, RemoteError, Select, Session,
    SessionStore,
};

const HEADER_APIKEY: &str = "apikey";
const HEADER_PREFER: &str = "Prefer";
const HEADER_CONTENT_RANGE: &str = "Content-Range";

#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base: Url,
    anon_key: String,
    session: SessionStore,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl RestClient {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self, RemoteError> {
        let mut base = Url::parse(base_url)
            .map_err(|err| RemoteError::not_configured(format!("invalid backend url: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::not_configured(format!(
                "backend url cannot carry paths: {base}"
            )));
        }
        // Request paths are joined relative to the base, which keeps any proxy prefix.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()
            .map_err(RemoteError::transport)?;
        Ok(Self {
            client,
            base,
            anon_key: anon_key.into(),
            session: SessionStore::new(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("folio/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, RemoteError> {
        self.base
            .join(path)
            .map_err(|err| RemoteError::not_configured(format!("invalid request path: {err}")))
    }

    fn table_url(
        &self,
        collection: Collection,
        filters: &[Filter],
        extra: &[(&str, String)],
    ) -> Result<Url, RemoteError> {
        let mut url = self.url(&format!("rest/v1/{}", collection.as_str()))?;
        {
            let mut pairs = url.query_pairs_mut();
            for filter in filters {
                pairs.append_pair(&filter.column, &filter_expression(&filter.value));
            }
            for (key, value) in extra {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn bearer(&self) -> String {
        self.session
            .current()
            .map_or_else(|| self.anon_key.clone(), |session| session.access_token)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(HEADER_APIKEY, &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.bearer()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(RemoteError::transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body))
    }

    async fn rows(&self, request: RequestBuilder) -> Result<Vec<Value>, RemoteError> {
        let bytes = self
            .send(request)
            .await?
            .bytes()
            .await
            .map_err(RemoteError::transport)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_slice(&bytes).map_err(RemoteError::decode)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            row @ Value::Object(_) => Ok(vec![row]),
            other => Err(RemoteError::decode(format!(
                "expected a row array, got `{other}`"
            ))),
        }
    }
}

fn filter_expression(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(text) => format!("eq.{text}"),
        other => format!("eq.{other}"),
    }
}

/// Map an unsuccessful response to a typed error using the backend's message fields.
fn error_for_status(status: StatusCode, body: &str) -> RemoteError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|field| value.get(*field).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                body.to_string()
            }
        });

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        RemoteError::Auth { message }
    } else {
        RemoteError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

/// Total from a `Content-Range` header such as `0-9/42` or `*/0`.
fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl DataClient for RestClient {
    async fn select(
        &self,
        collection: Collection,
        query: &Select,
    ) -> Result<Vec<Value>, RemoteError> {
        let mut extra = vec![("select", "*".to_string())];
        if let Some(order) = &query.order {
            extra.push((
                "order",
                format!("{}.{}", order.column, order.direction.as_str()),
            ));
        }
        if let Some(limit) = query.limit {
            extra.push(("limit", limit.to_string()));
        }
        let url = self.table_url(collection, &query.filters, &extra)?;
        debug!(collection = %collection, url = %url, "Selecting rows");
        self.rows(self.request(Method::GET, url)).await
    }

    async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<u64, RemoteError> {
        let url = self.table_url(collection, filters, &[("select", "*".to_string())])?;
        let response = self
            .send(
                self.request(Method::HEAD, url)
                    .header(HEADER_PREFER, "count=exact"),
            )
            .await?;
        response
            .headers()
            .get(HEADER_CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| RemoteError::decode("missing or malformed Content-Range header"))
    }

    async fn insert(
        &self,
        collection: Collection,
        rows: Vec<Value>,
    ) -> Result<Vec<Value>, RemoteError> {
        let url = self.table_url(collection, &[], &[])?;
        self.rows(
            self.request(Method::POST, url)
                .header(HEADER_PREFER, "return=representation")
                .json(&Value::Array(rows)),
        )
        .await
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Value,
    ) -> Result<Vec<Value>, RemoteError> {
        let url = self.table_url(collection, filters, &[])?;
        self.rows(
            self.request(Method::PATCH, url)
                .header(HEADER_PREFER, "return=representation")
                .json(&patch),
        )
        .await
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<(), RemoteError> {
        let url = self.table_url(collection, filters, &[])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for RestClient {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, RemoteError> {
        let url = self.url(&format!("storage/v1/object/{bucket}/{path}"))?;
        self.send(
            self.request(Method::POST, url)
                .header(CONTENT_TYPE, content_type)
                .body(bytes),
        )
        .await?;
        Ok(self
            .url(&format!("storage/v1/object/public/{bucket}/{path}"))?
            .to_string())
    }
}

#[async_trait]
impl AuthClient for RestClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, RemoteError> {
        let mut url = self.url("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .send(
                self.client
                    .post(url)
                    .header(HEADER_APIKEY, &self.anon_key)
                    .json(&json!({ "email": email, "password": password })),
            )
            .await
            .map_err(|err| match err {
                // The token endpoint answers bad credentials with 400.
                RemoteError::Rejected { status: 400, message } => RemoteError::Auth { message },
                other => other,
            })?;
        let token: TokenResponse = response.json().await.map_err(RemoteError::decode)?;

        let session = Session {
            access_token: token.access_token,
            user_id: token.user.id,
            email: token.user.email,
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
        let url = self.url("auth/v1/logout")?;
        let outcome = self.send(self.request(Method::POST, url)).await;
        // The local session ends even when the backend call fails.
        self.session.set(None);
        if let Err(err) = &outcome {
            warn!(error = %err, "Backend sign-out failed; local session cleared");
        }
        outcome.map(|_| ())
    }
}
