//! JSON HTTP surface: public pages, the gated admin console and shared helpers.

mod admin;
mod middleware;
mod public;

use std::{future::IntoFuture, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Notify};
use tracing::{info, warn};

use crate::{
    application::{
        AuthGuard, Commands, Queries,
        error::{AppError, ErrorReport},
        view::ViewState,
    },
    infra::error::InfraError,
    query::{QueryCache, QueryError, QueryHandle, QueryState},
    remote::Remote,
};

pub use admin::build_admin_router;
pub use public::build_public_router;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub queries: Queries,
    pub commands: Commands,
    pub guard: AuthGuard,
    pub admin_prefix: Arc<str>,
}

impl AppState {
    pub fn new(cache: QueryCache, remote: Remote, admin_prefix: &str) -> Self {
        Self {
            queries: Queries::new(cache.clone(), Arc::clone(&remote.data)),
            guard: AuthGuard::new(Arc::clone(&remote.auth)),
            commands: Commands::new(cache, remote),
            admin_prefix: Arc::from(admin_prefix),
        }
    }
}

/// Full application router: public pages plus the admin console under its prefix.
pub fn build_router(state: AppState) -> Router {
    let prefix = state.admin_prefix.to_string();
    build_public_router()
        .nest(&prefix, build_admin_router(state.clone()))
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::log_responses))
        .layer(axum::middleware::from_fn(middleware::set_request_context))
}

/// Subscribe, wait for the first settled state, then let the handle go.
///
/// The entry stays cached for the idle window, so the next request within it
/// is served without a fetch unless a write invalidated it.
pub(crate) async fn settle<T>(
    handle: Result<QueryHandle<T>, QueryError>,
) -> Result<QueryState<T>, AppError>
where
    T: Send + Sync + 'static,
{
    let mut handle = handle?;
    Ok(handle.settled().await)
}

/// Status for a page whose main content is `view`.
pub(crate) fn view_status<T>(view: &ViewState<T>) -> StatusCode {
    match view {
        ViewState::NotFound => StatusCode::NOT_FOUND,
        ViewState::Failed { .. } => StatusCode::BAD_GATEWAY,
        ViewState::Loading | ViewState::Empty | ViewState::Ready(_) => StatusCode::OK,
    }
}

/// JSON response for a page, carrying an error report when its main view failed.
pub(crate) fn page_response<T, B>(source: &'static str, main: &ViewState<T>, body: B) -> Response
where
    B: Serialize,
{
    let status = view_status(main);
    let mut response = (status, Json(body)).into_response();
    match main {
        ViewState::Failed { message, .. } => {
            ErrorReport::from_message(source, status, message.clone()).attach(&mut response);
        }
        ViewState::NotFound => {
            ErrorReport::from_message(source, status, "record not found").attach(&mut response);
        }
        _ => {}
    }
    response
}

/// Serve `router` until ctrl-c, then drain for at most `grace`.
pub async fn serve(listener: TcpListener, router: Router, grace: Duration) -> Result<(), AppError> {
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(target = "folio::http", %addr, "HTTP server listening");

    let draining = Arc::new(Notify::new());
    let signal = {
        let draining = Arc::clone(&draining);
        async move {
            shutdown_signal().await;
            info!(target = "folio::http", "Shutdown requested; draining connections");
            draining.notify_one();
        }
    };

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(signal)
        .into_future();

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        () = async {
            draining.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "folio::http",
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target = "folio::http", error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
