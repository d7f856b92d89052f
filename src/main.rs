use std::{process, sync::Arc};

use folio::{
    application::error::AppError,
    config,
    infra::{
        error::InfraError,
        http::{self, AppState},
        telemetry,
    },
    query::{QueryCache, QueryCacheConfig},
    remote::{MemoryBackend, Remote, RestClient},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) =
        config::load_with_cli().map_err(|err| AppError::from(InfraError::from(err)))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckConfig => {
            info!(
                target = "folio::config",
                addr = %settings.server.addr,
                admin_prefix = %settings.server.admin_prefix,
                remote = if settings.remote.backend.is_some() { "rest" } else { "memory" },
                gc_idle_seconds = settings.cache.gc_idle.as_secs(),
                "Configuration is valid"
            );
            Ok(())
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache = QueryCache::init(QueryCacheConfig::from(&settings.cache))?;
    let remote = build_remote(&settings.remote)?;

    let state = AppState::new(cache.clone(), remote, &settings.server.admin_prefix);
    let router = http::build_router(state);

    let addr = settings.server.addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::from(InfraError::bind(addr, err)))?;

    let result = http::serve(listener, router, settings.server.graceful_shutdown).await;

    cache.dispose();
    info!(target = "folio::serve", "Query cache disposed");

    result
}

fn build_remote(settings: &config::RemoteSettings) -> Result<Remote, AppError> {
    if let Some(backend) = &settings.backend {
        let client = RestClient::new(backend.url.as_str(), backend.anon_key.clone())?;
        info!(target = "folio::remote", url = %backend.url, "Using hosted backend");
        return Ok(Remote::from_backend(Arc::new(client)));
    }

    warn!(
        target = "folio::remote",
        "No backend url configured; serving from an in-memory store"
    );
    let mut memory = MemoryBackend::new();
    if let Some(admin) = &settings.memory_admin {
        memory = memory.with_admin(admin.email.clone(), admin.password.clone());
    }
    Ok(Remote::from_backend(Arc::new(memory)))
}
