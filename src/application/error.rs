use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    domain::error::DomainError,
    infra::error::InfraError,
    query::{FetchError, QueryError},
    remote::RemoteError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

/// Request-level failure with a fixed public message.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message,
            detail: None,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Recover the typed error behind a failed query.
    pub fn from_fetch(error: &FetchError) -> Self {
        match error.downcast_ref::<RemoteError>() {
            Some(remote) => Self::Remote(remote.clone()),
            None => Self::Unexpected(error.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) | AppError::NotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::Domain(DomainError::Validation { .. }) => StatusCode::BAD_REQUEST,
            AppError::Remote(RemoteError::Auth { .. }) => StatusCode::UNAUTHORIZED,
            AppError::Remote(RemoteError::Rejected { status, .. }) if *status == 404 => {
                StatusCode::NOT_FOUND
            }
            AppError::Remote(
                RemoteError::Rejected { .. }
                | RemoteError::Transport { .. }
                | RemoteError::Decode { .. },
            ) => StatusCode::BAD_GATEWAY,
            AppError::Remote(RemoteError::NotConfigured { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Query(QueryError::Disposed) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Query(QueryError::InvalidKey { .. } | QueryError::NoRuntime) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Infra(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) | AppError::NotFound => {
                "Resource not found"
            }
            AppError::Domain(DomainError::Validation { .. }) => "Request could not be processed",
            AppError::Remote(RemoteError::Auth { .. }) => "Authentication required",
            AppError::Remote(RemoteError::NotConfigured { .. }) => "Service misconfigured",
            AppError::Remote(_) => "Backend request failed",
            AppError::Query(QueryError::Disposed) => "Service is shutting down",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Infra(InfraError::Bind { .. }) => "Listener could not start",
            AppError::Query(_) | AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }

    /// Detail safe to show to the submitter of a form.
    fn public_detail(&self) -> Option<String> {
        match self {
            AppError::Domain(DomainError::Validation { message }) => Some(message.clone()),
            AppError::Remote(RemoteError::Auth { message }) => Some(message.clone()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.presentation_message(),
            detail: self.public_detail(),
        };
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}
