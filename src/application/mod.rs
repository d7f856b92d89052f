//! Application services: the query catalog, admin commands and the auth gate.

pub mod auth;
pub mod commands;
pub mod error;
pub mod filters;
pub mod invalidation;
pub mod queries;
pub mod view;

pub use auth::{AuthGuard, GuardDecision, GuardEvent};
pub use commands::Commands;
pub use queries::Queries;
