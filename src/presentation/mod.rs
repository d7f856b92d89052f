//! Routing surface shared by the HTTP layer and redirects.

pub mod routes;

pub use routes::{AdminRoute, RecordParam, Route};
