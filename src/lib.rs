//! Folio: a portfolio site served over a hosted data backend.
//!
//! Page reads go through [`query::QueryCache`], which deduplicates fetches and
//! keeps results for an idle window; admin writes invalidate the reads they
//! affect (see [`application::invalidation`]).

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub mod query;
pub mod remote;
