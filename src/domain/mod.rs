//! Domain layer types and invariants.

pub mod error;
pub mod forms;
pub mod slug;

pub use error::DomainError;
