//! HTTP route handlers.

pub mod health;
pub mod snapshot;
pub mod values;
