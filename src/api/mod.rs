//! HTTP front end over the repository and both caches.

pub mod config;
pub mod routes;
pub mod server;

pub use server::{build_router, start_server, AppState};
