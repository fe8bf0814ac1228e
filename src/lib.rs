//! snapcache: two caching strategies side by side over a JSON-file repository.
//!
//! - [`repository`] reads the data file and keeps the last good [`Snapshot`]
//! - [`cache::managed`] is a bounded moka cache with expiry, refresh and stats
//! - [`cache::annotated`] memoizes repository lookups with no policies at all
//! - [`api`] exposes both over HTTP

pub mod api;
pub mod cache;
pub mod config;
pub mod logging;
pub mod repository;

pub use cache::{AnnotatedCache, CacheStats, ManagedCache, ValueCache};
pub use config::Config;
pub use repository::{FileRepository, RepositoryError, Snapshot};
