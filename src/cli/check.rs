//! `snapcache check` and `snapcache get`.

use anyhow::{Context, Result};

use snapcache::cache::{ManagedCache, ValueCache};
use snapcache::config::Config;
use snapcache::repository::FileRepository;

/// Parse the data file and print a summary. Fails if the file is unreadable.
pub(crate) async fn cmd_check(config: &Config) -> Result<()> {
    let repository = FileRepository::new(config.repository.path.clone());
    let snapshot = repository
        .try_read()
        .await
        .with_context(|| format!("Data file check failed: {}", repository.path().display()))?;

    println!(
        "{}: {} key(s)",
        repository.path().display(),
        snapshot.len()
    );
    for key in snapshot.keys() {
        println!("  {key}");
    }
    Ok(())
}

/// Look up `key` through the managed cache and print the value.
pub(crate) async fn cmd_get(config: &Config, key: &str) -> Result<()> {
    let repository = FileRepository::new(config.repository.path.clone());
    let cache = ManagedCache::new(repository, &config.managed_cache);
    let value = cache
        .get(key)
        .await
        .with_context(|| format!("Key '{key}' not found"))?;
    println!("{value}");
    Ok(())
}
