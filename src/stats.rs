//! `doco stats` and `doco purge`.

use anyhow::Result;

use doco_core::store::ChunkStore;

use crate::config::Config;
use crate::sqlite_store::SqliteChunkStore;

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteChunkStore::open(config).await?;
    let stats = store.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Doco — Chunk Store");
    println!("==================");
    println!();
    println!("  Database:   {}", config.db.path.display());
    println!("  Size:       {}", format_bytes(db_size));
    println!("  TTL:        {} min", config.store.ttl_minutes);
    println!();
    println!("  Live:       {}", stats.live);
    println!("  Expired:    {}", stats.expired);
    println!();

    store.pool().close().await;
    Ok(())
}

pub async fn run_purge(config: &Config) -> Result<()> {
    let store = SqliteChunkStore::open(config).await?;
    let removed = store.purge_expired().await?;
    println!("Purged {} expired chunks.", removed);
    store.pool().close().await;
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
