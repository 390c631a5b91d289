//! Document-store statistics.
//!
//! The same aggregate feeds the admin dashboard and `docrag stats`, which
//! prints a quick overview of what is stored, what is indexed, and the most
//! recent index actions.

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::reindex::ReindexSignal;
use crate::store::DocumentStore;

/// Aggregate counts over the `documents` table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_docs: i64,
    pub indexed_docs: i64,
    /// Sum of file sizes in bytes.
    pub total_size: i64,
}

impl StoreStats {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size as f64 / (1024.0 * 1024.0)
    }
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = DocumentStore::open(&config.paths.database, &config.paths.documents_dir).await?;
    let stats = store.stats().await?;
    let history = store.history(5).await?;
    let pending = ReindexSignal::new(&config.paths.sentinel).is_pending();

    println!("docrag document store");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.paths.database.display());
    println!("  Documents:   {}", config.paths.documents_dir.display());
    println!();
    println!("  Stored:      {}", stats.total_docs);
    println!("  Indexed:     {} / {}", stats.indexed_docs, stats.total_docs);
    println!("  Total size:  {}", format_bytes(stats.total_size.max(0) as u64));
    println!(
        "  Reindex:     {}",
        if pending { "pending" } else { "not requested" }
    );

    if !history.is_empty() {
        println!();
        println!("  Recent index actions:");
        println!("  {:<20} {:>6}   {}", "ACTION", "DOCS", "WHEN");
        println!("  {}", "-".repeat(48));
        for entry in &history {
            println!(
                "  {:<20} {:>6}   {}",
                entry.action,
                entry.documents_count,
                format_ts(entry.created_at)
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Size as shown by the API's `/documents` listing: KB below 1 MiB, MB above.
pub fn format_size_readable(bytes: u64) -> String {
    if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

pub fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
