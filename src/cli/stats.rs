// Index statistics from the preservation store.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::preserve::ParseStore;

pub fn show_stats(project: String) -> Result<()> {
    let db_path = PathBuf::from(&project).join(".symgraph.db");
    if !db_path.exists() {
        println!("No index found at {}. Run 'symgraph index' first.", db_path.display());
        return Ok(());
    }

    let store = ParseStore::new(&db_path)?;
    let stats = store.stats()?;

    println!("Index statistics for {}", project);
    println!("  Files indexed:    {}", stats.files);
    println!("  Symbols:          {}", stats.symbols);
    println!("  Mean confidence:  {:.2}", stats.mean_confidence);
    if let Some(ts) = stats.last_indexed {
        if let Some(when) = DateTime::<Utc>::from_timestamp(ts, 0) {
            println!("  Last indexed:     {}", when.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    println!("  By strategy tier:");
    for (tier, count) in &stats.by_tier {
        println!("    {:<10} {}", tier, count);
    }
    Ok(())
}
