//! `sdm history` – show finished downloads.

use anyhow::Result;
use sdm_core::ResumeStore;

pub async fn run_history(store: &ResumeStore, limit: u32) -> Result<()> {
    let entries = store.history(limit).await?;
    if entries.is_empty() {
        println!("No download history.");
        return Ok(());
    }
    println!("{:<6} {:<12} {:<12} {}", "ID", "SIZE", "AVG B/s", "PATH");
    for e in entries {
        println!(
            "{:<6} {:<12} {:<12.0} {}",
            e.id,
            e.total_bytes,
            e.avg_bytes_per_sec,
            e.path.display()
        );
        println!("       <- {}", e.url);
    }
    Ok(())
}
