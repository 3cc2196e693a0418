//! `sdm list` – show downloads in the resume store.

use anyhow::Result;
use sdm_core::ResumeStore;

pub async fn run_list(store: &ResumeStore) -> Result<()> {
    let records = store.list().await?;
    if records.is_empty() {
        println!("No stored downloads.");
        return Ok(());
    }
    println!("{:<6} {:<10} {:<12} {}", "ID", "STATUS", "SIZE", "URL");
    for r in records {
        let size = r
            .total_size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = r
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("{:<6} {:<10} {:<12} {}", r.id, status, size, r.url);
        println!("       -> {}", r.destination);
    }
    Ok(())
}
