//! `sdm resume|cancel|remove <id>` – control operations on stored downloads.

use anyhow::Result;
use sdm_core::Engine;

use super::follow::{follow, report};

pub async fn run_resume(engine: &Engine, id: i64, limit: Option<u64>) -> Result<()> {
    if limit.is_some() {
        engine.set_bandwidth_limit(limit);
    }
    let events = engine.subscribe();
    engine.resume(id).await?;
    println!("Resumed download {}", id);
    let settled = follow(engine, id, events).await?;
    report(id, &settled)
}

pub async fn run_cancel(engine: &Engine, id: i64) -> Result<()> {
    engine.cancel(id).await?;
    println!("Canceled download {}", id);
    Ok(())
}

pub async fn run_remove(engine: &Engine, id: i64) -> Result<()> {
    engine.remove(id).await?;
    println!("Removed download {}", id);
    Ok(())
}
