//! Foreground progress display shared by `get` and `resume`.

use anyhow::{bail, Result};
use sdm_core::{DownloadEvent, DownloadId, DownloadStatus, Engine, ProgressSnapshot, Settled};
use std::io::Write;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Prints progress until the download is paused or terminal. The first
/// Ctrl-C pauses it (state is kept for `sdm resume`).
pub async fn follow(
    engine: &Engine,
    id: DownloadId,
    mut events: broadcast::Receiver<DownloadEvent>,
) -> Result<Settled> {
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut pausing = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(DownloadEvent::StatusChanged { id: eid, status, failure }) if eid == id => {
                    if status == DownloadStatus::Paused || status.is_terminal() {
                        eprintln!();
                        return Ok(Settled { status, failure });
                    }
                }
                Ok(DownloadEvent::Retrying { id: eid, segment, attempt, delay }) if eid == id => {
                    tracing::debug!(segment, attempt, ?delay, "retrying segment");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => bail!("engine stopped before download {} settled", id),
            },
            _ = ticker.tick() => {
                if let Ok(snap) = engine.progress(id) {
                    print_progress(&snap);
                }
            }
            res = &mut ctrl_c, if !pausing => {
                res?;
                pausing = true;
                eprintln!("\npausing download {}...", id);
                if let Err(e) = engine.pause(id).await {
                    tracing::warn!(id, "pause on Ctrl-C failed: {}", e);
                }
            }
        }
    }
}

fn print_progress(snap: &ProgressSnapshot) {
    let done_mib = snap.bytes_done as f64 / 1_048_576.0;
    let rate_mib = snap.bytes_per_sec / 1_048_576.0;
    let eta = snap
        .eta_secs()
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    let retry = if snap.retrying { "  (retrying)" } else { "" };
    match (snap.total_bytes, snap.fraction()) {
        (Some(total), Some(fraction)) => eprint!(
            "\r  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}{}  ",
            done_mib,
            total as f64 / 1_048_576.0,
            fraction * 100.0,
            rate_mib,
            eta,
            retry
        ),
        _ => eprint!("\r  {:.1} MiB  {:.2} MiB/s{}  ", done_mib, rate_mib, retry),
    }
    let _ = std::io::stderr().flush();
}

/// One-line outcome for the user. Err for anything but success or pause.
pub fn report(id: DownloadId, settled: &Settled) -> Result<()> {
    match settled.status {
        DownloadStatus::Completed => {
            println!("Download {} completed.", id);
            Ok(())
        }
        DownloadStatus::Paused => {
            println!("Download {} paused. Continue with: sdm resume {}", id, id);
            Ok(())
        }
        DownloadStatus::Canceled => {
            println!("Download {} canceled.", id);
            Ok(())
        }
        status => match &settled.failure {
            Some(f) => bail!("download {} {}: {}", id, status, f.message),
            None => bail!("download {} ended {}", id, status),
        },
    }
}
