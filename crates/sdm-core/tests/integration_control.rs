//! Integration tests: pause, resume, cancel, restore and failure paths
//! against a slow local range server.

mod common;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::range_server::{self, RangeServer, RangeServerOptions};
use sdm_core::config::RetryConfig;
use sdm_core::{
    wait_settled, DownloadEvent, DownloadId, DownloadRequest, DownloadStatus, Engine,
    EngineError, FailureKind, RemoteRef, ResumeStore, SdmConfig, SegmentStatus, StorageProvider,
};
use tempfile::tempdir;

const SIZE: usize = 1024 * 1024;

fn body() -> Vec<u8> {
    (0u8..241).cycle().take(SIZE).collect()
}

/// 4 KiB every 10 ms per connection: a segment of 256 KiB takes ~640 ms.
fn slow_server(body: Vec<u8>) -> RangeServer {
    range_server::start_with_options(
        body,
        RangeServerOptions {
            chunk_delay: Some(Duration::from_millis(10)),
            ..Default::default()
        },
    )
}

fn config() -> SdmConfig {
    SdmConfig {
        chunk_size_bytes: 4096,
        checkpoint_interval_ms: 50,
        ..SdmConfig::default()
    }
}

/// Polls until some bytes have landed.
async fn wait_for_bytes(engine: &Engine, id: DownloadId) -> u64 {
    for _ in 0..500 {
        let done = engine.progress(id).unwrap().bytes_done;
        if done > 0 {
            return done;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("download {} made no progress", id);
}

async fn start_and_pause(
    engine: &Engine,
    events: &mut tokio::sync::broadcast::Receiver<DownloadEvent>,
    server: &RangeServer,
    dest: &Path,
) -> (DownloadId, u64) {
    let id = engine
        .submit(DownloadRequest::new(&server.url, dest).with_segments(4))
        .await
        .unwrap();
    wait_for_bytes(engine, id).await;
    engine.pause(id).await.unwrap();
    assert_eq!(
        wait_settled(events, id).await.unwrap().status,
        DownloadStatus::Paused
    );
    let snap = engine.progress(id).unwrap();
    assert_eq!(snap.status, DownloadStatus::Paused);
    assert!(snap.bytes_done < SIZE as u64, "paused before the end");
    (id, snap.bytes_done)
}

#[tokio::test]
async fn pause_then_resume_fetches_only_missing_bytes() {
    let body = body();
    let server = slow_server(body.clone());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("resumed.bin");
    let engine = Engine::new(config(), ResumeStore::open_memory().await.unwrap());
    let mut events = engine.subscribe();

    let (id, done_at_pause) = start_and_pause(&engine, &mut events, &server, &dest).await;
    assert!(dir.path().join("resumed.bin.part").exists());
    assert!(matches!(
        engine.pause(id).await,
        Err(EngineError::InvalidTransition { op: "pause", .. })
    ));

    let before_resume = server.served_ranges().len();
    engine.resume(id).await.unwrap();
    let settled = wait_settled(&mut events, id).await.unwrap();
    assert_eq!(settled.status, DownloadStatus::Completed, "{:?}", settled.failure);

    assert_eq!(
        server.bytes_requested_since(before_resume),
        SIZE as u64 - done_at_pause
    );
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn cancel_removes_state_and_resubmit_starts_fresh() {
    let body = body();
    let server = slow_server(body.clone());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("canceled.bin");
    let store = ResumeStore::open_memory().await.unwrap();
    let engine = Engine::new(config(), store.clone());
    let mut events = engine.subscribe();

    let req = DownloadRequest::new(&server.url, &dest).with_segments(4);
    let first = engine.submit(req.clone()).await.unwrap();
    wait_for_bytes(&engine, first).await;
    engine.cancel(first).await.unwrap();
    assert_eq!(
        wait_settled(&mut events, first).await.unwrap().status,
        DownloadStatus::Canceled
    );
    assert!(store.load(first).await.unwrap().is_none());
    assert!(!dir.path().join("canceled.bin.part").exists());
    assert!(matches!(
        engine.resume(first).await,
        Err(EngineError::InvalidTransition { .. })
    ));

    let before = server.served_ranges().len();
    let second = engine.submit(req).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(
        wait_settled(&mut events, second).await.unwrap().status,
        DownloadStatus::Completed
    );
    assert_eq!(server.bytes_requested_since(before), SIZE as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn changed_validator_fails_resume() {
    let server = slow_server(body());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("changed.bin");
    let store = ResumeStore::open_memory().await.unwrap();
    let engine = Engine::new(config(), store.clone());
    let mut events = engine.subscribe();

    let (id, _) = start_and_pause(&engine, &mut events, &server, &dest).await;
    server.set_etag("v2");
    let before = server.get_count();

    let err = engine.resume(id).await.unwrap_err();
    assert!(matches!(err, EngineError::ResourceChanged(_)), "{err}");
    let settled = wait_settled(&mut events, id).await.unwrap();
    assert_eq!(settled.status, DownloadStatus::Failed);
    assert_eq!(settled.failure.unwrap().kind, FailureKind::ResourceChanged);

    assert_eq!(server.get_count(), before, "no stale bytes merged");
    assert!(!dest.exists());
    assert!(dir.path().join("changed.bin.part").exists());
    let stored = store.load(id).await.unwrap().unwrap();
    assert_eq!(stored.status, DownloadStatus::Failed);
}

#[tokio::test]
async fn segment_exhausts_retry_budget() {
    let server = range_server::start_with_options(
        body(),
        RangeServerOptions {
            fail_gets: true,
            ..Default::default()
        },
    );
    let dir = tempdir().unwrap();
    let engine = Engine::new(
        SdmConfig {
            retry: Some(RetryConfig {
                max_attempts: 3,
                base_delay_secs: 0.01,
                max_delay_secs: 1,
            }),
            ..config()
        },
        ResumeStore::open_memory().await.unwrap(),
    );
    let mut events = engine.subscribe();

    let id = engine
        .submit(DownloadRequest::new(&server.url, dir.path().join("x.bin")).with_segments(1))
        .await
        .unwrap();

    let mut retries = Vec::new();
    let settled = loop {
        match events.recv().await.unwrap() {
            DownloadEvent::Retrying { id: eid, attempt, .. } if eid == id => retries.push(attempt),
            DownloadEvent::StatusChanged {
                id: eid,
                status,
                failure,
            } if eid == id && status.is_terminal() => break (status, failure),
            _ => {}
        }
    };
    assert_eq!(settled.0, DownloadStatus::Failed);
    assert_eq!(settled.1.unwrap().kind, FailureKind::SegmentExhausted);
    assert_eq!(retries, vec![1, 2]);
    assert_eq!(server.get_count(), 3);
    let snap = engine.progress(id).unwrap();
    assert_eq!(snap.segments[0].attempts, 3);
}

#[tokio::test]
async fn restart_restores_paused_download() {
    let body = body();
    let server = slow_server(body.clone());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("restored.bin");
    let db = dir.path().join("state").join("downloads.db");

    let done_at_pause = {
        let engine = Engine::new(config(), ResumeStore::open_at(&db).await.unwrap());
        let mut events = engine.subscribe();
        let (_, done) = start_and_pause(&engine, &mut events, &server, &dest).await;
        done
    };

    let engine = Engine::new(config(), ResumeStore::open_at(&db).await.unwrap());
    assert_eq!(engine.restore().await.unwrap(), 1);
    let snap = engine.list().pop().unwrap();
    assert_eq!(snap.status, DownloadStatus::Paused);
    assert_eq!(snap.bytes_done, done_at_pause);

    let mut events = engine.subscribe();
    let before = server.served_ranges().len();
    engine.resume(snap.id).await.unwrap();
    assert_eq!(
        wait_settled(&mut events, snap.id).await.unwrap().status,
        DownloadStatus::Completed
    );
    assert_eq!(
        server.bytes_requested_since(before),
        SIZE as u64 - done_at_pause
    );
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn filled_segment_recorded_as_pending_is_not_refetched() {
    let body = body();
    let server = slow_server(body.clone());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("filled.bin");
    let db = dir.path().join("state").join("downloads.db");

    let id = {
        let engine = Engine::new(config(), ResumeStore::open_at(&db).await.unwrap());
        let mut events = engine.subscribe();
        start_and_pause(&engine, &mut events, &server, &dest).await.0
    };

    // Segment 0 landed in full but the crash beat its Done checkpoint.
    let store = ResumeStore::open_at(&db).await.unwrap();
    let mut state = store.load(id).await.unwrap().unwrap();
    let seg = &mut state.segments[0];
    let (start, end) = (seg.start, seg.end.unwrap());
    seg.completed = seg.len().unwrap();
    seg.status = SegmentStatus::Pending;
    {
        use std::io::{Seek, SeekFrom, Write};
        let mut part = std::fs::OpenOptions::new()
            .write(true)
            .open(sdm_core::storage::temp_path(&dest))
            .unwrap();
        part.seek(SeekFrom::Start(start)).unwrap();
        part.write_all(&body[start as usize..=end as usize]).unwrap();
    }
    store.save(&state).await.unwrap();
    let done = state.bytes_done();
    drop(store);

    let engine = Engine::new(config(), ResumeStore::open_at(&db).await.unwrap());
    assert_eq!(engine.restore().await.unwrap(), 1);
    let mut events = engine.subscribe();
    let before = server.served_ranges().len();
    engine.resume(id).await.unwrap();
    let settled = wait_settled(&mut events, id).await.unwrap();
    assert_eq!(settled.status, DownloadStatus::Completed, "{:?}", settled.failure);
    assert_eq!(std::fs::read(&dest).unwrap(), body);

    let resumed = server.served_ranges().split_off(before);
    assert!(resumed.iter().all(|&(s, e)| s > end && s < e), "{:?}", resumed);
    assert_eq!(server.bytes_requested_since(before), SIZE as u64 - done);
}

#[derive(Default)]
struct RecordingProvider {
    uploads: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl StorageProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn upload(&self, path: &Path) -> anyhow::Result<RemoteRef> {
        self.uploads.lock().unwrap().push(path.to_path_buf());
        Ok(RemoteRef {
            provider: self.name().to_string(),
            location: format!("mem://{}", path.display()),
        })
    }
}

#[tokio::test]
async fn completed_file_is_handed_to_provider() {
    let server = range_server::start(body());
    let dir = tempdir().unwrap();
    let dest = dir.path().join("up.bin");
    let provider = Arc::new(RecordingProvider::default());
    let engine = Engine::with_provider(
        config(),
        ResumeStore::open_memory().await.unwrap(),
        provider.clone(),
    );
    let mut events = engine.subscribe();

    let id = engine
        .submit(DownloadRequest::new(&server.url, &dest).with_upload(true))
        .await
        .unwrap();
    let remote = loop {
        match events.recv().await.unwrap() {
            DownloadEvent::Uploaded { id: eid, remote } if eid == id => break remote,
            _ => {}
        }
    };
    assert_eq!(remote.provider, "recording");
    assert_eq!(*provider.uploads.lock().unwrap(), vec![dest]);
}
