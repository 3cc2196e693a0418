//! Tests for the resume store (in-memory and on-disk).

use super::ResumeStore;
use crate::model::{DownloadRequest, DownloadStatus, ResourceMetadata, SegmentStatus};
use crate::segmenter::plan_segments;

fn request(url: &str) -> DownloadRequest {
    DownloadRequest::new(url, "/tmp/sdm-test/out.bin").with_segments(4)
}

#[tokio::test]
async fn insert_assigns_ids_and_persists_planned_state() {
    let store = ResumeStore::open_memory().await.unwrap();
    let a = store.insert(&request("https://a.example/one")).await.unwrap();
    let b = store.insert(&request("https://b.example/two")).await.unwrap();
    assert!(b.id > a.id);
    assert_eq!(a.status, DownloadStatus::Planned);

    let loaded = store.load(a.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, a.id);
    assert_eq!(loaded.request, a.request);
    assert!(loaded.segments.is_empty());
}

#[tokio::test]
async fn save_roundtrips_segment_table_and_validators() {
    let store = ResumeStore::open_memory().await.unwrap();
    let mut st = store.insert(&request("https://a.example/f.iso")).await.unwrap();
    let meta = ResourceMetadata {
        total_size: Some(1_000_000),
        accept_ranges: true,
        etag: Some("abc".into()),
        last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
        filename: None,
    };
    st.segments = plan_segments(&meta, 4).unwrap();
    st.metadata = Some(meta);
    st.status = DownloadStatus::Paused;
    st.segments[0].completed = 250_000;
    st.segments[0].status = SegmentStatus::Done;
    st.segments[2].completed = 1234;
    store.save(&st).await.unwrap();

    let back = store.load(st.id).await.unwrap().unwrap();
    assert_eq!(back.status, DownloadStatus::Paused);
    assert_eq!(back.segments, st.segments);
    assert_eq!(back.metadata, st.metadata);
    assert_eq!(back.bytes_done(), 251_234);

    let listed = store.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, Some(DownloadStatus::Paused));
    assert_eq!(listed[0].total_size, Some(1_000_000));
}

#[tokio::test]
async fn delete_removes_record_and_save_does_not_resurrect() {
    let store = ResumeStore::open_memory().await.unwrap();
    let st = store.insert(&request("https://a.example/x")).await.unwrap();
    assert!(store.delete(st.id).await.unwrap());
    assert!(!store.delete(st.id).await.unwrap());
    store.save(&st).await.unwrap();
    assert!(store.load(st.id).await.unwrap().is_none());
    assert!(store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn survives_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state dir").join("downloads.db");
    let id = {
        let store = ResumeStore::open_at(&path).await.unwrap();
        let st = store.insert(&request("https://a.example/y")).await.unwrap();
        store.pool.close().await;
        st.id
    };
    let store = ResumeStore::open_at(&path).await.unwrap();
    let all = store.load_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, id);
}

#[tokio::test]
async fn corrupt_snapshot_is_skipped() {
    let store = ResumeStore::open_memory().await.unwrap();
    let good = store.insert(&request("https://a.example/good")).await.unwrap();
    let bad = store.insert(&request("https://a.example/bad")).await.unwrap();
    sqlx::query("UPDATE downloads SET snapshot_json = 'not json' WHERE id = ?1")
        .bind(bad.id)
        .execute(&store.pool)
        .await
        .unwrap();
    let all = store.load_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, good.id);
    assert!(store.load(bad.id).await.is_err());
}

#[tokio::test]
async fn history_outlives_the_resume_record() {
    use super::HistoryEntry;
    use std::path::PathBuf;

    let store = ResumeStore::open_memory().await.unwrap();
    let a = store.insert(&request("https://a.example/first.iso")).await.unwrap();
    let b = store.insert(&request("https://a.example/second.iso")).await.unwrap();
    for (st, finished_at) in [(&a, 1_700_000_100), (&b, 1_700_000_200)] {
        store
            .record_history(&HistoryEntry {
                id: st.id,
                url: st.request.url.clone(),
                path: PathBuf::from("/tmp/sdm-test/out.bin"),
                total_bytes: 4096,
                avg_bytes_per_sec: 2048.0,
                started_at: st.created_at,
                finished_at,
            })
            .await
            .unwrap();
        store.delete(st.id).await.unwrap();
    }
    assert!(store.list().await.unwrap().is_empty());

    let history = store.history(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, b.id);
    assert_eq!(history[0].url, "https://a.example/second.iso");
    assert_eq!(history[1].total_bytes, 4096);
    assert_eq!(history[1].avg_bytes_per_sec, 2048.0);
    assert_eq!(store.history(1).await.unwrap().len(), 1);
}
