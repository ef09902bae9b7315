//! Download queues end to end against a stub server

mod common;

use common::{mp3_bytes, ok, slow, status, wait_until, StubServer};
use mediafetch_core::download::ItemStatus;
use mediafetch_core::{AddOutcome, DownloadQueue, EngineConfig};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig {
        download_dir: root.join("media"),
        state_dir: root.join("state"),
        min_media_bytes: 1024,
        ..EngineConfig::default()
    };
    config.http.chunk_size = 1024;
    config
}

fn files_in(dir: &Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn test_podcast_queue_downloads_and_commits() {
    let server = StubServer::start(|path| match path {
        "/ep1.mp3" => ok(&mp3_bytes(4096), "audio/mpeg"),
        "/ep2.mp3" => ok(&mp3_bytes(2048), "audio/mpeg"),
        _ => status(404),
    });
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let queue = DownloadQueue::podcast(&config);

    let ep1 = server.url("/ep1.mp3");
    let ep2 = server.url("/ep2.mp3");
    queue.add(&ep1, "Episode 1: Pilot", &ep1).unwrap();
    queue.add(&ep2, "Episode 2", &ep2).unwrap();

    assert!(queue.start().unwrap());
    queue.join();

    let status = queue.status();
    assert_eq!(status.completed_count, 2);
    assert_eq!(status.failed_count, 0);
    assert!(!status.running);
    assert!(queue.is_empty());

    let dir = config.download_dir.join("podcasts");
    let mut names = files_in(&dir);
    names.sort();
    assert_eq!(names, ["Episode 1 Pilot.mp3", "Episode 2.mp3"]);
    assert_eq!(std::fs::metadata(dir.join("Episode 1 Pilot.mp3")).unwrap().len(), 4096);

    let persisted = std::fs::read_to_string(config.queue_file("podcast")).unwrap();
    assert!(persisted.is_empty());
}

#[test]
fn test_invalid_artifact_marks_failed_and_discards_temp() {
    let server = StubServer::start(|_| {
        let mut page = b"<html><body>captive portal</body></html>".to_vec();
        page.resize(4096, b' ');
        ok(&page, "text/html")
    });
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let queue = DownloadQueue::podcast(&config);

    let url = server.url("/ep.mp3");
    queue.add(&url, "Portal", &url).unwrap();
    queue.start().unwrap();
    queue.join();

    let status = queue.status();
    assert_eq!(status.failed_count, 1);
    assert!(status.last_error.is_some());

    let items = queue.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, ItemStatus::Failed);
    assert!(files_in(&config.download_dir.join("podcasts")).is_empty());
}

#[test]
fn test_duplicate_add_is_noop() {
    let root = tempfile::tempdir().unwrap();
    let queue = DownloadQueue::audio(&config(root.path()));

    assert_eq!(queue.add("vid1", "Song", "http://x/1").unwrap(), AddOutcome::Added);
    assert_eq!(queue.add("vid1", "Song again", "http://x/1").unwrap(), AddOutcome::AlreadyQueued);
    assert_eq!(queue.add("vid2", "Other", "http://x/2").unwrap(), AddOutcome::Added);
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_failed_item_retried_once_per_start() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let server = StubServer::start(move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            status(503)
        } else {
            ok(&mp3_bytes(2048), "audio/mpeg")
        }
    });
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let queue = DownloadQueue::podcast(&config);
    let url = server.url("/flaky.mp3");
    queue.add(&url, "Flaky", &url).unwrap();

    queue.start().unwrap();
    queue.join();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(queue.items()[0].status, ItemStatus::Failed);
    assert_eq!(queue.status().failed_count, 1);

    queue.start().unwrap();
    queue.join();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(queue.is_empty());
    assert_eq!(queue.status().completed_count, 1);
}

#[test]
fn test_persistence_round_trip() {
    let root = tempfile::tempdir().unwrap();
    let mut config = config(root.path());
    config.audio_source_template = Some("https://media.example/audio/{id}".into());

    let queue = DownloadQueue::audio(&config);
    queue.add("c3", "Third added first", "https://media.example/audio/c3").unwrap();
    queue.add("a1", "Song | Remix", "https://media.example/audio/a1").unwrap();
    queue.add("b2", "Übergröße", "https://media.example/audio/b2").unwrap();
    queue.persist().unwrap();

    let reloaded = DownloadQueue::audio(&config);
    assert_eq!(reloaded.load().unwrap(), 3);

    let items = reloaded.items();
    let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
    let titles: Vec<_> = items.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(ids, ["c3", "a1", "b2"]);
    assert_eq!(titles, ["Third added first", "Song   Remix", "Übergröße"]);
    assert!(items.iter().all(|i| i.status == ItemStatus::Pending));
    assert_eq!(items[1].source_url, "https://media.example/audio/a1");
}

#[test]
fn test_queues_are_independent() {
    let server = StubServer::start(|_| ok(&mp3_bytes(2048), "audio/mpeg"));
    let root = tempfile::tempdir().unwrap();
    let mut config = config(root.path());
    config.audio_extension = "mp3".into();

    let podcasts = DownloadQueue::podcast(&config);
    let audio = DownloadQueue::audio(&config);
    let url = server.url("/shared.mp3");
    podcasts.add(&url, "From feed", &url).unwrap();
    audio.add("trk", "From search", &url).unwrap();

    assert_eq!(podcasts.len(), 1);
    assert_eq!(audio.len(), 1);
    assert_ne!(config.queue_file("podcast"), config.queue_file("audio"));

    assert!(podcasts.start().unwrap());
    assert!(audio.start().unwrap());
    podcasts.join();
    audio.join();

    assert_eq!(podcasts.status().completed_count, 1);
    assert_eq!(audio.status().completed_count, 1);
    assert!(config.download_dir.join("podcasts").join("From feed.mp3").exists());
    assert!(config.download_dir.join("audio").join("From search.mp3").exists());
}

#[test]
fn test_cancel_in_progress_removes_item_without_failure() {
    let server = StubServer::start(|_| slow(1024, 500, Duration::from_millis(10)));
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let queue = DownloadQueue::podcast(&config);
    let url = server.url("/long.mp3");
    queue.add(&url, "Long episode", &url).unwrap();

    assert!(queue.start().unwrap());
    assert!(!queue.start().unwrap(), "second start is a no-op while running");
    assert!(wait_until(Duration::from_secs(5), || queue.status().bytes_written > 0));

    queue.cancel();
    queue.join();

    let status = queue.status();
    assert_eq!(status.failed_count, 0);
    assert_eq!(status.completed_count, 0);
    assert!(queue.is_empty());
    assert!(files_in(&config.download_dir.join("podcasts")).is_empty());
}

#[test]
fn test_remove_in_progress_cancels_it() {
    let server = StubServer::start(|path| {
        if path == "/long.mp3" {
            slow(1024, 500, Duration::from_millis(10))
        } else {
            ok(&mp3_bytes(2048), "audio/mpeg")
        }
    });
    let root = tempfile::tempdir().unwrap();
    let config = config(root.path());
    let queue = DownloadQueue::podcast(&config);
    let long = server.url("/long.mp3");
    let short = server.url("/short.mp3");
    queue.add(&long, "Long", &long).unwrap();
    queue.add(&short, "Short", &short).unwrap();

    queue.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || queue.status().bytes_written > 0));
    assert!(queue.remove(&long));
    queue.join();

    let status = queue.status();
    assert_eq!(status.completed_count, 1);
    assert_eq!(status.failed_count, 0);
    assert!(queue.is_empty());
    assert_eq!(files_in(&config.download_dir.join("podcasts")), ["Short.mp3"]);
}
