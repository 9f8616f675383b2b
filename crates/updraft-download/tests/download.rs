use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use updraft_core::AuthHeader;
use updraft_download::{DownloadError, DownloadProgress, Downloader, RetryPolicy};
use updraft_platform::{MemoryStore, StateError, StateStore, UpdaterState};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAYLOAD: &[u8] = b"PK\x03\x04 fake android package";

/// State that can be read but never written, like a store on a full disk.
struct ReadOnlyStore;

impl StateStore for ReadOnlyStore {
    fn load(&self) -> Result<UpdaterState, StateError> {
        Ok(UpdaterState::default())
    }

    fn update(
        &self,
        _change: &mut dyn FnMut(&mut UpdaterState),
    ) -> Result<UpdaterState, StateError> {
        Err(StateError::Io {
            context: "failed to write updater state",
            path: PathBuf::from("state.json"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        })
    }
}

fn fast_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff_step: Duration::from_millis(5),
    }
}

fn downloader(store: &Arc<MemoryStore>) -> Downloader {
    let store: Arc<MemoryStore> = Arc::clone(store);
    Downloader::new(reqwest::Client::new(), store).with_retry_policy(fast_retries(3))
}

#[tokio::test]
async fn two_server_errors_then_success_takes_three_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app.apk"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app.apk"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let destination = dir.path().join("app.apk");
    let store = Arc::new(MemoryStore::default());

    let report = downloader(&store)
        .download(&format!("{}/app.apk", server.uri()), &[], &destination)
        .await
        .expect("third attempt should succeed");

    assert_eq!(report.attempts, 3);
    assert_eq!(report.bytes, PAYLOAD.len() as u64);
    assert_eq!(
        std::fs::read(&destination).expect("download should exist"),
        PAYLOAD
    );
    assert!(store.snapshot().previous_downloads.contains(&destination));
}

#[tokio::test]
async fn exhausted_retries_leave_no_file_and_no_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let destination = dir.path().join("app.apk");
    let store = Arc::new(MemoryStore::default());

    let error = downloader(&store)
        .download(&format!("{}/app.apk", server.uri()), &[], &destination)
        .await
        .expect_err("server never recovers");

    assert!(matches!(
        error,
        DownloadError::Network {
            attempts: 3,
            status: Some(503),
            ..
        }
    ));
    assert!(!destination.exists());
    assert_eq!(
        std::fs::read_dir(dir.path())
            .expect("dir should be listable")
            .count(),
        0
    );
    assert!(store.snapshot().previous_downloads.is_empty());
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let address = listener.local_addr().expect("listener has an address");
    drop(listener);

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let store = Arc::new(MemoryStore::default());

    let error = Downloader::new(reqwest::Client::new(), store)
        .with_retry_policy(fast_retries(2))
        .download(
            &format!("http://{address}/app.apk"),
            &[],
            &dir.path().join("app.apk"),
        )
        .await
        .expect_err("nothing listens on the port");

    assert!(error.is_network());
}

#[tokio::test]
async fn existing_destination_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let destination = dir.path().join("app.apk");
    std::fs::write(&destination, b"keep me").expect("existing file should be written");
    let store = Arc::new(MemoryStore::default());

    let error = downloader(&store)
        .download(&format!("{}/app.apk", server.uri()), &[], &destination)
        .await
        .expect_err("destination is taken");

    assert!(matches!(error, DownloadError::FileExists { .. }));
    assert_eq!(
        std::fs::read(&destination).expect("file should be untouched"),
        b"keep me"
    );
}

#[tokio::test]
async fn disk_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"a file, not a directory").expect("blocker should be written");
    let store = Arc::new(MemoryStore::default());

    let error = downloader(&store)
        .download(
            &format!("{}/app.apk", server.uri()),
            &[],
            &blocker.join("app.apk"),
        )
        .await
        .expect_err("parent is a regular file");

    assert!(matches!(error, DownloadError::Disk { .. }));
    assert!(!error.is_network());
}

#[tokio::test]
async fn auth_header_and_progress_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private.apk"))
        .and(header("Private-Token", "glpat-xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let destination = dir.path().join("downloads").join("private.apk");
    let store = Arc::new(MemoryStore::default());
    let (sender, mut receiver) = mpsc::channel(64);

    let report = downloader(&store)
        .with_progress(sender)
        .download(
            &format!("{}/private.apk", server.uri()),
            &[AuthHeader::new("Private-Token", "glpat-xyz")],
            &destination,
        )
        .await
        .expect("authorized download should succeed");

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }

    assert_eq!(report.path, destination);
    assert_eq!(
        events.first(),
        Some(&DownloadProgress::Attempt {
            attempt: 1,
            max_attempts: 3
        })
    );
    assert!(
        events
            .iter()
            .any(|event| matches!(event, DownloadProgress::Downloading { .. }))
    );
    assert_eq!(
        events.last(),
        Some(&DownloadProgress::Complete {
            path: destination.clone(),
            bytes: PAYLOAD.len() as u64,
        })
    );
}

#[tokio::test]
async fn unrecorded_download_is_removed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app.apk"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PAYLOAD))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let destination = dir.path().join("app.apk");

    let error = Downloader::new(reqwest::Client::new(), Arc::new(ReadOnlyStore))
        .with_retry_policy(fast_retries(3))
        .download(&format!("{}/app.apk", server.uri()), &[], &destination)
        .await
        .expect_err("state cannot be written");

    assert!(matches!(error, DownloadError::State(_)));
    assert!(!destination.exists());
    assert_eq!(
        std::fs::read_dir(dir.path())
            .expect("dir should be listable")
            .count(),
        0
    );
}
