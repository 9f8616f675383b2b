use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use updraft::core::AuthHeader;
use updraft::{
    AlwaysConnected, Downloader, JsonFileStore, RetryPolicy, RunOutcome, SkipReason, StateStore,
    UpdateCoordinator, UpdateHandler, UpdateOffer, UpdaterSettings,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct CollectingHandler {
    offers: Mutex<Vec<UpdateOffer>>,
}

#[async_trait]
impl UpdateHandler for CollectingHandler {
    async fn on_update(&self, offer: &UpdateOffer) {
        self.offers
            .lock()
            .expect("handler lock should not be poisoned")
            .push(offer.clone());
    }
}

fn settings_for(server: &MockServer) -> UpdaterSettings {
    serde_json::from_value(json!({
        "scheme": "semantic",
        "current_version": "1.4.2",
        "endpoints": [
            { "provider": "gitea", "repo": "acme/app", "api_base": server.uri() },
            {
                "provider": "github",
                "repo": "acme/app",
                "api_base": server.uri(),
                "auth": { "kind": "token", "token": "ghs_private" }
            }
        ]
    }))
    .expect("settings should deserialize")
}

async fn mount_release_host(server: &MockServer, expected_downloads: u64) {
    Mock::given(method("GET"))
        .and(path("/api/v1/repos/acme/app/releases"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/app/releases/latest"))
        .and(header("Authorization", "token ghs_private"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tag_name": "v1.5.0",
            "html_url": "https://github.com/acme/app/releases/tag/v1.5.0",
            "body": "Offline mode",
            "prerelease": false,
            "draft": false,
            "assets": [{
                "name": "app-1.5.0.apk",
                "content_type": "application/vnd.android.package-archive",
                "browser_download_url": format!("{}/assets/app-1.5.0.apk", server.uri())
            }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/assets/app-1.5.0.apk"))
        .and(header("Authorization", "token ghs_private"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"apk-bytes".to_vec()))
        .expect(expected_downloads)
        .mount(server)
        .await;
}

#[tokio::test]
async fn check_falls_back_downloads_and_cleans_up_next_launch() {
    let server = MockServer::start().await;
    mount_release_host(&server, 1).await;
    let home = tempfile::tempdir().expect("temp dir should be created");
    let settings = settings_for(&server);
    let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(home.path().join("state.json")));
    let handler = Arc::new(CollectingHandler::default());
    let client = settings.http_client().expect("client should build");

    let coordinator = UpdateCoordinator::builder()
        .parsed_current_version(settings.current().expect("version should parse"))
        .chain(settings.build_chain(&client).expect("chain should build"))
        .check_interval(settings.check_interval())
        .connectivity(Arc::new(AlwaysConnected))
        .state_store(Arc::clone(&store))
        .handler(handler.clone())
        .build()
        .expect("coordinator should build");

    let RunOutcome::UpdateOffered(offer) = coordinator.run().await.expect("run should succeed")
    else {
        panic!("expected an update offer");
    };
    assert_eq!(offer.endpoint, "github:acme/app");
    assert_eq!(offer.new_version.to_string(), "1.5.0");
    assert_eq!(offer.release_notes.as_deref(), Some("Offline mode"));
    assert_eq!(
        offer.auth_header,
        Some(AuthHeader::new("Authorization", "token ghs_private"))
    );
    assert_eq!(handler.offers.lock().expect("lock").len(), 1);

    let destination = home.path().join("downloads").join("app-1.5.0.apk");
    let headers: Vec<AuthHeader> = offer.auth_header.iter().cloned().collect();
    let report = Downloader::new(client, Arc::clone(&store))
        .with_retry_policy(RetryPolicy {
            max_attempts: 2,
            backoff_step: Duration::from_millis(5),
        })
        .download(&offer.download_url, &headers, &destination)
        .await
        .expect("download should succeed");
    assert_eq!(report.attempts, 1);
    assert!(destination.exists());

    let second = coordinator.run().await.expect("second run should succeed");
    assert!(matches!(
        second,
        RunOutcome::Skipped(SkipReason::IntervalNotElapsed { .. })
    ));
    assert!(
        !destination.exists(),
        "the next launch removes the previous download"
    );
    assert!(
        store
            .load()
            .expect("state should load")
            .previous_downloads
            .is_empty()
    );
}

#[tokio::test]
async fn settings_file_drives_the_whole_check() {
    let server = MockServer::start().await;
    mount_release_host(&server, 0).await;
    let home = tempfile::tempdir().expect("temp dir should be created");
    let settings_path = home.path().join("config").join("settings.json");
    settings_for(&server)
        .save_to(&settings_path)
        .expect("settings should save");

    let settings = UpdaterSettings::load_from(&settings_path).expect("settings should load");
    let client = settings.http_client().expect("client should build");
    let coordinator = UpdateCoordinator::builder()
        .scheme(settings.scheme)
        .current_version("1.5.0")
        .chain(settings.build_chain(&client).expect("chain should build"))
        .connectivity(Arc::new(AlwaysConnected))
        .state_store(Arc::new(JsonFileStore::new(home.path().join("state.json"))))
        .handler(Arc::new(CollectingHandler::default()))
        .build()
        .expect("coordinator should build");

    let outcome = coordinator.force_run().await.expect("run should succeed");

    let RunOutcome::UpToDate { endpoint, latest } = outcome else {
        panic!("1.5.0 is already the latest release");
    };
    assert_eq!(endpoint, "github:acme/app");
    assert_eq!(latest.to_string(), "1.5.0");
}
