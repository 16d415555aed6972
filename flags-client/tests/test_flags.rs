use std::sync::Arc;
use std::time::Duration;

use flags_client::{Config, FileOverrideStore, FlagsClient, MemoryOverrideStore};

fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

fn response_body(name: &str, id: &str, enabled: bool, interval: u64) -> String {
    serde_json::json!({
        "intervalAllowed": interval,
        "secretMenu": {
            "sequence": ["b", "a"],
            "styles": [{ "name": "backgroundColor", "value": "#000" }]
        },
        "flags": [
            { "enabled": enabled, "details": { "name": name, "id": id } }
        ]
    })
    .to_string()
}

fn client_for(server: &mockito::Server) -> FlagsClient {
    let config = Config::new()
        .with_flags_url(format!("{}/flags", server.url()))
        .with_project_id("p1");
    FlagsClient::with_store(config, Arc::new(MemoryOverrideStore::new())).unwrap()
}

async fn eventually(deadline: Duration, check: impl Fn() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

#[tokio::test]
async fn test_initial_fetch_applies_flags_then_refetches_on_the_interval() {
    setup_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/flags")
        .match_header("content-type", "application/json")
        .match_header("x-project-id", "p1")
        .with_status(200)
        .with_body(response_body("featureA", "1", true, 1))
        .expect_at_least(2)
        .create_async()
        .await;

    let client = client_for(&server);
    let handle = client.start();

    let applied = eventually(Duration::from_secs(3), || client.is("featureA").enabled()).await;
    assert!(applied, "initial fetch should apply featureA");
    assert_eq!(client.refresh_interval(), Duration::from_secs(1));
    assert_eq!(client.secret_menu().sequence, vec!["b", "a"]);

    // At least one interval-driven refetch happens on the 1s period.
    tokio::time::sleep(Duration::from_millis(2600)).await;
    client.shutdown();
    handle.await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_without_identity_no_network_call_ever_occurs() {
    setup_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let config = Config::new().with_flags_url(format!("{}/flags", server.url()));
    let client = FlagsClient::with_store(config, Arc::new(MemoryOverrideStore::new())).unwrap();
    let handle = client.start();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!client.is("anything").enabled());

    client.shutdown();
    handle.await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_first_fetch_failure_without_cache_serves_defaults() {
    setup_tracing();
    // Nothing listens on this port: a genuine connection failure.
    let config = Config::new()
        .with_flags_url("http://127.0.0.1:9/flags")
        .with_project_id("p1");
    let client = FlagsClient::with_store(config, Arc::new(MemoryOverrideStore::new())).unwrap();
    let handle = client.start();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!client.is("featureA").enabled());

    client.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_protocol_failure_is_absorbed_and_retried_later() {
    setup_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/flags")
        .with_status(500)
        .with_body("boom")
        .expect_at_least(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let handle = client.start();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!client.is("featureA").enabled());
    assert!(client.effective_flags().is_empty());

    client.shutdown();
    handle.await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_override_survives_refetch_until_reset() {
    setup_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/flags")
        .with_status(200)
        .with_body(response_body("featureB", "2", false, 1))
        .expect_at_least(2)
        .create_async()
        .await;

    let client = client_for(&server);
    let handle = client.start();

    let known = eventually(Duration::from_secs(3), || {
        client.effective_flags().contains_key("featureB")
    })
    .await;
    assert!(known, "initial fetch should apply featureB");
    assert!(!client.is("featureB").enabled());

    client.toggle("featureB");
    assert!(client.is("featureB").enabled());

    // The server keeps saying disabled; the override takes precedence
    // across the next refetch.
    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(client.is("featureB").enabled());

    client.reset_flags();
    assert!(!client.is("featureB").enabled());

    client.shutdown();
    handle.await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_initialize_creates_once_and_only_once() {
    setup_tracing();
    let client =
        FlagsClient::with_store(Config::new(), Arc::new(MemoryOverrideStore::new())).unwrap();

    client.is("newFlag").initialize(true);
    assert!(client.is("newFlag").enabled());

    client.is("newFlag").initialize(false);
    assert!(client.is("newFlag").enabled(), "second initialize is a no-op");
}

#[tokio::test]
async fn test_shutdown_stops_the_refresh_loop() {
    setup_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/flags")
        .with_status(200)
        .with_body(response_body("featureA", "1", true, 1))
        .expect_at_most(3)
        .create_async()
        .await;

    let client = client_for(&server);
    let handle = client.start();

    tokio::time::sleep(Duration::from_millis(1300)).await;
    client.shutdown();
    handle.await.unwrap();

    // Were the loop still alive, the 1s interval would keep accumulating
    // calls well past the cap.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    mock.assert_async().await;
}

#[tokio::test]
async fn test_subscribers_observe_fetched_changes() {
    setup_tracing();
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/flags")
        .with_status(200)
        .with_body(response_body("featureA", "1", true, 60))
        .create_async()
        .await;

    let client = client_for(&server);
    let mut updates = client.subscribe();
    let handle = client.start();

    tokio::time::timeout(Duration::from_secs(3), updates.changed())
        .await
        .expect("a publish should arrive")
        .unwrap();
    assert!(updates.borrow_and_update()["featureA"].enabled);

    client.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_overrides_persist_across_client_restarts() {
    setup_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local_flags.json");

    {
        let store = Arc::new(FileOverrideStore::at(&path));
        let client = FlagsClient::with_store(Config::new(), store).unwrap();
        client.initialize("featureA", false);
        client.toggle("featureA");
        assert!(client.is("featureA").enabled());
    }

    // A fresh client over the same file sees the override immediately.
    let store = Arc::new(FileOverrideStore::at(&path));
    let client = FlagsClient::with_store(Config::new(), store).unwrap();
    client.initialize("featureA", false);
    assert!(client.is("featureA").enabled());

    client.reset_flags();
    assert!(!client.is("featureA").enabled());
}
