//! Integration tests for install, activation and registration

mod common;

use common::ScriptedNetwork;
use shellcache::worker::{ClientHub, MessageOutcome, WorkerError, WorkerMessage, WorkerState};
use shellcache::{CacheStorage, Outcome, PartitionKind, Registration, Request, Response, ServiceWorker, WorkerConfig, WorkerContext};
use url::Url;

const APP: &str = "https://placar.example/";

fn config(version: &str) -> WorkerConfig {
    WorkerConfig {
        scope: Url::parse(APP).unwrap(),
        version: version.to_string(),
        core_assets: vec!["/".to_string(), "/index.html".to_string(), "/app.js".to_string()],
        ..Default::default()
    }
}

fn serve_shell(network: &ScriptedNetwork, tag: &str) {
    network.serve("https://placar.example/", &format!("root {}", tag));
    network.serve("https://placar.example/index.html", &format!("index {}", tag));
    network.serve("https://placar.example/app.js", &format!("app {}", tag));
}

fn get(url: &str) -> Request {
    Request::parse_get(url).unwrap()
}

#[tokio::test]
async fn test_install_caches_manifest_and_serves_it_offline() {
    let network = ScriptedNetwork::new();
    serve_shell(&network, "v1");
    let storage = CacheStorage::in_memory();
    let mut worker = ServiceWorker::new(WorkerContext::new(config("v1"), storage.clone(), network.clone()));

    let report = worker.install().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(worker.state(), WorkerState::Installed);
    let core = storage.partition("placar-fut-cache-v1").await.unwrap();
    assert_eq!(core.len(), 3);
    let urls: Vec<&str> = core.keys().map(|k| k.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://placar.example/",
            "https://placar.example/index.html",
            "https://placar.example/app.js"
        ]
    );

    worker.activate(&ClientHub::new()).await.unwrap();
    network.serve("https://placar.example/app.js", "app changed after install");
    network.set_offline(true);

    let outcome = worker.interceptor().handle(&get("https://placar.example/app.js")).await;

    assert_eq!(
        outcome,
        Outcome::Cached {
            partition: PartitionKind::Core,
            response: Response::new(200, "app v1", "https://placar.example/app.js"),
        }
    );
}

#[tokio::test]
async fn test_install_with_unreachable_asset_keeps_the_rest() {
    let network = ScriptedNetwork::new();
    network.serve("https://placar.example/", "root");
    network.serve("https://placar.example/index.html", "index");
    network.serve_status("https://placar.example/app.js", 500, "boom");
    let storage = CacheStorage::in_memory();
    let mut worker = ServiceWorker::new(WorkerContext::new(config("v1"), storage.clone(), network.clone()));

    let report = worker.install().await.unwrap();

    assert_eq!(worker.state(), WorkerState::Installed);
    assert_eq!(report.stored.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].url, "https://placar.example/app.js");
    assert!(report.failures[0].to_string().contains("500"));
    assert_eq!(storage.partition("placar-fut-cache-v1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_activation_deletes_only_stale_partitions() {
    let network = ScriptedNetwork::new();
    serve_shell(&network, "v2");
    let storage = CacheStorage::in_memory();
    let key = get(APP).cache_key();
    for name in [
        "placar-fut-cache-v1",
        "placar-fut-dynamic-v1",
        "placar-fut-dynamic-v2",
        "another-app-cache-v1",
    ] {
        storage
            .put(name, key.clone(), Response::new(200, name.to_string(), APP))
            .await
            .unwrap();
    }
    let mut worker = ServiceWorker::new(WorkerContext::new(config("v2"), storage.clone(), network.clone()));
    worker.install().await.unwrap();

    let report = worker.activate(&ClientHub::new()).await.unwrap();

    assert_eq!(worker.state(), WorkerState::Active);
    assert_eq!(report.deleted, vec!["placar-fut-cache-v1", "placar-fut-dynamic-v1"]);
    let mut remaining = storage.keys().await;
    remaining.sort();
    assert_eq!(
        remaining,
        vec!["another-app-cache-v1", "placar-fut-cache-v2", "placar-fut-dynamic-v2"]
    );
    // Current-version partitions are untouched
    assert_eq!(
        storage.match_key("placar-fut-dynamic-v2", &key).await.unwrap().body,
        "placar-fut-dynamic-v2"
    );
}

#[tokio::test]
async fn test_activation_claims_and_notifies_clients() {
    let network = ScriptedNetwork::new();
    serve_shell(&network, "v1");
    let mut registration = Registration::new(CacheStorage::in_memory(), network.clone());
    let mut page = registration.clients().connect();

    let report = registration.register(config("v1")).await.unwrap();

    let activation = report.activation.expect("first version activates at once");
    assert_eq!(activation.claimed, 1);
    assert_eq!(activation.notified, 1);
    assert_eq!(registration.clients().controller(page.id()).as_deref(), Some("v1"));
    assert_eq!(
        page.recv().await,
        Some(WorkerMessage::Updated {
            version: "v1".to_string()
        })
    );
}

#[tokio::test]
async fn test_no_broadcast_when_disabled() {
    let network = ScriptedNetwork::new();
    serve_shell(&network, "v1");
    let mut registration = Registration::new(CacheStorage::in_memory(), network.clone());
    let mut page = registration.clients().connect();

    let report = registration
        .register(WorkerConfig {
            broadcast_on_activate: false,
            ..config("v1")
        })
        .await
        .unwrap();

    assert_eq!(report.activation.unwrap().notified, 0);
    assert!(page.try_recv().is_none());
    assert_eq!(registration.clients().controller(page.id()).as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_new_version_waits_until_skip_waiting_message() {
    let network = ScriptedNetwork::new();
    serve_shell(&network, "v1");
    let storage = CacheStorage::in_memory();
    let mut registration = Registration::new(storage.clone(), network.clone());
    registration.register(config("v1")).await.unwrap();

    serve_shell(&network, "v2");
    let report = registration
        .register(WorkerConfig {
            skip_waiting_on_install: false,
            ..config("v2")
        })
        .await
        .unwrap();

    assert!(report.activation.is_none());
    assert_eq!(registration.active().unwrap().version(), "v1");
    assert_eq!(registration.waiting().unwrap().state(), WorkerState::Installed);
    assert!(storage.has("placar-fut-cache-v1").await);
    assert!(storage.has("placar-fut-cache-v2").await);

    let outcome = registration.post_message(r#"{"action":"skipWaiting"}"#).await.unwrap();

    match outcome {
        MessageOutcome::Activated(Some(activation)) => {
            assert_eq!(activation.version, "v2");
            assert_eq!(activation.deleted, vec!["placar-fut-cache-v1"]);
        }
        other => panic!("expected activation, got {:?}", other),
    }
    assert_eq!(registration.active().unwrap().version(), "v2");
    assert!(registration.waiting().is_none());
    assert!(!storage.has("placar-fut-cache-v1").await);
}

#[tokio::test]
async fn test_skip_waiting_on_install_replaces_active_version() {
    let network = ScriptedNetwork::new();
    serve_shell(&network, "v1");
    let mut registration = Registration::new(CacheStorage::in_memory(), network.clone());
    registration.register(config("v1")).await.unwrap();

    serve_shell(&network, "v2");
    let report = registration.register(config("v2")).await.unwrap();

    assert_eq!(report.activation.unwrap().version, "v2");
    assert_eq!(registration.active().unwrap().version(), "v2");
    assert!(registration.waiting().is_none());
}

#[tokio::test]
async fn test_immediate_activation_discards_older_waiting_version() {
    let network = ScriptedNetwork::new();
    serve_shell(&network, "v1");
    let storage = CacheStorage::in_memory();
    let mut registration = Registration::new(storage.clone(), network.clone());
    registration.register(config("v1")).await.unwrap();
    registration
        .register(WorkerConfig {
            skip_waiting_on_install: false,
            ..config("v2")
        })
        .await
        .unwrap();
    assert_eq!(registration.waiting().unwrap().version(), "v2");

    registration.register(config("v3")).await.unwrap();

    assert_eq!(registration.active().unwrap().version(), "v3");
    assert!(registration.waiting().is_none());

    let outcome = registration.post_message("skipWaiting").await.unwrap();

    assert_eq!(outcome, MessageOutcome::Activated(None));
    assert_eq!(registration.active().unwrap().version(), "v3");
    assert_eq!(storage.keys().await, vec!["placar-fut-cache-v3"]);
}

#[tokio::test]
async fn test_promotion_waits_for_outgoing_version_writes() {
    let network = ScriptedNetwork::new();
    serve_shell(&network, "v1");
    let storage = CacheStorage::in_memory();
    let mut registration = Registration::new(storage.clone(), network.clone());
    registration.register(config("v1")).await.unwrap();

    let outgoing = registration.interceptor().unwrap().clone();
    outgoing.handle(&get("https://placar.example/app.js")).await;

    registration.register(config("v2")).await.unwrap();
    outgoing.settle().await;

    let mut remaining = storage.keys().await;
    remaining.sort();
    assert_eq!(remaining, vec!["placar-fut-cache-v2"]);
}

#[tokio::test]
async fn test_skip_waiting_without_waiting_version_is_noop() {
    let network = ScriptedNetwork::new();
    serve_shell(&network, "v1");
    let mut registration = Registration::new(CacheStorage::in_memory(), network.clone());
    registration.register(config("v1")).await.unwrap();

    let outcome = registration.post_message("skipWaiting").await.unwrap();

    assert_eq!(outcome, MessageOutcome::Activated(None));
    assert_eq!(registration.active().unwrap().version(), "v1");
}

#[tokio::test]
async fn test_clear_cache_message_deletes_current_partitions() {
    let network = ScriptedNetwork::new();
    serve_shell(&network, "v1");
    let storage = CacheStorage::in_memory();
    let mut registration = Registration::new(storage.clone(), network.clone());
    registration.register(config("v1")).await.unwrap();

    let interceptor = registration.interceptor().unwrap().clone();
    interceptor.handle(&get("https://placar.example/app.js")).await;
    interceptor.settle().await;
    assert!(storage.has("placar-fut-dynamic-v1").await);

    let outcome = registration.post_message(r#"{"action":"clearCache"}"#).await.unwrap();

    assert_eq!(
        outcome,
        MessageOutcome::Cleared(vec![
            "placar-fut-cache-v1".to_string(),
            "placar-fut-dynamic-v1".to_string()
        ])
    );
    assert!(storage.keys().await.is_empty());
}

#[tokio::test]
async fn test_clear_cache_without_active_worker_fails() {
    let mut registration = Registration::new(CacheStorage::in_memory(), ScriptedNetwork::new());

    let result = registration.post_message("clearCache").await;

    assert!(matches!(result, Err(WorkerError::NoActiveWorker)));
}

#[tokio::test]
async fn test_unknown_message_is_rejected() {
    let mut registration = Registration::new(CacheStorage::in_memory(), ScriptedNetwork::new());

    let result = registration.post_message(r#"{"action":"reload"}"#).await;

    assert!(matches!(result, Err(WorkerError::Message(_))));
}

#[tokio::test]
async fn test_register_rejects_invalid_config() {
    let mut registration = Registration::new(CacheStorage::in_memory(), ScriptedNetwork::new());

    let result = registration
        .register(WorkerConfig {
            version: String::new(),
            ..config("v1")
        })
        .await;

    assert!(matches!(result, Err(WorkerError::Config(_))));
    assert!(registration.active().is_none());
}

#[tokio::test]
async fn test_interceptor_is_none_before_registration() {
    let registration = Registration::new(CacheStorage::in_memory(), ScriptedNetwork::new());
    assert!(registration.interceptor().is_none());
}
