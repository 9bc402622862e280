mod common;

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::Arc;

use localpod::error::{RegistryError, StoreError};
use localpod::pod::store::PersistedPodConfig;
use localpod::pod::{MemoryStore, PersistedState, PodConfig, PodRegistry, StateStore};

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn registry(store: &Arc<MemoryStore>) -> PodRegistry {
    PodRegistry::new(store.clone(), None, LOOPBACK)
}

fn config(name: &str, root: &Path) -> PodConfig {
    PodConfig {
        name: name.to_string(),
        port: 0,
        base_path: root.to_path_buf(),
        uri_prefix: None,
    }
}

#[tokio::test]
async fn test_add_starts_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::default());
    let registry = registry(&store);

    let info = registry.add(config("alice", dir.path())).await.unwrap();
    assert_eq!(info.name, "alice");
    assert!(info.listening);

    let saved = store.snapshot();
    let entry = &saved.pods["alice"];
    assert!(entry.is_active);
    assert_eq!(entry.base_path, dir.path());

    let addr = registry.local_addr("alice").await.unwrap();
    assert_eq!(common::send(addr, "GET", "/", &[], b"").await.status, 200);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_add_rejects_duplicates_and_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::default());
    let registry = registry(&store);
    registry.add(config("alice", dir.path())).await.unwrap();

    let duplicate = registry.add(config("alice", dir.path())).await;
    assert!(matches!(duplicate, Err(RegistryError::AlreadyExists(_))));

    let relative = registry.add(config("bob", Path::new("relative/dir"))).await;
    assert!(matches!(relative, Err(RegistryError::Invalid(_))));

    let unnamed = registry.add(config("  ", dir.path())).await;
    assert!(matches!(unnamed, Err(RegistryError::Invalid(_))));

    assert_eq!(registry.list().await.len(), 1);
    assert_eq!(store.snapshot().pods.len(), 1);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_failed_add_stores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let occupied = tokio::net::TcpListener::bind((LOOPBACK, 0)).await.unwrap();
    let port = occupied.local_addr().unwrap().port();
    let store = Arc::new(MemoryStore::default());
    let registry = registry(&store);

    let mut busy = config("busy", dir.path());
    busy.port = port;
    let result = registry.add(busy).await;

    assert!(matches!(result, Err(RegistryError::Pod(_))));
    assert_eq!(result.unwrap_err().status().as_u16(), 500);
    assert!(registry.list().await.is_empty());
    assert!(store.snapshot().pods.is_empty());
}

#[tokio::test]
async fn test_activate_and_deactivate_update_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::default());
    let registry = registry(&store);
    registry.add(config("alice", dir.path())).await.unwrap();

    let info = registry.deactivate("alice").await.unwrap();
    assert!(!info.listening);
    assert!(!store.snapshot().pods["alice"].is_active);
    assert!(registry.local_addr("alice").await.is_none());

    // deactivating again is a no-op that still succeeds
    registry.deactivate("alice").await.unwrap();

    let info = registry.activate("alice").await.unwrap();
    assert!(info.listening);
    assert!(store.snapshot().pods["alice"].is_active);

    let again = registry.activate("alice").await.unwrap();
    assert!(again.listening);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_unknown_names_are_not_found() {
    let store = Arc::new(MemoryStore::default());
    let registry = registry(&store);

    for result in [
        registry.activate("ghost").await.map(|_| ()),
        registry.deactivate("ghost").await.map(|_| ()),
        registry.delete("ghost").await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert_eq!(err.status().as_u16(), 404);
    }
}

#[tokio::test]
async fn test_delete_stops_and_forgets_but_keeps_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("keep.txt"), "data").unwrap();
    let store = Arc::new(MemoryStore::default());
    let registry = registry(&store);
    registry.add(config("alice", dir.path())).await.unwrap();
    let addr = registry.local_addr("alice").await.unwrap();

    registry.delete("alice").await.unwrap();

    assert!(registry.list().await.is_empty());
    assert!(store.snapshot().pods.is_empty());
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    assert!(dir.path().join("keep.txt").exists());
}

#[tokio::test]
async fn test_list_reports_every_pod_in_name_order() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::default());
    let registry = registry(&store);
    registry.add(config("zed", a.path())).await.unwrap();
    registry.add(config("amy", b.path())).await.unwrap();
    registry.deactivate("zed").await.unwrap();

    let pods = registry.list().await;
    let summary: Vec<_> = pods.iter().map(|p| (p.name.as_str(), p.listening)).collect();
    assert_eq!(summary, vec![("amy", true), ("zed", false)]);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_load_at_startup_starts_only_active_pods() {
    let active = tempfile::tempdir().unwrap();
    let inactive = tempfile::tempdir().unwrap();
    let mut pods = BTreeMap::new();
    pods.insert(
        "on".to_string(),
        PersistedPodConfig {
            port: 0,
            base_path: active.path().to_path_buf(),
            is_active: true,
            uri_prefix: None,
        },
    );
    pods.insert(
        "off".to_string(),
        PersistedPodConfig {
            port: 0,
            base_path: inactive.path().to_path_buf(),
            is_active: false,
            uri_prefix: Some("/data".into()),
        },
    );
    pods.insert(
        "relative".to_string(),
        PersistedPodConfig {
            port: 0,
            base_path: "not/absolute".into(),
            is_active: true,
            uri_prefix: None,
        },
    );
    let initial = PersistedState { pods, cert: None };
    let store = Arc::new(MemoryStore::new(initial.clone()));
    let registry = registry(&store);

    let loaded = registry.load_at_startup().await.unwrap();

    assert_eq!(loaded, 2);
    let pods = registry.list().await;
    let off = pods.iter().find(|p| p.name == "off").unwrap();
    let on = pods.iter().find(|p| p.name == "on").unwrap();
    assert!(!off.listening);
    assert_eq!(off.uri_prefix.as_deref(), Some("/data"));
    assert!(on.listening);
    // loading never rewrites the stored state
    assert_eq!(store.snapshot(), initial);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_pod_that_cannot_bind_at_startup_stays_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let occupied = tokio::net::TcpListener::bind((LOOPBACK, 0)).await.unwrap();
    let mut pods = BTreeMap::new();
    pods.insert(
        "blocked".to_string(),
        PersistedPodConfig {
            port: occupied.local_addr().unwrap().port(),
            base_path: dir.path().to_path_buf(),
            is_active: true,
            uri_prefix: None,
        },
    );
    let store = Arc::new(MemoryStore::new(PersistedState { pods, cert: None }));
    let registry = registry(&store);

    assert_eq!(registry.load_at_startup().await.unwrap(), 1);

    let pods = registry.list().await;
    assert_eq!(pods.len(), 1);
    assert!(!pods[0].listening);
}

#[tokio::test]
async fn test_save_failure_keeps_in_memory_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::default());
    let registry = registry(&store);
    registry.add(config("alice", dir.path())).await.unwrap();

    store.set_fail_saves(true);
    let info = registry.deactivate("alice").await.unwrap();

    assert!(!info.listening);
    assert!(!registry.list().await[0].listening);
    // the store still holds the last successful save
    assert!(store.snapshot().pods["alice"].is_active);

    store.set_fail_saves(false);
    registry.activate("alice").await.unwrap();
    assert!(store.snapshot().pods["alice"].is_active);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_pods_without_persisting() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::default());
    let registry = registry(&store);
    registry.add(config("alice", dir.path())).await.unwrap();

    registry.shutdown().await;

    assert!(!registry.list().await[0].listening);
    assert!(store.snapshot().pods["alice"].is_active);
}

#[tokio::test]
async fn test_concurrent_adds_all_persist() {
    let dirs: Vec<_> = (0..8).map(|_| tempfile::tempdir().unwrap()).collect();
    let store = Arc::new(MemoryStore::default());
    let registry = Arc::new(registry(&store));

    let mut tasks = Vec::new();
    for (i, dir) in dirs.iter().enumerate() {
        let registry = Arc::clone(&registry);
        let cfg = config(&format!("pod{i}"), dir.path());
        tasks.push(tokio::spawn(async move { registry.add(cfg).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.snapshot().pods.len(), 8);
    assert_eq!(registry.list().await.len(), 8);
    registry.shutdown().await;
}

#[tokio::test]
async fn test_deactivate_and_delete_close_open_connections() {
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::default());
    let registry = registry(&store);
    registry.add(config("alice", dir.path())).await.unwrap();

    for action in ["deactivate", "delete"] {
        if action == "delete" {
            registry.activate("alice").await.unwrap();
        }
        let addr = registry.local_addr("alice").await.unwrap();
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(common::read_response(&mut stream).await.status, 200);

        match action {
            "deactivate" => {
                registry.deactivate("alice").await.unwrap();
            }
            _ => registry.delete("alice").await.unwrap(),
        }

        let _ = stream
            .write_all(b"PUT /late.txt HTTP/1.1\r\nContent-Length: 1\r\n\r\nx")
            .await;
        let mut rest = Vec::new();
        let drained =
            tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest)).await;
        assert!(drained.is_ok(), "{action}: connection stayed open");
        assert!(!dir.path().join("late.txt").exists(), "{action}");
    }
}

/// Store whose saves block their thread for a while.
struct SlowStore {
    saving: std::sync::atomic::AtomicBool,
    inner: MemoryStore,
}

impl StateStore for SlowStore {
    fn load(&self) -> Result<PersistedState, StoreError> {
        self.inner.load()
    }

    fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        use std::sync::atomic::Ordering;
        self.saving.store(true, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(200));
        self.saving.store(false, Ordering::SeqCst);
        self.inner.save(state)
    }
}

#[tokio::test]
async fn test_saves_do_not_block_the_runtime() {
    use std::sync::atomic::Ordering;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SlowStore {
        saving: Default::default(),
        inner: MemoryStore::default(),
    });
    let registry = Arc::new(PodRegistry::new(store.clone(), None, LOOPBACK));

    let task = {
        let registry = Arc::clone(&registry);
        let cfg = config("alice", dir.path());
        tokio::spawn(async move { registry.add(cfg).await })
    };

    // on a single-threaded runtime this loop only runs while the save is
    // in progress if the save left the runtime thread
    let mut seen_saving = false;
    while !task.is_finished() {
        seen_saving |= store.saving.load(Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    task.await.unwrap().unwrap();

    assert!(seen_saving);
    assert!(store.inner.snapshot().pods.contains_key("alice"));
    registry.shutdown().await;
}
