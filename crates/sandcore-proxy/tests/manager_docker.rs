//! Integration tests against a real Docker daemon.
//!
//! Ignored by default — run with `cargo test -- --ignored` on a machine with
//! Docker available and `sandcore/proxy:test` built locally.

use bollard::Docker;
use sandcore_proxy::{ProxyConfig, ProxyManager};
use sandcore_security::MasterKey;

fn manager() -> (ProxyManager, tempfile::TempDir) {
    let docker = Docker::connect_with_local_defaults().expect("docker daemon reachable");
    let dir = tempfile::tempdir().unwrap();
    let manager = ProxyManager::with_client(
        docker,
        ProxyConfig {
            proxy_image: "sandcore/proxy:test".to_string(),
            upstream_llm_url: "http://127.0.0.1:4000".to_string(),
            base_dir: dir.path().to_path_buf(),
            startup_timeout_secs: 10,
            network_mode: "bridge".to_string(),
        },
    );
    (manager, dir)
}

#[tokio::test]
#[ignore]
async fn acquire_then_release_cleans_up_the_container() {
    let (manager, _dir) = manager();
    let master_key = MasterKey::new("sk-test");

    let instance = manager
        .acquire("run-1", "http://127.0.0.1:4000", &master_key, "b1", "{}")
        .await
        .unwrap();
    assert_eq!(instance.run_id, "run-1");

    manager.release("run-1").await.unwrap();
    let entries = manager.read_audit_entries("run-1").await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
#[ignore]
async fn concurrent_acquire_for_the_same_run_id_coalesces_to_one_container() {
    let (manager, _dir) = manager();
    let master_key = MasterKey::new("sk-test");

    let (a, b) = tokio::join!(
        manager.acquire("run-2", "http://127.0.0.1:4000", &master_key, "b1", "{}"),
        manager.acquire("run-2", "http://127.0.0.1:4000", &master_key, "b1", "{}"),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.container_id, b.container_id);

    manager.release("run-2").await.unwrap();
}

#[tokio::test]
#[ignore]
async fn sweep_removes_containers_not_in_the_live_set() {
    let (manager, _dir) = manager();
    let master_key = MasterKey::new("sk-test");

    manager
        .acquire("run-3", "http://127.0.0.1:4000", &master_key, "b1", "{}")
        .await
        .unwrap();

    // Simulate a restart: a fresh manager has no live set, so the
    // previous manager's container is an orphan from its point of view.
    let (orphan_finder, _dir2) = manager();
    let removed = orphan_finder.sweep().await.unwrap();
    assert!(removed.contains(&"run-3".to_string()));

    let _ = manager.release("run-3").await;
}
