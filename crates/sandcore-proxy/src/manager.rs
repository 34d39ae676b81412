//! `ProxyManager`: launches, health-checks, and tears down per-run proxy
//! containers, and sweeps orphans left behind by a prior process.

use crate::audit::read_audit_entries;
use crate::instance::{ProxyConfig, ProxyInstance};
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::models::HostConfig;
use bollard::Docker;
use sandcore_core::billing::AuditEntry;
use sandcore_core::{CoreError, CoreResult};
use sandcore_security::MasterKey;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{Notify, RwLock};
use tracing::{info, warn};

/// One request for a run's proxy has already completed creation, or is
/// still in flight. `Acquire` calls racing on the same `run_id` share this
/// slot instead of launching a second container.
type CreationResult = Result<ProxyInstance, String>;

struct LiveSlot {
    instance: RwLock<Option<CreationResult>>,
    notify: Notify,
}

/// Owns the set of live per-run proxies.
pub struct ProxyManager {
    docker: Docker,
    config: ProxyConfig,
    live: RwLock<HashMap<String, Arc<LiveSlot>>>,
}

#[derive(Serialize)]
struct ProxyContainerConfig<'a> {
    upstream_llm_url: &'a str,
    master_key: &'a str,
    end_user_id: &'a str,
    spend_logs_metadata: &'a str,
    run_id: &'a str,
    listen_socket: &'a str,
}

impl ProxyManager {
    /// Connect to the local Docker daemon and build a manager with no live
    /// proxies yet.
    pub fn new(config: ProxyConfig) -> CoreResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self {
            docker,
            config,
            live: RwLock::new(HashMap::new()),
        })
    }

    /// Build a manager around an already-connected Docker client, mainly for
    /// tests that point at a non-default daemon socket.
    pub fn with_client(docker: Docker, config: ProxyConfig) -> Self {
        Self {
            docker,
            config,
            live: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the live proxy for `run_id`.
    ///
    /// A second `Acquire` call for a `run_id` that already has a live
    /// instance returns a clone of it. A second call racing the first while
    /// the container is still starting waits on the same creation instead of
    /// launching a duplicate container. Only a `run_id` whose previous
    /// instance has already been released, with a new one not yet requested,
    /// starts a fresh creation.
    pub async fn acquire(
        &self,
        run_id: &str,
        upstream_llm_url: &str,
        master_key: &MasterKey,
        end_user_id: &str,
        spend_logs_metadata: &str,
    ) -> CoreResult<ProxyInstance> {
        let (slot, is_owner) = {
            let mut live = self.live.write().await;
            if let Some(slot) = live.get(run_id) {
                (slot.clone(), false)
            } else {
                let slot = Arc::new(LiveSlot {
                    instance: RwLock::new(None),
                    notify: Notify::new(),
                });
                live.insert(run_id.to_string(), slot.clone());
                (slot, true)
            }
        };

        if is_owner {
            let result = self
                .create_instance(run_id, upstream_llm_url, master_key, end_user_id, spend_logs_metadata)
                .await;
            let outcome: CreationResult = match &result {
                Ok(inst) => Ok(inst.clone()),
                Err(e) => Err(e.to_string()),
            };
            if outcome.is_err() {
                self.live.write().await.remove(run_id);
            }
            *slot.instance.write().await = Some(outcome);
            slot.notify.notify_waiters();
            return result;
        }

        loop {
            // `notified()` must be constructed before the state check below:
            // `notify_waiters` only wakes `Notified` futures that already
            // exist at the time it's called, so checking first and creating
            // the future second would miss a notification sent in between.
            let notified = slot.notify.notified();
            if let Some(outcome) = slot.instance.read().await.as_ref() {
                return outcome
                    .clone()
                    .map_err(|e| CoreError::ProxyStartFailed(e));
            }
            notified.await;
        }
    }

    async fn create_instance(
        &self,
        run_id: &str,
        upstream_llm_url: &str,
        master_key: &MasterKey,
        end_user_id: &str,
        spend_logs_metadata: &str,
    ) -> CoreResult<ProxyInstance> {
        let run_dir = self.config.base_dir.join(run_id);
        tokio::fs::create_dir_all(&run_dir).await?;

        let unix_socket_path = run_dir.join("proxy.sock");
        let audit_log_path = run_dir.join("audit.jsonl");
        let config_path = run_dir.join("config.json");

        let container_config = ProxyContainerConfig {
            upstream_llm_url,
            master_key: master_key.expose(),
            end_user_id,
            spend_logs_metadata,
            run_id,
            listen_socket: "/run/sandcore/proxy.sock",
        };
        tokio::fs::write(&config_path, serde_json::to_vec(&container_config)?).await?;

        // The proxy is the one outbound service an isolated sandbox container
        // can reach (spec: "exactly one outbound service") — it needs egress
        // to the upstream LLM itself, so it runs on the bridge network rather
        // than `none`. Only the sandbox container is fully network-isolated.
        let host_config = HostConfig {
            network_mode: Some(self.config.network_mode.clone()),
            binds: Some(vec![format!(
                "{}:/run/sandcore:rw",
                run_dir.display()
            )]),
            ..Default::default()
        };
        let mut labels = HashMap::new();
        labels.insert(
            ProxyInstance::OWNER_LABEL.to_string(),
            ProxyInstance::OWNER_LABEL_VALUE.to_string(),
        );
        labels.insert(ProxyInstance::RUN_ID_LABEL.to_string(), run_id.to_string());

        let create_opts = ContainerConfig {
            image: Some(self.config.proxy_image.clone()),
            env: Some(vec![
                "SANDCORE_PROXY_CONFIG=/run/sandcore/config.json".to_string(),
            ]),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let name = format!("sandcore-proxy-{run_id}");
        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                create_opts,
            )
            .await
            .map_err(|e| CoreError::ProxyStartFailed(e.to_string()))?;

        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| CoreError::ProxyStartFailed(e.to_string()))?;

        wait_for_socket_health(&unix_socket_path, self.config.startup_timeout_secs).await?;

        info!(run_id, container_id = %container.id, "proxy instance acquired");

        Ok(ProxyInstance {
            run_id: run_id.to_string(),
            unix_socket_path,
            upstream_llm_url: upstream_llm_url.to_string(),
            master_key: MasterKey::new(master_key.expose().to_string()),
            end_user_id: end_user_id.to_string(),
            spend_logs_metadata: spend_logs_metadata.to_string(),
            container_id: Some(container.id),
            audit_log_path,
        })
    }

    /// Tear down the live proxy for `run_id`, if any. Idempotent: releasing
    /// a `run_id` with no live instance is a no-op.
    pub async fn release(&self, run_id: &str) -> CoreResult<()> {
        let slot = self.live.write().await.remove(run_id);
        let Some(slot) = slot else {
            return Ok(());
        };

        let container_id = match slot.instance.read().await.as_ref() {
            Some(Ok(inst)) => inst.container_id.clone(),
            _ => None,
        };

        if let Some(container_id) = container_id {
            self.stop_and_remove(&container_id).await;
        }

        let run_dir = self.config.base_dir.join(run_id);
        let _ = tokio::fs::remove_dir_all(&run_dir).await;

        Ok(())
    }

    /// Read every audit entry recorded so far for `run_id`'s live proxy.
    pub async fn read_audit_entries(&self, run_id: &str) -> CoreResult<Vec<AuditEntry>> {
        let live = self.live.read().await;
        let Some(slot) = live.get(run_id) else {
            return Ok(Vec::new());
        };
        match slot.instance.read().await.as_ref() {
            Some(Ok(inst)) => read_audit_entries(&inst.audit_log_path).await,
            _ => Ok(Vec::new()),
        }
    }

    /// Remove proxy containers owned by this core (by label) whose `run_id`
    /// is not in the live set. Called periodically to clean up after a
    /// crash or unclean restart.
    pub async fn sweep(&self) -> CoreResult<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!(
                "{}={}",
                ProxyInstance::OWNER_LABEL,
                ProxyInstance::OWNER_LABEL_VALUE
            )],
        );
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        let live_run_ids: std::collections::HashSet<String> =
            self.live.read().await.keys().cloned().collect();

        let mut removed = Vec::new();
        for container in containers {
            let Some(labels) = &container.labels else {
                continue;
            };
            let Some(owned_run_id) = labels.get(ProxyInstance::RUN_ID_LABEL) else {
                continue;
            };
            if live_run_ids.contains(owned_run_id) {
                continue;
            }
            let Some(id) = &container.id else { continue };
            warn!(run_id = owned_run_id, container_id = %id, "sweeping orphaned proxy container");
            self.stop_and_remove(id).await;
            removed.push(owned_run_id.clone());

            let run_dir = self.config.base_dir.join(owned_run_id);
            let _ = tokio::fs::remove_dir_all(&run_dir).await;
        }

        Ok(removed)
    }

    /// Spawn a background task that calls `sweep` on a fixed interval for as
    /// long as `self` lives. Intended to run once at process start (an
    /// explicit `sweep()` call, not this task) and then periodically
    /// thereafter to clean up after an unclean restart.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(removed) if !removed.is_empty() => {
                        info!(count = removed.len(), "periodic sweep removed orphaned proxies");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "periodic sweep failed"),
                }
            }
        })
    }

    async fn stop_and_remove(&self, container_id: &str) {
        let _ = self
            .docker
            .stop_container(container_id, Some(StopContainerOptions { t: 5 }))
            .await;
        let _ = self
            .docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
    }
}

/// Poll a unix-socket `/health` endpoint with a raw HTTP/1.1 request until it
/// answers `200`, or the timeout elapses. No unix-socket HTTP client crate is
/// in use anywhere in this workspace's dependency tree, so this is a minimal
/// hand-rolled probe rather than pulling one in for a single GET request.
async fn wait_for_socket_health(socket_path: &std::path::Path, timeout_secs: u64) -> CoreResult<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        if tokio::time::Instant::now() >= deadline {
            return Err(CoreError::ProxyStartFailed(format!(
                "proxy at {} did not become healthy within {timeout_secs}s",
                socket_path.display()
            )));
        }
        match probe_once(socket_path).await {
            Ok(true) => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
}

async fn probe_once(socket_path: &std::path::Path) -> CoreResult<bool> {
    let mut stream = match UnixStream::connect(socket_path).await {
        Ok(stream) => stream,
        Err(_) => return Ok(false),
    };
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    let response = String::from_utf8_lossy(&response);
    Ok(response.starts_with("HTTP/1.1 200") || response.starts_with("HTTP/1.0 200"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn release_of_unknown_run_id_is_a_no_op() {
        let Ok(docker) = Docker::connect_with_local_defaults() else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let manager = ProxyManager::with_client(
            docker,
            ProxyConfig {
                proxy_image: "sandcore/proxy:test".to_string(),
                upstream_llm_url: "http://127.0.0.1:1".to_string(),
                base_dir: dir.path().to_path_buf(),
                startup_timeout_secs: 1,
                network_mode: "bridge".to_string(),
            },
        );
        manager.release("never-acquired").await.unwrap();
    }

    #[tokio::test]
    async fn read_audit_entries_of_unknown_run_id_is_empty() {
        let Ok(docker) = Docker::connect_with_local_defaults() else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let manager = ProxyManager::with_client(
            docker,
            ProxyConfig {
                proxy_image: "sandcore/proxy:test".to_string(),
                upstream_llm_url: "http://127.0.0.1:1".to_string(),
                base_dir: dir.path().to_path_buf(),
                startup_timeout_secs: 1,
                network_mode: "bridge".to_string(),
            },
        );
        let entries = manager.read_audit_entries("never-acquired").await.unwrap();
        assert!(entries.is_empty());
    }
}
