use crate::outcome::SandboxOutcome;
use crate::spec::{LlmProxyBridge, RunSpec};
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use sandcore_core::envelope::SandboxProgramContract;
use sandcore_core::{CoreError, CoreResult};
use sandcore_security::MasterKey;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Bridges the proxy's host socket into the container at this fixed path.
const IN_CONTAINER_PROXY_SOCKET: &str = "/var/run/sandcore-proxy.sock";

/// Runs one untrusted program to completion inside a locked-down container.
pub struct EphemeralRunner {
    docker: Docker,
}

impl EphemeralRunner {
    /// Connect to the local Docker daemon.
    pub fn new() -> CoreResult<Self> {
        Ok(Self {
            docker: Docker::connect_with_local_defaults()?,
        })
    }

    /// Build an `EphemeralRunner` around an already-connected client, mainly
    /// for tests.
    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Run `spec`'s program to completion, enforcing its runtime and memory
    /// ceilings, and always cleaning up the container regardless of which
    /// branch finished first.
    ///
    /// Returns `Err` for anything that prevents a meaningful outcome
    /// (startup failure, timeout, cancellation); returns `Ok` for any
    /// container that actually ran, including a non-zero exit or a
    /// malformed stdout envelope.
    pub async fn run_once(
        &self,
        spec: RunSpec,
        master_key: Option<&MasterKey>,
        cancel: CancellationToken,
    ) -> CoreResult<SandboxOutcome> {
        let container_id = self.create_and_start(&spec, master_key).await?;

        let max_runtime = Duration::from_secs(u64::from(spec.limits.max_runtime_sec));
        let wait_result = tokio::select! {
            result = self.wait_for_exit(&container_id) => WaitOutcome::Exited(result),
            _ = tokio::time::sleep(max_runtime) => WaitOutcome::TimedOut,
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        let logs = self.collect_logs(&container_id).await.unwrap_or_default();
        self.cleanup(&container_id).await;

        match wait_result {
            WaitOutcome::TimedOut => {
                warn!(run_id = %spec.run_id, "sandbox exceeded maxRuntimeSec, killed");
                Err(CoreError::SandboxTimeout {
                    elapsed_secs: spec.limits.max_runtime_sec.into(),
                })
            }
            WaitOutcome::Cancelled => Err(CoreError::Cancelled),
            WaitOutcome::Exited(Err(e)) => Err(e),
            WaitOutcome::Exited(Ok(exit_code)) => {
                if exit_code != 0 {
                    return Ok(SandboxOutcome::non_zero_exit(
                        exit_code,
                        logs.stdout,
                        logs.stderr,
                    ));
                }
                match SandboxProgramContract::parse(&logs.stdout) {
                    Ok(envelope) => Ok(SandboxOutcome::success(logs.stdout, logs.stderr, envelope)),
                    Err(_) => Ok(SandboxOutcome::invalid_envelope(logs.stdout, logs.stderr)),
                }
            }
        }
    }

    async fn create_and_start(
        &self,
        spec: &RunSpec,
        master_key: Option<&MasterKey>,
    ) -> CoreResult<String> {
        let memory_bytes = i64::from(spec.limits.max_memory_mb) * 1024 * 1024;

        let mut binds = vec![format!(
            "{}:{}:rw",
            spec.workspace_dir.display(),
            spec.container_workspace_path
        )];
        for mount in &spec.extra_mounts {
            binds.push(format!(
                "{}:{}:{}",
                mount.host_path.display(),
                mount.container_path,
                if mount.read_only { "ro" } else { "rw" }
            ));
        }

        let network_mode = match &spec.llm_proxy {
            LlmProxyBridge::Disabled => "none".to_string(),
            LlmProxyBridge::UnixSocket { host_socket_path } => {
                binds.push(format!(
                    "{}:{}:rw",
                    host_socket_path.display(),
                    IN_CONTAINER_PROXY_SOCKET
                ));
                "none".to_string()
            }
        };

        let host_config = HostConfig {
            memory: Some(memory_bytes),
            network_mode: Some(network_mode),
            binds: Some(binds),
            ..Default::default()
        };

        let proxy_enabled = matches!(spec.llm_proxy, LlmProxyBridge::UnixSocket { .. });
        let env = master_key
            .map(|key| build_env(&spec.user_env, proxy_enabled, key))
            .unwrap_or_else(|| build_env_without_key(&spec.user_env, proxy_enabled));

        let cmd = spec.command.clone().unwrap_or_default();
        let entrypoint_cmd = if proxy_enabled {
            vec![
                "sh".to_string(),
                "-c".to_string(),
                format!(
                    "socat UNIX-CONNECT:{IN_CONTAINER_PROXY_SOCKET} TCP-LISTEN:8080,fork,reuseaddr & exec {}",
                    shell_join(&cmd)
                ),
            ]
        } else {
            cmd
        };

        let container_config = ContainerConfig {
            image: Some(spec.image.clone()),
            working_dir: Some(spec.container_workspace_path.clone()),
            env: Some(env),
            cmd: if entrypoint_cmd.is_empty() {
                None
            } else {
                Some(entrypoint_cmd)
            },
            host_config: Some(host_config),
            ..Default::default()
        };

        let name = format!("sandcore-run-{}", spec.run_id);
        let container = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                container_config,
            )
            .await
            .map_err(|e| CoreError::SandboxStartFailed(e.to_string()))?;

        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| CoreError::SandboxStartFailed(e.to_string()))?;

        info!(run_id = %spec.run_id, container_id = %container.id, "sandbox container started");
        Ok(container.id)
    }

    async fn wait_for_exit(&self, container_id: &str) -> CoreResult<i64> {
        let mut stream = self
            .docker
            .wait_container(container_id, None::<WaitContainerOptions<String>>);
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            Some(Err(e)) => Err(CoreError::Container(e)),
            None => Ok(-1),
        }
    }

    async fn collect_logs(&self, container_id: &str) -> CoreResult<CollectedLogs> {
        let mut stream = self.docker.logs(
            container_id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) => {
                    stdout.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(LogOutput::StdErr { message }) => {
                    stderr.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(container_id, error = %e, "error reading sandbox logs");
                    break;
                }
            }
        }
        Ok(CollectedLogs { stdout, stderr })
    }

    async fn cleanup(&self, container_id: &str) {
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

impl Default for EphemeralRunner {
    fn default() -> Self {
        Self::new().expect("docker daemon reachable")
    }
}

enum WaitOutcome {
    Exited(CoreResult<i64>),
    TimedOut,
    Cancelled,
}

#[derive(Default)]
struct CollectedLogs {
    stdout: String,
    stderr: String,
}

fn shell_join(cmd: &[String]) -> String {
    cmd.iter()
        .map(|part| format!("'{}'", part.replace('\'', "'\\''")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the allowlisted environment passed into the sandbox.
///
/// Only `OPENAI_API_BASE` (when the proxy bridge is enabled) and the
/// caller's explicitly enumerated `user_env` ever appear here. `master_key`
/// is accepted purely so this function can assert its secret never ends up
/// in the constructed list — see the test below and
/// [`SandboxOutcome`](crate::outcome::SandboxOutcome)'s invariants.
pub fn build_env(
    user_env: &std::collections::BTreeMap<String, String>,
    proxy_enabled: bool,
    master_key: &MasterKey,
) -> Vec<String> {
    let env = build_env_without_key(user_env, proxy_enabled);
    debug_assert!(
        env.iter().all(|entry| !entry.contains(master_key.expose())),
        "master key must never appear in the sandbox container environment"
    );
    env
}

fn build_env_without_key(
    user_env: &std::collections::BTreeMap<String, String>,
    proxy_enabled: bool,
) -> Vec<String> {
    let mut env = Vec::with_capacity(user_env.len() + 1);
    if proxy_enabled {
        env.push("OPENAI_API_BASE=http://127.0.0.1:8080/v1".to_string());
    }
    for (key, value) in user_env {
        env.push(format!("{key}={value}"));
    }
    env
}
