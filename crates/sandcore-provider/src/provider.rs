use crate::request::GraphRunRequest;
use async_stream::stream;
use sandcore_core::envelope::SandboxProgramContract;
use sandcore_core::events::{GatewayAgentEvent, RunEvent};
use sandcore_core::{CoreError, CoreResult};
use sandcore_gateway::GatewayClient;
use sandcore_proxy::ProxyManager;
use sandcore_sandbox::{EphemeralRunner, LlmProxyBridge, RunSpec, SandboxFailure};
use sandcore_security::headers::SpendLogsMetadata;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where each ephemeral run's host workspace directory is rooted;
/// `{base}/{run_id}/` is bind-mounted into the container.
#[derive(Clone)]
pub struct ProviderConfig {
    pub workspace_base_dir: PathBuf,
    pub sandbox_image: String,
    pub gateway_model_default: Option<String>,
    pub gateway_run_timeout: Duration,
    /// The upstream LLM endpoint every per-run proxy forwards to.
    pub upstream_llm_url: String,
    /// The core's upstream LLM master key, never forwarded to the caller
    /// and never placed in a sandboxed container's environment.
    pub master_key: Arc<sandcore_security::MasterKey>,
}

/// Orchestrates one run end to end: acquire a proxy, execute ephemeral or
/// gateway, translate outputs into [`RunEvent`], always release.
pub struct GraphProvider {
    proxy_manager: Arc<ProxyManager>,
    runner: Arc<EphemeralRunner>,
    gateway: Arc<GatewayClient>,
    config: ProviderConfig,
}

impl GraphProvider {
    pub fn new(
        proxy_manager: Arc<ProxyManager>,
        runner: Arc<EphemeralRunner>,
        gateway: Arc<GatewayClient>,
        config: ProviderConfig,
    ) -> Self {
        Self {
            proxy_manager,
            runner,
            gateway,
            config,
        }
    }

    /// Run `request` and produce its `RunEvent` stream.
    ///
    /// Ordering guarantee: `accepted` is emitted exactly once, first;
    /// `final`/`error` exactly once, last; `usage_report` events may follow
    /// `final` since billing is independent of content delivery. Cancelling
    /// the returned stream (dropping it) still lets the spawned teardown
    /// path run to completion via the proxy release below.
    pub fn run(
        self: Arc<Self>,
        request: GraphRunRequest,
        cancel: CancellationToken,
    ) -> impl Stream<Item = RunEvent> {
        try_stream_to_run_events(self, request, cancel)
    }
}

fn try_stream_to_run_events(
    provider: Arc<GraphProvider>,
    request: GraphRunRequest,
    cancel: CancellationToken,
) -> impl Stream<Item = RunEvent> {
    stream! {
        let run_id = request.run_id.clone();
        yield RunEvent::Accepted { run_id: run_id.clone() };

        let outcome = if request.is_ephemeral() {
            run_ephemeral(&provider, &request, cancel).await
        } else {
            // Inlined rather than delegated to a helper fn: only code
            // directly inside this generator can `yield`, and the gateway
            // path must stream each `TextDelta` as it arrives instead of
            // collecting and replaying it after the run finishes.
            match start_gateway_run(&provider, &request).await {
                Ok(mut rx) => {
                    let mut final_text = String::new();
                    let outcome = loop {
                        tokio::select! {
                            event = rx.recv() => {
                                let Some(event) = event else {
                                    break Err(CoreError::GatewayUnavailable {
                                        attempts: 0,
                                        message: "connection closed mid-run".into(),
                                    });
                                };
                                match event {
                                    GatewayAgentEvent::Accepted { run_id, .. } => {
                                        info!(run_id, "gateway accepted run");
                                    }
                                    GatewayAgentEvent::TextDelta { text, .. } => {
                                        yield RunEvent::TextDelta {
                                            run_id: run_id.clone(),
                                            text: text.clone(),
                                        };
                                        final_text.push_str(&text);
                                    }
                                    GatewayAgentEvent::ChatFinal { text, .. } => {
                                        final_text = text;
                                        break Ok(());
                                    }
                                    GatewayAgentEvent::ChatError { message, .. } => {
                                        break Err(CoreError::GatewayUnavailable { attempts: 0, message });
                                    }
                                }
                            }
                            _ = cancel.cancelled() => {
                                let _ = provider.gateway.cancel(&request.run_id).await;
                                break Err(CoreError::Cancelled);
                            }
                        }
                    };

                    match outcome {
                        Ok(()) => provider
                            .proxy_manager
                            .read_audit_entries(&request.run_id)
                            .await
                            .map(|usage| RunOutcome { final_text, usage }),
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            }
        };

        match outcome {
            Ok(RunOutcome { final_text, usage }) => {
                for entry in usage {
                    yield RunEvent::UsageReport {
                        run_id: run_id.clone(),
                        litellm_call_id: entry.litellm_call_id,
                        cost_usd: entry.cost_usd,
                        model: request.model.clone(),
                        graph_id: request.graph_id.clone(),
                    };
                }
                yield RunEvent::Final { run_id: run_id.clone(), text: final_text };
            }
            Err(e) => {
                yield RunEvent::Error {
                    run_id: run_id.clone(),
                    message: e.to_string(),
                    code: Some(e.kind().as_str().to_string()),
                };
            }
        }

        let _ = provider.proxy_manager.release(&run_id).await;
    }
}

struct RunOutcome {
    final_text: String,
    usage: Vec<sandcore_core::billing::AuditEntry>,
}

async fn run_ephemeral(
    provider: &GraphProvider,
    request: &GraphRunRequest,
    cancel: CancellationToken,
) -> CoreResult<RunOutcome> {
    let spend_logs_metadata = serde_json::to_string(&SpendLogsMetadata {
        run_id: request.run_id.clone(),
        attempt: request.attempt,
        graph_id: request.graph_id.clone(),
    })?;

    let proxy = provider
        .proxy_manager
        .acquire(
            &request.run_id,
            &provider.config.upstream_llm_url,
            &provider.config.master_key,
            &request.caller.billing_account_id,
            &spend_logs_metadata,
        )
        .await?;

    let workspace_dir = provider
        .config
        .workspace_base_dir
        .join(&request.run_id);
    tokio::fs::create_dir_all(&workspace_dir).await?;
    if let Some(message) = &request.message {
        tokio::fs::write(workspace_dir.join("input.txt"), message).await?;
    }

    let spec = RunSpec {
        run_id: request.run_id.clone(),
        image: provider.config.sandbox_image.clone(),
        command: None,
        workspace_dir,
        container_workspace_path: "/workspace".to_string(),
        extra_mounts: vec![],
        user_env: BTreeMap::new(),
        llm_proxy: LlmProxyBridge::UnixSocket {
            host_socket_path: proxy.unix_socket_path.clone(),
        },
        limits: request.limits,
    };

    let outcome = provider
        .runner
        .run_once(spec, Some(&proxy.master_key), cancel)
        .await?;

    let usage = provider.proxy_manager.read_audit_entries(&request.run_id).await?;

    match outcome.failure {
        Some(SandboxFailure::InvalidEnvelope) => {
            return Err(CoreError::InvalidEnvelope(format!(
                "stdout did not parse as a SandboxProgramContract: {}",
                outcome.stdout
            )));
        }
        Some(SandboxFailure::NonZeroExit) => {
            return Err(CoreError::SandboxNonZeroExit {
                exit_code: outcome.exit_code,
                stderr: outcome.stderr,
            });
        }
        None => {}
    }

    let envelope: SandboxProgramContract = outcome
        .envelope
        .ok_or_else(|| CoreError::InvalidEnvelope("missing envelope on successful exit".into()))?;

    if let Some(reported) = envelope.reported_error() {
        warn!(run_id = %request.run_id, error = reported, "agent reported an error in its envelope");
    }

    Ok(RunOutcome {
        final_text: envelope.combined_text(),
        usage,
    })
}

/// Acquire this run's proxy (so upstream billing headers get captured) and
/// start the gateway session. The caller drives the returned event stream
/// itself so it can forward `TextDelta`s as they arrive rather than
/// collecting them here.
async fn start_gateway_run(
    provider: &GraphProvider,
    request: &GraphRunRequest,
) -> CoreResult<mpsc::Receiver<GatewayAgentEvent>> {
    let spend_logs_metadata = serde_json::to_string(&SpendLogsMetadata {
        run_id: request.run_id.clone(),
        attempt: request.attempt,
        graph_id: request.graph_id.clone(),
    })?;

    provider
        .proxy_manager
        .acquire(
            &request.run_id,
            &provider.config.upstream_llm_url,
            &provider.config.master_key,
            &request.caller.billing_account_id,
            &spend_logs_metadata,
        )
        .await?;

    let mut outbound_headers = BTreeMap::new();
    outbound_headers.insert(
        "x-litellm-end-user-id".to_string(),
        request.caller.billing_account_id.to_string(),
    );
    outbound_headers.insert("x-litellm-spend-logs-metadata".to_string(), spend_logs_metadata);
    outbound_headers.insert("x-cogni-run-id".to_string(), request.run_id.clone());

    let model = request
        .model
        .clone()
        .or_else(|| provider.config.gateway_model_default.clone());

    provider
        .gateway
        .run_agent(
            &request.run_id,
            request.message.as_deref().unwrap_or_default(),
            outbound_headers,
            provider.config.gateway_run_timeout,
            model.as_deref(),
        )
        .await
}

