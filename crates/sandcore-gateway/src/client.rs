use crate::wire::OutboundFrame;
use futures_util::{SinkExt, StreamExt};
use sandcore_core::events::GatewayAgentEvent;
use sandcore_core::{CoreError, CoreResult};
use sandcore_security::MasterKey;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Static configuration for one `GatewayClient`.
#[derive(Clone)]
pub struct GatewayClientConfig {
    /// The gateway's WebSocket URL, e.g. `wss://gateway.internal/ws`.
    pub url: String,
    /// Bearer token authenticating this connection to the gateway.
    pub bearer_token: Arc<MasterKey>,
    /// Initial delay before the first reconnect attempt.
    pub reconnect_initial_backoff: Duration,
    /// Reconnect backoff never grows past this.
    pub reconnect_max_backoff: Duration,
    /// Channel depth for one session's event stream.
    pub session_channel_capacity: usize,
}

impl Default for GatewayClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            bearer_token: Arc::new(MasterKey::new(String::new())),
            reconnect_initial_backoff: Duration::from_millis(200),
            reconnect_max_backoff: Duration::from_secs(30),
            session_channel_capacity: 64,
        }
    }
}

type SessionTable = Arc<RwLock<HashMap<String, mpsc::Sender<GatewayAgentEvent>>>>;

/// One physical connection to a long-running gateway agent container,
/// multiplexing many logical runs by `session_key`.
pub struct GatewayClient {
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
    sessions: SessionTable,
    session_channel_capacity: usize,
}

impl GatewayClient {
    /// Start the background connection task and return a handle.
    ///
    /// Connection happens lazily on first use of the background task; this
    /// call itself never blocks on the network.
    pub fn connect(config: GatewayClientConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let sessions: SessionTable = Arc::new(RwLock::new(HashMap::new()));
        let session_channel_capacity = config.session_channel_capacity;

        tokio::spawn(connection_loop(config, outbound_rx, sessions.clone()));

        Self {
            outbound_tx,
            sessions,
            session_channel_capacity,
        }
    }

    /// Pin the model for `session_key` ahead of the next `run_agent` call.
    /// Idempotent on the gateway side.
    pub fn configure_session(
        &self,
        session_key: &str,
        outbound_headers: BTreeMap<String, String>,
        model: &str,
    ) -> CoreResult<()> {
        self.send(OutboundFrame::Configure {
            session_key: session_key.to_string(),
            model: model.to_string(),
            outbound_headers,
        })
    }

    /// Run one turn on `session_key`, returning a bounded receiver of
    /// events for that session only. The receiver is registered before the
    /// `run` frame is sent, so no event can be dropped to a race between
    /// "frame sent" and "listener registered".
    ///
    /// If no terminal event (`chat_final`/`chat_error`) arrives within
    /// `timeout`, a `chat_error{message: "timeout"}` is pushed and a
    /// `cancel` frame is sent upstream.
    pub async fn run_agent(
        &self,
        session_key: &str,
        message: &str,
        outbound_headers: BTreeMap<String, String>,
        timeout: Duration,
        model_override: Option<&str>,
    ) -> CoreResult<mpsc::Receiver<GatewayAgentEvent>> {
        if let Some(model) = model_override {
            self.configure_session(session_key, outbound_headers.clone(), model)?;
        }

        let (tx, rx) = mpsc::channel(self.session_channel_capacity);
        self.sessions
            .write()
            .await
            .insert(session_key.to_string(), tx.clone());

        self.send(OutboundFrame::Run {
            session_key: session_key.to_string(),
            message: message.to_string(),
            outbound_headers,
        })?;

        self.spawn_timeout_watchdog(session_key.to_string(), tx, timeout);

        Ok(rx)
    }

    /// Abandon `session_key`'s in-flight run. The shared connection stays
    /// up; only this logical run is torn down.
    pub async fn cancel(&self, session_key: &str) -> CoreResult<()> {
        self.sessions.write().await.remove(session_key);
        self.send(OutboundFrame::Cancel {
            session_key: session_key.to_string(),
        })
    }

    fn send(&self, frame: OutboundFrame) -> CoreResult<()> {
        self.outbound_tx
            .send(frame)
            .map_err(|_| CoreError::GatewayUnavailable {
                attempts: 0,
                message: "connection task has shut down".to_string(),
            })
    }

    fn spawn_timeout_watchdog(
        &self,
        session_key: String,
        tx: mpsc::Sender<GatewayAgentEvent>,
        timeout: Duration,
    ) {
        let sessions = self.sessions.clone();
        let outbound_tx = self.outbound_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut sessions = sessions.write().await;
            if sessions.remove(&session_key).is_some() {
                let _ = outbound_tx.send(OutboundFrame::Cancel {
                    session_key: session_key.clone(),
                });
                let _ = tx
                    .send(GatewayAgentEvent::ChatError {
                        session_key,
                        message: "timeout".to_string(),
                    })
                    .await;
            }
        });
    }
}

async fn connection_loop(
    config: GatewayClientConfig,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    sessions: SessionTable,
) {
    let mut backoff = config.reconnect_initial_backoff;
    loop {
        match connect_once(&config).await {
            Ok(stream) => {
                backoff = config.reconnect_initial_backoff;
                run_connection(stream, &mut outbound_rx, &sessions).await;
                fail_all_sessions(&sessions, "connection_lost").await;
            }
            Err(e) => {
                warn!(error = %e, "gateway connection failed, retrying");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = std::cmp::min(backoff * 2, config.reconnect_max_backoff);
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect_once(config: &GatewayClientConfig) -> CoreResult<WsStream> {
    let mut request = config
        .url
        .clone()
        .into_client_request()
        .map_err(|e| CoreError::GatewayUnavailable {
            attempts: 1,
            message: e.to_string(),
        })?;
    request.headers_mut().insert(
        "authorization",
        config
            .bearer_token
            .bearer_header_value()
            .parse()
            .map_err(|_| CoreError::GatewayUnavailable {
                attempts: 1,
                message: "invalid bearer token".to_string(),
            })?,
    );

    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| CoreError::GatewayUnavailable {
            attempts: 1,
            message: e.to_string(),
        })?;
    info!(url = %config.url, "gateway connection established");
    Ok(stream)
}

async fn run_connection(
    stream: WsStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<OutboundFrame>,
    sessions: &SessionTable,
) {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { return };
                let Ok(json) = serde_json::to_string(&frame) else { continue };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    return;
                }
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => dispatch(&text, sessions).await,
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "gateway read error");
                        return;
                    }
                }
            }
        }
    }
}

async fn dispatch(text: &str, sessions: &SessionTable) {
    let event: GatewayAgentEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "unparseable gateway frame");
            return;
        }
    };

    let session_key = event.session_key().to_string();
    let is_terminal = event.is_terminal();

    let sessions_read = sessions.read().await;
    let Some(sender) = sessions_read.get(&session_key) else {
        debug!(session_key, "dropping event for unregistered session");
        return;
    };
    let sender = sender.clone();
    drop(sessions_read);

    let _ = sender.send(event).await;
    if is_terminal {
        sessions.write().await.remove(&session_key);
    }
}

async fn fail_all_sessions(sessions: &SessionTable, reason: &str) {
    let mut sessions = sessions.write().await;
    for (session_key, sender) in sessions.drain() {
        let _ = sender
            .send(GatewayAgentEvent::ChatError {
                session_key,
                message: reason.to_string(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{Message as AxumMessage, WebSocketUpgrade};
    use axum::extract::State;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;

    async fn echo_accept_handler(
        ws: WebSocketUpgrade,
        State(_): State<()>,
    ) -> impl IntoResponse {
        ws.on_upgrade(|mut socket| async move {
            while let Some(Ok(AxumMessage::Text(text))) = socket.next().await {
                let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                if value["type"] == "run" {
                    let session_key = value["session_key"].as_str().unwrap();
                    let accepted = serde_json::json!({
                        "type": "accepted",
                        "session_key": session_key,
                        "run_id": "gateway-run-1",
                    });
                    let _ = socket
                        .send(AxumMessage::Text(accepted.to_string().into()))
                        .await;
                    let final_event = serde_json::json!({
                        "type": "chat_final",
                        "session_key": session_key,
                        "text": "done",
                    });
                    let _ = socket
                        .send(AxumMessage::Text(final_event.to_string().into()))
                        .await;
                }
            }
        })
    }

    async fn start_echo_server() -> SocketAddr {
        let app = Router::new()
            .route("/ws", get(echo_accept_handler))
            .with_state(());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        addr
    }

    #[tokio::test]
    async fn run_agent_receives_accepted_then_final() {
        let addr = start_echo_server().await;
        let client = GatewayClient::connect(GatewayClientConfig {
            url: format!("ws://{addr}/ws"),
            bearer_token: Arc::new(MasterKey::new("sk-gateway-test")),
            ..GatewayClientConfig::default()
        });

        let mut rx = client
            .run_agent("s1", "hello", BTreeMap::new(), Duration::from_secs(5), None)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, GatewayAgentEvent::Accepted { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, GatewayAgentEvent::ChatFinal { .. }));
    }

    #[tokio::test]
    async fn concurrent_sessions_do_not_cross_deliver_events() {
        let addr = start_echo_server().await;
        let client = GatewayClient::connect(GatewayClientConfig {
            url: format!("ws://{addr}/ws"),
            bearer_token: Arc::new(MasterKey::new("sk-gateway-test")),
            ..GatewayClientConfig::default()
        });

        let mut rx_a = client
            .run_agent("a", "hello", BTreeMap::new(), Duration::from_secs(5), None)
            .await
            .unwrap();
        let mut rx_b = client
            .run_agent("b", "hello", BTreeMap::new(), Duration::from_secs(5), None)
            .await
            .unwrap();

        for _ in 0..2 {
            if let Some(event) = rx_a.recv().await {
                assert_eq!(event.session_key(), "a");
            }
        }
        for _ in 0..2 {
            if let Some(event) = rx_b.recv().await {
                assert_eq!(event.session_key(), "b");
            }
        }
    }
}
