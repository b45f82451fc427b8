//! WebSocket support for live build tails.
//!
//! Clients receive every build event published on the core event bus,
//! optionally restricted to one plugin with `?plugin_slug=`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use plugin_builder_core::{BuildEvent, BuildState, PluginSlug};

use super::error::ApiError;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Interval between heartbeats on an idle connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket message sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// A line was appended to a build's log.
    BuildLogUpdated {
        plugin_slug: String,
        build_id: i64,
        line: String,
    },
    /// A build moved to a new state.
    BuildChanged {
        plugin_slug: String,
        build_id: i64,
        state: BuildState,
        #[serde(skip_serializing_if = "Option::is_none")]
        build_info: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        manifest_info: Option<Value>,
    },
    /// Server heartbeat (sent periodically to keep connection alive).
    Heartbeat { timestamp: i64 },
}

impl WsMessage {
    fn type_label(&self) -> &'static str {
        match self {
            WsMessage::BuildLogUpdated { .. } => "build_log_updated",
            WsMessage::BuildChanged { .. } => "build_changed",
            WsMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

impl From<BuildEvent> for WsMessage {
    fn from(event: BuildEvent) -> Self {
        // Payloads travel as JSON text on the bus; clients get them as objects
        let parse = |text: Option<String>| {
            text.and_then(|t| serde_json::from_str::<Value>(&t).ok())
        };

        match event {
            BuildEvent::BuildLogUpdated { identity, line } => WsMessage::BuildLogUpdated {
                plugin_slug: identity.plugin_slug.to_string(),
                build_id: identity.build_id,
                line,
            },
            BuildEvent::BuildChanged {
                identity,
                state,
                build_info,
                manifest_info,
            } => WsMessage::BuildChanged {
                plugin_slug: identity.plugin_slug.to_string(),
                build_id: identity.build_id,
                state,
                build_info: parse(build_info),
                manifest_info: parse(manifest_info),
            },
        }
    }
}

/// Query parameters of the WebSocket endpoint
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Only forward events of this plugin
    pub plugin_slug: Option<String>,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = params.plugin_slug.map(PluginSlug::new).transpose()?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, filter)))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, filter: Option<PluginSlug>) {
    let (mut sender, mut receiver) = socket.split();

    let mut subscription = state.events().subscribe_all();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    match &filter {
        Some(slug) => info!("WebSocket client connected (plugin {})", slug),
        None => info!("WebSocket client connected"),
    }

    // Forward bus events to this client
    let send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            let msg = tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) => {
                        if filter
                            .as_ref()
                            .is_some_and(|slug| &event.identity().plugin_slug != slug)
                        {
                            continue;
                        }
                        WsMessage::from(event)
                    }
                    None => {
                        debug!("Event bus closed");
                        break;
                    }
                },
                _ = heartbeat.tick() => WsMessage::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp(),
                },
            };

            WS_MESSAGES_SENT
                .with_label_values(&[msg.type_label()])
                .inc();

            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, client disconnected");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize WsMessage: {}", e);
                }
            }
        }
    });

    // Handle incoming messages from client (ping/pong, close)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Received text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}
