//! Live listening server.
//!
//! Exposes a health endpoint and the WebSocket session endpoint clients
//! connect to for live playback with interruption Q&A. Frames on one socket
//! are processed sequentially, so a question runs to completion before the
//! next frame is read.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::{Result as SvarResult, SvarError};
use crate::live::protocol::{ClientMessage, ServerMessage};
use crate::live::Orchestrator;
use crate::session::{ConnectionRegistry, ListenerIdentity, MessageSink};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};
use uuid::Uuid;

/// Shared application state.
struct AppState {
    orchestrator: Orchestrator,
    registry: Arc<ConnectionRegistry>,
}

/// Run the live server.
pub async fn run_serve(
    host: Option<&str>,
    port: Option<u16>,
    settings: Settings,
) -> anyhow::Result<()> {
    let host = host.unwrap_or(&settings.server.host).to_string();
    let port = port.unwrap_or(settings.server.port);

    let registry = Arc::new(ConnectionRegistry::new());
    let orchestrator = Orchestrator::new(settings, Arc::clone(&registry))?;

    let state = Arc::new(AppState {
        orchestrator,
        registry,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws/{content_id}/{unit_id}", get(ws_upgrade))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Svar Live Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET /health");
    Output::kv("Live session", "GET /ws/:content_id/:unit_id (WebSocket)");
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "active_connections": state.registry.len(),
    }))
}

#[derive(Deserialize)]
struct ListenQuery {
    listener_name: Option<String>,
    listener_id: Option<String>,
}

async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Path((content_id, unit_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ListenQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(state, socket, content_id, unit_id, query))
}

/// Outbound socket half, shared with the registry.
struct WsSink {
    sender: Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&self, payload: String) -> SvarResult<()> {
        self.sender
            .lock()
            .await
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| SvarError::Transport(e.to_string()))
    }
}

async fn handle_session(
    state: Arc<AppState>,
    socket: WebSocket,
    content_id: Uuid,
    unit_id: Uuid,
    query: ListenQuery,
) {
    let connection_id = Uuid::new_v4().to_string();
    let (sender, mut receiver) = socket.split();
    let sink = Arc::new(WsSink {
        sender: Mutex::new(sender),
    });

    let slide_deck_id = state
        .orchestrator
        .store()
        .content(content_id)
        .await
        .ok()
        .flatten()
        .and_then(|c| c.slide_deck_id);

    state.registry.connect(
        &connection_id,
        content_id,
        unit_id,
        slide_deck_id,
        ListenerIdentity {
            name: query.listener_name,
            id: query.listener_id,
        },
        sink,
    );
    debug!(connection_id, %content_id, %unit_id, "Session opened");

    state
        .registry
        .send(
            &connection_id,
            &ServerMessage::Connected {
                connection_id: connection_id.clone(),
            },
        )
        .await;

    while let Some(frame) = receiver.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection_id, error = %e, "Socket error, closing session");
                break;
            }
        };

        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    state.orchestrator.handle_message(&connection_id, message).await;
                }
                Err(e) => {
                    state
                        .registry
                        .send(
                            &connection_id,
                            &ServerMessage::Error {
                                error: format!("Invalid message: {}", e),
                            },
                        )
                        .await;
                }
            },
            Message::Close(_) => break,
            // Binary frames are not part of the protocol; control frames are
            // handled by axum.
            _ => {}
        }
    }

    state.registry.disconnect(&connection_id);
    debug!(connection_id, "Session closed");
}
