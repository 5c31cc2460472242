// Live project rooms: clients of a booking receive new messages and files as
// they are created. Pushes are one-way; client frames other than close/ping
// are ignored.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::{
    db::{
        bookings::fetch_booking,
        models::{ProjectFile, ProjectMessage},
    },
    error::{AppError, Result},
    middleware::auth::{decode_token, user_from_claims, AuthUser, MaybeAuthUser},
    services::access::{authorize, Action, Resource},
    AppState,
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProjectEvent {
    NewMessage(ProjectMessage),
    FileUploaded(ProjectFile),
}

pub struct ProjectRoom {
    pub broadcast: broadcast::Sender<String>,
}

impl ProjectRoom {
    pub fn new() -> Self {
        let (broadcast, _) = broadcast::channel(64);
        Self { broadcast }
    }
}

impl Default for ProjectRoom {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Default)]
pub struct ProjectHub {
    rooms: Arc<RwLock<HashMap<i64, Arc<ProjectRoom>>>>,
}

impl ProjectHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, booking_id: i64) -> broadcast::Receiver<String> {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(booking_id)
            .or_insert_with(|| Arc::new(ProjectRoom::new()))
            .broadcast
            .subscribe()
    }

    // Push to everyone watching the booking; a room nobody joined is a no-op.
    pub async fn publish(&self, booking_id: i64, event: &ProjectEvent) {
        let Some(room) = self.rooms.read().await.get(&booking_id).cloned() else {
            return;
        };
        match serde_json::to_string(event) {
            Ok(payload) => {
                let _ = room.broadcast.send(payload);
            }
            Err(e) => tracing::warn!(booking_id, error = %e, "Failed to encode project event"),
        }
    }

    async fn release(&self, booking_id: i64) {
        let mut rooms = self.rooms.write().await;
        if rooms
            .get(&booking_id)
            .is_some_and(|room| room.broadcast.receiver_count() == 0)
        {
            rooms.remove(&booking_id);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

// Resolve the caller from the query token (browsers cannot set headers on a
// socket) or the bearer header, then require read access to the project.
pub async fn authorize_subscription(
    state: &AppState,
    booking_id: i64,
    token: Option<&str>,
    header_user: Option<AuthUser>,
    source: Option<String>,
) -> Result<AuthUser> {
    let user = match (token, header_user) {
        (Some(token), _) => {
            user_from_claims(decode_token(token, &state.config.jwt_secret)?, source)
        }
        (None, Some(user)) => user,
        (None, None) => return Err(AppError::Unauthorized),
    };

    let booking = fetch_booking(&state.db.pool, booking_id).await?;
    authorize(
        &state.db,
        &user,
        Action::Read,
        &Resource::Project((&booking).into()),
    )
    .await?;
    Ok(user)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(booking_id): Path<i64>,
    Query(query): Query<WsQuery>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    MaybeAuthUser(header_user): MaybeAuthUser,
    State(state): State<AppState>,
) -> Result<Response> {
    let source = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string());
    let user = authorize_subscription(
        &state,
        booking_id,
        query.token.as_deref(),
        header_user,
        source,
    )
    .await?;

    tracing::debug!(booking_id, user_id = user.id, "Joining project room");
    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, booking_id, hub)))
}

async fn handle_socket(socket: WebSocket, booking_id: i64, hub: ProjectHub) {
    let (sender, mut receiver) = socket.split();
    let mut events = hub.subscribe(booking_id).await;

    let sender = Arc::new(tokio::sync::Mutex::new(sender));
    let push_sender = sender.clone();

    let push_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(payload) => {
                    let mut sender = push_sender.lock().await;
                    if sender.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(booking_id, skipped, "Project room subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Close(_) => break,
            Message::Ping(data) => {
                let mut sender = sender.lock().await;
                let _ = sender.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }

    push_task.abort();
    let _ = push_task.await;
    hub.release(booking_id).await;
}
