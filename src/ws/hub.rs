//! WebSocket Hub implementation
//!
//! Tracks live connections per user and pushes new notifications to them

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Extension,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::entity::notification::NotificationItem;
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

/// WebSocket message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    #[serde(rename = "notification")]
    Notification(NotificationItem),
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

/// WebSocket Hub
pub struct Hub {
    /// Connected clients by user ID
    clients: DashMap<i32, Vec<mpsc::UnboundedSender<WsMessage>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    /// Register a new client
    pub fn register(&self, user_id: i32, tx: mpsc::UnboundedSender<WsMessage>) {
        self.clients.entry(user_id).or_default().push(tx);
        tracing::debug!("WebSocket client registered for user {}", user_id);
    }

    /// Unregister a client
    pub fn unregister(&self, user_id: i32, tx: &mpsc::UnboundedSender<WsMessage>) {
        if let Some(mut clients) = self.clients.get_mut(&user_id) {
            clients.retain(|c| !c.same_channel(tx));
            let empty = clients.is_empty();
            drop(clients);
            if empty {
                self.drop_if_empty(user_id);
            }
        }
        tracing::debug!("WebSocket client unregistered for user {}", user_id);
    }

    /// Deliver to every open connection of a user, dropping dead ones.
    /// Returns the number of connections reached.
    pub fn push(&self, user_id: i32, msg: WsMessage) -> usize {
        let Some(mut clients) = self.clients.get_mut(&user_id) else {
            return 0;
        };
        clients.retain(|c| c.send(msg.clone()).is_ok());
        let reached = clients.len();
        drop(clients);
        if reached == 0 {
            self.drop_if_empty(user_id);
        }
        reached
    }

    /// Forget a user with no senders left. Rechecked under the shard lock,
    /// so a connection registered since the caller looked is kept.
    fn drop_if_empty(&self, user_id: i32) {
        self.clients.remove_if(&user_id, |_, senders| senders.is_empty());
    }

    pub fn connections(&self, user_id: i32) -> usize {
        self.clients.get(&user_id).map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler
pub async fn serve_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, current_user))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, user: CurrentUser) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    hub.register(user.id, tx.clone());

    // Outgoing
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Failed to encode websocket message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Incoming
    let tx_clone = tx.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Ok(WsMessage::Ping) = serde_json::from_str::<WsMessage>(&text) {
                        let _ = tx_clone.send(WsMessage::Pong);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    hub.unregister(user.id, &tx);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i32) -> NotificationItem {
        NotificationItem {
            id,
            title: "t".into(),
            message: "m".into(),
            url: "u".into(),
            is_read: false,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn test_push_reaches_every_connection() {
        let hub = Hub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register(7, tx1);
        hub.register(7, tx2);

        assert_eq!(hub.push(7, WsMessage::Notification(item(1))), 2);
        assert!(matches!(rx1.recv().await, Some(WsMessage::Notification(n)) if n.id == 1));
        assert!(matches!(rx2.recv().await, Some(WsMessage::Notification(n)) if n.id == 1));
        assert_eq!(hub.push(8, WsMessage::Ping), 0);
    }

    #[test]
    fn test_dead_connections_are_dropped() {
        let hub = Hub::new();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.register(3, tx.clone());
        drop(rx);
        assert_eq!(hub.push(3, WsMessage::Ping), 0);
        assert_eq!(hub.connections(3), 0);
        hub.unregister(3, &tx);
    }

    #[test]
    fn test_late_cleanup_keeps_new_connection() {
        let hub = Hub::new();
        let (dead, rx) = mpsc::unbounded_channel();
        hub.register(4, dead);
        drop(rx);

        // a push has pruned the dead sender and released the entry...
        if let Some(mut senders) = hub.clients.get_mut(&4) {
            senders.retain(|c| c.send(WsMessage::Ping).is_ok());
        }
        // ...the user reconnects before the empty entry is removed
        let (live, mut live_rx) = mpsc::unbounded_channel();
        hub.register(4, live);
        hub.drop_if_empty(4);

        assert_eq!(hub.connections(4), 1);
        assert_eq!(hub.push(4, WsMessage::Ping), 1);
        assert!(matches!(live_rx.try_recv(), Ok(WsMessage::Ping)));
    }

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_value(WsMessage::Notification(item(5))).unwrap();
        assert_eq!(json["type"], "notification");
        assert_eq!(json["data"]["isRead"], false);
        let ping: WsMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, WsMessage::Ping));
    }
}
