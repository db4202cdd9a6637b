//! Node event broadcast
//!
//! Management clients hold a websocket open on `/events`. The listener
//! manager closes every stream when it restarts, so clients reconnect to
//! the new listener generation.

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::broadcast::{self, error::RecvError};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Message(String),
    /// Subscribers disconnect
    Close,
}

/// Event fan-out to connected management clients
pub trait EventBroadcaster: Send + Sync {
    fn publish(&self, message: String);

    /// Tell every subscriber to disconnect
    fn close(&self);

    fn subscribe(&self) -> broadcast::Receiver<Event>;
}

/// Broadcaster over a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct WebSocketEvents {
    sender: broadcast::Sender<Event>,
}

impl WebSocketEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WebSocketEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster for WebSocketEvents {
    fn publish(&self, message: String) {
        // no subscribers is fine
        let _ = self.sender.send(Event::Message(message));
    }

    fn close(&self) {
        tracing::debug!(subscribers = self.subscribers(), "router: Closing event streams");
        let _ = self.sender.send(Event::Close);
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

/// Pump events into one websocket until either side closes
pub async fn stream(mut socket: WebSocket, mut events: broadcast::Receiver<Event>) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(Event::Message(text)) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Event::Close) | Err(RecvError::Closed) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "router: Event stream lagged");
                }
            },
            incoming = socket.recv() => match incoming {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_close() {
        let events = WebSocketEvents::new();
        let mut rx = events.subscribe();

        events.publish("node updated".to_string());
        events.close();

        assert_eq!(rx.recv().await.unwrap(), Event::Message("node updated".to_string()));
        assert_eq!(rx.recv().await.unwrap(), Event::Close);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let events = WebSocketEvents::new();
        events.publish("nobody listening".to_string());
        events.close();
        assert_eq!(events.subscribers(), 0);
    }
}
