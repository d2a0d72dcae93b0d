//! Broadcast hub: fan-out of serialized events to live client connections.
//!
//! Transports plug in through [`Connection`], which reduces "is this socket
//! writable" to a [`SendOutcome`]. The hub serializes each event once and
//! never fails the caller because a connection went away.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use taskpilot_core::ServerEvent;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Closed,
}

pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Queue a text frame for the client.
    fn send(&self, frame: &str) -> SendOutcome;
}

/// A connection backed by an unbounded channel; the transport drains the
/// receiver into its socket.
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelConnection {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, frame: &str) -> SendOutcome {
        match self.tx.send(frame.to_string()) {
            Ok(()) => SendOutcome::Delivered,
            Err(_) => SendOutcome::Closed,
        }
    }
}

#[derive(Default)]
pub struct BroadcastHub {
    connections: HashMap<ConnectionId, Arc<dyn Connection>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connection: Arc<dyn Connection>) {
        let id = connection.id();
        self.connections.insert(id, connection);
        debug!(connection = %id, total = self.connections.len(), "connection registered");
    }

    pub fn unregister(&mut self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            debug!(connection = %id, total = self.connections.len(), "connection unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Send `event` to every connection. Returns how many accepted it.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        self.fan_out(event, None)
    }

    /// Send `event` to every connection except `skip`.
    pub fn broadcast_except(&self, event: &ServerEvent, skip: ConnectionId) -> usize {
        self.fan_out(event, Some(skip))
    }

    /// Send `event` to one connection.
    pub fn send_to(&self, id: ConnectionId, event: &ServerEvent) -> SendOutcome {
        let Some(connection) = self.connections.get(&id) else {
            return SendOutcome::Closed;
        };
        let Some(frame) = encode(event) else {
            return SendOutcome::Closed;
        };
        let outcome = connection.send(&frame);
        if outcome == SendOutcome::Closed {
            warn!(connection = %id, event = event.kind(), "connection not writable");
        }
        outcome
    }

    fn fan_out(&self, event: &ServerEvent, skip: Option<ConnectionId>) -> usize {
        if self.connections.is_empty() {
            return 0;
        }
        let Some(frame) = encode(event) else {
            return 0;
        };

        let mut delivered = 0;
        for (id, connection) in &self.connections {
            if Some(*id) == skip {
                continue;
            }
            match connection.send(&frame) {
                SendOutcome::Delivered => delivered += 1,
                SendOutcome::Closed => {
                    warn!(connection = %id, event = event.kind(), "skipping closed connection")
                }
            }
        }
        debug!(event = event.kind(), delivered, "broadcast");
        delivered
    }
}

fn encode(event: &ServerEvent) -> Option<String> {
    match event.to_json() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(event = event.kind(), error = %e, "failed to serialize event");
            None
        }
    }
}
