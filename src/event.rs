//! Server event system.

use crate::verifier::Outcome;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Events emitted by the server.
#[derive(Debug, Clone)]
pub enum CheckEvent {
    /// Server is listening.
    Started {
        /// Bound address.
        addr: SocketAddr,
    },

    /// A domain was verified.
    DomainChecked {
        /// Domain as received.
        domain: String,
        /// Verification result.
        outcome: Outcome,
    },

    /// Server is shutting down.
    ShuttingDown,

    /// Error occurred.
    Error {
        /// Error message.
        message: String,
    },
}

/// Channel for receiving server events.
pub type CheckEventsChannel = broadcast::Receiver<CheckEvent>;

/// Sender for server events.
pub type CheckEventsSender = broadcast::Sender<CheckEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (CheckEventsSender, CheckEventsChannel) {
    broadcast::channel(256)
}
