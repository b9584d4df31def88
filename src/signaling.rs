use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::room::Broadcaster;
use crate::websockets::WebSocketMessage;

/// Kind of connection-negotiation metadata being exchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Offer,
    Answer,
    Ice,
}

/// Transient signaling payload, never persisted.
///
/// The relay treats the payload as an opaque blob; SDP and ICE contents are
/// a peer concern.
#[derive(Debug, Clone)]
pub struct SignalEnvelope {
    pub session_id: String,
    pub kind: SignalKind,
    pub sender_id: String,
    pub payload: Value,
}

/// Forwards signaling envelopes between the two peers of a media room.
///
/// Best-effort and live-only: with no counterpart present the envelope is
/// dropped, not queued. The two-party cap itself is enforced at join time by
/// the room registry.
pub struct SignalingRelay {
    broadcaster: Arc<Broadcaster>,
}

impl SignalingRelay {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self { broadcaster }
    }

    /// Forwards the envelope verbatim to the other member of the room.
    /// The sender never receives its own envelope back.
    #[instrument(skip(self, envelope), fields(session_id = %envelope.session_id, kind = ?envelope.kind))]
    pub async fn relay(&self, from_connection: Uuid, envelope: SignalEnvelope) {
        let message = WebSocketMessage::signal(&envelope);
        let delivered = self
            .broadcaster
            .send_to_other(&envelope.session_id, from_connection, &message)
            .await;

        if !delivered {
            debug!(
                sender_id = %envelope.sender_id,
                "No peer to relay to, envelope dropped"
            );
        }
    }
}
