use icrs_atoms::complaints::Complaint;
use serde::{Deserialize, Serialize};

/// Incoming WebSocket message from a view
#[derive(Debug, Deserialize)]
pub struct WebSocketMessage {
    pub action: WebSocketAction,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebSocketAction {
    /// Ask for the current resolved feed right after connecting.
    Subscribe,
    Ping,
}

/// Broadcast message sent to every open view
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage<'a> {
    ResolvedFeed { complaints: &'a [Complaint] },
    Pong,
}

impl<'a> BroadcastMessage<'a> {
    pub fn resolved_feed(complaints: &'a [Complaint]) -> Self {
        BroadcastMessage::ResolvedFeed { complaints }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
