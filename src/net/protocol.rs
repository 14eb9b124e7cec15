//! Wire protocol message definitions
//! JSON frames of the form `{"type": "...", "data": ...}`

use serde::{Deserialize, Serialize};

use crate::room::PlayerState;

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMsg {
    /// Join handshake: the state assigned to this client's player
    #[serde(rename = "player:id")]
    Welcome(PlayerState),

    /// A remote player entered the room
    #[serde(rename = "player:joined")]
    Joined(PlayerState),

    /// Full state of a remote player
    #[serde(rename = "player:state")]
    State(PlayerState),

    /// A remote player left the room
    #[serde(rename = "player:leave")]
    Leave { id: String },

    /// Server-side error indicator
    #[serde(rename = "player:error")]
    Error { message: String },
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMsg {
    /// Full state of the local player
    #[serde(rename = "player:state")]
    State(PlayerState),
}

/// Codec failures
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn decode_server(text: &str) -> Result<ServerMsg, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode_client(msg: &ClientMsg) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}
