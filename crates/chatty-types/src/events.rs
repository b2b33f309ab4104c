use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageResponse;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// A new encrypted message addressed to this user (or echoed to the sender)
    NewMessage { message: MessageResponse },

    /// A user came online or went offline
    PresenceUpdate { user_id: Uuid, online: bool },

    /// Snapshot of everyone online, sent right after Ready
    OnlineUsers { user_ids: Vec<Uuid> },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Ask for a fresh online-users snapshot
    GetOnlineUsers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_adjacent_tagging() {
        let json = serde_json::to_string(&GatewayCommand::Identify { token: "t".into() }).unwrap();
        assert_eq!(json, r#"{"type":"Identify","data":{"token":"t"}}"#);

        let parsed: GatewayCommand = serde_json::from_str(r#"{"type":"GetOnlineUsers"}"#).unwrap();
        assert!(matches!(parsed, GatewayCommand::GetOnlineUsers));
    }
}
