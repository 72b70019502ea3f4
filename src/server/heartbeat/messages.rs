use actix::prelude::*;
use serde::{Deserialize, Serialize};

use crate::server::directory::store::HeartbeatStatus;
use crate::server::types::SessionId;

/// Client -> server frames on the host channel.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "action", content = "data")]
pub enum ClientWsMessage {
    Heartbeat { session_id: SessionId, timestamp: u64 },
    Ping,
}

/// Server -> client frames on the host channel.
#[derive(Message, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[rtype(result = "()")]
#[serde(tag = "action", content = "data")]
pub enum ServerWsMessage {
    HeartbeatAck {
        session_id: SessionId,
        status: HeartbeatStatus,
    },
    Pong,
}

impl ServerWsMessage {
    pub fn heartbeat_ack(session_id: SessionId, status: HeartbeatStatus) -> Self {
        Self::HeartbeatAck { session_id, status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn heartbeat_frame_parses() {
        let id = Uuid::new_v4();
        let text = format!(r#"{{"action":"Heartbeat","data":{{"session_id":"{id}","timestamp":42}}}}"#);
        match serde_json::from_str::<ClientWsMessage>(&text).unwrap() {
            ClientWsMessage::Heartbeat { session_id, timestamp } => {
                assert_eq!(session_id, id);
                assert_eq!(timestamp, 42);
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert!(matches!(
            serde_json::from_str::<ClientWsMessage>(r#"{"action":"Ping"}"#).unwrap(),
            ClientWsMessage::Ping
        ));
    }

    #[test]
    fn ack_serializes_with_action_tag() {
        let ack = ServerWsMessage::heartbeat_ack(Uuid::nil(), HeartbeatStatus::OutOfOrder);
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value["action"], "HeartbeatAck");
        assert_eq!(value["data"]["status"], "OutOfOrder");
    }
}
