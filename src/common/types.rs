use std::fmt;

use serde::{Deserialize, Serialize};

/// Presence of a peer as carried on the `USERS/+` topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Offline,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Retained payload on `USERS/<peer>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub user: String,
    pub status: Status,
}

/// Serialize a presence announcement for `peer`.
///
/// Both the graceful shutdown publish and the last will registered at
/// connect time go through here, so the two offline paths produce
/// byte-identical payloads.
pub fn presence_bytes(peer: &str, status: Status) -> Vec<u8> {
    serde_json::to_vec(&PresencePayload {
        user: peer.to_string(),
        status,
    })
    .unwrap_or_default()
}

/// Handshake messages carried on `<peer>_Control` channels.
///
/// Field names are part of the wire contract and must stay bit-exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "messageMode")]
pub enum ControlPayload {
    /// Request to open a private session with the receiver.
    #[serde(rename = "private")]
    Private { sender: String },
    /// Accepter's announcement of the derived session topic.
    #[serde(rename = "chatConfirmation")]
    ChatConfirmation {
        sender: String,
        #[serde(rename = "chatId")]
        chat_id: String,
    },
    /// Ask the group leader to be added to a group.
    #[serde(rename = "groupJoinRequest")]
    GroupJoinRequest {
        sender: String,
        #[serde(rename = "groupName")]
        group_name: String,
    },
}

/// The authoritative record of one group, retained on `GROUPS/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub group_name: String,
    pub leader: String,
    pub members: Vec<String>,
}

impl GroupRecord {
    /// A record missing its name, leader or member list is dropped by the
    /// mirror instead of upserted.
    pub fn is_valid(&self) -> bool {
        !self.group_name.is_empty() && !self.leader.is_empty() && !self.members.is_empty()
    }

    pub fn is_member(&self, peer: &str) -> bool {
        self.members.iter().any(|m| m == peer)
    }
}

/// One chat line on a session topic. Not retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub sender: String,
    pub text: String,
    pub sent_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_wire_shape_is_exact() {
        let bytes = presence_bytes("alice", Status::Offline);
        assert_eq!(bytes, br#"{"user":"alice","status":"offline"}"#.to_vec());

        let online = presence_bytes("alice", Status::Online);
        assert_eq!(online, br#"{"user":"alice","status":"online"}"#.to_vec());
    }

    #[test]
    fn control_private_wire_shape() {
        let msg = ControlPayload::Private {
            sender: "alice".into(),
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"messageMode":"private","sender":"alice"}"#
        );
    }

    #[test]
    fn control_confirmation_wire_shape() {
        let msg = ControlPayload::ChatConfirmation {
            sender: "bob".into(),
            chat_id: "alice_bob_1700000000000".into(),
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"messageMode":"chatConfirmation","sender":"bob","chatId":"alice_bob_1700000000000"}"#
        );
    }

    #[test]
    fn control_join_request_wire_shape() {
        let msg = ControlPayload::GroupJoinRequest {
            sender: "carol".into(),
            group_name: "devs".into(),
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"messageMode":"groupJoinRequest","sender":"carol","groupName":"devs"}"#
        );
    }

    #[test]
    fn group_record_round_trips_with_camel_case_fields() {
        let json = r#"{"groupName":"devs","leader":"alice","members":["alice","bob"]}"#;
        let record: GroupRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.group_name, "devs");
        assert!(record.is_member("bob"));
        assert_eq!(serde_json::to_string(&record).unwrap(), json);
    }

    #[test]
    fn invalid_group_records_are_detectable() {
        let no_members: GroupRecord =
            serde_json::from_str(r#"{"groupName":"devs","leader":"alice","members":[]}"#).unwrap();
        assert!(!no_members.is_valid());

        let no_name: GroupRecord =
            serde_json::from_str(r#"{"groupName":"","leader":"alice","members":["alice"]}"#)
                .unwrap();
        assert!(!no_name.is_valid());
    }

    #[test]
    fn session_payload_uses_sent_at_field() {
        let msg = SessionPayload {
            sender: "alice".into(),
            text: "hi".into(),
            sent_at: 1_700_000_000_000,
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"sender":"alice","text":"hi","sentAt":1700000000000}"#
        );
    }
}
