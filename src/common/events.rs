use crate::common::types::{GroupRecord, Status};
use crate::state::{ChatRequest, GroupJoinRequest};

/// Sự kiện từ tầng mạng gửi lên console.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    PresenceChanged {
        peer: String,
        status: Status,
    },
    PeerList(Vec<(String, Status)>),
    ChatRequestReceived {
        sender: String,
        refreshed: bool,
    },
    ChatRequestList(Vec<ChatRequest>),
    /// A session topic is now subscribed on this side, either because we
    /// accepted a request or because our request was confirmed.
    SessionEstablished {
        chat_id: String,
        peer: String,
    },
    SessionList(Vec<String>),
    /// Focus switch confirmed; the console may enter the session view.
    /// A rejected focus arrives as `ActionFailed` instead.
    SessionFocused {
        chat_id: String,
    },
    /// Live line for the currently focused session.
    SessionMessage {
        chat_id: String,
        sender: String,
        text: String,
    },
    GroupUpdated(GroupRecord),
    GroupList(Vec<GroupRecord>),
    JoinRequestReceived {
        sender: String,
        group: String,
        refreshed: bool,
    },
    JoinRequestList(Vec<GroupJoinRequest>),
    /// Free-form confirmation of a menu action.
    Notice(String),
    /// User-facing error text for a failed menu action.
    ActionFailed(String),
}
