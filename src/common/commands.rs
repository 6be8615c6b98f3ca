/// Lệnh console gửi xuống tầng mạng.
///
/// Indexes are 1-based, matching how the menu numbers its listings.
#[derive(Debug, Clone)]
pub enum NetworkCommand {
    ListPeers,
    RequestChat { target: String },
    ListChatRequests,
    AcceptChatRequest { index: usize },
    ListSessions,
    FocusSession { chat_id: String },
    UnfocusSession,
    SendChatMessage { chat_id: String, text: String },
    CreateGroup { name: String },
    ListGroups,
    RequestJoinGroup { name: String },
    ListJoinRequests,
    AcceptJoinRequest { index: usize },
    AddGroupMember { group: String, member: String },
    /// Publish retained offline presence, wait out the grace delay,
    /// disconnect. Always the last command the engine sees.
    Shutdown,
}
