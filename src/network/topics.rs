//! Topic naming contract. The strings produced here must stay bit-exact;
//! peers running other implementations derive the same names.

pub const USERS_ROOT: &str = "USERS";
pub const GROUPS_ROOT: &str = "GROUPS";
pub const CONTROL_SUFFIX: &str = "_Control";

/// Whether `segment` can be embedded in a topic name.
///
/// Peer ids and group names become topic segments, so `/` would add a
/// level (escaping the `+` wildcard subscriptions) and `+`/`#` in a
/// publish topic is a protocol violation that can cost the connection.
pub fn is_topic_safe(segment: &str) -> bool {
    !segment.is_empty()
        && !segment
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '+' | '#'))
}

/// `USERS/<peer>`, retained presence.
pub fn presence(peer: &str) -> String {
    format!("{USERS_ROOT}/{peer}")
}

/// `USERS/+`, all peers' presence.
pub fn presence_wildcard() -> String {
    format!("{USERS_ROOT}/+")
}

/// `<peer>_Control`, the per-peer handshake channel.
pub fn control(peer: &str) -> String {
    format!("{peer}{CONTROL_SUFFIX}")
}

/// `GROUPS/<name>`, the retained group record.
pub fn group(name: &str) -> String {
    format!("{GROUPS_ROOT}/{name}")
}

/// `GROUPS/+`, all group records.
pub fn groups_wildcard() -> String {
    format!("{GROUPS_ROOT}/+")
}

/// Where an inbound publish belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic<'a> {
    Presence(&'a str),
    Group(&'a str),
    /// Our own control channel.
    Control,
    /// Anything else we are subscribed to, i.e. a session topic.
    Other(&'a str),
}

pub fn classify<'a>(topic: &'a str, self_id: &str) -> InboundTopic<'a> {
    if let Some(peer) = topic.strip_prefix("USERS/") {
        return InboundTopic::Presence(peer);
    }
    if let Some(name) = topic.strip_prefix("GROUPS/") {
        return InboundTopic::Group(name);
    }
    if topic == control(self_id) {
        return InboundTopic::Control;
    }
    InboundTopic::Other(topic)
}
