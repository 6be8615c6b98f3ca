pub mod groups;
pub mod presence;
pub mod sessions;

pub use groups::{GroupJoinRequest, GroupRegistry};
pub use presence::PresenceTracker;
pub use sessions::{ChatRequest, RequestOutcome, Session, SessionEntry, SessionNegotiator};
