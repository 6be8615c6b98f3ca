pub mod commands;
pub mod events;
pub mod types;

pub use commands::NetworkCommand;
pub use events::NetworkEvent;
pub use types::{ControlPayload, GroupRecord, PresencePayload, SessionPayload, Status};
