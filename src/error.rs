use thiserror::Error;

/// User-facing failures of menu-driven operations.
///
/// Malformed inbound traffic is not represented here: unparseable payloads
/// are dropped at the parse site with a warn log and never reach the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid group name: {0}")]
    InvalidName(String),

    #[error("group '{0}' already exists")]
    AlreadyExists(String),

    #[error("no group named '{0}' is known")]
    UnknownGroup(String),

    #[error("only '{leader}' (the leader) can change group '{group}'")]
    NotLeader { group: String, leader: String },

    #[error("{0}")]
    DuplicateState(String),

    #[error("selection {index} is out of range (1..={len})")]
    SelectionOutOfRange { index: usize, len: usize },

    #[error("transport failure: {0}")]
    Transport(String),
}
