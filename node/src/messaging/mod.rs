//! Message pipelines coordinating store writes and translation.

mod direct;
mod group;
mod reactions;

pub use direct::{DirectMessagePipeline, SendDirectRequest, SendOutcome};
pub use group::{GroupMessagePipeline, SendGroupRequest};

use crate::store::StoreError;

/// Errors surfaced by the pipelines. Translation failures are absent on
/// purpose: they are recovered locally by falling back to the original
/// text and never reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("message text is empty")]
    EmptyMessage,
    #[error("recipient language is not set")]
    MissingLanguage,
    #[error("a send is already in flight for this conversation")]
    SendInFlight,
    #[error("group name is empty")]
    EmptyGroupName,
    #[error("unknown message {0}")]
    UnknownMessage(String),
    #[error("message {0} has no translation variants")]
    VariantsUnavailable(String),
    #[error("unknown group {0}")]
    UnknownGroup(String),
    #[error("user {user} is not a member of group {group}")]
    NotAMember { user: String, group: String },
    #[error("user {user} is not an admin of group {group}")]
    NotAdmin { user: String, group: String },
    #[error("group {0} would be left without an admin")]
    LastAdmin(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
