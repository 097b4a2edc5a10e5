//! Chat data models shared across LinguaChat clients and services.

pub mod group;
pub mod message;
pub mod paths;
pub mod reaction;
pub mod user;

pub use group::{Group, GroupMember, GroupMessage, Role};
pub use message::{DirectMessage, MessageKind, ReplySnapshot};
pub use paths::chat_id;
pub use reaction::{reaction_key, Reaction};
pub use user::UserProfile;

/// Placeholder shown to the recipient while translation is in flight.
pub const TRANSLATING: &str = "Translating...";

/// Language assumed for senders who never picked one.
pub const DEFAULT_LANGUAGE: &str = "en";
