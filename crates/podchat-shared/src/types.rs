use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::Location;

/// A profile as published on its owner's pod. Immutable once loaded;
/// refreshed by re-fetching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// WebID of the profile.
    pub id: String,
    pub name: String,
    pub inbox_id: String,
    pub storage_id: String,
    pub private_type_index_id: String,
    pub public_type_index_id: String,
    pub read_access_permitted: bool,
    pub control_access_permitted: bool,
    pub image: Option<String>,
}

/// Weak cross-store link to a peer: their WebID plus, when known, the id
/// of their own copy of the chat (a back-reference, not an ownership edge).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub chat_id: Option<String>,
}

impl Participant {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            chat_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    /// WebID of the chat subject, `<container>/index.ttl#this`.
    pub id: String,
    pub title: String,
    /// Other participants, excluding the owner, sorted by id.
    pub participants: Vec<Participant>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    NotVerified,
    Verifying,
    Trusted,
    InvalidSignature,
    NoSignature,
    Error,
}

/// Immutable after creation except for the verification status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub created: DateTime<Utc>,
    pub content: String,
    /// WebID of the author.
    pub maker: String,
    pub verification_status: VerificationStatus,
}

/// A reaction on a message. Existence is keyed by (name, agent, message):
/// sending the same triple twice removes the reply again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessageReply {
    pub id: String,
    /// Emoji or short label.
    pub name: String,
    /// WebID of the reacting agent.
    pub agent: String,
    pub message_id: String,
}

/// One shard: a location plus its messages and replies. The unit of
/// storage and fetch granularity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessageResource {
    pub location: Location,
    pub messages: Vec<ChatMessage>,
    pub replies: Vec<ChatMessageReply>,
}

/// Shards discovered so far for one participant's copy of a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessageSearchResult {
    pub chat_id: String,
    pub resources: Vec<ChatMessageResource>,
}

impl ChatMessageSearchResult {
    /// Result representing "no more history" for a chat.
    pub fn end(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            resources: vec![ChatMessageResource {
                location: Location::END,
                messages: Vec::new(),
                replies: Vec::new(),
            }],
        }
    }

    pub fn resource_at(&self, location: Location) -> Option<&ChatMessageResource> {
        self.resources.iter().find(|r| r.location == location)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationType {
    ChatMessageAdd,
    ChatMessageReplyAdd,
    ChatMessageReplyRemove,
    Unknown,
}

/// A remote event discovered in the inbox. Consumed once resolved and
/// accepted, eventually physically deleted by the cleanup pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SolidNotification {
    pub id: String,
    /// Chat the sender addressed (their copy).
    pub target_id: String,
    /// Message or reply the notification is about.
    pub object_id: String,
    pub actor_id: String,
    pub kind: NotificationType,
    pub updated: DateTime<Utc>,
    /// Locally known chat this notification resolved to, if any. Absent
    /// for first-contact invitations.
    pub reference_id: Option<String>,
}
