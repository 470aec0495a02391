use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::coerce::loose_id;
use crate::models::{CommentView, DirectMessage};

/// Events sent FROM server TO clients over the realtime channel.
///
/// Framed as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum GatewayEvent {
    /// Handshake finished; the connection is live
    #[serde(rename = "ready", rename_all = "camelCase")]
    Ready {
        connection_id: Uuid,
        user_id: Option<i64>,
    },

    /// A direct message was persisted
    #[serde(rename = "new_message")]
    NewMessage(DirectMessage),

    /// `user_id` has opened the conversation with `peer_id`
    #[serde(rename = "conversation_seen", rename_all = "camelCase")]
    ConversationSeen { user_id: i64, peer_id: i64 },

    #[serde(rename = "comment:created", rename_all = "camelCase")]
    CommentCreated {
        post_id: i64,
        comment: CommentView,
        is_parent: bool,
    },

    #[serde(rename = "comment:updated", rename_all = "camelCase")]
    CommentUpdated {
        post_id: i64,
        comment: CommentView,
        is_parent: bool,
    },

    /// `is_parent` is captured before the row is removed
    #[serde(rename = "comment:deleted", rename_all = "camelCase")]
    CommentDeleted {
        post_id: i64,
        comment_id: i64,
        is_parent: bool,
    },

    /// Carries the recounted total, never a delta
    #[serde(rename = "like:updated", rename_all = "camelCase")]
    LikeUpdated {
        post_id: i64,
        likes_count: i64,
        actor_id: i64,
        action: LikeAction,
    },
}

impl GatewayEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::NewMessage(_) => "new_message",
            Self::ConversationSeen { .. } => "conversation_seen",
            Self::CommentCreated { .. } => "comment:created",
            Self::CommentUpdated { .. } => "comment:updated",
            Self::CommentDeleted { .. } => "comment:deleted",
            Self::LikeUpdated { .. } => "like:updated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeAction {
    Like,
    Unlike,
}

/// Commands sent FROM client TO server, as decoded off the wire.
///
/// Field values are still loose here; call [`GatewayCommand::validate`]
/// before acting on one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum GatewayCommand {
    #[serde(rename = "send_message")]
    SendMessage(SendMessageData),

    #[serde(rename = "mark_seen")]
    MarkSeen(MarkSeenData),

    #[serde(rename = "join_post")]
    JoinPost(PostRoomData),

    #[serde(rename = "leave_post")]
    LeavePost(PostRoomData),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageData {
    #[serde(default, deserialize_with = "loose_id")]
    pub sender_id: Option<i64>,
    #[serde(default, deserialize_with = "loose_id")]
    pub receiver_id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarkSeenData {
    #[serde(default, deserialize_with = "loose_id")]
    pub user_id: Option<i64>,
    #[serde(default, deserialize_with = "loose_id")]
    pub peer_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostRoomData {
    #[serde(default, deserialize_with = "loose_id")]
    pub post_id: Option<i64>,
}

/// A command whose fields passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SendMessage {
        sender_id: i64,
        receiver_id: i64,
        /// Already trimmed, never empty
        content: String,
    },
    MarkSeen {
        user_id: i64,
        peer_id: i64,
    },
    JoinPost {
        post_id: i64,
    },
    LeavePost {
        post_id: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("{event}: missing or invalid `{field}`")]
    InvalidField {
        event: &'static str,
        field: &'static str,
    },
}

impl GatewayCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "send_message",
            Self::MarkSeen(_) => "mark_seen",
            Self::JoinPost(_) => "join_post",
            Self::LeavePost(_) => "leave_post",
        }
    }

    /// Check field contracts and produce a strictly typed [`Command`].
    pub fn validate(self) -> Result<Command, CommandError> {
        let event = self.name();
        let invalid = |field| CommandError::InvalidField { event, field };

        match self {
            Self::SendMessage(data) => {
                let sender_id = data.sender_id.ok_or_else(|| invalid("senderId"))?;
                let receiver_id = data.receiver_id.ok_or_else(|| invalid("receiverId"))?;
                let content = data
                    .content
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| invalid("content"))?
                    .to_string();
                Ok(Command::SendMessage {
                    sender_id,
                    receiver_id,
                    content,
                })
            }
            Self::MarkSeen(data) => Ok(Command::MarkSeen {
                user_id: data.user_id.ok_or_else(|| invalid("userId"))?,
                peer_id: data.peer_id.ok_or_else(|| invalid("peerId"))?,
            }),
            Self::JoinPost(data) => Ok(Command::JoinPost {
                post_id: data.post_id.ok_or_else(|| invalid("postId"))?,
            }),
            Self::LeavePost(data) => Ok(Command::LeavePost {
                post_id: data.post_id.ok_or_else(|| invalid("postId"))?,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Result<Command, String> {
        let cmd: GatewayCommand = serde_json::from_value(value).map_err(|e| e.to_string())?;
        cmd.validate().map_err(|e| e.to_string())
    }

    #[test]
    fn send_message_trims_content_and_coerces_ids() {
        let cmd = decode(json!({
            "event": "send_message",
            "data": { "senderId": "1", "receiverId": 2, "content": "  hi  " }
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::SendMessage {
                sender_id: 1,
                receiver_id: 2,
                content: "hi".into()
            }
        );
    }

    #[test]
    fn send_message_rejects_blank_content() {
        let err = decode(json!({
            "event": "send_message",
            "data": { "senderId": 1, "receiverId": 2, "content": "   " }
        }))
        .unwrap_err();
        assert!(err.contains("content"), "{err}");
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert!(decode(json!({ "event": "mark_seen", "data": { "userId": 1 } })).is_err());
        assert!(decode(json!({ "event": "join_post", "data": {} })).is_err());
        assert!(decode(json!({ "event": "join_post", "data": { "postId": "abc" } })).is_err());
        assert!(decode(json!({ "event": "leave_post", "data": { "postId": 0 } })).is_err());
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        assert!(decode(json!({ "event": "drop_tables", "data": {} })).is_err());
        assert!(decode(json!({ "event": "join_post", "data": { "postId": 1, "extra": true } })).is_err());
        assert!(decode(json!({ "postId": 1 })).is_err());
    }

    #[test]
    fn join_post_accepts_string_id() {
        assert_eq!(
            decode(json!({ "event": "join_post", "data": { "postId": "42" } })).unwrap(),
            Command::JoinPost { post_id: 42 }
        );
    }

    #[test]
    fn outbound_events_use_wire_names() {
        let event = GatewayEvent::LikeUpdated {
            post_id: 42,
            likes_count: 3,
            actor_id: 7,
            action: LikeAction::Unlike,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "like:updated");
        assert_eq!(value["data"]["likesCount"], 3);
        assert_eq!(value["data"]["action"], "unlike");
        assert_eq!(event.name(), "like:updated");

        let seen = serde_json::to_value(GatewayEvent::ConversationSeen { user_id: 1, peer_id: 2 }).unwrap();
        assert_eq!(seen, json!({ "event": "conversation_seen", "data": { "userId": 1, "peerId": 2 } }));
    }

    #[test]
    fn new_message_payload_shape() {
        let event = GatewayEvent::NewMessage(DirectMessage {
            id: 9,
            source_id: 1,
            target_id: 2,
            message: "hi".into(),
            created_at: Utc::now(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "new_message");
        assert_eq!(value["data"]["sourceId"], 1);
        assert_eq!(value["data"]["targetId"], 2);
        assert_eq!(value["data"]["message"], "hi");

        let back: GatewayEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
