use serde::Deserialize;

use crate::domain::{ChatId, MessageId, UserId};

/// Event classes carried by chat records. Records authored by a real
/// user are always `NonSystem`; everything else is authored by the
/// platform pseudo-user (id 0) and classified from its text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    NonSystem,
    OrderPurchased,
    OrderConfirmed,
    OrderConfirmedByAdmin,
    OrderReopened,
    Refund,
    PartialRefund,
    RefundByAdmin,
    NewFeedback,
    FeedbackChanged,
    FeedbackDeleted,
    NewFeedbackReply,
    FeedbackReplyChanged,
    FeedbackReplyDeleted,
    /// Platform-authored text that matched no known phrase. Kept in the
    /// batch so one reworded event cannot abort a whole history fetch.
    Unrecognized,
}

impl MessageKind {
    pub fn is_system(self) -> bool {
        !matches!(self, MessageKind::NonSystem)
    }
}

/// One fully attributed chat message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    /// `None` for image messages.
    pub text: Option<String>,
    pub chat_id: ChatId,
    /// Interlocutor name of the owning private chat; may be resolved
    /// only after the whole batch has been classified.
    pub chat_name: Option<String>,
    pub interlocutor_id: Option<UserId>,
    pub author_id: UserId,
    /// Resolved author name; filled from the batch identity cache.
    pub author: Option<String>,
    pub kind: MessageKind,
    /// Raw badge label next to the author name, when present.
    pub badge: Option<String>,

    pub by_bot: bool,
    pub by_vertex: bool,
    pub is_employee: bool,
    pub is_support: bool,
    pub is_moderation: bool,
    pub is_arbitration: bool,
    pub is_autoreply: bool,

    /// Whether the local account is the buyer/seller of the event.
    /// Unset for non-system messages and events without actor links.
    pub i_am_buyer: Option<bool>,
    pub i_am_seller: Option<bool>,

    /// The user who triggered a system event, when the markup names one.
    pub initiator_id: Option<UserId>,
    pub initiator_username: Option<String>,

    pub image_link: Option<String>,
    pub image_name: Option<String>,

    /// Original markup fragment, kept for callers that need fields this
    /// model does not carry.
    pub html: String,
}

impl Message {
    pub fn is_system(&self) -> bool {
        self.kind.is_system()
    }
}

/// One raw record of a chat history payload.
#[derive(Clone, Debug, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    pub author: i64,
    pub html: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatNode {
    pub name: String,
    pub silent: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatHistoryData {
    pub node: ChatNode,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

/// Envelope of the single-chat history endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatHistoryPayload {
    pub chat: Option<ChatHistoryData>,
}

/// What a buyer is currently viewing, piggybacked on bulk envelopes as
/// viewer-presence records.
#[derive(Clone, Debug, PartialEq)]
pub struct BuyerViewing {
    pub buyer_id: UserId,
    pub offer_link: Option<String>,
    pub offer_title: Option<String>,
    pub tag: Option<String>,
    pub html: Option<String>,
}

/// One entry of the chat-bookmarks fragment.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatShortcut {
    pub id: i64,
    pub name: String,
    pub last_message_text: String,
    pub node_msg_id: i64,
    pub user_msg_id: i64,
    pub unread: bool,
    pub last_by_bot: bool,
    pub last_by_vertex: bool,
}
