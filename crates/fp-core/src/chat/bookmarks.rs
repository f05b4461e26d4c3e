//! Chat bookmarks: the sidebar list of saved chats with last-message
//! previews.

use crate::markup;
use crate::phrases;

use super::types::ChatShortcut;

/// Parses the chat-bookmarks fragment into shortcuts.
///
/// Entries without a numeric id are skipped; everything else degrades
/// field by field.
pub fn parse_bookmarks(html: &str) -> Vec<ChatShortcut> {
    let mut out = Vec::new();
    for item in markup::find_all_by_class(html, "a", "contact-item") {
        let Some(id) = item.tag.attr("data-id").and_then(|v| v.parse::<i64>().ok()) else {
            continue;
        };
        let name = markup::find_by_class(item.inner, "div", "media-user-name")
            .map(|b| markup::text(b.inner))
            .unwrap_or_default();
        let preview = markup::find_by_class(item.inner, "div", "contact-item-message")
            .map(|b| markup::text(b.inner))
            .unwrap_or_default();
        let node_msg_id = numeric_attr(&item.tag, "data-node-msg");
        let user_msg_id = numeric_attr(&item.tag, "data-user-msg");
        let unread = item.tag.has_class("unread");

        // The preview of an image message is a localized placeholder,
        // which can never carry an outbound marker.
        let is_image = phrases::is_image_placeholder(&preview);
        let mut last_by_bot = false;
        let mut last_by_vertex = false;
        let mut last_message_text = preview;
        if let Some(rest) = last_message_text.strip_prefix(phrases::BOT_MARKER) {
            last_message_text = rest.to_string();
            last_by_bot = !is_image;
        } else if let Some(rest) = last_message_text.strip_prefix(phrases::LEGACY_BOT_MARKER) {
            last_message_text = rest.to_string();
            last_by_vertex = !is_image;
        }

        out.push(ChatShortcut {
            id,
            name,
            last_message_text,
            node_msg_id,
            user_msg_id,
            unread,
            last_by_bot,
            last_by_vertex,
        });
    }
    out
}

fn numeric_attr(tag: &markup::Tag, name: &str) -> i64 {
    tag.attr(name).and_then(|v| v.parse().ok()).unwrap_or(0)
}
