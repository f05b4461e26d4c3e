//! Per-record message classification.
//!
//! [`classify`] is a pure transform from one raw record plus read-only
//! context to one [`Message`]. The only shared piece is the per-batch
//! [`IdentityCache`]; it must never be reused across concurrently
//! running batches.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{ChatId, MessageId, UserId, SYSTEM_AUTHOR};
use crate::markup;
use crate::phrases::{self, BadgeRole, SystemPhrases};

use super::types::{Message, MessageKind, RawMessage};

/// Resolution state distinguishing "not looked up yet" from "looked up,
/// nothing there". A record without an author block leaves the state at
/// `NotChecked` so a later record may still resolve it; a record whose
/// author block simply has no badge pins `Empty` for the whole batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Resolved<T> {
    #[default]
    NotChecked,
    Empty,
    Value(T),
}

impl<T> Resolved<T> {
    pub fn is_checked(&self) -> bool {
        !matches!(self, Resolved::NotChecked)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Resolved::Value(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct IdentityEntry {
    name: Resolved<String>,
    badge: Resolved<String>,
}

/// Names and staff badges resolved while walking one batch.
#[derive(Clone, Debug, Default)]
pub struct IdentityCache {
    entries: HashMap<i64, IdentityEntry>,
}

impl IdentityCache {
    pub fn new() -> IdentityCache {
        IdentityCache::default()
    }

    /// Seeds a name known before the batch starts (the local account,
    /// the platform pseudo-user, a caller-supplied interlocutor name).
    pub fn seed_name(&mut self, user: UserId, name: &str) {
        self.entries.entry(user.0).or_default().name = Resolved::Value(name.to_string());
    }

    pub fn name(&self, user: UserId) -> Option<&str> {
        self.entries
            .get(&user.0)
            .and_then(|e| e.name.value())
            .map(String::as_str)
    }

    pub fn badge(&self, user: UserId) -> Option<&str> {
        self.entries
            .get(&user.0)
            .and_then(|e| e.badge.value())
            .map(String::as_str)
    }

    #[cfg(test)]
    fn badge_state(&self, user: UserId) -> Option<&Resolved<String>> {
        self.entries.get(&user.0).map(|e| &e.badge)
    }
}

/// Read-only context shared by every record of one batch.
pub struct ClassifyContext<'a> {
    pub local_user: UserId,
    pub chat_id: &'a ChatId,
    pub interlocutor_id: Option<UserId>,
    pub phrases: &'a SystemPhrases,
}

impl<'a> ClassifyContext<'a> {
    pub fn new(
        local_user: UserId,
        chat_id: &'a ChatId,
        interlocutor_id: Option<UserId>,
    ) -> ClassifyContext<'a> {
        ClassifyContext {
            local_user,
            chat_id,
            interlocutor_id,
            phrases: SystemPhrases::builtin(),
        }
    }

    pub fn with_phrases(mut self, phrases: &'a SystemPhrases) -> ClassifyContext<'a> {
        self.phrases = phrases;
        self
    }
}

/// Classifies one raw record into a [`Message`], resolving author
/// identity into `cache` as a side effect.
pub fn classify(record: &RawMessage, ctx: &ClassifyContext<'_>, cache: &mut IdentityCache) -> Message {
    let author_id = UserId(record.author);
    let html = record.html.as_str();

    resolve_author_block(html, author_id, cache);

    let mut msg = blank_message(record, ctx, author_id);

    let image_anchor = if ctx.chat_id.is_private() {
        markup::find_by_class(html, "a", "chat-img-link")
    } else {
        None
    };

    if let Some(anchor) = image_anchor {
        msg.image_link = anchor.tag.attr("href").map(str::to_string);
        msg.image_name = markup::find_block(anchor.inner, "img", |_| true)
            .and_then(|img| img.tag.attr("alt").map(str::to_string));
        if let Some(name) = msg.image_name.as_deref() {
            if name.to_lowercase().contains(phrases::BOT_IMAGE_STAMP) {
                msg.by_bot = true;
            } else if name == phrases::VERTEX_IMAGE_STAMP {
                msg.by_vertex = true;
            }
        }
    } else {
        let raw_text = if author_id == SYSTEM_AUTHOR {
            markup::find_block(html, "div", |t| t.attr("role") == Some("alert"))
                .map(|b| markup::text(b.inner))
        } else {
            markup::find_by_class(html, "div", "chat-msg-text").map(|b| markup::text(b.inner))
        };
        let (text, by_bot) = strip_bot_marker(raw_text, author_id == ctx.local_user);
        msg.text = text;
        msg.by_bot = by_bot;
    }

    msg.kind = if author_id == SYSTEM_AUTHOR {
        match msg.text.as_deref().and_then(|t| ctx.phrases.classify(t)) {
            Some(kind) => kind,
            None => {
                debug!(id = record.id, "system message matched no known phrase");
                MessageKind::Unrecognized
            }
        }
    } else {
        MessageKind::NonSystem
    };

    if msg.kind.is_system() {
        attribute_roles(&mut msg, html, ctx.local_user);
    }

    if let Some(author_div) = markup::find_by_class(html, "div", "media-user-name") {
        if let Some(label) = markup::find_block(author_div.inner, "span", |t| {
            t.has_class("chat-msg-author-label") && t.has_class("label-default")
        }) {
            let label_text = markup::text(label.inner);
            if phrases::is_autoreply_label(&label_text) {
                msg.is_autoreply = true;
            }
            if msg.badge.is_none() {
                msg.badge = Some(label_text);
            }
        }
    }

    apply_identity(&mut msg, cache);
    msg
}

/// Re-applies cached identity to a message. The assembler runs this
/// again after the whole batch is classified, so a name or badge
/// resolved by a later record also lands on earlier messages.
pub fn apply_identity(msg: &mut Message, cache: &IdentityCache) {
    if let Some(name) = cache.name(msg.author_id) {
        msg.author = Some(name.to_string());
    }
    if let Some(badge) = cache.badge(msg.author_id) {
        msg.badge = Some(badge.to_string());
        msg.is_employee = true;
        match phrases::badge_role(badge) {
            Some(BadgeRole::Support) => msg.is_support = true,
            Some(BadgeRole::Moderation) => msg.is_moderation = true,
            Some(BadgeRole::Arbitration) => msg.is_arbitration = true,
            None => {}
        }
    }
}

fn blank_message(record: &RawMessage, ctx: &ClassifyContext<'_>, author_id: UserId) -> Message {
    Message {
        id: MessageId(record.id),
        text: None,
        chat_id: ctx.chat_id.clone(),
        chat_name: None,
        interlocutor_id: ctx.interlocutor_id,
        author_id,
        author: None,
        kind: MessageKind::NonSystem,
        badge: None,
        by_bot: false,
        by_vertex: false,
        is_employee: false,
        is_support: false,
        is_moderation: false,
        is_arbitration: false,
        is_autoreply: false,
        i_am_buyer: None,
        i_am_seller: None,
        initiator_id: None,
        initiator_username: None,
        image_link: None,
        image_name: None,
        html: record.html.clone(),
    }
}

/// Fills the author's cache entry from the record's author block, if
/// the record has one and the entry is not fully resolved yet.
fn resolve_author_block(html: &str, author: UserId, cache: &mut IdentityCache) {
    let entry = cache.entries.entry(author.0).or_default();
    if entry.name.is_checked() && entry.badge.is_checked() {
        return;
    }
    let Some(author_div) = markup::find_by_class(html, "div", "media-user-name") else {
        return;
    };

    if !entry.badge.is_checked() {
        entry.badge = match markup::find_block(author_div.inner, "span", |t| {
            t.has_class("chat-msg-author-label") && t.has_class("label-success")
        }) {
            Some(b) => Resolved::Value(markup::text(b.inner)),
            None => Resolved::Empty,
        };
    }
    if !entry.name.is_checked() {
        let name = markup::find_block(author_div.inner, "a", |_| true)
            .map(|a| markup::text(a.inner))
            .unwrap_or_default();
        entry.name = if name.is_empty() {
            Resolved::Empty
        } else {
            Resolved::Value(name)
        };
    }
}

/// Marker stripping applies only to the local account's own messages;
/// exactly one leading character is removed.
fn strip_bot_marker(text: Option<String>, from_local: bool) -> (Option<String>, bool) {
    let Some(text) = text else {
        return (None, false);
    };
    if from_local {
        if let Some(rest) = text
            .strip_prefix(phrases::BOT_MARKER)
            .or_else(|| text.strip_prefix(phrases::LEGACY_BOT_MARKER))
        {
            return (Some(rest.to_string()), true);
        }
    }
    (Some(text), false)
}

/// Event classes where a single profile link names the buyer.
const BUYER_INITIATED: &[MessageKind] = &[
    MessageKind::OrderPurchased,
    MessageKind::OrderConfirmed,
    MessageKind::NewFeedback,
    MessageKind::FeedbackChanged,
    MessageKind::FeedbackDeleted,
];

/// Event classes where a single profile link names the seller.
const SELLER_INITIATED: &[MessageKind] = &[
    MessageKind::NewFeedbackReply,
    MessageKind::FeedbackReplyChanged,
    MessageKind::FeedbackReplyDeleted,
    MessageKind::Refund,
];

/// Buyer/seller attribution from the profile links of a system record.
///
/// With two or more links the event is admin-mediated and the last
/// link names the authoritative actor. That rule is an observation
/// about the markup, not a documented contract; the golden-sample
/// tests below pin it so drift shows up as a failure.
fn attribute_roles(msg: &mut Message, html: &str, local: UserId) {
    let links = markup::links_containing(html, "/users/");
    let Some((first_href, first_name)) = links.first() else {
        return;
    };
    let Some(first_id) = markup::trailing_id(first_href) else {
        return;
    };
    msg.initiator_id = Some(UserId(first_id));
    msg.initiator_username = Some(first_name.clone());

    if BUYER_INITIATED.contains(&msg.kind) {
        let local_is_buyer = first_id == local.0;
        msg.i_am_buyer = Some(local_is_buyer);
        msg.i_am_seller = Some(!local_is_buyer);
    } else if SELLER_INITIATED.contains(&msg.kind) {
        let local_is_seller = first_id == local.0;
        msg.i_am_seller = Some(local_is_seller);
        msg.i_am_buyer = Some(!local_is_seller);
    } else if links.len() > 1 {
        let Some(last_id) = markup::trailing_id(&links[links.len() - 1].0) else {
            return;
        };
        match msg.kind {
            MessageKind::OrderConfirmedByAdmin => {
                let local_is_seller = last_id == local.0;
                msg.i_am_seller = Some(local_is_seller);
                msg.i_am_buyer = Some(!local_is_seller);
            }
            MessageKind::RefundByAdmin => {
                let local_is_buyer = last_id == local.0;
                msg.i_am_buyer = Some(local_is_buyer);
                msg.i_am_seller = Some(!local_is_buyer);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL: UserId = UserId(100);

    fn record(id: i64, author: i64, html: &str) -> RawMessage {
        RawMessage {
            id,
            author,
            html: html.to_string(),
        }
    }

    fn private_ctx(chat_id: &ChatId) -> ClassifyContext<'_> {
        ClassifyContext::new(LOCAL, chat_id, Some(UserId(42)))
    }

    fn user_text_html(text: &str) -> String {
        format!(r#"<div class="chat-msg-item"><div class="chat-msg-text">{text}</div></div>"#)
    }

    #[test]
    fn bot_marker_is_stripped_only_for_local_author() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();
        let html = user_text_html("\u{2061}done");

        let own = classify(&record(1, LOCAL.0, &html), &ctx, &mut cache);
        assert_eq!(own.text.as_deref(), Some("done"));
        assert!(own.by_bot);

        let theirs = classify(&record(2, 42, &html), &ctx, &mut cache);
        assert_eq!(theirs.text.as_deref(), Some("\u{2061}done"));
        assert!(!theirs.by_bot);
    }

    #[test]
    fn legacy_marker_strips_exactly_one_character() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();
        let html = user_text_html("\u{2064}\u{2064}hi");

        let msg = classify(&record(1, LOCAL.0, &html), &ctx, &mut cache);
        assert_eq!(msg.text.as_deref(), Some("\u{2064}hi"));
        assert!(msg.by_bot);
    }

    #[test]
    fn unmarked_text_is_untouched() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();

        let msg = classify(&record(1, LOCAL.0, &user_text_html("plain")), &ctx, &mut cache);
        assert_eq!(msg.text.as_deref(), Some("plain"));
        assert!(!msg.by_bot);
    }

    fn image_html(alt: &str) -> String {
        format!(
            r#"<a class="chat-img-link" href="https://img.example/f.png"><img alt="{alt}"></a>"#
        )
    }

    #[test]
    fn image_stamp_sets_bot_flags() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();

        let current = classify(
            &record(1, 42, &image_html("Funpay_Cardinal_upload.png")),
            &ctx,
            &mut cache,
        );
        assert!(current.by_bot && !current.by_vertex);
        assert_eq!(current.text, None);
        assert_eq!(current.image_link.as_deref(), Some("https://img.example/f.png"));

        let legacy = classify(
            &record(2, 42, &image_html("funpay_vertex_image.png")),
            &ctx,
            &mut cache,
        );
        assert!(!legacy.by_bot && legacy.by_vertex);

        let plain = classify(&record(3, 42, &image_html("cat.png")), &ctx, &mut cache);
        assert!(!plain.by_bot && !plain.by_vertex);
        assert_eq!(plain.image_name.as_deref(), Some("cat.png"));
    }

    #[test]
    fn image_anchor_is_ignored_outside_private_chats() {
        let chat = ChatId::Key("flood-chat".into());
        let ctx = ClassifyContext::new(LOCAL, &chat, None);
        let mut cache = IdentityCache::new();
        let html = format!(
            "{}{}",
            image_html("cat.png"),
            r#"<div class="chat-msg-text">look</div>"#
        );

        let msg = classify(&record(1, 42, &html), &ctx, &mut cache);
        assert_eq!(msg.image_link, None);
        assert_eq!(msg.text.as_deref(), Some("look"));
    }

    fn system_html(text: &str) -> String {
        format!(r#"<div class="alert alert-with-icon" role="alert">{text}</div>"#)
    }

    #[test]
    fn order_confirmed_single_link_maps_local_to_seller() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();
        let html = system_html(concat!(
            r#"The buyer <a href="https://funpay.com/users/42/">Ivan</a> has confirmed "#,
            "that order #ABC123 has been fulfilled successfully and that the seller kit has been paid.",
        ));

        let msg = classify(&record(5, 0, &html), &ctx, &mut cache);
        assert_eq!(msg.kind, MessageKind::OrderConfirmed);
        assert_eq!(msg.initiator_id, Some(UserId(42)));
        assert_eq!(msg.initiator_username.as_deref(), Some("Ivan"));
        assert_eq!(msg.i_am_seller, Some(true));
        assert_eq!(msg.i_am_buyer, Some(false));
    }

    #[test]
    fn refund_single_link_inverts_the_mapping() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();
        let html = system_html(concat!(
            r#"The seller <a href="https://funpay.com/users/100/">kit</a> has refunded "#,
            "the buyer Ivan on order #ABC123.",
        ));

        let msg = classify(&record(6, 0, &html), &ctx, &mut cache);
        assert_eq!(msg.kind, MessageKind::Refund);
        assert_eq!(msg.i_am_seller, Some(true));
        assert_eq!(msg.i_am_buyer, Some(false));
    }

    #[test]
    fn admin_confirmation_uses_last_profile_link() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();
        let html = system_html(concat!(
            r#"The administrator <a href="https://funpay.com/users/7/">Sup</a> has confirmed "#,
            "that order #ABC123 has been fulfilled successfully and that the seller ",
            r#"<a href="https://funpay.com/users/100/">kit</a> has been paid."#,
        ));

        let msg = classify(&record(7, 0, &html), &ctx, &mut cache);
        assert_eq!(msg.kind, MessageKind::OrderConfirmedByAdmin);
        assert_eq!(msg.initiator_id, Some(UserId(7)));
        assert_eq!(msg.i_am_seller, Some(true));
        assert_eq!(msg.i_am_buyer, Some(false));
    }

    #[test]
    fn admin_refund_inverts_the_last_link_mapping() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();
        let html = system_html(concat!(
            r#"The administrator <a href="https://funpay.com/users/7/">Sup</a> has refunded "#,
            r#"the buyer <a href="https://funpay.com/users/42/">Ivan</a> on order #ABC123."#,
        ));

        let msg = classify(&record(8, 0, &html), &ctx, &mut cache);
        assert_eq!(msg.kind, MessageKind::RefundByAdmin);
        // Last link is the buyer (42), not the local account.
        assert_eq!(msg.i_am_buyer, Some(false));
        assert_eq!(msg.i_am_seller, Some(true));
    }

    #[test]
    fn unrecognized_system_text_is_non_fatal() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();
        let html = system_html(
            r#"Something new involving <a href="https://funpay.com/users/42/">Ivan</a> happened."#,
        );

        let msg = classify(&record(9, 0, &html), &ctx, &mut cache);
        assert_eq!(msg.kind, MessageKind::Unrecognized);
        assert_eq!(msg.initiator_id, Some(UserId(42)));
        assert_eq!(msg.i_am_buyer, None);
        assert_eq!(msg.i_am_seller, None);
    }

    #[test]
    fn badge_checked_empty_is_not_rechecked() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();

        let bare = concat!(
            r#"<div class="media-user-name"><a href="https://funpay.com/users/42/">Ivan</a></div>"#,
            r#"<div class="chat-msg-text">first</div>"#,
        );
        classify(&record(1, 42, bare), &ctx, &mut cache);
        assert_eq!(cache.badge_state(UserId(42)), Some(&Resolved::Empty));

        // A later record with a badge span must not flip the pinned state.
        let badged = concat!(
            r#"<div class="media-user-name"><a href="https://funpay.com/users/42/">Ivan</a>"#,
            r#"<span class="chat-msg-author-label label label-success">support</span></div>"#,
            r#"<div class="chat-msg-text">second</div>"#,
        );
        let msg = classify(&record(2, 42, badged), &ctx, &mut cache);
        assert_eq!(cache.badge_state(UserId(42)), Some(&Resolved::Empty));
        assert!(!msg.is_employee);
    }

    #[test]
    fn support_badge_sets_employee_flags() {
        let chat = ChatId::Node(7);
        let ctx = ClassifyContext::new(LOCAL, &chat, None);
        let mut cache = IdentityCache::new();
        let html = concat!(
            r#"<div class="media-user-name"><a href="https://funpay.com/users/9/">Helper</a>"#,
            r#"<span class="chat-msg-author-label label label-success">support</span></div>"#,
            r#"<div class="chat-msg-text">hello</div>"#,
        );

        let msg = classify(&record(1, 9, html), &ctx, &mut cache);
        assert!(msg.is_employee && msg.is_support);
        assert!(!msg.is_moderation && !msg.is_arbitration);
        assert_eq!(msg.badge.as_deref(), Some("support"));
        assert_eq!(msg.author.as_deref(), Some("Helper"));
        assert_eq!(msg.kind, MessageKind::NonSystem);
    }

    #[test]
    fn autoreply_label_sets_flag_without_role() {
        let chat = ChatId::Node(7);
        let ctx = ClassifyContext::new(LOCAL, &chat, None);
        let mut cache = IdentityCache::new();
        let html = concat!(
            r#"<div class="media-user-name"><a href="https://funpay.com/users/42/">Ivan</a>"#,
            r#"<span class="chat-msg-author-label label label-default">auto-reply</span></div>"#,
            r#"<div class="chat-msg-text">away right now</div>"#,
        );

        let msg = classify(&record(1, 42, html), &ctx, &mut cache);
        assert!(msg.is_autoreply);
        assert!(!msg.is_employee);
        assert_eq!(msg.badge.as_deref(), Some("auto-reply"));
    }

    #[test]
    fn custom_phrase_table_drives_classification() {
        let chat = ChatId::Node(7);
        let table = crate::phrases::SystemPhrases::from_patterns(&[(
            MessageKind::OrderPurchased,
            r"^Order \S+ was bought\.",
        )])
        .unwrap();
        let ctx = ClassifyContext::new(LOCAL, &chat, None).with_phrases(&table);
        let mut cache = IdentityCache::new();

        let msg = classify(&record(1, 0, &system_html("Order #X1 was bought.")), &ctx, &mut cache);
        assert_eq!(msg.kind, MessageKind::OrderPurchased);
    }

    #[test]
    fn seeded_names_are_not_overwritten_by_markup() {
        let chat = ChatId::Node(7);
        let ctx = private_ctx(&chat);
        let mut cache = IdentityCache::new();
        cache.seed_name(UserId(42), "KnownName");

        let html = concat!(
            r#"<div class="media-user-name"><a href="https://funpay.com/users/42/">Other</a></div>"#,
            r#"<div class="chat-msg-text">hi</div>"#,
        );
        let msg = classify(&record(1, 42, html), &ctx, &mut cache);
        assert_eq!(msg.author.as_deref(), Some("KnownName"));
    }
}
