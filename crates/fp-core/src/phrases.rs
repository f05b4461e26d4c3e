//! Locale phrase tables for the site's human-readable signals.
//!
//! The site reports system events, staff badges, and send failures as
//! plain strings in Russian, English, and Ukrainian. All of those
//! strings live here, in one swappable table per concern, so a site
//! rewording is a table edit rather than a logic change.

use std::sync::OnceLock;

use regex::Regex;

use crate::chat::types::MessageKind;
use crate::errors::{Error, Result};

// ============== Outbound Markers ==============

/// Invisible character prepended to outbound texts so the library can
/// recognize its own messages when reading them back.
pub const BOT_MARKER: char = '\u{2061}';

/// Marker used by older releases; still honored when reading history.
pub const LEGACY_BOT_MARKER: char = '\u{2064}';

/// Substring of the image filename stamped onto current bot uploads.
/// Matched case-insensitively against the image alt text.
pub const BOT_IMAGE_STAMP: &str = "funpay_cardinal";

/// Exact image filename stamped by the legacy Vertex builds.
pub const VERTEX_IMAGE_STAMP: &str = "funpay_vertex_image.png";

/// Display name of the platform pseudo-author (id 0).
pub const PLATFORM_NAME: &str = "FunPay";

// ============== System Event Phrases ==============

/// Locale-keyed classification table for platform-authored messages.
///
/// Entries are tried in order; the first match wins. The built-in table
/// covers ru/en/uk wordings of every known event class, and a custom
/// table can be swapped in when the site rewords an event before a
/// release catches up.
#[derive(Debug)]
pub struct SystemPhrases {
    entries: Vec<(MessageKind, Regex)>,
}

impl SystemPhrases {
    pub fn from_patterns(patterns: &[(MessageKind, &str)]) -> Result<SystemPhrases> {
        let mut entries = Vec::with_capacity(patterns.len());
        for (kind, pattern) in patterns {
            let re = Regex::new(pattern).map_err(|e| Error::Pattern(e.to_string()))?;
            entries.push((*kind, re));
        }
        Ok(SystemPhrases { entries })
    }

    pub fn classify(&self, text: &str) -> Option<MessageKind> {
        let text = text.trim();
        self.entries
            .iter()
            .find(|(_, re)| re.is_match(text))
            .map(|(kind, _)| *kind)
    }

    /// The compiled built-in table. Patterns are static and known-good,
    /// so compilation cannot fail at runtime.
    pub fn builtin() -> &'static SystemPhrases {
        static TABLE: OnceLock<SystemPhrases> = OnceLock::new();
        TABLE.get_or_init(|| {
            SystemPhrases::from_patterns(BUILTIN_PATTERNS).expect("built-in phrase table compiles")
        })
    }
}

const BUILTIN_PATTERNS: &[(MessageKind, &str)] = &[
    (
        MessageKind::OrderPurchased,
        r"^Покупатель \S+ оплатил заказ #[A-Z0-9]+\.",
    ),
    (
        MessageKind::OrderPurchased,
        r"^The buyer \S+ has paid for order #[A-Z0-9]+\.",
    ),
    (
        MessageKind::OrderPurchased,
        r"^Покупець \S+ оплатив замовлення #[A-Z0-9]+\.",
    ),
    (
        MessageKind::OrderConfirmed,
        r"^Покупатель \S+ подтвердил успешное выполнение заказа #[A-Z0-9]+ и отправил деньги продавцу \S+",
    ),
    (
        MessageKind::OrderConfirmed,
        r"^The buyer \S+ has confirmed that order #[A-Z0-9]+ has been fulfilled successfully and that the seller \S+ has been paid",
    ),
    (
        MessageKind::OrderConfirmed,
        r"^Покупець \S+ підтвердив успішне виконання замовлення #[A-Z0-9]+ і надіслав гроші продавцю \S+",
    ),
    (
        MessageKind::OrderConfirmedByAdmin,
        r"^Администратор \S+ подтвердил успешное выполнение заказа #[A-Z0-9]+ и отправил деньги продавцу \S+",
    ),
    (
        MessageKind::OrderConfirmedByAdmin,
        r"^The administrator \S+ has confirmed that order #[A-Z0-9]+ has been fulfilled successfully and that the seller \S+ has been paid",
    ),
    (
        MessageKind::OrderConfirmedByAdmin,
        r"^Адміністратор \S+ підтвердив успішне виконання замовлення #[A-Z0-9]+ і надіслав гроші продавцю \S+",
    ),
    (
        MessageKind::OrderReopened,
        r"^Заказ #[A-Z0-9]+ открыт повторно\.",
    ),
    (
        MessageKind::OrderReopened,
        r"^Order #[A-Z0-9]+ has been reopened\.",
    ),
    (
        MessageKind::OrderReopened,
        r"^Замовлення #[A-Z0-9]+ відкрито повторно\.",
    ),
    (
        MessageKind::Refund,
        r"^Продавец \S+ вернул деньги покупателю \S+ по заказу #[A-Z0-9]+\.",
    ),
    (
        MessageKind::Refund,
        r"^The seller \S+ has refunded the buyer \S+ on order #[A-Z0-9]+\.",
    ),
    (
        MessageKind::Refund,
        r"^Продавець \S+ повернув гроші покупцеві \S+ за замовленням #[A-Z0-9]+\.",
    ),
    (
        MessageKind::PartialRefund,
        r"^Часть средств по заказу #[A-Z0-9]+ возвращена покупателю\.",
    ),
    (
        MessageKind::PartialRefund,
        r"^A part of the funds pertaining to the order #[A-Z0-9]+ has been refunded to the buyer\.",
    ),
    (
        MessageKind::PartialRefund,
        r"^Частину коштів за замовленням #[A-Z0-9]+ повернуто покупцеві\.",
    ),
    (
        MessageKind::RefundByAdmin,
        r"^Администратор \S+ вернул деньги покупателю \S+ по заказу #[A-Z0-9]+\.",
    ),
    (
        MessageKind::RefundByAdmin,
        r"^The administrator \S+ has refunded the buyer \S+ on order #[A-Z0-9]+\.",
    ),
    (
        MessageKind::RefundByAdmin,
        r"^Адміністратор \S+ повернув гроші покупцеві \S+ за замовленням #[A-Z0-9]+\.",
    ),
    (
        MessageKind::NewFeedback,
        r"^Покупатель \S+ написал отзыв к заказу #[A-Z0-9]+\.",
    ),
    (
        MessageKind::NewFeedback,
        r"^The buyer \S+ has given feedback to the order #[A-Z0-9]+\.",
    ),
    (
        MessageKind::NewFeedback,
        r"^Покупець \S+ написав відгук до замовлення #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackChanged,
        r"^Покупатель \S+ изменил отзыв к заказу #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackChanged,
        r"^The buyer \S+ has edited their feedback to the order #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackChanged,
        r"^Покупець \S+ змінив відгук до замовлення #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackDeleted,
        r"^Покупатель \S+ удалил отзыв к заказу #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackDeleted,
        r"^The buyer \S+ has deleted their feedback to the order #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackDeleted,
        r"^Покупець \S+ видалив відгук до замовлення #[A-Z0-9]+\.",
    ),
    (
        MessageKind::NewFeedbackReply,
        r"^Продавец \S+ ответил на отзыв к заказу #[A-Z0-9]+\.",
    ),
    (
        MessageKind::NewFeedbackReply,
        r"^The seller \S+ has replied to their feedback to the order #[A-Z0-9]+\.",
    ),
    (
        MessageKind::NewFeedbackReply,
        r"^Продавець \S+ відповів на відгук до замовлення #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackReplyChanged,
        r"^Продавец \S+ изменил ответ на отзыв к заказу #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackReplyChanged,
        r"^The seller \S+ has edited a reply to their feedback to the order #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackReplyChanged,
        r"^Продавець \S+ змінив відповідь на відгук до замовлення #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackReplyDeleted,
        r"^Продавец \S+ удалил ответ на отзыв к заказу #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackReplyDeleted,
        r"^The seller \S+ has deleted a reply to their feedback to the order #[A-Z0-9]+\.",
    ),
    (
        MessageKind::FeedbackReplyDeleted,
        r"^Продавець \S+ видалив відповідь на відгук до замовлення #[A-Z0-9]+\.",
    ),
];

// ============== Staff Badges ==============

/// Staff role encoded by the badge next to an author name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BadgeRole {
    Support,
    Moderation,
    Arbitration,
}

const SUPPORT_BADGES: &[&str] = &["поддержка", "підтримка", "support"];
const MODERATION_BADGES: &[&str] = &["модерация", "модерація", "moderation"];
const ARBITRATION_BADGES: &[&str] = &["арбитраж", "арбітраж", "arbitration"];
const AUTOREPLY_LABELS: &[&str] = &["автоответ", "автовідповідь", "auto-reply"];

pub fn badge_role(badge: &str) -> Option<BadgeRole> {
    let badge = badge.trim();
    if SUPPORT_BADGES.contains(&badge) {
        Some(BadgeRole::Support)
    } else if MODERATION_BADGES.contains(&badge) {
        Some(BadgeRole::Moderation)
    } else if ARBITRATION_BADGES.contains(&badge) {
        Some(BadgeRole::Arbitration)
    } else {
        None
    }
}

pub fn is_autoreply_label(label: &str) -> bool {
    AUTOREPLY_LABELS.contains(&label.trim())
}

// ============== Send Failures ==============

const MESSAGE_FLOOD_ERRORS: &[&str] = &[
    "Нельзя отправлять сообщения слишком часто.",
    "You cannot send messages too frequently.",
    "Не можна надсилати повідомлення занадто часто.",
];

const RECIPIENT_FLOOD_ERRORS: &[&str] = &[
    "Нельзя слишком часто отправлять сообщения разным пользователям.",
    "Не можна надто часто надсилати повідомлення різним користувачам.",
    "You cannot message multiple users too frequently.",
];

const WAIT_PREFIXES: &[&str] = &["Подождите", "Please wait", "Зачекайте"];

const WAIT_ONE_SECOND: &[&str] = &[
    "Подождите секунду.",
    "Please wait a second.",
    "Зачекайте секунду.",
];

pub fn is_message_flood_error(text: &str) -> bool {
    MESSAGE_FLOOD_ERRORS.contains(&text.trim())
}

pub fn is_recipient_flood_error(text: &str) -> bool {
    RECIPIENT_FLOOD_ERRORS.contains(&text.trim())
}

pub fn is_wait_error(text: &str) -> bool {
    WAIT_PREFIXES.iter().any(|p| text.contains(p))
}

/// Image placeholder shown as a chat's last-message preview.
const IMAGE_PLACEHOLDERS: &[&str] = &["Изображение", "Зображення", "Image"];

pub fn is_image_placeholder(text: &str) -> bool {
    IMAGE_PLACEHOLDERS.contains(&text.trim())
}

// ============== Wait-Time Extraction ==============

/// Seconds to wait, extracted from a "wait N <unit>" style error.
///
/// The site rounds "one second" down to a phrase with no number; that
/// case is padded to 2 seconds so the caller never retries instantly.
pub fn parse_wait_time(text: &str) -> Option<u64> {
    let text = text.trim();
    if WAIT_ONE_SECOND.contains(&text) {
        return Some(2);
    }

    static NUM: OnceLock<Regex> = OnceLock::new();
    let num = NUM.get_or_init(|| Regex::new(r"\d+").expect("valid regex"));
    let n: u64 = num.find(text)?.as_str().parse().ok()?;

    // Unit words share stems across the three locales; hours before
    // minutes because "годин" must not be shadowed by a later match.
    let lowered = text.to_lowercase();
    let multiplier = if ["час", "hour", "годин"].iter().any(|u| lowered.contains(u)) {
        3600
    } else if ["минут", "minute", "хвилин"].iter().any(|u| lowered.contains(u)) {
        60
    } else {
        1
    };
    Some(n * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_order_purchased_in_all_locales() {
        let table = SystemPhrases::builtin();
        for text in [
            "Покупатель slermk оплатил заказ #QRSTU123.",
            "The buyer slermk has paid for order #QRSTU123.",
            "Покупець slermk оплатив замовлення #QRSTU123.",
        ] {
            assert_eq!(table.classify(text), Some(MessageKind::OrderPurchased));
        }
    }

    #[test]
    fn distinguishes_feedback_from_feedback_reply_edits() {
        let table = SystemPhrases::builtin();
        assert_eq!(
            table.classify("Покупатель n1 изменил отзыв к заказу #AAAA1111."),
            Some(MessageKind::FeedbackChanged)
        );
        assert_eq!(
            table.classify("Продавец n2 изменил ответ на отзыв к заказу #AAAA1111."),
            Some(MessageKind::FeedbackReplyChanged)
        );
    }

    #[test]
    fn admin_wordings_map_to_admin_kinds() {
        let table = SystemPhrases::builtin();
        assert_eq!(
            table.classify(
                "The administrator Sup has confirmed that order #AB12CD34 has been fulfilled successfully and that the seller kit has been paid."
            ),
            Some(MessageKind::OrderConfirmedByAdmin)
        );
        assert_eq!(
            table.classify("Администратор Sup вернул деньги покупателю kit по заказу #AB12CD34."),
            Some(MessageKind::RefundByAdmin)
        );
    }

    #[test]
    fn unknown_text_is_unclassified() {
        assert_eq!(
            SystemPhrases::builtin().classify("Нечто невиданное случилось."),
            None
        );
    }

    #[test]
    fn custom_table_replaces_builtin_wordings() {
        let table = SystemPhrases::from_patterns(&[(
            MessageKind::OrderPurchased,
            r"^Order \S+ was bought\.",
        )])
        .unwrap();
        assert_eq!(
            table.classify("Order #X was bought."),
            Some(MessageKind::OrderPurchased)
        );
        assert_eq!(
            table.classify("The buyer x has paid for order #Y."),
            None
        );
    }

    #[test]
    fn invalid_custom_pattern_is_reported() {
        let err = SystemPhrases::from_patterns(&[(MessageKind::Refund, "(")]).unwrap_err();
        assert!(matches!(err, crate::Error::Pattern(_)));
    }

    #[test]
    fn badge_roles_map_across_locales() {
        assert_eq!(badge_role("поддержка"), Some(BadgeRole::Support));
        assert_eq!(badge_role("support"), Some(BadgeRole::Support));
        assert_eq!(badge_role("модерація"), Some(BadgeRole::Moderation));
        assert_eq!(badge_role("arbitration"), Some(BadgeRole::Arbitration));
        assert_eq!(badge_role("автоответ"), None);
        assert!(is_autoreply_label("автоответ"));
        assert!(is_autoreply_label("auto-reply"));
    }

    #[test]
    fn wait_time_units_multiply_out() {
        assert_eq!(parse_wait_time("Please wait 120 seconds."), Some(120));
        assert_eq!(parse_wait_time("Подождите 3 минуты."), Some(180));
        assert_eq!(parse_wait_time("Зачекайте 2 години."), Some(7200));
        assert_eq!(parse_wait_time("Please wait a second."), Some(2));
        assert_eq!(parse_wait_time("Please wait."), None);
    }
}
