use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Account id (numeric). Id 0 is the platform itself in chat payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

/// Chat message id (numeric). Id 0 is reserved for the synthetic
/// placeholder of a message sent with `leave_as_unread`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i64);

/// The id of the platform pseudo-author carried by system messages.
pub const SYSTEM_AUTHOR: UserId = UserId(0);

/// Chat identifier: either a numeric chat node id or the textual node
/// key the site uses in history payloads.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatId {
    Node(i64),
    Key(String),
}

fn private_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^users-\d+-\d+$").expect("valid regex"))
}

impl ChatId {
    /// Numeric node ids always denote private chats; textual keys only
    /// when they follow the `users-<a>-<b>` shape.
    pub fn is_private(&self) -> bool {
        match self {
            ChatId::Node(_) => true,
            ChatId::Key(k) => private_key_re().is_match(k),
        }
    }

    /// Chat ids arrive as either numbers or strings in runner envelopes.
    pub fn from_json(value: &serde_json::Value) -> Option<ChatId> {
        if let Some(n) = value.as_i64() {
            return Some(ChatId::Node(n));
        }
        value.as_str().map(|s| ChatId::Key(s.to_string()))
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatId::Node(n) => write!(f, "{n}"),
            ChatId::Key(k) => f.write_str(k),
        }
    }
}

impl From<i64> for ChatId {
    fn from(n: i64) -> Self {
        ChatId::Node(n)
    }
}

/// Private chat node key for a participant pair. Order-independent.
pub fn private_chat_key(a: UserId, b: UserId) -> String {
    let (lo, hi) = if a.0 <= b.0 { (a.0, b.0) } else { (b.0, a.0) };
    format!("users-{lo}-{hi}")
}

/// Interface languages the site serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Locale {
    Ru,
    En,
    Uk,
}

impl Locale {
    pub fn as_str(self) -> &'static str {
        match self {
            Locale::Ru => "ru",
            Locale::En => "en",
            Locale::Uk => "uk",
        }
    }

    pub fn parse(s: &str) -> Option<Locale> {
        match s {
            "ru" => Some(Locale::Ru),
            "en" => Some(Locale::En),
            "uk" => Some(Locale::Uk),
            _ => None,
        }
    }
}

/// Account currency as shown in the balance badge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Currency {
    Rub,
    Usd,
    Eur,
    #[default]
    Unknown,
}

impl Currency {
    /// Parses the currency sign trailing a price or balance string.
    pub fn parse(sign: &str) -> Currency {
        match sign.trim() {
            "₽" => Currency::Rub,
            "$" => Currency::Usd,
            "€" => Currency::Eur,
            _ => Currency::Unknown,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::Rub => "rub",
            Currency::Usd => "usd",
            Currency::Eur => "eur",
            Currency::Unknown => "",
        }
    }
}
