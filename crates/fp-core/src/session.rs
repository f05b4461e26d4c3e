//! Authenticated-session state and home-page ingestion.
//!
//! One `SessionState` lives for one authenticated session. All fields
//! are last-writer-wins; the locale for an individual call is threaded
//! as an explicit argument (see [`SessionState::request_locale`]), never
//! stored as transient state, so interleaved calls cannot corrupt each
//! other.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::domain::{Currency, Locale, UserId};
use crate::errors::{Error, Result};
use crate::markup;

/// Rate-limit classes signalled by the send path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloodKind {
    /// Messages sent too frequently into one chat.
    Message,
    /// Messages sent to too many distinct recipients.
    MultiRecipient,
}

/// Structured blob embedded in every page body as `data-app-data`.
#[derive(Clone, Debug, Deserialize)]
pub struct AppData {
    pub locale: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
    #[serde(rename = "csrf-token")]
    pub csrf_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SessionState {
    user_id: Option<UserId>,
    username: Option<String>,
    csrf_token: Option<String>,
    default_locale: Option<Locale>,
    negotiated_locale: Option<Locale>,
    currency: Currency,
    active_sales: u32,
    active_purchases: u32,
    balance: i64,
    last_message_flood: Option<DateTime<Utc>>,
    last_recipient_flood: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(default_locale: Option<Locale>) -> SessionState {
        SessionState {
            default_locale,
            ..SessionState::default()
        }
    }

    /// Whether the home page has been ingested at least once.
    pub fn is_initiated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// The local account id, required by chat attribution.
    pub fn local_user(&self) -> Result<UserId> {
        self.user_id.ok_or(Error::NotInitialized)
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub fn default_locale(&self) -> Option<Locale> {
        self.default_locale
    }

    /// Locale the server reported back in the app-data blob.
    pub fn negotiated_locale(&self) -> Option<Locale> {
        self.negotiated_locale
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn active_sales(&self) -> u32 {
        self.active_sales
    }

    pub fn active_purchases(&self) -> u32 {
        self.active_purchases
    }

    /// Approximate total balance in the account currency.
    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Locale for one outbound call: explicit override, else the
    /// session default. Pure; nothing is mutated or restored.
    pub fn request_locale(&self, call_locale: Option<Locale>) -> Option<Locale> {
        call_locale.or(self.default_locale)
    }

    /// Servers do not resend the token on every response; an absent or
    /// empty candidate keeps the previous value.
    pub fn refresh_csrf(&mut self, candidate: Option<&str>) {
        if let Some(token) = candidate {
            if !token.is_empty() {
                self.csrf_token = Some(token.to_string());
            }
        }
    }

    pub fn record_flood(&mut self, kind: FloodKind, at: DateTime<Utc>) {
        match kind {
            FloodKind::Message => self.last_message_flood = Some(at),
            FloodKind::MultiRecipient => self.last_recipient_flood = Some(at),
        }
    }

    /// Read by callers to pace future sends.
    pub fn last_flood(&self, kind: FloodKind) -> Option<DateTime<Utc>> {
        match kind {
            FloodKind::Message => self.last_message_flood,
            FloodKind::MultiRecipient => self.last_recipient_flood,
        }
    }

    /// Applies the app-data blob of a freshly fetched page.
    pub fn absorb_app_data(&mut self, data: &AppData) {
        if let Some(locale) = data.locale.as_deref().and_then(Locale::parse) {
            self.negotiated_locale = Some(locale);
        }
        if let Some(id) = data.user_id {
            self.user_id = Some(UserId(id));
        }
        self.refresh_csrf(data.csrf_token.as_deref());
    }
}

/// Extracts the `data-app-data` blob from a page body, if present.
pub fn extract_app_data(html: &str) -> Option<AppData> {
    let body = markup::find_block(html, "body", |t| t.attr("data-app-data").is_some())?;
    let raw = markup::decode_entities(body.tag.attr("data-app-data")?);
    serde_json::from_str(&raw).ok()
}

/// Token refresh on secondary pages. The blob is optional there; a
/// malformed one keeps the previous token.
pub fn refresh_csrf_from_page(html: &str, state: &mut SessionState) {
    match extract_app_data(html) {
        Some(data) => state.refresh_csrf(data.csrf_token.as_deref()),
        None => warn!("csrf refresh skipped: app-data blob missing or malformed"),
    }
}

/// Ingests the home page: authentication marker, identity, negotiated
/// locale, csrf token, and the account badges.
///
/// Fails with [`Error::Unauthorized`] when the authenticated-user
/// marker is absent, and with [`Error::Payload`] when the page carries
/// no readable app-data blob.
pub fn parse_home_page(html: &str, state: &mut SessionState) -> Result<()> {
    let username = markup::find_by_class(html, "div", "user-link-name")
        .map(|b| markup::text(b.inner))
        .ok_or(Error::Unauthorized)?;

    let data =
        extract_app_data(html).ok_or_else(|| Error::Payload("app-data blob missing".into()))?;
    state.absorb_app_data(&data);
    state.username = Some(username);

    state.active_sales = badge_count(html, "badge-trade");
    state.active_purchases = badge_count(html, "badge-orders");

    state.balance = 0;
    if let Some(badge) = markup::find_by_class(html, "span", "badge-balance") {
        let text = markup::text(badge.inner);
        if let Some((amount, sign)) = text.rsplit_once(' ') {
            if let Ok(value) = amount.replace(' ', "").parse::<i64>() {
                state.balance = value;
                state.currency = Currency::parse(sign);
            }
        }
    }

    Ok(())
}

fn badge_count(html: &str, class: &str) -> u32 {
    markup::find_by_class(html, "span", class)
        .and_then(|b| markup::text(b.inner).parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME: &str = concat!(
        r#"<body data-app-data="{&quot;locale&quot;:&quot;en&quot;,&quot;userId&quot;:100,&quot;csrf-token&quot;:&quot;tok1&quot;}">"#,
        r#"<div class="user-link-name">kit</div>"#,
        r#"<span class="badge badge-trade">3</span>"#,
        r#"<span class="badge badge-balance">12 500 ₽</span>"#,
        r#"</body>"#,
    );

    #[test]
    fn home_page_fills_identity_and_badges() {
        let mut state = SessionState::new(Some(Locale::Ru));
        parse_home_page(HOME, &mut state).unwrap();

        assert_eq!(state.user_id(), Some(UserId(100)));
        assert_eq!(state.username(), Some("kit"));
        assert_eq!(state.csrf_token(), Some("tok1"));
        assert_eq!(state.negotiated_locale(), Some(Locale::En));
        assert_eq!(state.active_sales(), 3);
        assert_eq!(state.active_purchases(), 0);
        assert_eq!(state.balance(), 12500);
        assert_eq!(state.currency(), Currency::Rub);
        assert!(state.is_initiated());
    }

    #[test]
    fn missing_user_marker_is_unauthorized() {
        let mut state = SessionState::default();
        let err = parse_home_page("<body><p>log in</p></body>", &mut state).unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
        assert!(!state.is_initiated());
    }

    #[test]
    fn csrf_refresh_keeps_last_non_empty() {
        let mut state = SessionState::default();
        state.refresh_csrf(Some("tok1"));
        state.refresh_csrf(None);
        state.refresh_csrf(Some(""));
        assert_eq!(state.csrf_token(), Some("tok1"));
        state.refresh_csrf(Some("tok2"));
        assert_eq!(state.csrf_token(), Some("tok2"));
    }

    #[test]
    fn csrf_refresh_from_page_tolerates_garbage() {
        let mut state = SessionState::default();
        state.refresh_csrf(Some("tok1"));
        refresh_csrf_from_page("<body data-app-data=\"not json\"></body>", &mut state);
        assert_eq!(state.csrf_token(), Some("tok1"));
    }

    #[test]
    fn request_locale_prefers_explicit_argument() {
        let state = SessionState::new(Some(Locale::Ru));
        assert_eq!(state.request_locale(Some(Locale::Uk)), Some(Locale::Uk));
        assert_eq!(state.request_locale(None), Some(Locale::Ru));
        assert_eq!(SessionState::default().request_locale(None), None);
    }

    #[test]
    fn flood_timestamps_are_tracked_per_kind() {
        let mut state = SessionState::default();
        let t = Utc::now();
        state.record_flood(FloodKind::Message, t);
        assert_eq!(state.last_flood(FloodKind::Message), Some(t));
        assert_eq!(state.last_flood(FloodKind::MultiRecipient), None);
    }
}
