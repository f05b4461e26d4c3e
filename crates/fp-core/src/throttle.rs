//! Classification of failed-send error strings into throttle verdicts.
//!
//! The site signals rate limiting through localized free-text errors,
//! not status codes. Callers funnel every send result through
//! [`classify_send_error`] and pick their own backoff policy from the
//! returned verdict; flood verdicts also stamp [`SessionState`] so the
//! pacing state survives across calls.

use chrono::{DateTime, Utc};

use crate::phrases;
use crate::session::{FloodKind, SessionState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrottleKind {
    /// Messages sent too frequently into one chat.
    MessageFlood,
    /// Messages sent to too many distinct recipients.
    MultiRecipientFlood,
    /// A "wait N seconds" style answer without a specific flood class,
    /// as returned by the listing-raise endpoint.
    Generic,
}

/// Verdict for one send attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Throttled {
        kind: ThrottleKind,
        retry_after: Option<u64>,
    },
    Rejected {
        reason: String,
    },
}

/// Classifies the error text of a send attempt. `None` means the
/// response carried no error and the message was delivered.
pub fn classify_send_error(
    error: Option<&str>,
    state: &mut SessionState,
    at: DateTime<Utc>,
) -> SendOutcome {
    let Some(error) = error else {
        return SendOutcome::Delivered;
    };

    if phrases::is_message_flood_error(error) {
        state.record_flood(FloodKind::Message, at);
        return SendOutcome::Throttled {
            kind: ThrottleKind::MessageFlood,
            retry_after: None,
        };
    }
    if phrases::is_recipient_flood_error(error) {
        state.record_flood(FloodKind::MultiRecipient, at);
        return SendOutcome::Throttled {
            kind: ThrottleKind::MultiRecipientFlood,
            retry_after: None,
        };
    }
    if phrases::is_wait_error(error) {
        return SendOutcome::Throttled {
            kind: ThrottleKind::Generic,
            retry_after: phrases::parse_wait_time(error),
        };
    }
    SendOutcome::Rejected {
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_error_is_delivered() {
        let mut state = SessionState::default();
        assert_eq!(
            classify_send_error(None, &mut state, Utc::now()),
            SendOutcome::Delivered
        );
    }

    #[test]
    fn message_flood_stamps_session_state() {
        let mut state = SessionState::default();
        let at = Utc::now();
        let verdict = classify_send_error(
            Some("Нельзя отправлять сообщения слишком часто."),
            &mut state,
            at,
        );
        assert_eq!(
            verdict,
            SendOutcome::Throttled {
                kind: ThrottleKind::MessageFlood,
                retry_after: None
            }
        );
        assert_eq!(state.last_flood(FloodKind::Message), Some(at));
        assert_eq!(state.last_flood(FloodKind::MultiRecipient), None);
    }

    #[test]
    fn recipient_flood_stamps_the_other_timestamp() {
        let mut state = SessionState::default();
        let at = Utc::now();
        let verdict = classify_send_error(
            Some("You cannot message multiple users too frequently."),
            &mut state,
            at,
        );
        assert_eq!(
            verdict,
            SendOutcome::Throttled {
                kind: ThrottleKind::MultiRecipientFlood,
                retry_after: None
            }
        );
        assert_eq!(state.last_flood(FloodKind::Message), None);
        assert_eq!(state.last_flood(FloodKind::MultiRecipient), Some(at));
    }

    #[test]
    fn wait_seconds_becomes_generic_throttle() {
        let mut state = SessionState::default();
        let verdict = classify_send_error(Some("Please wait 120 seconds."), &mut state, Utc::now());
        assert_eq!(
            verdict,
            SendOutcome::Throttled {
                kind: ThrottleKind::Generic,
                retry_after: Some(120)
            }
        );
        assert_eq!(state.last_flood(FloodKind::Message), None);
    }

    #[test]
    fn unknown_error_is_rejected_with_reason() {
        let mut state = SessionState::default();
        let verdict = classify_send_error(Some("Чат заблокирован."), &mut state, Utc::now());
        assert_eq!(
            verdict,
            SendOutcome::Rejected {
                reason: "Чат заблокирован.".to_string()
            }
        );
    }
}
