//! High-level account facade: wires transport responses into the
//! fp-core parsers and keeps the session coherent across calls.

use chrono::Utc;
use serde_json::{json, Value};

use fp_core::chat::bookmarks::parse_bookmarks;
use fp_core::chat::history::{
    assemble, parse_chat_history, parse_chats_histories, ChatsHistories, HistoryBatch,
};
use fp_core::chat::types::{ChatHistoryPayload, ChatShortcut, Message, MessageKind, RawMessage};
use fp_core::domain::{ChatId, Locale, MessageId, UserId};
use fp_core::phrases;
use fp_core::ports::Transport;
use fp_core::session::{self, SessionState};
use fp_core::taxonomy::{SubCategoryKind, TaxonomyIndex};
use fp_core::throttle::{classify_send_error, SendOutcome, ThrottleKind};
use fp_core::{Error, Result};

/// Outcome of one send attempt. Throttle and rejection verdicts are
/// ordinary values so the caller picks its own backoff policy.
#[derive(Clone, Debug)]
pub enum SendReply {
    Delivered(Message),
    Throttled {
        kind: ThrottleKind,
        retry_after: Option<u64>,
    },
    Rejected {
        reason: String,
    },
}

/// Outcome of a listing-raise attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum RaiseOutcome {
    Raised,
    Wait {
        retry_after: Option<u64>,
        message: String,
    },
    Refused {
        message: Option<String>,
    },
}

pub struct Account<T: Transport> {
    transport: T,
    state: SessionState,
    taxonomy: TaxonomyIndex,
}

impl<T: Transport> Account<T> {
    pub fn new(transport: T, default_locale: Option<Locale>) -> Account<T> {
        Account {
            transport,
            state: SessionState::new(default_locale),
            taxonomy: TaxonomyIndex::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn taxonomy(&self) -> &TaxonomyIndex {
        &self.taxonomy
    }

    async fn get_ok(&self, path: &str, locale: Option<Locale>) -> Result<String> {
        let response = self.transport.get(path, locale).await?;
        if !response.is_ok() {
            return Err(Error::External(format!(
                "GET {path} failed with status {}",
                response.status
            )));
        }
        Ok(response.body)
    }

    async fn post_ok(&self, path: &str, form: &[(String, String)]) -> Result<String> {
        let response = self.transport.post_form(path, form, None).await?;
        if !response.is_ok() {
            return Err(Error::External(format!(
                "POST {path} failed with status {}",
                response.status
            )));
        }
        Ok(response.body)
    }

    fn csrf_form_token(&self) -> String {
        self.state.csrf_token().unwrap_or_default().to_string()
    }

    /// Fetches the home page and rebuilds the session identity and the
    /// taxonomy index. Call once at start-up and periodically after, so
    /// the server-issued session cookie stays fresh.
    pub async fn refresh(&mut self, locale: Option<Locale>) -> Result<()> {
        let locale = self.state.request_locale(locale);
        let body = self.get_ok("", locale).await?;
        session::parse_home_page(&body, &mut self.state)?;
        self.taxonomy = TaxonomyIndex::from_home_page(&body);
        Ok(())
    }

    /// History of one chat, floor-filtered at `from_id`.
    pub async fn chat_history(
        &mut self,
        chat_id: ChatId,
        last_message: i64,
        interlocutor_name: Option<&str>,
        from_id: i64,
    ) -> Result<Vec<Message>> {
        self.state.local_user()?;
        let path = format!("chat/history?node={chat_id}&last_message={last_message}");
        let body = self.get_ok(&path, None).await?;
        let payload: ChatHistoryPayload = serde_json::from_str(&body)?;
        parse_chat_history(&payload, &self.state, chat_id, interlocutor_name, from_id)
    }

    /// Histories of several chats in one runner round-trip, with
    /// viewer-presence probes for `viewer_ids` piggybacked on the same
    /// envelope.
    pub async fn chats_histories(
        &mut self,
        chats: &[(ChatId, Option<String>)],
        viewer_ids: &[UserId],
    ) -> Result<ChatsHistories> {
        self.state.local_user()?;
        let mut objects = Vec::with_capacity(chats.len() + viewer_ids.len());
        for (chat_id, _) in chats {
            objects.push(json!({
                "type": "chat_node",
                "id": chat_id_value(chat_id),
                "tag": "00000000",
                "data": {"node": chat_id_value(chat_id), "last_message": -1, "content": ""},
            }));
        }
        for viewer in viewer_ids {
            objects.push(json!({
                "type": "c-p-u",
                "id": viewer.0.to_string(),
                "tag": "00000000",
                "data": false,
            }));
        }
        let form = vec![
            ("objects".to_string(), serde_json::to_string(&objects)?),
            ("request".to_string(), "false".to_string()),
            ("csrf_token".to_string(), self.csrf_form_token()),
        ];
        let body = self.post_ok("runner/", &form).await?;
        let envelope: Value = serde_json::from_str(&body)?;
        parse_chats_histories(&envelope, &self.state, chats)
    }

    /// Sends a text or an already-uploaded image into a chat.
    ///
    /// Outbound texts are prefixed with the invisible marker so the
    /// library recognizes its own messages when reading them back.
    /// With `leave_as_unread` the chat is not opened server-side and
    /// the returned message is a synthetic id-0 placeholder.
    pub async fn send_message(
        &mut self,
        chat_id: ChatId,
        text: Option<&str>,
        chat_name: Option<&str>,
        interlocutor_id: Option<UserId>,
        image_id: Option<i64>,
        leave_as_unread: bool,
    ) -> Result<SendReply> {
        let local_user = self.state.local_user()?;

        let content = match (image_id, text) {
            (Some(_), _) | (None, None) => String::new(),
            (None, Some(t)) => format!("{}{t}", phrases::BOT_MARKER),
        };
        let mut data = json!({
            "node": chat_id_value(&chat_id),
            "last_message": -1,
            "content": content,
        });
        if let Some(image_id) = image_id {
            data["image_id"] = json!(image_id);
        }
        let request = json!({"action": "chat_message", "data": data});
        let probe = json!([{
            "type": "chat_node",
            "id": chat_id_value(&chat_id),
            "tag": "00000000",
            "data": {"node": chat_id_value(&chat_id), "last_message": -1, "content": ""},
        }]);
        let form = vec![
            (
                "objects".to_string(),
                if leave_as_unread {
                    String::new()
                } else {
                    serde_json::to_string(&probe)?
                },
            ),
            ("request".to_string(), serde_json::to_string(&request)?),
            ("csrf_token".to_string(), self.csrf_form_token()),
        ];

        let body = self.post_ok("runner/", &form).await?;
        let answer: Value = serde_json::from_str(&body)?;
        let Some(response) = answer.get("response").filter(|r| !r.is_null()) else {
            return Err(Error::Payload("send answer has no response object".into()));
        };

        let error_text = response.get("error").and_then(|e| e.as_str());
        match classify_send_error(error_text, &mut self.state, Utc::now()) {
            SendOutcome::Delivered => {}
            SendOutcome::Throttled { kind, retry_after } => {
                return Ok(SendReply::Throttled { kind, retry_after })
            }
            SendOutcome::Rejected { reason } => return Ok(SendReply::Rejected { reason }),
        }

        if leave_as_unread {
            return Ok(SendReply::Delivered(placeholder_message(
                &self.state,
                chat_id,
                chat_name,
                interlocutor_id,
                text,
            )));
        }

        let echoed = answer["objects"][0]["data"]["messages"]
            .as_array()
            .and_then(|m| m.last())
            .cloned()
            .ok_or_else(|| Error::Payload("send answer echoed no message".into()))?;
        let raw: RawMessage = serde_json::from_value(echoed)?;

        // Run the echo through the assembler so marker stripping and
        // image detection behave exactly like history parsing.
        let batch = HistoryBatch {
            chat_id,
            local_user,
            local_username: self.state.username(),
            interlocutor_id,
            interlocutor_name: chat_name,
            from_id: 0,
        };
        let message = assemble(std::slice::from_ref(&raw), &batch)
            .pop()
            .ok_or_else(|| Error::Payload("send answer echoed no message".into()))?;
        Ok(SendReply::Delivered(message))
    }

    /// Current chat bookmarks (up to the server-side page size).
    pub async fn request_bookmarks(&mut self) -> Result<Vec<ChatShortcut>> {
        let local_user = self.state.local_user()?;
        let objects = json!([{
            "type": "chat_bookmarks",
            "id": local_user.0,
            "tag": "00000000",
            "data": false,
        }]);
        let form = vec![
            ("objects".to_string(), serde_json::to_string(&objects)?),
            ("request".to_string(), "false".to_string()),
            ("csrf_token".to_string(), self.csrf_form_token()),
        ];
        let body = self.post_ok("runner/", &form).await?;
        let envelope: Value = serde_json::from_str(&body)?;

        let fragment = envelope
            .get("objects")
            .and_then(|o| o.as_array())
            .and_then(|objects| {
                objects
                    .iter()
                    .find(|o| o.get("type").and_then(|t| t.as_str()) == Some("chat_bookmarks"))
            })
            .and_then(|o| o.get("data"))
            .and_then(|d| d.get("html"))
            .and_then(|h| h.as_str())
            .unwrap_or_default();
        Ok(parse_bookmarks(fragment))
    }

    /// Bumps the listings of a category (all of its common sections,
    /// or the given subset). The wait verdict carries the server's
    /// retry hint in seconds.
    pub async fn raise_listings(
        &mut self,
        category_id: i64,
        subcategory_ids: Option<&[i64]>,
    ) -> Result<RaiseOutcome> {
        self.state.local_user()?;
        let category = self
            .taxonomy
            .category(category_id)
            .ok_or_else(|| Error::Payload(format!("unknown category id {category_id}")))?;

        let nodes: Vec<i64> = category
            .subcategories
            .iter()
            .filter(|(kind, id)| {
                *kind == SubCategoryKind::Common
                    && subcategory_ids.map(|ids| ids.contains(id)).unwrap_or(true)
            })
            .map(|(_, id)| *id)
            .collect();
        let Some(&first) = nodes.first() else {
            return Err(Error::Payload(format!(
                "category {category_id} has no raisable sections"
            )));
        };

        let mut form = vec![
            ("game_id".to_string(), category_id.to_string()),
            ("node_id".to_string(), first.to_string()),
        ];
        for node in &nodes {
            form.push(("node_ids[]".to_string(), node.to_string()));
        }

        let body = self.post_ok("lots/raise", &form).await?;
        let answer: Value = serde_json::from_str(&body)?;
        tracing::debug!(%answer, "raise answer");

        let url = answer.get("url").and_then(|u| u.as_str()).unwrap_or("");
        if !url.is_empty() {
            // A captcha-style interstitial; the server re-allows raises
            // on its usual two-hour cycle.
            return Ok(RaiseOutcome::Wait {
                retry_after: Some(7200),
                message: url.to_string(),
            });
        }

        let msg = answer.get("msg").and_then(|m| m.as_str());
        if truthy(answer.get("error")) {
            if let Some(msg) = msg.filter(|m| phrases::is_wait_error(m)) {
                return Ok(RaiseOutcome::Wait {
                    retry_after: phrases::parse_wait_time(msg),
                    message: msg.to_string(),
                });
            }
            return Ok(RaiseOutcome::Refused {
                message: msg.map(str::to_string),
            });
        }
        Ok(RaiseOutcome::Raised)
    }
}

fn chat_id_value(chat_id: &ChatId) -> Value {
    match chat_id {
        ChatId::Node(n) => json!(n),
        ChatId::Key(k) => json!(k),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0 || n.as_f64().unwrap_or(0.0) != 0.0,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Message object for a send that the server never echoed back
/// (`leave_as_unread`). It skips classification entirely.
fn placeholder_message(
    state: &SessionState,
    chat_id: ChatId,
    chat_name: Option<&str>,
    interlocutor_id: Option<UserId>,
    text: Option<&str>,
) -> Message {
    let body = text.unwrap_or_default();
    let html = format!(
        concat!(
            r#"<div class="chat-msg-item" id="message-0000000000">"#,
            r#"<div class="chat-message"><div class="chat-msg-body">"#,
            r#"<div class="chat-msg-text">{}</div>"#,
            r#"</div></div></div>"#,
        ),
        body
    );
    Message {
        id: MessageId(0),
        text: text.map(str::to_string),
        chat_id,
        chat_name: chat_name.map(str::to_string),
        interlocutor_id,
        author_id: state.user_id().unwrap_or(fp_core::domain::SYSTEM_AUTHOR),
        author: state.username().map(str::to_string),
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
        html,
    }
}
