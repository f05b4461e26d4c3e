//! Batch assembly of chat histories.
//!
//! Two passes over each batch: classify every surviving record while
//! one shared [`IdentityCache`] fills up, then re-apply the fully
//! resolved identities so a name or badge supplied by a late record
//! also lands on the messages classified before it.

use std::collections::HashMap;

use crate::domain::{ChatId, UserId};
use crate::errors::{Error, Result};
use crate::markup;
use crate::phrases;
use crate::session::SessionState;

use super::classifier::{apply_identity, classify, ClassifyContext, IdentityCache};
use super::types::{BuyerViewing, ChatHistoryData, ChatHistoryPayload, Message, RawMessage};

/// Inputs shared by every record of one batch.
#[derive(Clone, Debug)]
pub struct HistoryBatch<'a> {
    pub chat_id: ChatId,
    pub local_user: UserId,
    pub local_username: Option<&'a str>,
    pub interlocutor_id: Option<UserId>,
    pub interlocutor_name: Option<&'a str>,
    /// Records with an id below this floor are dropped before
    /// classification. The synthetic id-0 placeholder never appears in
    /// server payloads, so the floor applies uniformly here.
    pub from_id: i64,
}

/// Classifies a batch of raw records into attributed messages.
pub fn assemble(records: &[RawMessage], batch: &HistoryBatch<'_>) -> Vec<Message> {
    let mut cache = IdentityCache::new();
    cache.seed_name(crate::domain::SYSTEM_AUTHOR, phrases::PLATFORM_NAME);
    if let Some(name) = batch.local_username {
        cache.seed_name(batch.local_user, name);
    }
    if let (Some(id), Some(name)) = (batch.interlocutor_id, batch.interlocutor_name) {
        cache.seed_name(id, name);
    }

    let ctx = ClassifyContext::new(batch.local_user, &batch.chat_id, batch.interlocutor_id);

    let mut messages: Vec<Message> = records
        .iter()
        .filter(|r| r.id >= batch.from_id)
        .map(|r| classify(r, &ctx, &mut cache))
        .collect();

    let chat_name = batch
        .interlocutor_id
        .and_then(|id| cache.name(id))
        .map(str::to_string)
        .or_else(|| batch.interlocutor_name.map(str::to_string));

    for msg in &mut messages {
        apply_identity(msg, &cache);
        msg.chat_name = chat_name.clone();
    }
    messages
}

/// The other participant encoded in a `users-<a>-<b>` node name.
fn interlocutor_from_node_name(name: &str, local: UserId) -> Result<UserId> {
    let ids: Vec<i64> = name
        .split('-')
        .skip(1)
        .map(|s| s.parse::<i64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::Payload(format!("unparseable chat node name: {name}")))?;
    if !ids.contains(&local.0) {
        return Err(Error::Payload(format!(
            "chat node {name} does not include the local account"
        )));
    }
    ids.into_iter()
        .find(|&id| id != local.0)
        .map(UserId)
        .ok_or_else(|| Error::Payload(format!("chat node {name} has no counterpart")))
}

/// Parses a single-chat history payload.
///
/// An absent chat object or an empty message array yields `Ok(vec![])`.
pub fn parse_chat_history(
    payload: &ChatHistoryPayload,
    state: &SessionState,
    chat_id: ChatId,
    interlocutor_name: Option<&str>,
    from_id: i64,
) -> Result<Vec<Message>> {
    let local_user = state.local_user()?;
    let Some(chat) = payload.chat.as_ref() else {
        return Ok(Vec::new());
    };
    if chat.messages.is_empty() {
        return Ok(Vec::new());
    }

    let interlocutor_id = if chat.node.silent {
        None
    } else {
        Some(interlocutor_from_node_name(&chat.node.name, local_user)?)
    };

    let batch = HistoryBatch {
        chat_id,
        local_user,
        local_username: state.username(),
        interlocutor_id,
        interlocutor_name,
        from_id,
    };
    Ok(assemble(&chat.messages, &batch))
}

/// Result of demultiplexing one bulk-histories envelope.
#[derive(Clone, Debug, Default)]
pub struct ChatsHistories {
    /// One entry per requested chat id. A chat without messages maps to
    /// an empty list, never to an absent key.
    pub chats: HashMap<ChatId, Vec<Message>>,
    pub viewing: Vec<BuyerViewing>,
}

/// Demultiplexes a bulk envelope back into per-chat histories.
///
/// `requested` pairs each chat id with the interlocutor name known to
/// the caller (`None` when unknown).
pub fn parse_chats_histories(
    envelope: &serde_json::Value,
    state: &SessionState,
    requested: &[(ChatId, Option<String>)],
) -> Result<ChatsHistories> {
    let local_user = state.local_user()?;
    let mut out = ChatsHistories::default();
    for (chat_id, _) in requested {
        out.chats.insert(chat_id.clone(), Vec::new());
    }

    let objects = envelope
        .get("objects")
        .and_then(|o| o.as_array())
        .ok_or_else(|| Error::Payload("bulk envelope has no objects array".into()))?;

    for obj in objects {
        match obj.get("type").and_then(|t| t.as_str()) {
            Some("c-p-u") => {
                if let Some(viewing) = parse_buyer_viewing(obj) {
                    out.viewing.push(viewing);
                }
            }
            Some("chat_node") => {
                let Some(chat_id) = obj.get("id").and_then(ChatId::from_json) else {
                    continue;
                };
                let data = obj.get("data").cloned().unwrap_or(serde_json::Value::Null);
                if data.is_null() || data.as_bool() == Some(false) {
                    out.chats.entry(chat_id).or_default();
                    continue;
                }
                let chat: ChatHistoryData = serde_json::from_value(data)?;
                let interlocutor_id = if chat.node.silent {
                    None
                } else {
                    Some(interlocutor_from_node_name(&chat.node.name, local_user)?)
                };
                let interlocutor_name = requested
                    .iter()
                    .find(|(id, _)| *id == chat_id)
                    .and_then(|(_, name)| name.as_deref());

                let batch = HistoryBatch {
                    chat_id: chat_id.clone(),
                    local_user,
                    local_username: state.username(),
                    interlocutor_id,
                    interlocutor_name,
                    from_id: 0,
                };
                out.chats.insert(chat_id, assemble(&chat.messages, &batch));
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Viewer-presence record: which offer a buyer currently has open.
fn parse_buyer_viewing(obj: &serde_json::Value) -> Option<BuyerViewing> {
    let buyer_id = UserId(obj.get("id")?.as_i64()?);
    let tag = obj
        .get("tag")
        .and_then(|t| t.as_str())
        .map(str::to_string);

    let data = obj.get("data")?;
    if !data.is_object() {
        return Some(BuyerViewing {
            buyer_id,
            offer_link: None,
            offer_title: None,
            tag: None,
            html: None,
        });
    }

    let html = data
        .get("html")
        .and_then(|h| h.get("desktop"))
        .and_then(|d| d.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let (offer_link, offer_title) = match html.as_deref() {
        Some(fragment) => match markup::find_block(fragment, "a", |_| true) {
            Some(a) => (
                a.tag.attr("href").map(str::to_string),
                Some(markup::text(a.inner)),
            ),
            None => (None, None),
        },
        None => (None, None),
    };

    Some(BuyerViewing {
        buyer_id,
        offer_link,
        offer_title,
        tag,
        html,
    })
}
