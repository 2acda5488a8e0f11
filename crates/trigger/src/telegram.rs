//! Telegram update normalization.

use serde_json::Value;

const UPDATE_KINDS: [&str; 5] = [
    "message",
    "edited_message",
    "channel_post",
    "callback_query",
    "inline_query",
];

/// Normalize a raw Telegram update into the canonical map fed to runs:
/// `update_id`, `update_type`, a flattened `{text, chat_id, user_id,
/// username, first_name}` convenience slice, and the raw update under
/// `update`.
#[must_use]
pub fn normalize_update(update: &Value) -> serde_json::Map<String, Value> {
    let mut normalized = serde_json::Map::new();

    if let Some(id) = update.get("update_id") {
        normalized.insert("update_id".into(), id.clone());
    }

    let update_type = UPDATE_KINDS
        .iter()
        .find(|kind| update.get(**kind).is_some())
        .copied()
        .unwrap_or("unknown");
    normalized.insert("update_type".into(), Value::String(update_type.into()));

    let inner = update.get(update_type).unwrap_or(&Value::Null);

    // `callback_query` nests the chat under its message; everything else
    // carries `chat` directly.
    let chat = inner
        .get("chat")
        .or_else(|| inner.get("message").and_then(|m| m.get("chat")));
    let from = inner.get("from");

    if let Some(text) = inner.get("text").or_else(|| inner.get("data")) {
        normalized.insert("text".into(), text.clone());
    }
    if let Some(chat_id) = chat.and_then(|c| c.get("id")) {
        normalized.insert("chat_id".into(), chat_id.clone());
    }
    if let Some(user_id) = from.and_then(|f| f.get("id")) {
        normalized.insert("user_id".into(), user_id.clone());
    }
    if let Some(username) = from.and_then(|f| f.get("username")) {
        normalized.insert("username".into(), username.clone());
    }
    if let Some(first_name) = from.and_then(|f| f.get("first_name")) {
        normalized.insert("first_name".into(), first_name.clone());
    }

    normalized.insert("update".into(), update.clone());
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn message_update() {
        let update = json!({
            "update_id": 1001,
            "message": {
                "text": "hello",
                "chat": {"id": 42},
                "from": {"id": 7, "username": "alice", "first_name": "Alice"},
            }
        });
        let normalized = normalize_update(&update);

        assert_eq!(normalized["update_id"], json!(1001));
        assert_eq!(normalized["update_type"], json!("message"));
        assert_eq!(normalized["text"], json!("hello"));
        assert_eq!(normalized["chat_id"], json!(42));
        assert_eq!(normalized["user_id"], json!(7));
        assert_eq!(normalized["username"], json!("alice"));
        assert_eq!(normalized["first_name"], json!("Alice"));
        assert_eq!(normalized["update"], update);
    }

    #[test]
    fn callback_query_update() {
        let update = json!({
            "update_id": 1002,
            "callback_query": {
                "data": "approve",
                "from": {"id": 9, "username": "bob"},
                "message": {"chat": {"id": 55}},
            }
        });
        let normalized = normalize_update(&update);

        assert_eq!(normalized["update_type"], json!("callback_query"));
        assert_eq!(normalized["text"], json!("approve"));
        assert_eq!(normalized["chat_id"], json!(55));
        assert_eq!(normalized["user_id"], json!(9));
    }

    #[test]
    fn unknown_update_kind() {
        let update = json!({"update_id": 5, "poll": {"id": "x"}});
        let normalized = normalize_update(&update);
        assert_eq!(normalized["update_type"], json!("unknown"));
        assert!(normalized.get("text").is_none());
    }
}
