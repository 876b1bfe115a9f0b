//! Wire format for chat frames.
//!
//! Clients send one JSON object per text frame:
//!
//! ```json
//! {"senderId": "u1", "receiverId": "u2", "timestamp": "2024-01-01T00:00:00Z", "message": "hi"}
//! ```
//!
//! `timestamp` is optional and advisory; the store assigns the real one.
//! Errors go back to the sender only, as `{"error": "..."}`.

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Default cap on a decoded message body, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// A chat message as it travels over the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub message: String,
}

/// Parse and shape-check one inbound text frame. `max_message_bytes` bounds
/// the decoded body, so JSON escapes do not count against it.
pub fn parse_frame(raw: &str, max_message_bytes: usize) -> Result<ChatMessage, RelayError> {
    let msg: ChatMessage =
        serde_json::from_str(raw).map_err(|e| RelayError::Malformed(e.to_string()))?;
    if msg.sender_id.trim().is_empty() {
        return Err(RelayError::Malformed("senderId is required".to_string()));
    }
    if msg.receiver_id.trim().is_empty() {
        return Err(RelayError::Malformed("receiverId is required".to_string()));
    }
    if msg.message.trim().is_empty() {
        return Err(RelayError::Malformed("message must not be empty".to_string()));
    }
    if msg.message.len() > max_message_bytes {
        return Err(RelayError::Malformed(format!(
            "message exceeds {max_message_bytes} bytes"
        )));
    }
    Ok(msg)
}

/// Build an error frame.
pub fn error_frame(reason: &str) -> String {
    serde_json::json!({ "error": reason }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<ChatMessage, RelayError> {
        parse_frame(raw, DEFAULT_MAX_MESSAGE_BYTES)
    }

    #[test]
    fn parses_minimal_frame() {
        let msg = parse(r#"{"senderId":"u1","receiverId":"u2","message":"hi"}"#).unwrap();
        assert_eq!(msg.sender_id, "u1");
        assert_eq!(msg.receiver_id, "u2");
        assert_eq!(msg.timestamp, None);
        assert_eq!(msg.message, "hi");
    }

    #[test]
    fn accepts_client_timestamp_and_unknown_fields() {
        let raw = r#"{"senderId":"u1","receiverId":"u2","timestamp":"1999-01-01T00:00:00Z","message":"hi","clientId":"abc"}"#;
        let msg = parse(raw).unwrap();
        assert_eq!(msg.timestamp.as_deref(), Some("1999-01-01T00:00:00Z"));
    }

    #[test]
    fn omits_absent_timestamp() {
        let msg = ChatMessage {
            sender_id: "u1".into(),
            receiver_id: "u2".into(),
            timestamp: None,
            message: "hi".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"senderId":"u1","receiverId":"u2","message":"hi"}"#);
    }

    #[test]
    fn rejects_non_json() {
        let err = parse("hello there").unwrap_err();
        assert!(matches!(err, RelayError::Malformed(_)));
    }

    #[test]
    fn rejects_missing_receiver() {
        let err = parse(r#"{"senderId":"u1","message":"hi"}"#).unwrap_err();
        assert!(err.to_string().contains("receiverId"), "{err}");
    }

    #[test]
    fn rejects_blank_fields() {
        assert!(parse(r#"{"senderId":" ","receiverId":"u2","message":"hi"}"#).is_err());
        assert!(parse(r#"{"senderId":"u1","receiverId":"","message":"hi"}"#).is_err());
        assert!(parse(r#"{"senderId":"u1","receiverId":"u2","message":"   "}"#).is_err());
    }

    fn frame_with_body(body: &str) -> String {
        serde_json::json!({"senderId": "u1", "receiverId": "u2", "message": body}).to_string()
    }

    #[test]
    fn accepts_long_message_under_cap() {
        let body = "x".repeat(9000);
        let msg = parse(&frame_with_body(&body)).unwrap();
        assert_eq!(msg.message.len(), 9000);
    }

    #[test]
    fn rejects_message_over_cap() {
        let body = "x".repeat(101);
        let err = parse_frame(&frame_with_body(&body), 100).unwrap_err();
        assert_eq!(err.to_string(), "invalid message: message exceeds 100 bytes");
        assert!(parse_frame(&frame_with_body(&body[..100]), 100).is_ok());
    }

    #[test]
    fn cap_applies_to_decoded_body() {
        // 50 quotes decode to 50 bytes but take 100 on the wire.
        let body = "\"".repeat(50);
        let raw = frame_with_body(&body);
        assert!(raw.len() > 100);
        assert_eq!(parse_frame(&raw, 50).unwrap().message, body);
    }

    #[test]
    fn error_frame_shape() {
        let v: serde_json::Value = serde_json::from_str(&error_frame("senderId mismatch")).unwrap();
        assert_eq!(v, serde_json::json!({"error": "senderId mismatch"}));
    }
}
