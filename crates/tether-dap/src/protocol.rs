use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope of every message exchanged with the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProtocolMessage {
    Request(Request),
    Response(Response),
    Event(Event),
}

impl ProtocolMessage {
    pub fn seq(&self) -> i64 {
        match self {
            ProtocolMessage::Request(r) => r.seq,
            ProtocolMessage::Response(r) => r.seq,
            ProtocolMessage::Event(e) => e.seq,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: i64,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: i64,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: i64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Value of the `type` discriminator on an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind<'a> {
    Request,
    Response,
    Event,
    Unknown(&'a str),
}

impl<'a> MessageKind<'a> {
    pub fn of(message: &'a Value) -> Self {
        match message.get("type").and_then(Value::as_str).unwrap_or_default() {
            "request" => MessageKind::Request,
            "response" => MessageKind::Response,
            "event" => MessageKind::Event,
            other => MessageKind::Unknown(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_response_serializes_with_type_tag() {
        let message = ProtocolMessage::Response(Response {
            seq: 2,
            request_seq: 1,
            success: false,
            command: "next".to_string(),
            message: Some("cancelled".to_string()),
            body: None,
        });

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "response",
                "seq": 2,
                "request_seq": 1,
                "success": false,
                "command": "next",
                "message": "cancelled"
            })
        );
        assert_eq!(message.seq(), 2);
    }

    #[test]
    fn test_request_without_arguments() {
        let request: Request = serde_json::from_value(json!({"seq": 4, "type": "request", "command": "threads"})).unwrap();

        assert_eq!(request.seq, 4);
        assert_eq!(request.command, "threads");
        assert_eq!(request.arguments, None);
    }

    #[rstest]
    #[case(json!({"type": "request"}), MessageKind::Request)]
    #[case(json!({"type": "response"}), MessageKind::Response)]
    #[case(json!({"type": "event"}), MessageKind::Event)]
    #[case(json!({"type": "notification"}), MessageKind::Unknown("notification"))]
    #[case(json!({"type": 1}), MessageKind::Unknown(""))]
    #[case(json!({}), MessageKind::Unknown(""))]
    fn test_message_kind(#[case] message: Value, #[case] expected: MessageKind<'static>) {
        assert_eq!(MessageKind::of(&message), expected);
    }
}
