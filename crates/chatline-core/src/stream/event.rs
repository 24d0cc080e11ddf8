use serde::Deserialize;

/// One decoded unit of a generation stream. The end of the stream is the
/// transport closing; there is no frame for it.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Text to append to the reply.
    Content { text: String },
    /// Out-of-band information, chiefly the id of a conversation the server
    /// created for this request.
    Metadata { conversation_id: Option<String> },
    /// Server-side failure report. The stream may continue afterwards.
    Error { detail: String },
}

/// JSON payload of a `data:` line.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireFrame {
    Content {
        #[serde(default)]
        content: String,
    },
    Metadata {
        #[serde(default)]
        conversation_id: Option<serde_json::Value>,
    },
    Error {
        #[serde(default)]
        detail: serde_json::Value,
    },
}

impl From<WireFrame> for StreamEvent {
    fn from(frame: WireFrame) -> Self {
        match frame {
            WireFrame::Content { content } => StreamEvent::Content { text: content },
            WireFrame::Metadata { conversation_id } => StreamEvent::Metadata {
                conversation_id: conversation_id.and_then(|id| match id {
                    serde_json::Value::String(s) if !s.is_empty() => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
            },
            WireFrame::Error { detail } => StreamEvent::Error {
                detail: match detail {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => "unknown error".to_string(),
                    other => other.to_string(),
                },
            },
        }
    }
}
