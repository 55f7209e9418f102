//! Tool descriptors and result envelopes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_common::{Result, SwitchboardError};

/// A tool advertised by a server's `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

/// One item of a `tools/call` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    #[serde(other)]
    Unsupported,
}

/// Raw result of `tools/call`.
///
/// Servers put their real payload as JSON text inside the content parts, so
/// the useful value usually needs a second decode via [`decode_payload`].
///
/// [`decode_payload`]: ToolEnvelope::decode_payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub content: Vec<ContentPart>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolEnvelope {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentPart::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Concatenated text of every text part.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Decode the text payload as JSON, falling back to a JSON string.
    pub fn decode_payload(&self) -> Value {
        let text = self.joined_text();
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    }

    pub fn decode_as<T: DeserializeOwned>(&self) -> Result<T> {
        let text = self.joined_text();
        serde_json::from_str(&text).map_err(|e| {
            SwitchboardError::Protocol(format!("Failed to parse result: {e} (text: {text})"))
        })
    }
}

/// Decides whether a successful `tools/call` actually carries a failure.
pub trait EnvelopeClassifier: Send + Sync {
    /// The failure message, or `None` when the envelope is a real success.
    fn application_error(&self, envelope: &ToolEnvelope) -> Option<String>;
}

/// Flags `isError: true`, payloads shaped like `{"success": false, ...}`,
/// and text starting with one of the configured markers.
#[derive(Debug, Clone)]
pub struct DefaultClassifier {
    markers: Vec<String>,
}

impl DefaultClassifier {
    pub fn new(markers: Vec<String>) -> Self {
        Self {
            markers: markers.into_iter().map(|m| m.to_lowercase()).collect(),
        }
    }
}

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self::new(vec!["error:".to_string()])
    }
}

impl EnvelopeClassifier for DefaultClassifier {
    fn application_error(&self, envelope: &ToolEnvelope) -> Option<String> {
        let text = envelope.joined_text();
        if envelope.is_error {
            return Some(if text.is_empty() {
                "tool reported an error".to_string()
            } else {
                text
            });
        }

        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text)
            && map.get("success") == Some(&Value::Bool(false))
        {
            let message = map
                .get("error")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or(text);
            return Some(message);
        }

        let lower = text.trim_start().to_lowercase();
        if self.markers.iter().any(|m| lower.starts_with(m.as_str())) {
            return Some(text);
        }

        None
    }
}
