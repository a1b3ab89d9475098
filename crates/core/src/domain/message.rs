use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::author::AuthorId;
use crate::domain::thread::{Platform, ThreadId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(format!("M-{}", uuid::Uuid::new_v4().simple()))
    }
}

/// A single reply inside a thread. `external_message_id` is write-once: it is
/// set exactly when the outbound relay has posted the message (or when the
/// message itself arrived from a platform), and it is the relay's dedup key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: ThreadId,
    pub author_id: Option<AuthorId>,
    pub content: RichText,
    pub origin: Option<Platform>,
    pub external_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The persisted rich-text document. The original stored an opaque editor
/// blob; here the node tree is explicit so rendering to platform markup is a
/// total function instead of a parse-and-hope walk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    pub blocks: Vec<RichTextBlock>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichTextBlock {
    Paragraph { spans: Vec<RichTextSpan> },
    CodeBlock { text: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RichTextSpan {
    pub text: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !value
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            blocks: vec![RichTextBlock::Paragraph {
                spans: vec![RichTextSpan::plain(text)],
            }],
        }
    }

    /// Concatenated text content with all formatting stripped.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if !out.is_empty() {
                out.push('\n');
            }
            match block {
                RichTextBlock::Paragraph { spans } => {
                    for span in spans {
                        out.push_str(&span.text);
                    }
                }
                RichTextBlock::CodeBlock { text } => out.push_str(text),
            }
        }
        out
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"blocks\":[]}".to_string())
    }
}

impl RichTextSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), bold: false, italic: false, code: false, link: None }
    }
}
