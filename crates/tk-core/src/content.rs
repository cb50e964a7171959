//! Flattening structured message content into an upstream text body.
//!
//! Upstreams that only accept plain text lose structured thinking parts, so
//! those are re-wrapped in `<thinking>` tags ahead of the regular text. The
//! extractor can then recover them from the model's echo.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::extractor::{THINKING_CLOSE_TAG, THINKING_OPEN_TAG};

const EMPTY_TOOL_RESULT: &str = "Tool executed successfully";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(#[serde(deserialize_with = "lenient_parts")] Vec<ContentPart>),
}

/// Parse each block on its own so one malformed block does not sink the message.
fn lenient_parts<'de, D>(deserializer: D) -> Result<Vec<ContentPart>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, block)| match serde_json::from_value(block) {
            Ok(part) => Some(part),
            Err(err) => {
                debug!(index, error = %err, "Skipping unparseable content block");
                None
            }
        })
        .collect())
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<Vec<ContentPart>> for Content {
    fn from(parts: Vec<ContentPart>) -> Self {
        Content::Parts(parts)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        /// Never forwarded upstream.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    /// Passed through untouched; decoding and validation happen elsewhere.
    Image {
        source: serde_json::Value,
    },
    ImageUrl {
        image_url: serde_json::Value,
    },
    /// Tool invocations have no text rendering upstream.
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        ContentPart::Thinking {
            thinking: thinking.into(),
            signature: None,
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: serde_json::Value) -> Self {
        ContentPart::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
            is_error: false,
        }
    }
}

/// The upstream text body plus any image sources that travel beside it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedContent {
    pub text: String,
    pub images: Vec<serde_json::Value>,
}

/// Render `content` as one text body: thinking parts first, then text and
/// tool results, separated by blank lines.
pub fn flatten_content(content: &Content) -> Result<FlattenedContent, Error> {
    let parts = match content {
        Content::Text(s) => {
            return Ok(FlattenedContent {
                text: s.clone(),
                images: Vec::new(),
            })
        }
        Content::Parts(parts) => parts,
    };

    let mut thinking_parts = Vec::new();
    let mut text_parts = Vec::new();
    let mut images = Vec::new();

    for part in parts {
        match part {
            ContentPart::Text { text } => text_parts.push(text.clone()),
            ContentPart::Thinking { thinking, .. } => {
                if !thinking.is_empty() {
                    thinking_parts.push(format!(
                        "{THINKING_OPEN_TAG}\n{thinking}\n{THINKING_CLOSE_TAG}"
                    ));
                }
            }
            ContentPart::ToolResult { content, .. } => {
                let mut rendered = render_tool_result(content)?;
                if rendered.is_empty() {
                    rendered = EMPTY_TOOL_RESULT.to_string();
                }
                text_parts.push(rendered);
            }
            ContentPart::Image { source } => images.push(source.clone()),
            ContentPart::ImageUrl { image_url } => images.push(image_url.clone()),
            ContentPart::ToolUse { name, .. } => {
                debug!(tool_name = %name, "Skipping tool_use block");
            }
            ContentPart::Unknown => debug!("Skipping content block of unknown type"),
        }
    }

    let text = thinking_parts
        .iter()
        .chain(text_parts.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n");

    if text.is_empty() && images.is_empty() {
        debug!(
            part_count = parts.len(),
            thinking_parts = thinking_parts.len(),
            text_parts = text_parts.len(),
            "Flattened message content is empty"
        );
    }

    Ok(FlattenedContent { text, images })
}

/// Tool results arrive as a string, a list of text blocks, or arbitrary JSON.
fn render_tool_result(content: &serde_json::Value) -> Result<String, Error> {
    match content {
        serde_json::Value::Null => Ok(String::new()),
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Array(items) => Ok(items
            .iter()
            .filter(|item| item.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n")),
        other => Ok(serde_json::to_string(other)?),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::batch::extract_all;

    #[test]
    fn test_plain_string_content() {
        let flat = flatten_content(&Content::text("hello")).unwrap();
        assert_eq!(flat.text, "hello");
        assert!(flat.images.is_empty());
    }

    #[test]
    fn test_thinking_parts_come_first() {
        let content = Content::from(vec![
            ContentPart::text("answer"),
            ContentPart::thinking("reasoning"),
        ]);
        let flat = flatten_content(&content).unwrap();
        assert_eq!(flat.text, "<thinking>\nreasoning\n</thinking>\n\nanswer");
    }

    #[test]
    fn test_empty_thinking_is_dropped() {
        let content = Content::from(vec![ContentPart::thinking(""), ContentPart::text("x")]);
        assert_eq!(flatten_content(&content).unwrap().text, "x");
    }

    #[test]
    fn test_tool_result_rendering() {
        let content = Content::from(vec![
            ContentPart::tool_result("t1", json!("plain output")),
            ContentPart::tool_result(
                "t2",
                json!([
                    {"type": "text", "text": "line one"},
                    {"type": "image", "source": {}},
                    {"type": "text", "text": "line two"}
                ]),
            ),
            ContentPart::tool_result("t3", json!({"ok": true})),
            ContentPart::tool_result("t4", serde_json::Value::Null),
        ]);
        let flat = flatten_content(&content).unwrap();
        assert_eq!(
            flat.text,
            "plain output\n\nline one\nline two\n\n{\"ok\":true}\n\nTool executed successfully"
        );
    }

    #[test]
    fn test_images_pass_through() {
        let content: Content = serde_json::from_value(json!([
            {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}},
            {"type": "text", "text": "describe this"}
        ]))
        .unwrap();
        let flat = flatten_content(&content).unwrap();
        assert_eq!(flat.text, "describe this");
        assert_eq!(flat.images.len(), 1);
        assert_eq!(flat.images[0]["media_type"], "image/png");
    }

    #[test]
    fn test_signature_is_not_forwarded() {
        let content: Content = serde_json::from_value(json!([
            {"type": "thinking", "thinking": "hmm", "signature": "c2ln"}
        ]))
        .unwrap();
        let flat = flatten_content(&content).unwrap();
        assert!(!flat.text.contains("c2ln"));
    }

    #[test]
    fn test_flattened_thinking_round_trips_through_batch() {
        let content = Content::from(vec![
            ContentPart::thinking("first thought"),
            ContentPart::thinking("second thought"),
            ContentPart::text("final answer"),
        ]);
        let flat = flatten_content(&content).unwrap();
        let extracted = extract_all(&flat.text);
        assert_eq!(extracted.blocks, vec!["first thought", "second thought"]);
        assert_eq!(extracted.clean_text, "final answer");
    }

    #[test]
    fn test_unrecognized_blocks_are_skipped() {
        let content: Content = serde_json::from_value(json!([
            {"type": "text", "text": "hi"},
            {"type": "tool_use", "id": "t1", "name": "bash", "input": {}},
            {"type": "citation", "cited_text": "elsewhere"},
            {"type": "text", "text": "there"}
        ]))
        .unwrap();
        let flat = flatten_content(&content).unwrap();
        assert_eq!(flat.text, "hi\n\nthere");
        assert!(flat.images.is_empty());
    }

    #[test]
    fn test_malformed_block_does_not_drop_message() {
        let content: Content = serde_json::from_value(json!([
            {"type": "text"},
            {"text": "no type field"},
            {"type": "tool_result", "content": "ran without an id"},
            {"type": "text", "text": "kept"}
        ]))
        .unwrap();
        let flat = flatten_content(&content).unwrap();
        assert_eq!(flat.text, "ran without an id\n\nkept");
    }

    #[test]
    fn test_image_url_passes_through() {
        let content: Content = serde_json::from_value(json!([
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
        ]))
        .unwrap();
        let flat = flatten_content(&content).unwrap();
        assert_eq!(flat.images.len(), 1);
        assert_eq!(flat.images[0]["url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_empty_parts() {
        let flat = flatten_content(&Content::Parts(Vec::new())).unwrap();
        assert_eq!(flat, FlattenedContent::default());
    }
}
