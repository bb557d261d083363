//! Helpers over the block editor's serialized content.
//!
//! Content is a JSON array of blocks. By convention the first block is a
//! paragraph holding the page icon and the second a heading holding the page
//! title; both are kept free of formatting.

use crate::errors::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use uuid::Uuid;

pub const DEFAULT_ICON: &str = "📄";
pub const DEFAULT_HEADER: &str = "New page";

static EMOJI: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Emoji}").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeading {
    pub icon: String,
    pub header: String,
}

impl Default for PageHeading {
    fn default() -> Self {
        Self {
            icon: DEFAULT_ICON.to_string(),
            header: DEFAULT_HEADER.to_string(),
        }
    }
}

/// Blank icon paragraph followed by an empty level-1 heading.
pub fn initial_content() -> String {
    Value::Array(vec![paragraph_block(""), heading_block("")]).to_string()
}

pub fn extract_icon_and_header(content: &str) -> PageHeading {
    let Some(blocks) = parse_blocks(content) else {
        return PageHeading::default();
    };
    if blocks.is_empty() {
        return PageHeading::default();
    }

    let mut heading = PageHeading::default();

    if block_type(&blocks[0]) == Some("paragraph") {
        if let Some(text) = first_text(&blocks[0]) {
            let text = text.trim();
            if text.encode_utf16().count() <= 4 && EMOJI.is_match(text) {
                heading.icon = text.to_string();
            }
        }
    }

    let header_block = match blocks.get(1) {
        Some(block) if block_type(block) == Some("heading") => Some(block),
        _ if block_type(&blocks[0]) == Some("heading") => Some(&blocks[0]),
        _ => None,
    };
    if let Some(text) = header_block.and_then(first_text) {
        let text = text.trim();
        if !text.is_empty() {
            heading.header = text.to_string();
        }
    }

    heading
}

/// Strips formatting from the icon and heading blocks. Malformed input is returned as is.
pub fn normalize_leading_blocks(content: &str) -> String {
    let Some(mut blocks) = parse_blocks(content) else {
        return content.to_string();
    };
    if blocks.is_empty() {
        return content.to_string();
    }

    if block_type(&blocks[0]) == Some("paragraph") && has_content(&blocks[0]) {
        strip_formatting(&mut blocks[0], false);
    }
    if blocks.get(1).and_then(block_type) == Some("heading") && has_content(&blocks[1]) {
        strip_formatting(&mut blocks[1], true);
    } else if block_type(&blocks[0]) == Some("heading") && has_content(&blocks[0]) {
        strip_formatting(&mut blocks[0], true);
    }

    Value::Array(blocks).to_string()
}

/// Writes `icon` into the leading paragraph, inserting one when the first block is something else.
pub fn with_icon(content: &str, icon: &str, fallback_title: &str) -> AppResult<String> {
    let mut blocks = if content.is_empty() {
        Vec::new()
    } else {
        parse_blocks(content).ok_or_else(|| AppError::Validation("content is not a block array".to_string()))?
    };
    if blocks.is_empty() {
        let title = if fallback_title.is_empty() {
            DEFAULT_HEADER
        } else {
            fallback_title
        };
        return Ok(Value::Array(vec![paragraph_block(icon), heading_block(title)]).to_string());
    }

    if block_type(&blocks[0]) == Some("paragraph") {
        if let Some(block) = blocks[0].as_object_mut() {
            block.insert("content".to_string(), text_content(icon));
        }
    } else {
        blocks.insert(0, paragraph_block(icon));
    }

    Ok(Value::Array(blocks).to_string())
}

fn parse_blocks(content: &str) -> Option<Vec<Value>> {
    if content.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(blocks)) => Some(blocks),
        _ => None,
    }
}

fn block_type(block: &Value) -> Option<&str> {
    block.get("type").and_then(Value::as_str)
}

fn has_content(block: &Value) -> bool {
    block.get("content").map(|value| !value.is_null()).unwrap_or(false)
}

fn first_text(block: &Value) -> Option<&str> {
    block
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .filter(|text| !text.is_empty())
}

fn joined_text(block: &Value) -> String {
    block
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn strip_formatting(block: &mut Value, is_heading: bool) {
    let text = joined_text(block);
    let Some(object) = block.as_object_mut() else {
        return;
    };

    let mut props = object
        .get("props")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);
    if is_heading {
        let level = props
            .get("level")
            .filter(|level| level.as_u64().map(|value| value > 0).unwrap_or(false))
            .cloned()
            .unwrap_or(json!(1));
        props.insert("level".to_string(), level);
    }
    props.insert("textColor".to_string(), json!("default"));
    props.insert("backgroundColor".to_string(), json!("default"));
    props.insert("textAlignment".to_string(), json!("left"));
    object.insert("props".to_string(), Value::Object(props));

    let content = if text.is_empty() {
        json!([])
    } else {
        text_content(&text)
    };
    object.insert("content".to_string(), content);
}

fn text_content(text: &str) -> Value {
    json!([{ "type": "text", "text": text, "styles": {} }])
}

fn paragraph_block(text: &str) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "type": "paragraph",
        "props": {
            "textColor": "default",
            "backgroundColor": "default",
            "textAlignment": "left"
        },
        "content": text_content(text),
        "children": []
    })
}

fn heading_block(text: &str) -> Value {
    json!({
        "id": Uuid::new_v4().to_string(),
        "type": "heading",
        "props": {
            "level": 1,
            "textColor": "default",
            "backgroundColor": "default",
            "textAlignment": "left"
        },
        "content": text_content(text),
        "children": []
    })
}

#[cfg(test)]
mod tests {
    use super::{
        extract_icon_and_header, initial_content, normalize_leading_blocks, with_icon, PageHeading, DEFAULT_HEADER,
        DEFAULT_ICON,
    };
    use serde_json::{json, Value};

    fn page(icon: &str, header: &str) -> String {
        json!([
            { "type": "paragraph", "props": {}, "content": [{ "type": "text", "text": icon, "styles": {} }] },
            { "type": "heading", "props": { "level": 2 }, "content": [{ "type": "text", "text": header, "styles": {} }] },
            { "type": "paragraph", "props": {}, "content": [{ "type": "text", "text": "body", "styles": {} }] }
        ])
        .to_string()
    }

    #[test]
    fn initial_content_has_defaults() {
        assert_eq!(extract_icon_and_header(&initial_content()), PageHeading::default());
    }

    #[test]
    fn extracts_emoji_icon_and_heading() {
        let heading = extract_icon_and_header(&page("🚀", "  Launch plan  "));
        assert_eq!(heading.icon, "🚀");
        assert_eq!(heading.header, "Launch plan");
    }

    #[test]
    fn plain_text_is_not_an_icon() {
        let heading = extract_icon_and_header(&page("hello", "Title"));
        assert_eq!(heading.icon, DEFAULT_ICON);
    }

    #[test]
    fn heading_as_first_block_is_the_header() {
        let content = json!([
            { "type": "heading", "content": [{ "type": "text", "text": "Only heading" }] }
        ])
        .to_string();
        let heading = extract_icon_and_header(&content);
        assert_eq!(heading.header, "Only heading");
        assert_eq!(heading.icon, DEFAULT_ICON);
    }

    #[test]
    fn malformed_content_yields_defaults() {
        assert_eq!(extract_icon_and_header("{not json"), PageHeading::default());
        assert_eq!(extract_icon_and_header(""), PageHeading::default());
        assert_eq!(extract_icon_and_header("{}").header, DEFAULT_HEADER);
    }

    #[test]
    fn normalization_strips_styles_but_keeps_text() {
        let content = json!([
            {
                "type": "paragraph",
                "props": { "textColor": "red" },
                "content": [{ "type": "text", "text": "🔥", "styles": { "bold": true } }]
            },
            {
                "type": "heading",
                "props": { "level": 3, "textAlignment": "center" },
                "content": [
                    { "type": "text", "text": "Big ", "styles": { "italic": true } },
                    { "type": "text", "text": "idea", "styles": {} }
                ]
            }
        ])
        .to_string();

        let normalized: Value = serde_json::from_str(&normalize_leading_blocks(&content)).expect("json");
        assert_eq!(normalized[0]["props"]["textColor"], "default");
        assert_eq!(normalized[0]["content"][0]["styles"], json!({}));
        assert_eq!(normalized[1]["props"]["level"], 3);
        assert_eq!(normalized[1]["props"]["textAlignment"], "left");
        assert_eq!(normalized[1]["content"][0]["text"], "Big idea");
    }

    #[test]
    fn normalization_leaves_malformed_input_alone() {
        assert_eq!(normalize_leading_blocks("oops"), "oops");
    }

    #[test]
    fn icon_replaces_leading_paragraph() {
        let updated = with_icon(&page("🚀", "Plan"), "🌱", "Plan").expect("icon");
        assert_eq!(extract_icon_and_header(&updated).icon, "🌱");
    }

    #[test]
    fn icon_is_inserted_before_a_leading_heading() {
        let content = json!([{ "type": "heading", "content": [{ "type": "text", "text": "Title" }] }]).to_string();
        let updated: Value = serde_json::from_str(&with_icon(&content, "🌱", "Title").expect("icon")).expect("json");
        assert_eq!(updated[0]["type"], "paragraph");
        assert_eq!(updated[1]["type"], "heading");
    }

    #[test]
    fn icon_on_empty_content_builds_a_page() {
        let updated = with_icon("", "🌱", "").expect("icon");
        let heading = extract_icon_and_header(&updated);
        assert_eq!(heading.icon, "🌱");
        assert_eq!(heading.header, DEFAULT_HEADER);
    }

    #[test]
    fn icon_on_malformed_content_is_rejected() {
        assert!(with_icon("nope", "🌱", "Title").is_err());
    }
}
