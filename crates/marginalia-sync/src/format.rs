//! Block formatting
//!
//! The engine treats block content as opaque; this module is the one place
//! that knows what a heading or a quote looks like on the destination.

use crate::config::{ContentStyle, FormatConfig};
use crate::model::{AnnotationKind, BlockPayload};
use chrono::DateTime;
use serde_json::{json, Value};

/// Produces destination payloads for the block shapes the compiler emits.
pub trait BlockFormatter {
    fn heading(&self, level: u8, title: &str) -> BlockPayload;

    /// A highlight or review, rendered in the configured content style.
    fn content(
        &self,
        text: &str,
        style: Option<i32>,
        color: Option<i32>,
        kind: AnnotationKind,
    ) -> BlockPayload;

    fn quote(&self, text: &str) -> BlockPayload;

    fn divider(&self) -> BlockPayload;

    fn table_of_contents(&self) -> BlockPayload;

    /// A table whose first row is `header`; further rows are appended as
    /// children.
    fn table(&self, header: &[String]) -> BlockPayload;

    fn table_row(&self, cells: &[String]) -> BlockPayload;
}

/// Notion-shaped block payloads.
#[derive(Debug, Clone, Default)]
pub struct NotionBlocks {
    content_style: ContentStyle,
    emoji_enabled: bool,
}

impl NotionBlocks {
    pub fn new(format: &FormatConfig) -> Self {
        Self {
            content_style: format.content_style,
            emoji_enabled: format.emoji_enabled,
        }
    }

    fn emoji(&self, style: Option<i32>, kind: AnnotationKind) -> &'static str {
        if self.emoji_enabled {
            emoji_for(style, kind)
        } else {
            ""
        }
    }
}

impl BlockFormatter for NotionBlocks {
    fn heading(&self, level: u8, title: &str) -> BlockPayload {
        let tag = format!("heading_{}", level.clamp(1, 3));
        let mut body = serde_json::Map::new();
        body.insert(
            tag.clone(),
            json!({
                "rich_text": rich_text(title),
                "color": "default",
                "is_toggleable": false,
            }),
        );
        body.insert("type".to_string(), Value::String(tag));
        BlockPayload(Value::Object(body))
    }

    fn content(
        &self,
        text: &str,
        style: Option<i32>,
        color: Option<i32>,
        kind: AnnotationKind,
    ) -> BlockPayload {
        let emoji = self.emoji(style, kind);
        let color = color_name(color);
        let payload = match self.content_style {
            ContentStyle::Callout => {
                let mut callout = json!({
                    "rich_text": rich_text(text),
                    "color": color,
                });
                // An empty emoji icon is rejected by the destination
                if !emoji.is_empty() {
                    callout["icon"] = json!({ "emoji": emoji });
                }
                json!({ "type": "callout", "callout": callout })
            }
            ContentStyle::Bulleted => json!({
                "type": "bulleted_list_item",
                "bulleted_list_item": {
                    "rich_text": rich_text(&format!("{emoji}{text}")),
                    "color": color,
                },
            }),
            ContentStyle::Plain => json!({
                "type": "paragraph",
                "paragraph": {
                    "rich_text": rich_text(&format!("{emoji}{text}")),
                    "color": color,
                },
            }),
        };
        BlockPayload(payload)
    }

    fn quote(&self, text: &str) -> BlockPayload {
        BlockPayload(json!({
            "type": "quote",
            "quote": { "rich_text": rich_text(text), "color": "default" },
        }))
    }

    fn divider(&self) -> BlockPayload {
        BlockPayload(json!({ "type": "divider", "divider": {} }))
    }

    fn table_of_contents(&self) -> BlockPayload {
        BlockPayload(json!({
            "type": "table_of_contents",
            "table_of_contents": { "color": "default" },
        }))
    }

    fn table(&self, header: &[String]) -> BlockPayload {
        BlockPayload(json!({
            "type": "table",
            "table": {
                "table_width": header.len(),
                "has_column_header": true,
                "has_row_header": false,
                "children": [self.table_row(header).0],
            },
        }))
    }

    fn table_row(&self, cells: &[String]) -> BlockPayload {
        let cells: Vec<Value> = cells.iter().map(|c| rich_text(c)).collect();
        BlockPayload(json!({
            "type": "table_row",
            "table_row": { "cells": cells },
        }))
    }
}

fn rich_text(content: &str) -> Value {
    json!([{ "type": "text", "text": { "content": content } }])
}

/// Emoji by highlight style: 0 straight line, 1 background, else wavy.
pub fn emoji_for(style: Option<i32>, kind: AnnotationKind) -> &'static str {
    match (kind, style) {
        (AnnotationKind::Review, _) => "✍️",
        (_, Some(0)) => "💡",
        (_, Some(1)) => "⭐",
        _ => "🌟",
    }
}

pub fn color_name(color: Option<i32>) -> &'static str {
    match color {
        Some(1) => "red",
        Some(2) => "purple",
        Some(3) => "blue",
        Some(4) => "green",
        Some(5) => "yellow",
        _ => "default",
    }
}

/// Human readable duration, e.g. `1 hr 5 min` or `12 min`.
pub fn reading_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = seconds % 3600 / 60;
    if hours > 0 {
        format!("{hours} hr {minutes} min")
    } else {
        format!("{minutes} min")
    }
}

/// `YYYY/MM/DD` for a unix timestamp (UTC); empty when out of range.
pub fn day(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|d| d.format("%Y/%m/%d").to_string())
        .unwrap_or_default()
}
