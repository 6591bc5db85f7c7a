//! Hook event rendering for terminal output.
//!
//! Renderers return strings; writing them is the sink's job.

use std::fmt::Write as _;

use clap::ValueEnum;
use crossterm::style::{Color, Stylize};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use hookr_core::HookEvent;

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON document per event.
    Json,
    /// Human-readable block per event.
    #[default]
    Pretty,
}

/// Render an event in the requested format.
pub fn render(event: &HookEvent, format: OutputFormat, timestamp: &str, color: bool) -> String {
    match format {
        OutputFormat::Json => render_json(event, timestamp),
        OutputFormat::Pretty => render_pretty(event, timestamp, color),
    }
}

/// `{"event": {...}, "timestamp": ...}` on a single line, with textual JSON
/// payloads expanded into structured values.
pub fn render_json(event: &HookEvent, timestamp: &str) -> String {
    json!({
        "timestamp": timestamp,
        "event": event_document(event),
    })
    .to_string()
}

/// The event as a JSON document with its payload expanded.
pub fn event_document(event: &HookEvent) -> Value {
    let mut doc = json!({
        "eventId": event.event_id,
        "hookId": event.hook_id,
    });
    if let Some(received_at) = &event.received_at {
        doc["receivedAt"] = json!(received_at);
    }
    if let Some(payload) = event.structured_payload() {
        doc["payload"] = payload;
    }
    doc
}

pub fn render_pretty(event: &HookEvent, timestamp: &str, color: bool) -> String {
    let received_at = event
        .received_at
        .as_ref()
        .map_or_else(|| "N/A".to_string(), ToString::to_string);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        paint(&format!("🪝 [{timestamp}] Hook Called"), Color::Green, color)
    );
    for (label, value) in [
        ("Event ID:", event.event_id.as_str()),
        ("Hook ID:", event.hook_id.as_str()),
        ("Received At:", received_at.as_str()),
    ] {
        let _ = writeln!(out, "   {} {value}", paint(label, Color::DarkGrey, color));
    }
    let _ = writeln!(
        out,
        "   {} {}",
        paint("Payload:", Color::DarkGrey, color),
        format_payload(event)
    );
    out
}

/// Best-effort pretty payload: indented JSON when it parses, the raw text
/// otherwise, `N/A` when absent or empty.
pub fn format_payload(event: &HookEvent) -> String {
    match event.structured_payload() {
        None => "N/A".to_string(),
        Some(Value::String(text)) if text.is_empty() => "N/A".to_string(),
        Some(Value::String(text)) => text,
        Some(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
    }
}

/// First 8 characters of the client key followed by an ellipsis.
pub fn key_preview(key: &str) -> String {
    let head: String = key.chars().take(8).collect();
    format!("{head}...")
}

/// Apply a foreground color when color output is enabled.
pub fn paint(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        text.with(color).to_string()
    } else {
        text.to_string()
    }
}
