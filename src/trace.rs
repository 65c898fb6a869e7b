//! Execution trace excerpts for prompt context.
//!
//! Trace logs are JSON files produced by an external runtime tracer. Only a
//! bounded excerpt ever reaches a prompt: the last few entries, each
//! pretty-printed and truncated, so a large log cannot blow up the prompt.

use anyhow::{Context, Result};
use std::path::Path;

const MAX_ENTRIES: usize = 5;
const MAX_ENTRY_CHARS: usize = 1000;

/// Read a JSON trace log and render its tail as prompt-ready text.
///
/// A top-level array contributes its last five elements; any other JSON
/// value is treated as a single entry. Each entry is pretty-printed and
/// truncated to 1000 characters.
pub fn read_trace_excerpt(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace log: {}", path.display()))?;

    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Trace log is not valid JSON: {}", path.display()))?;

    let entries: Vec<&serde_json::Value> = match &value {
        serde_json::Value::Array(items) => {
            let skip = items.len().saturating_sub(MAX_ENTRIES);
            items.iter().skip(skip).collect()
        }
        other => vec![other],
    };

    let rendered: Vec<String> = entries
        .iter()
        .map(|entry| {
            let pretty =
                serde_json::to_string_pretty(entry).unwrap_or_else(|_| entry.to_string());
            if pretty.chars().count() > MAX_ENTRY_CHARS {
                pretty.chars().take(MAX_ENTRY_CHARS).collect()
            } else {
                pretty
            }
        })
        .collect();

    Ok(rendered.join("\n\n"))
}
