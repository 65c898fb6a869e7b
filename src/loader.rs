//! Source tree discovery and loading.
//!
//! Walks a root directory and loads every file whose extension is on the
//! configured allow-list, skipping default excludes (`.git`, `target`,
//! `node_modules`) plus any config-supplied globs. Unreadable files are
//! recorded and skipped — a single bad file never aborts a run.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::IngestConfig;

/// A loaded source file, consumed by the splitter and then discarded.
/// Documents themselves are never persisted; only their chunks are.
#[derive(Debug, Clone)]
pub struct Document {
    /// Root-relative path with forward slashes, used as the source id.
    pub path: String,
    pub text: String,
    /// Extension-derived kind: code, markup, text, data, or query.
    pub kind: String,
}

/// Result of scanning a source tree: the documents that loaded plus a
/// record of everything that was skipped.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub errors: Vec<String>,
}

pub fn load_documents(root: &Path, config: &IngestConfig) -> Result<LoadOutcome> {
    if !root.is_dir() {
        bail!("source root does not exist: {}", root.display());
    }

    let include_set = build_globset(
        &config
            .extensions
            .iter()
            .map(|ext| format!("**/*.{}", ext))
            .collect::<Vec<_>>(),
    )?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&excludes)?;

    let mut outcome = LoadOutcome::default();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                outcome.errors.push(format!("walk error: {}", e));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                outcome.errors.push(format!("unreadable file {}: {}", rel_str, e));
                continue;
            }
        };

        if text.is_empty() {
            warn!(path = %rel_str, "empty file yields no chunks");
        }

        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        outcome.documents.push(Document {
            path: rel_str,
            text,
            kind: kind_for_extension(ext).to_string(),
        });
    }

    // Sort for deterministic ordering
    outcome.documents.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(outcome)
}

/// Map a file extension to a coarse document kind.
pub fn kind_for_extension(ext: &str) -> &'static str {
    match ext {
        "py" | "cs" | "js" | "ts" | "rs" | "go" => "code",
        "html" | "cshtml" | "xml" | "md" => "markup",
        "json" => "data",
        "sql" => "query",
        _ => "text",
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
