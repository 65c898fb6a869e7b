//! Fuzzy DOM element location.
//!
//! Given a page URL and a free-text element descriptor, fetch the page,
//! describe every element as `tag`, `id`, `class`, and a bounded inner-text
//! excerpt, score each description against the query with a longest-common-
//! subsequence ratio, and return the best matches with structural paths.
//!
//! Everything here degrades instead of failing: an unreachable page, an
//! unparsable descriptor, or zero matches all produce an empty match list
//! plus a human-readable message.

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::time::Duration;

use crate::config::LocatorConfig;

/// One located element, ordered best-first.
#[derive(Debug, Clone, Serialize)]
pub struct DomMatch {
    pub tag: String,
    pub id: Option<String>,
    pub class: Option<String>,
    pub text: String,
    /// Root-to-element path of `tag[n]` steps, n counting same-tag siblings
    /// from 1, e.g. `/html[1]/body[1]/ul[1]/li[2]`.
    pub path: String,
    /// Similarity as a percentage, rounded to two decimals.
    pub confidence: f64,
}

/// One enumerated element: what [`DomMatch`] carries minus the similarity,
/// which only exists when a descriptor was matched against.
#[derive(Debug, Clone, Serialize)]
pub struct ElementSummary {
    pub tag: String,
    pub id: Option<String>,
    pub class: Option<String>,
    pub text: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocateResponse {
    pub matches: Vec<DomMatch>,
    /// Set when matches is empty: why nothing was found.
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LocatorOptions {
    pub min_similarity: f64,
    pub max_matches: usize,
    pub fetch_timeout_secs: u64,
    pub text_excerpt_chars: usize,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        LocatorOptions::from(&LocatorConfig::default())
    }
}

impl From<&LocatorConfig> for LocatorOptions {
    fn from(config: &LocatorConfig) -> Self {
        Self {
            min_similarity: config.min_similarity,
            max_matches: config.max_matches,
            fetch_timeout_secs: config.fetch_timeout_secs,
            text_excerpt_chars: config.text_excerpt_chars,
        }
    }
}

/// Fetch `url` and locate `descriptor` in its DOM. Fetch and parse failures
/// come back as an empty response with a message, never an `Err`.
pub async fn locate(url: &str, descriptor: &str, opts: &LocatorOptions) -> LocateResponse {
    match fetch_page(url, opts.fetch_timeout_secs).await {
        Ok(html) => locate_in_html(&html, descriptor, opts),
        Err(msg) => LocateResponse {
            matches: Vec::new(),
            message: Some(msg),
        },
    }
}

/// Fetch `url` and describe every element in its DOM, in document order.
pub async fn enumerate_elements(
    url: &str,
    opts: &LocatorOptions,
) -> Result<Vec<ElementSummary>, String> {
    let html = fetch_page(url, opts.fetch_timeout_secs).await?;
    enumerate_in_html(&html, opts)
}

/// Describe every element of a parsed page, in document order.
pub fn enumerate_in_html(
    html: &str,
    opts: &LocatorOptions,
) -> Result<Vec<ElementSummary>, String> {
    let document = Html::parse_document(html);
    let all = Selector::parse("*").map_err(|e| format!("selector error: {:?}", e))?;

    Ok(document
        .select(&all)
        .map(|el| summarize(el, opts.text_excerpt_chars))
        .collect())
}

async fn fetch_page(url: &str, timeout_secs: u64) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| format!("Error fetching DOM: {}", e))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Error fetching DOM: {}", e))?;

    if !response.status().is_success() {
        return Err(format!("Error fetching DOM: HTTP {}", response.status()));
    }

    response
        .text()
        .await
        .map_err(|e| format!("Error fetching DOM: {}", e))
}

/// Score `descriptor` against every element of a parsed page.
pub fn locate_in_html(html: &str, descriptor: &str, opts: &LocatorOptions) -> LocateResponse {
    let descriptor = descriptor.trim();
    if descriptor.is_empty() {
        return LocateResponse {
            matches: Vec::new(),
            message: Some("No element descriptor provided.".to_string()),
        };
    }

    let document = Html::parse_document(html);
    let all = match Selector::parse("*") {
        Ok(s) => s,
        Err(e) => {
            return LocateResponse {
                matches: Vec::new(),
                message: Some(format!("Error parsing DOM: {:?}", e)),
            }
        }
    };

    let mut scored: Vec<(f64, usize, DomMatch)> = Vec::new();
    for (doc_order, el) in document.select(&all).enumerate() {
        let candidate = element_descriptor(el, opts.text_excerpt_chars);
        let similarity = similarity_ratio(descriptor, &candidate);
        if similarity >= opts.min_similarity {
            scored.push((similarity, doc_order, describe(el, similarity, opts.text_excerpt_chars)));
        }
    }

    // Best similarity first; equal scores keep document order
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    scored.truncate(opts.max_matches);

    let matches: Vec<DomMatch> = scored.into_iter().map(|(_, _, m)| m).collect();
    let message = if matches.is_empty() {
        Some("No matching element found.".to_string())
    } else {
        None
    };

    LocateResponse { matches, message }
}

fn summarize(el: ElementRef, excerpt_chars: usize) -> ElementSummary {
    ElementSummary {
        tag: el.value().name().to_string(),
        id: el.value().attr("id").map(|s| s.to_string()),
        class: el.value().attr("class").map(|s| s.to_string()),
        text: text_excerpt(el, excerpt_chars),
        path: element_path(el),
    }
}

fn describe(el: ElementRef, similarity: f64, excerpt_chars: usize) -> DomMatch {
    let summary = summarize(el, excerpt_chars);
    DomMatch {
        tag: summary.tag,
        id: summary.id,
        class: summary.class,
        text: summary.text,
        path: summary.path,
        confidence: (similarity * 10000.0).round() / 100.0,
    }
}

/// The string an element is matched by: tag, id, class, and text excerpt
/// joined by spaces, omitting absent parts.
pub fn element_descriptor(el: ElementRef, excerpt_chars: usize) -> String {
    let mut parts: Vec<String> = vec![el.value().name().to_string()];
    if let Some(id) = el.value().attr("id") {
        parts.push(id.to_string());
    }
    if let Some(class) = el.value().attr("class") {
        parts.push(class.to_string());
    }
    let text = text_excerpt(el, excerpt_chars);
    if !text.is_empty() {
        parts.push(text);
    }
    parts.join(" ")
}

/// Inner text with whitespace collapsed, truncated to `max_chars` characters.
fn text_excerpt(el: ElementRef, max_chars: usize) -> String {
    let joined = el
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    joined.chars().take(max_chars).collect()
}

/// Root-to-element structural path. Each step is `tag[n]` where n is the
/// 1-based position among preceding siblings of the same tag.
pub fn element_path(el: ElementRef) -> String {
    let mut steps: Vec<String> = Vec::new();
    let mut node = el;

    loop {
        let tag = node.value().name().to_string();
        let position = 1 + node
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|sib| sib.value().name() == tag)
            .count();
        steps.push(format!("{}[{}]", tag, position));

        match node.parent().and_then(ElementRef::wrap) {
            Some(parent) => node = parent,
            None => break,
        }
    }

    steps.reverse();
    format!("/{}", steps.join("/"))
}

/// Similarity of two strings: `2 * LCS / (len_a + len_b)` over lowercased
/// characters. Both-empty compares as identical.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    // LCS length, rolling single row
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let lcs = prev[b.len()] as f64;
    2.0 * lcs / (a.len() + b.len()) as f64
}
