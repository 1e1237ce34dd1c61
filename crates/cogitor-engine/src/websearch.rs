//! DuckDuckGo web search for current information.

use std::time::Duration;

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::fetch::{collapse_whitespace, fetch_page, URL_FETCH_TIMEOUT};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);
const RESULT_LIMIT: usize = 5;
const SUMMARY_CAP: usize = 500;

/// Phrases that veto automatic search: the user is asking for code, not
/// for current information.
const SEARCH_BLOCKING_PHRASES: [&str; 7] = [
    "write code",
    "write program",
    "create file",
    "rewrite code",
    "modify code",
    "add function",
    "implement",
];

/// Topics whose answers go stale without a search.
const CURRENT_INFO_TOPICS: [&str; 17] = [
    "latest",
    "recent",
    "current",
    "new",
    "update",
    "version",
    "today",
    "2024",
    "2025",
    "2026",
    "modern",
    "trend",
    "best practice",
    "recent change",
    "new feature",
    "release",
    "deprecated",
];

/// Technical topics best answered from live documentation.
const TECHNICAL_TOPICS: [&str; 14] = [
    "how to",
    "tutorial",
    "guide",
    "example",
    "sample code",
    "documentation",
    "api reference",
    "library",
    "package",
    "framework",
    "tool",
    "installation",
    "setup",
    "configuration",
];

const LANGUAGE_SPECIFIC_TOPICS: [(&str, &[&str]); 4] = [
    ("go", &["go mod", "go get", "goroutine", "channel", "interface", "struct"]),
    (
        "python",
        &[
            "pip install",
            "virtualenv",
            "decorator",
            "list comprehension",
            "pandas",
            "numpy",
            "django",
            "flask",
        ],
    ),
    (
        "javascript",
        &["npm install", "react", "vue", "angular", "node.js", "express", "webpack", "babel"],
    ),
    ("java", &["maven", "gradle", "spring", "hibernate", "jpa", "servlet"]),
];

/// Decide whether a question warrants an automatic web search, without an
/// explicit phrase or marker. Returns the reason when it does. Blocking
/// phrases are checked first: code-generation requests never auto-search.
pub fn should_search(question: &str, language: Option<&str>) -> Option<&'static str> {
    let lower = question.to_lowercase();
    let padded = format!(" {lower} ");

    for phrase in SEARCH_BLOCKING_PHRASES {
        if padded.contains(&format!(" {phrase} "))
            || lower.starts_with(&format!("{phrase} "))
            || lower.ends_with(&format!(" {phrase}"))
        {
            return None;
        }
    }

    for topic in CURRENT_INFO_TOPICS {
        if lower.contains(topic) {
            return Some("question_requires_current_info");
        }
    }

    for topic in TECHNICAL_TOPICS {
        if lower.contains(topic) {
            return Some("technical_topic_requires_docs");
        }
    }

    if let Some(language) = language {
        if let Some((_, topics)) = LANGUAGE_SPECIFIC_TOPICS
            .iter()
            .find(|(name, _)| *name == language)
        {
            for topic in *topics {
                if lower.contains(topic) {
                    return Some("language_specific_topic");
                }
            }
        }
    }

    None
}

/// Guess the programming language a question is about, for the
/// language-specific search triggers.
pub fn detect_language(question: &str) -> Option<&'static str> {
    const KEYWORDS: [(&str, &[&str]); 11] = [
        ("go", &["golang", " go ", "in go"]),
        ("python", &["python", "python3", " py "]),
        ("cpp", &["cpp", "c++", "cplusplus"]),
        ("javascript", &["javascript", "typescript", " js "]),
        ("java", &[" java "]),
        ("fortran", &["fortran", "f90", "f95"]),
        ("ruby", &["ruby", " rb "]),
        ("kotlin", &["kotlin", " kt "]),
        ("swift", &["swift"]),
        ("assembly", &["assembly", " asm "]),
        ("lisp", &["lisp", " cl "]),
    ];

    let padded = format!(" {} ", question.to_lowercase());
    for (language, keywords) in KEYWORDS {
        for keyword in keywords {
            if padded.contains(keyword) {
                return Some(language);
            }
        }
    }
    None
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchLink {
    pub title: String,
    pub url: String,
}

/// Search output with a rough confidence estimate.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub query: String,
    pub content: String,
    pub sources: Vec<SearchLink>,
    /// 0-100.
    pub confidence: u8,
    pub summary: String,
}

/// Fetch the top DuckDuckGo results for a query, pull the visible text of
/// each page, and aggregate it. Pages that fail to load are skipped.
pub async fn fetch_top_text(
    client: &reqwest::Client,
    scope: &CancellationToken,
    query: &str,
) -> EngineResult<SearchResult> {
    info!(query, "web search");
    let links = fetch_top_links(client, scope, query).await?;

    let mut texts: Vec<String> = Vec::new();
    let mut sources: Vec<SearchLink> = Vec::new();
    for link in links.into_iter().take(RESULT_LIMIT) {
        match fetch_page(client, scope, &link.url, URL_FETCH_TIMEOUT).await {
            Ok(html) => {
                let text = crate::fetch::extract_visible_text(&html);
                if !text.trim().is_empty() {
                    texts.push(text);
                    sources.push(link);
                }
            }
            Err(EngineError::CancelledByUser) => return Err(EngineError::CancelledByUser),
            Err(err) => {
                warn!(url = %link.url, error = %err, "skipping search result");
            }
        }
    }

    if texts.is_empty() {
        return Err(EngineError::Network(format!(
            "no content found for query: {query}"
        )));
    }

    let content = collapse_whitespace(&texts.join("\n\n"));
    let confidence = estimate_confidence(&sources, &content);
    let summary = summarize(&content);
    Ok(SearchResult {
        query: query.to_string(),
        content,
        sources,
        confidence,
        summary,
    })
}

async fn fetch_top_links(
    client: &reqwest::Client,
    scope: &CancellationToken,
    query: &str,
) -> EngineResult<Vec<SearchLink>> {
    let encoded = urlencode(query);
    let url = format!("https://duckduckgo.com/html/?q={encoded}");
    let html = fetch_page(client, scope, &url, SEARCH_TIMEOUT).await?;
    Ok(parse_result_links(&html))
}

/// DuckDuckGo's HTML results mark hits with the `result__a` anchor class;
/// the real target hides in the `uddg` query parameter.
pub fn parse_result_links(html: &str) -> Vec<SearchLink> {
    let dom = match parse_document(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
    {
        Ok(dom) => dom,
        Err(_) => return Vec::new(),
    };

    let mut links = Vec::new();
    collect_result_anchors(&dom.document, &mut links);
    links.truncate(RESULT_LIMIT);
    links
}

fn collect_result_anchors(handle: &Handle, links: &mut Vec<SearchLink>) {
    if let NodeData::Element { name, attrs, .. } = &handle.data {
        if name.local.as_ref() == "a" {
            let attrs = attrs.borrow();
            let class = attrs
                .iter()
                .find(|a| a.name.local.as_ref() == "class")
                .map(|a| a.value.to_string())
                .unwrap_or_default();
            let href = attrs
                .iter()
                .find(|a| a.name.local.as_ref() == "href")
                .map(|a| a.value.to_string())
                .unwrap_or_default();

            if class.contains("result__a") && !href.is_empty() {
                let mut text = String::new();
                anchor_text(handle, &mut text);
                let url = resolve_result_url(&href);
                if !url.contains("duckduckgo.com") {
                    links.push(SearchLink {
                        title: text.trim().to_string(),
                        url,
                    });
                }
            }
        }
    }
    for child in handle.children.borrow().iter() {
        collect_result_anchors(child, links);
    }
}

fn anchor_text(handle: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &handle.data {
        out.push_str(&contents.borrow());
    }
    for child in handle.children.borrow().iter() {
        anchor_text(child, out);
    }
}

fn resolve_result_url(href: &str) -> String {
    // Redirect links look like //duckduckgo.com/l/?uddg=<encoded-target>.
    if let Some(idx) = href.find("uddg=") {
        let tail = &href[idx + 5..];
        let encoded = tail.split('&').next().unwrap_or(tail);
        let decoded = urldecode(encoded);
        if !decoded.is_empty() {
            return decoded;
        }
    }
    if href.starts_with('/') {
        return format!("https://duckduckgo.com{href}");
    }
    href.to_string()
}

fn estimate_confidence(sources: &[SearchLink], content: &str) -> u8 {
    let mut confidence: i32 = (sources.len() as i32 * 15).min(60);
    let lower = content.to_lowercase();

    const POSITIVE: [&str; 10] = [
        "official",
        "documentation",
        "github.com",
        "stackoverflow",
        "w3.org",
        "mozilla",
        "developer",
        "tutorial",
        "guide",
        "example",
    ];
    const NEGATIVE: [&str; 8] = [
        "click here",
        "download now",
        "buy now",
        "limited time",
        "advertisement",
        "sponsored",
        "popup",
        "subscribe",
    ];

    for signal in POSITIVE {
        if lower.contains(signal) {
            confidence += 5;
        }
    }
    for signal in NEGATIVE {
        if lower.contains(signal) {
            confidence -= 10;
        }
    }

    confidence.clamp(10, 95) as u8
}

fn summarize(content: &str) -> String {
    if content.len() <= SUMMARY_CAP {
        return content.to_string();
    }
    let mut cut = SUMMARY_CAP;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &content[..cut])
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

fn urldecode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    out.push(value);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
