//! Web page fetching and visible-text extraction.

use std::time::Duration;

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, EngineResult};

/// Deadline for one page fetch.
pub const URL_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

/// Cap on extracted page text, in bytes.
pub const URL_CONTENT_CAP: usize = 50_000;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; AI-Code-Assistant/1.0)";

/// Fetch a page and return its visible text: scripts, styles, and chrome
/// elements stripped, whitespace collapsed, capped at 50 KB.
pub async fn fetch_url_text(
    client: &reqwest::Client,
    scope: &CancellationToken,
    url: &str,
) -> EngineResult<String> {
    let html = fetch_page(client, scope, url, URL_FETCH_TIMEOUT).await?;
    let text = extract_visible_text(&html);
    Ok(cap_text(text, URL_CONTENT_CAP))
}

pub(crate) async fn fetch_page(
    client: &reqwest::Client,
    scope: &CancellationToken,
    url: &str,
    deadline: Duration,
) -> EngineResult<String> {
    if scope.is_cancelled() {
        return Err(EngineError::CancelledByUser);
    }

    let request = async {
        let response = client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::HttpStatus {
                status: status.as_u16(),
                body: String::new(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))
    };

    tokio::select! {
        _ = scope.cancelled() => Err(EngineError::CancelledByUser),
        outcome = tokio::time::timeout(deadline, request) => match outcome {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                seconds: deadline.as_secs(),
            }),
        },
    }
}

/// Walk the DOM collecting text nodes, skipping non-content elements.
pub fn extract_visible_text(html: &str) -> String {
    let dom = match parse_document(RcDom::default(), ParseOpts::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())
    {
        Ok(dom) => dom,
        Err(_) => return String::new(),
    };

    let mut out = String::new();
    walk_text(&dom.document, &mut out);
    collapse_whitespace(&out)
}

fn walk_text(handle: &Handle, out: &mut String) {
    match &handle.data {
        NodeData::Element { name, .. } => {
            let tag = name.local.as_ref();
            if matches!(tag, "script" | "style" | "nav" | "header" | "footer") {
                return;
            }
        }
        NodeData::Text { contents } => {
            let text = contents.borrow();
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push_str(trimmed);
                out.push(' ');
            }
        }
        _ => {}
    }
    for child in handle.children.borrow().iter() {
        walk_text(child, out);
    }
}

/// Collapse all whitespace runs into single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cap_text(mut text: String, cap: usize) -> String {
    if text.len() <= cap {
        return text;
    }
    let mut cut = cap;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n... (truncated)");
    text
}
