//! Typed references extracted from the user's query.

use serde::{Deserialize, Serialize};

/// One source-of-context named in the query. File paths are kept in raw
/// form; sandbox resolution happens later, at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reference {
    File {
        path: String,
        /// 1-based inclusive range; zero means "whole file".
        line_start: usize,
        line_end: usize,
        is_absolute: bool,
    },
    AllFiles,
    Url {
        url: String,
    },
}

impl Reference {
    /// Raw path or URL for display; `@all` has none.
    pub fn display_path(&self) -> Option<&str> {
        match self {
            Reference::File { path, .. } => Some(path),
            Reference::Url { url } => Some(url),
            Reference::AllFiles => None,
        }
    }
}

/// Extract every `@`-prefixed reference token from the query. Tokens not
/// starting with `@` are ignored.
pub fn extract_references(query: &str) -> Vec<Reference> {
    query
        .split_whitespace()
        .filter_map(parse_reference_token)
        .collect()
}

fn parse_reference_token(token: &str) -> Option<Reference> {
    let body = token.strip_prefix('@')?;
    if body.is_empty() {
        return None;
    }
    if body == "all" {
        return Some(Reference::AllFiles);
    }
    if body.starts_with("http://") || body.starts_with("https://") {
        return Some(Reference::Url {
            url: body.to_string(),
        });
    }

    let (path, range) = match body.split_once(':') {
        Some((path, range)) => (path, Some(range)),
        None => (body, None),
    };
    if path.is_empty() {
        return None;
    }

    let (line_start, line_end) = range.map(parse_line_range).unwrap_or((0, 0));
    let is_absolute = path.starts_with("~/") || path.starts_with('/');

    Some(Reference::File {
        path: path.to_string(),
        line_start,
        line_end,
        is_absolute,
    })
}

/// `N` selects a single line, `N-M` an inclusive span. Unparseable ranges
/// fall back to the whole file. The result always satisfies
/// `line_end >= line_start >= 1` when nonzero.
fn parse_line_range(range: &str) -> (usize, usize) {
    if let Some((start, end)) = range.split_once('-') {
        match (start.parse::<usize>(), end.parse::<usize>()) {
            (Ok(start), Ok(end)) if start >= 1 => (start, end.max(start)),
            _ => (0, 0),
        }
    } else {
        match range.parse::<usize>() {
            Ok(line) if line >= 1 => (line, line),
            _ => (0, 0),
        }
    }
}
