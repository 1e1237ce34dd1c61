//! Context assembly: history, referenced files, URLs, RAG, and search
//! results, in that order. Later sections can override earlier guidance.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::warn;
use walkdir::WalkDir;

use cogitor_context::Reference;

use crate::fetch::fetch_url_text;
use crate::session::Session;
use crate::websearch::SearchResult;

const SOURCE_SUFFIXES: [&str; 20] = [
    "go", "py", "c", "cpp", "cc", "cxx", "h", "hpp", "f", "f90", "f95", "rb", "kt", "swift",
    "html", "lisp", "cl", "asm", "s", "txt",
];

impl Session {
    /// Materialize the query's references and the session state into one
    /// prompt-ready blob.
    pub async fn assemble_context(
        &self,
        scope: &CancellationToken,
        references: &[Reference],
    ) -> String {
        let mut context = self.history.render().await;

        for reference in references {
            match reference {
                Reference::AllFiles => context.push_str(&self.read_all_files()),
                Reference::File { .. } => {
                    context.push('\n');
                    context.push_str(&self.read_single_file(reference));
                }
                Reference::Url { .. } => {}
            }
        }

        for reference in references {
            if let Reference::Url { url } = reference {
                match fetch_url_text(&self.http, scope, url).await {
                    Ok(text) => {
                        context.push_str(&format!("\n--- URL: {url} ---\n{text}\n"));
                    }
                    Err(err) => {
                        warn!(url = %url, error = %err, "url fetch failed");
                        context.push_str(&format!("\n--- URL: {url} ---\n(fetch failed: {err})\n"));
                    }
                }
            }
        }

        context.push_str(&self.rag.render_context().await);
        context
    }

    /// Read one referenced file, honoring its line range. Failures become
    /// inline markers, never hard errors; one bad reference should not
    /// sink the request.
    pub fn read_single_file(&self, reference: &Reference) -> String {
        let Reference::File {
            path,
            line_start,
            line_end,
            ..
        } = reference
        else {
            return String::new();
        };

        let resolved = match self.sandbox.resolve(path) {
            Ok(resolved) => resolved,
            Err(err) => {
                return format!("--- File: {path} ---\n(path validation failed: {err})\n");
            }
        };
        let content = match std::fs::read_to_string(&resolved) {
            Ok(content) => content,
            Err(err) => {
                return format!("--- File: {path} ---\n(read failed: {err})\n");
            }
        };

        let mut out = format!("--- File: {path} ---\n");
        if *line_start > 0 {
            let lines: Vec<&str> = content.lines().collect();
            let end = (*line_end).max(*line_start).min(lines.len());
            if *line_start > lines.len() {
                return format!("--- File: {path} ---\n(file has only {} lines)\n", lines.len());
            }
            for (offset, line) in lines[*line_start - 1..end].iter().enumerate() {
                out.push_str(&format!("{}: {line}\n", line_start + offset));
            }
        } else {
            out.push_str(&content);
            if !content.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    /// Read every source file under the working root, skipping hidden
    /// entries and non-source suffixes.
    pub fn read_all_files(&self) -> String {
        let mut out = String::from("Contents of all project files:\n");
        let mut errors: Vec<String> = Vec::new();
        let root = self.working_root();

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_hidden(entry.path(), root));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    errors.push(format!("access error: {err}"));
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_source_file(entry.path()) {
                continue;
            }
            let display = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            match std::fs::read_to_string(entry.path()) {
                Ok(content) => {
                    out.push_str(&format!("\n--- File: {display} ---\n"));
                    out.push_str(&content);
                }
                Err(err) => errors.push(format!("read error for {display}: {err}")),
            }
        }

        if !errors.is_empty() {
            out.push_str("\n--- Errors while reading files ---\n");
            for error in errors {
                out.push_str(&error);
                out.push('\n');
            }
        }
        out
    }

    /// Render a search-results section with the "use only this" contract.
    pub fn render_search_section(
        result: &SearchResult,
        llm_additional: &str,
    ) -> String {
        let sources = if result.sources.is_empty() {
            "no sources".to_string()
        } else {
            result
                .sources
                .iter()
                .map(|s| s.title.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut out = format!("\n=== SEARCH RESULTS (query: '{}') ===\n", result.query);
        out.push_str(&result.summary);
        out.push_str(&format!("\nSources: {sources}"));
        out.push_str(&format!("\n[Confidence: {}%]", result.confidence));
        out.push_str(
            "\n\nANSWER INSTRUCTIONS:\n\
             1. Use ONLY the provided search information\n\
             2. Do not add facts from your own knowledge\n\
             3. If the information is insufficient, say so honestly\n\
             4. For timely requests (weather, news) process the information naturally\n\
             ================================\n",
        );
        if !llm_additional.is_empty() {
            out.push_str(&format!(
                "\nADDITIONAL USER INSTRUCTIONS: {llm_additional}\n"
            ));
        }
        out
    }
}

fn is_hidden(path: &Path, root: &Path) -> bool {
    path != root
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SOURCE_SUFFIXES.contains(&e.as_str()))
}
