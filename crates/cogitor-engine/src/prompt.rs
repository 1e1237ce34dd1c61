//! Prompt construction: query markers and the three system templates.
//!
//! The envelope grammar described here is a hard contract shared with the
//! response classifier; wording changes must keep the marker lines intact.

/// Marker for code-generation requests. A substring check on purpose, so
/// `$cod`, `$code`, `$coding` all hit.
pub fn has_code_marker(query: &str) -> bool {
    query.to_lowercase().contains("$cod")
}

pub fn has_diff_marker(query: &str) -> bool {
    query.contains("$diff") || query.contains("$patch")
}

pub fn has_internet_marker(query: &str) -> bool {
    query.contains("$internet") || query.contains("$int")
}

/// Remove the given markers and tidy whitespace.
pub fn strip_markers(query: &str, markers: &[&str]) -> String {
    let mut cleaned = query.to_string();
    for marker in markers {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned.trim().to_string()
}

/// Default trigger phrase for the explicit web-search path.
pub const EXPLICIT_SEARCH_PHRASE: &str = "find on the internet";

/// Match the explicit-search prefix (case-insensitive). Returns the search
/// query and optional trailing instructions for the LLM, split on the
/// first `:`.
pub fn explicit_search_query(query: &str, phrase: &str) -> Option<(String, String)> {
    let lower = query.to_lowercase();
    if !lower.starts_with(&phrase.to_lowercase()) {
        return None;
    }
    let mut rest = query[phrase.len()..].trim();
    rest = rest.strip_prefix(',').unwrap_or(rest).trim();
    if rest.is_empty() {
        return None;
    }

    match rest.split_once(':') {
        Some((search, additional)) => Some((
            search.trim().to_string(),
            format!(", {}", additional.trim()),
        )),
        None => Some((rest.to_string(), String::new())),
    }
}

/// Build the prompt for the general path. `is_text_request` marks queries
/// referencing `.txt` files or URLs, which keep the file envelope but are
/// never compiled.
pub fn build_prompt(query: &str, context: &str, is_text_request: bool) -> String {
    let code_generation = has_code_marker(query) || has_diff_marker(query);
    let mut prompt = String::from("You are a senior software engineer and technical expert. ");

    if !context.is_empty() {
        prompt.push_str("Use the following context to answer:\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    if !code_generation && !is_text_request && !has_diff_marker(query) {
        prompt.push_str(
            "RESPONSE FORMAT: Use Markdown for formatting (headings, bold text, \
             lists, `code`). Do NOT use the --- File: --- format.\n\n",
        );
    }

    prompt.push_str("Answer briefly and to the point unless asked otherwise. User request: ");
    prompt.push_str(query);

    if code_generation && !is_text_request {
        prompt.push_str(
            "\n\nIMPORTANT: When you provide code, use ONLY this format:\n\
             --- File: filename ---\n\
             // your code here without any extra tags\n\
             IMPORTANT: NEVER place '--- File:' markers inside code. \
             Use them ONLY to delimit files.\n\
             FOR PROGRAMS WITH EXTERNAL DEPENDENCIES:\n\
             If the code needs dependencies installed, add:\n\
             --- Install: language ---\n\
             dependency_install_command\n\
             If the code needs special compile flags, add:\n\
             --- Compile: language ---\n\
             compile_flags_or_command\n\
             Do NOT use markdown fences (```).\n\
             The code must be clean and ready to run.\n\
             Repeat the format for every file when creating several.\n\n\
             EXAMPLES:\n\
             1. Python with dependencies:\n\
             --- Install: python ---\n\
             pip install requests numpy\n\
             --- Compile: python ---\n\
             python3 main.py\n\
             2. C with external libraries:\n\
             --- Install: c ---\n\
             sudo apt-get install libssl-dev\n\
             --- Compile: c ---\n\
             gcc -o myapp main.c -lssl\n",
        );
    } else if is_text_request {
        prompt.push_str(
            "\n\nIMPORTANT: The user is working with a text file (.txt). \
             Keep the reply in the same format (--- File: filename ---) but \
             do not attempt to compile or execute anything.",
        );
    }

    prompt
}

/// Build the prompt for the diff path.
pub fn build_diff_prompt(query: &str, context: &str, files: &[String]) -> String {
    format!(
        "You are a senior software engineer. APPLY CHANGES ONLY TO THE LISTED FILES \
         using the DIFF format.\n\n\
         RULES:\n\
         1. Do NOT rewrite whole files.\n\
         2. Name the EXACT lines to replace.\n\
         3. Format:\n\
         --- Diff: path/to/file ---\n\
         Original lines X-Y:\n\
         <3 context lines BEFORE>\n\
         <the original lines to replace>\n\
         <3 context lines AFTER>\n\
         Modified:\n\
         <3 context lines BEFORE>\n\
         <the new lines with identical indentation>\n\
         <3 context lines AFTER>\n\
         4. Always include exactly 3 lines before and 3 lines after the changed \
         fragment (when they exist).\n\
         5. Line numbers may be wrong; the program locates the block by its context.\n\
         6. Preserve indentation one-for-one (copy spaces/tabs from the original).\n\
         7. To delete lines, leave the Modified block empty.\n\
         8. Several files mean several blocks in sequence.\n\
         9. Reply with ONLY these blocks, no explanations.\n\
         10. NEVER place '--- Diff:' markers inside code; use them only as block \
         delimiters.\n\
         11. NEVER leave the Original block empty.\n\n\
         EXAMPLE:\n\
         --- Diff: main.go ---\n\
         Original lines 12-14:\n\
             fmt.Println(\"hello\")\n\
             x := 1\n\
             y := 2\n\
         Modified:\n\
             log.Println(\"hello\")\n\
             x := 42\n\
             y := 3\n\n\
         FILES: {files}\n\n\
         CODE:\n{context}\n\n\
         TASK: {query}\n\n\
         RETURN ONLY DIFF BLOCKS.",
        files = files.join(", "),
        context = context,
        query = query,
    )
}

/// Build the URL-synthesis prompt for `$internet` requests.
pub fn build_url_prompt(query: &str) -> String {
    format!(
        "Generate the right URL for the following user request.\n\
         Return ONLY the URL, with no extra text, explanations, or markdown.\n\n\
         User request: \"{query}\"\n\n\
         Examples:\n\
         Request: \"Open the Washington Post site\" -> https://www.washingtonpost.com\n\
         Request: \"Search Google for rust iterators\" -> https://www.google.com/search?q=rust+iterators\n\
         Request: \"GitHub\" -> https://github.com\n\n\
         URL:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_detected() {
        assert!(has_code_marker("write a parser $cod"));
        assert!(has_code_marker("$CODE in caps"));
        assert!(!has_code_marker("plain question"));
        assert!(has_diff_marker("fix this $diff @a.go"));
        assert!(has_diff_marker("fix this $patch @a.go"));
        assert!(has_internet_marker("open docs $int"));
        assert!(has_internet_marker("open docs $internet"));
    }

    #[test]
    fn strip_markers_cleans_whitespace() {
        assert_eq!(
            strip_markers("fix the loop $diff  ", &["$diff", "$patch"]),
            "fix the loop"
        );
    }

    #[test]
    fn explicit_search_splits_llm_instructions_on_colon() {
        let (search, additional) = explicit_search_query(
            "Find on the internet rust 2024 edition: summarize in one line",
            EXPLICIT_SEARCH_PHRASE,
        )
        .unwrap();
        assert_eq!(search, "rust 2024 edition");
        assert_eq!(additional, ", summarize in one line");
    }

    #[test]
    fn explicit_search_requires_the_prefix_and_a_query() {
        assert!(explicit_search_query("what is rust", EXPLICIT_SEARCH_PHRASE).is_none());
        assert!(explicit_search_query("find on the internet", EXPLICIT_SEARCH_PHRASE).is_none());
        assert!(
            explicit_search_query("find on the internet,   ", EXPLICIT_SEARCH_PHRASE).is_none()
        );
    }

    #[test]
    fn conversational_prompt_requests_markdown_and_forbids_envelope() {
        let prompt = build_prompt("why is the sky blue", "", false);
        assert!(prompt.contains("Use Markdown"));
        assert!(prompt.contains("Do NOT use the --- File: --- format"));
    }

    #[test]
    fn code_prompt_describes_the_envelope() {
        let prompt = build_prompt("$cod write hello world in C", "", false);
        assert!(prompt.contains("--- File: filename ---"));
        assert!(prompt.contains("--- Install: language ---"));
        assert!(prompt.contains("--- Compile: language ---"));
        assert!(!prompt.contains("Use Markdown for formatting"));
    }

    #[test]
    fn text_request_keeps_envelope_but_suppresses_execution() {
        let prompt = build_prompt("$cod reword @notes.txt", "", true);
        assert!(prompt.contains("do not attempt to compile"));
    }

    #[test]
    fn context_is_injected_ahead_of_the_query() {
        let prompt = build_prompt("question", "CONTEXT BLOB", false);
        let context_at = prompt.find("CONTEXT BLOB").unwrap();
        let query_at = prompt.find("User request: question").unwrap();
        assert!(context_at < query_at);
    }

    #[test]
    fn diff_prompt_lists_files_and_rules() {
        let prompt = build_diff_prompt("rename x", "code here", &["a.go".to_string()]);
        assert!(prompt.contains("FILES: a.go"));
        assert!(prompt.contains("--- Diff: path/to/file ---"));
        assert!(prompt.contains("NEVER leave the Original block empty"));
    }
}
