//! Single-pass envelope parsing.
//!
//! The reply is scanned line by line. Marker lines open a new segment; a
//! segment's content runs to the next marker or end of input. Keyword
//! recognition is case-insensitive, paths are taken verbatim.

use std::sync::OnceLock;

use regex::Regex;

use crate::{BuildDirective, CodeFile, CompileInfo, DiffBlock, LlmReply};

fn file_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^---\s*file:\s*(.+?)\s*---\s*$").unwrap())
}

fn diff_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^---\s*diff:\s*(.+?)\s*---\s*$").unwrap())
}

fn compile_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^---\s*compile:\s*(.+?)\s*---\s*$").unwrap())
}

fn install_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^---\s*install:\s*(.+?)\s*---\s*$").unwrap())
}

fn end_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^---\s*end\s*(file|diff|compile|install)\b.*$").unwrap())
}

fn original_lines_hint() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Original lines (\d+)-(\d+):\s*$").unwrap())
}

#[derive(Debug)]
enum Segment<'a> {
    File { path: String, lines: Vec<&'a str> },
    Diff { path: String, lines: Vec<&'a str> },
    Compile { spec: String, lines: Vec<&'a str> },
    Install { spec: String, lines: Vec<&'a str> },
}

impl<'a> Segment<'a> {
    fn push(&mut self, line: &'a str) {
        match self {
            Segment::File { lines, .. }
            | Segment::Diff { lines, .. }
            | Segment::Compile { lines, .. }
            | Segment::Install { lines, .. } => lines.push(line),
        }
    }
}

fn scan_segments(response: &str) -> Vec<Segment<'_>> {
    let mut segments: Vec<Segment<'_>> = Vec::new();
    let mut open = false;

    for line in response.lines() {
        if let Some(caps) = file_marker().captures(line) {
            segments.push(Segment::File {
                path: caps[1].to_string(),
                lines: Vec::new(),
            });
            open = true;
        } else if let Some(caps) = diff_marker().captures(line) {
            segments.push(Segment::Diff {
                path: caps[1].to_string(),
                lines: Vec::new(),
            });
            open = true;
        } else if let Some(caps) = compile_marker().captures(line) {
            segments.push(Segment::Compile {
                spec: caps[1].to_string(),
                lines: Vec::new(),
            });
            open = true;
        } else if let Some(caps) = install_marker().captures(line) {
            segments.push(Segment::Install {
                spec: caps[1].to_string(),
                lines: Vec::new(),
            });
            open = true;
        } else if end_marker().is_match(line) {
            open = false;
        } else if open {
            if let Some(segment) = segments.last_mut() {
                segment.push(line);
            }
        }
    }

    segments
}

/// Strip marker lines that survived inside a block (indented or otherwise
/// not at line start). The model is told never to emit these; we do not
/// trust it.
fn clean_nested_markers(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| {
            let trimmed = line.trim_start();
            !(trimmed.starts_with("--- File:")
                || trimmed.starts_with("--- Diff:")
                || trimmed.starts_with("--- Compile:")
                || trimmed.starts_with("--- Install:"))
        })
        .map(|line| line.to_string())
        .collect()
}

fn trim_outer_empty_lines(lines: &mut Vec<String>) {
    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
}

fn looks_like_full_command(text: &str) -> bool {
    text.contains(' ')
        && (text.starts_with("gcc")
            || text.starts_with("g++")
            || text.starts_with("go ")
            || text.starts_with("python")
            || text.contains("pip install"))
}

/// Parse a `--- Compile: <spec> ---` section into a directive. The spec line
/// may carry the command after a colon (`c: gcc -o app main.c`); otherwise
/// the body holds flags or a full command.
fn parse_compile_section(spec: &str, lines: &[&str]) -> CompileInfo {
    let body = lines.join("\n").trim().to_string();
    let (language, inline) = match spec.split_once(':') {
        Some((lang, rest)) => (lang.trim().to_string(), rest.trim().to_string()),
        None => (spec.trim().to_string(), String::new()),
    };

    let payload = if !inline.is_empty() { inline } else { body };
    let directive = if payload.is_empty() {
        None
    } else if looks_like_full_command(&payload) {
        Some(BuildDirective::Command(payload))
    } else {
        Some(BuildDirective::Flags(payload))
    };

    CompileInfo {
        language,
        directive,
        install_command: None,
    }
}

fn merge_compile(target: &mut Option<CompileInfo>, section: CompileInfo) {
    match target {
        Some(existing) => {
            if existing.directive.is_none() {
                existing.directive = section.directive;
            }
            if existing.language.is_empty() {
                existing.language = section.language;
            }
        }
        None => *target = Some(section),
    }
}

fn merge_install(target: &mut Option<CompileInfo>, language: &str, command: String) {
    if command.is_empty() {
        return;
    }
    match target {
        Some(existing) => {
            if existing.install_command.is_none() {
                existing.install_command = Some(command);
            }
        }
        None => {
            *target = Some(CompileInfo {
                language: language.trim().to_string(),
                directive: None,
                install_command: Some(command),
            })
        }
    }
}

/// Extract whole-file blocks, with trailing compile/install metadata
/// associated to the block they follow. Blocks with an empty path or empty
/// content are discarded.
pub fn parse_code_blocks(response: &str) -> Vec<CodeFile> {
    let mut files: Vec<CodeFile> = Vec::new();

    for segment in scan_segments(response) {
        match segment {
            Segment::File { path, lines } => {
                let mut content_lines = clean_nested_markers(&lines);
                trim_outer_empty_lines(&mut content_lines);
                let content = content_lines.join("\n");
                if path.is_empty() || content.is_empty() {
                    continue;
                }
                files.push(CodeFile {
                    path,
                    content,
                    compile: None,
                });
            }
            Segment::Diff { .. } => {}
            Segment::Compile { spec, lines } => {
                if let Some(file) = files.last_mut() {
                    merge_compile(&mut file.compile, parse_compile_section(&spec, &lines));
                }
            }
            Segment::Install { spec, lines } => {
                if let Some(file) = files.last_mut() {
                    let command = lines.join("\n").trim().to_string();
                    merge_install(&mut file.compile, &spec, command);
                }
            }
        }
    }

    files
}

/// Extract diff blocks. The optional `Original lines X-Y:` hint is parsed
/// and stripped from the original payload; trailing empty lines on both
/// sides of `Modified:` are normalized away.
pub fn parse_diff_blocks(response: &str) -> Vec<DiffBlock> {
    let mut blocks: Vec<DiffBlock> = Vec::new();

    for segment in scan_segments(response) {
        match segment {
            Segment::Diff { path, lines } => {
                if path.is_empty() {
                    continue;
                }
                blocks.push(parse_diff_body(path, &lines));
            }
            Segment::Compile { spec, lines } => {
                if let Some(block) = blocks.last_mut() {
                    merge_compile(&mut block.compile, parse_compile_section(&spec, &lines));
                }
            }
            Segment::Install { spec, lines } => {
                if let Some(block) = blocks.last_mut() {
                    let command = lines.join("\n").trim().to_string();
                    merge_install(&mut block.compile, &spec, command);
                }
            }
            Segment::File { .. } => {}
        }
    }

    blocks
}

fn parse_diff_body(path: String, lines: &[&str]) -> DiffBlock {
    let mut hint_start = 0usize;
    let mut hint_end = 0usize;
    let mut body: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    trim_outer_empty_lines(&mut body);

    if let Some(first) = body.first() {
        if let Some(caps) = original_lines_hint().captures(first) {
            hint_start = caps[1].parse().unwrap_or(0);
            hint_end = caps[2].parse().unwrap_or(0);
            body.remove(0);
        }
    }

    let modified_at = body.iter().position(|l| l.trim() == "Modified:");
    let (mut original, mut modified) = match modified_at {
        Some(idx) => {
            let modified = body.split_off(idx + 1);
            body.pop(); // the "Modified:" line itself
            (body, modified)
        }
        // No Modified marker: treat the whole body as replacement content.
        None => (Vec::new(), body),
    };

    trim_outer_empty_lines(&mut original);
    trim_outer_empty_lines(&mut modified);

    // A stray hint line inside the original payload is noise, not content.
    if original
        .first()
        .is_some_and(|l| l.contains("Original lines"))
    {
        original.remove(0);
    }

    DiffBlock {
        file_path: path,
        original,
        modified,
        hint_start,
        hint_end,
        compile: None,
    }
}

/// Classify one LLM reply: whole-file blocks win, then diff blocks, then
/// the reply passes through as prose unchanged.
pub fn classify(response: &str) -> LlmReply {
    let files = parse_code_blocks(response);
    if !files.is_empty() {
        return LlmReply::WholeFiles { files };
    }
    let blocks = parse_diff_blocks(response);
    if !blocks.is_empty() {
        return LlmReply::DiffBlocks { blocks };
    }
    LlmReply::Prose {
        text: response.to_string(),
    }
}
