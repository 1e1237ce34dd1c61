//! Fuzzy-anchored patch application with per-patch partial success.
//!
//! The value of this engine is not applying edits, it is *locating* them
//! despite the LLM mis-numbering lines and dropping whitespace:
//! - smart range: the hint is searched in a ±10-line window, scored by
//!   trimmed-line equality, with a whole-file exact scan as fallback
//! - fuzzy validation: at least 70% of the original lines must match
//! - application runs in reverse start order so index shifts from later
//!   patches do not disturb earlier ones
//! - leading whitespace is restored from the file when the model dropped it
//!
//! Overlapping ranges are not detected: with reverse-order application the
//! later patch silently clobbers the earlier one.

use std::fs;
use std::path::{Path, PathBuf};

use cogitor_protocol::DiffBlock;
use tracing::{debug, warn};

use crate::error::{PatchError, PatchResult};
use crate::sandbox::PathSandbox;

/// Search window around the LLM's line hint, in lines.
const HINT_WINDOW: isize = 10;

/// Minimum fraction of trimmed-equal lines for a block to validate.
const FUZZY_THRESHOLD: f64 = 0.7;

/// Operator confirmation hook for interactive runs.
pub trait ApplyPrompt: Send + Sync {
    /// Asked when some blocks failed validation: apply only the valid
    /// subset? Returning false aborts the file.
    fn confirm_partial(&self, path: &str, valid: usize, total: usize) -> bool;
}

/// Per-file application report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: String,
    pub applied: usize,
    pub total: usize,
    pub warnings: Vec<String>,
    pub apply_errors: Vec<String>,
    pub backup: Option<PathBuf>,
}

impl FileReport {
    pub fn outcome(&self) -> FileOutcome {
        if self.applied == 0 {
            FileOutcome::NoneApplied
        } else if self.applied == self.total {
            FileOutcome::AllApplied
        } else {
            FileOutcome::PartiallyApplied {
                applied: self.applied,
                total: self.total,
            }
        }
    }
}

/// File-level outcome; only `NoneApplied` is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    AllApplied,
    PartiallyApplied { applied: usize, total: usize },
    NoneApplied,
}

/// Batch result across all target files. A failure in one file never
/// aborts the rest.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<FileReport>,
    pub failures: Vec<(String, PatchError)>,
}

impl BatchReport {
    pub fn applied(&self) -> usize {
        self.reports.iter().map(|r| r.applied).sum()
    }

    pub fn total(&self) -> usize {
        self.reports.iter().map(|r| r.total).sum::<usize>()
            + self.failures.len()
    }

    pub fn all_failed(&self) -> bool {
        self.reports.is_empty() && !self.failures.is_empty()
    }
}

/// Applies sets of diff blocks to files under a sandbox root.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    sandbox: PathSandbox,
    skip_backup: bool,
}

impl DiffEngine {
    pub fn new(sandbox: PathSandbox) -> Self {
        Self {
            sandbox,
            skip_backup: false,
        }
    }

    pub fn with_skip_backup(mut self, skip_backup: bool) -> Self {
        self.skip_backup = skip_backup;
        self
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    /// Apply all blocks, grouped by target file in first-appearance order.
    /// Each file is processed independently.
    pub fn apply_blocks(
        &self,
        blocks: &[DiffBlock],
        auto_mode: bool,
        prompt: Option<&dyn ApplyPrompt>,
    ) -> PatchResult<BatchReport> {
        if blocks.is_empty() {
            return Err(PatchError::EmptyBatch);
        }

        let mut order: Vec<&str> = Vec::new();
        for block in blocks {
            if !order.contains(&block.file_path.as_str()) {
                order.push(&block.file_path);
            }
        }

        let mut batch = BatchReport::default();
        for path in order {
            let group: Vec<&DiffBlock> = blocks
                .iter()
                .filter(|b| b.file_path == path)
                .collect::<Vec<_>>();
            match self.apply_file(path, &group, auto_mode, prompt) {
                Ok(report) => batch.reports.push(report),
                Err(err) => {
                    warn!(path, error = %err, "patch application failed");
                    batch.failures.push((path.to_string(), err));
                }
            }
        }
        Ok(batch)
    }

    fn apply_file(
        &self,
        path: &str,
        blocks: &[&DiffBlock],
        auto_mode: bool,
        prompt: Option<&dyn ApplyPrompt>,
    ) -> PatchResult<FileReport> {
        let resolved = self.sandbox.resolve(path)?;
        let content = fs::read_to_string(&resolved)?;
        let orig_lines: Vec<String> = content.split('\n').map(str::to_string).collect();

        let backup = if self.skip_backup {
            None
        } else {
            let backup_path = backup_path_for(&resolved);
            fs::write(&backup_path, &content)?;
            Some(backup_path)
        };

        // Pre-validate every block before touching the file.
        let mut valid: Vec<(usize, usize, &DiffBlock)> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        for &block in blocks {
            let (start, end) = smart_range(&orig_lines, block);
            if validate_fuzzy(&orig_lines, start, end, &block.original) {
                valid.push((start, end, block));
            } else {
                warnings.push(format!(
                    "patch for lines {}-{}: content mismatch (fuzzy) in a {}-line block",
                    start + 1,
                    end,
                    block.original.len()
                ));
            }
        }

        if !warnings.is_empty() && !auto_mode {
            let confirmed = prompt
                .map(|p| p.confirm_partial(path, valid.len(), blocks.len()))
                .unwrap_or(false);
            if !confirmed {
                return Err(PatchError::OperatorDeclined {
                    path: path.to_string(),
                });
            }
        }

        if valid.is_empty() {
            return Err(PatchError::NoValidPatches {
                path: path.to_string(),
            });
        }

        // Largest start first, so earlier indices stay stable.
        valid.sort_by(|a, b| b.0.cmp(&a.0));

        let mut result_lines = orig_lines.clone();
        let mut applied = 0usize;
        let mut apply_errors: Vec<String> = Vec::new();

        for (start, end, block) in valid {
            // Earlier (higher-start) applications may have shrunk the
            // file; a range that no longer fits is an apply error.
            if end > result_lines.len() || block.original.len() > result_lines.len() {
                apply_errors.push(format!(
                    "patch for lines {}-{}: range out of bounds after earlier patches",
                    start + 1,
                    end
                ));
                continue;
            }
            let modified = restore_leading_whitespace(&result_lines, start, &block.modified);
            let mut new_lines = Vec::with_capacity(
                result_lines.len() - block.original.len() + modified.len(),
            );
            new_lines.extend_from_slice(&result_lines[..start]);
            new_lines.extend(modified);
            new_lines.extend_from_slice(&result_lines[end..]);

            let expected = result_lines.len() - block.original.len() + block.modified.len();
            if new_lines.len() != expected {
                apply_errors.push(format!(
                    "patch for lines {}-{}: length mismatch after application",
                    start + 1,
                    end
                ));
                continue;
            }

            result_lines = new_lines;
            applied += 1;
        }

        write_atomic(&resolved, &result_lines.join("\n"))?;
        debug!(path, applied, total = blocks.len(), "patches applied");

        if applied == 0 {
            return Err(PatchError::NoneApplied {
                path: path.to_string(),
            });
        }

        Ok(FileReport {
            path: path.to_string(),
            applied,
            total: blocks.len(),
            warnings,
            apply_errors,
            backup,
        })
    }
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".backup");
    PathBuf::from(os)
}

fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}

/// Resolve the effective `(start, end)` range for a block. The LLM hint is
/// scored against a ±10-line window; with no hit, the whole file is scanned
/// for the first exact trimmed match; with still no hit, the whole file is
/// returned and the block will be rejected at validation.
pub fn smart_range(lines: &[String], block: &DiffBlock) -> (usize, usize) {
    let target = &block.original;
    if target.is_empty() {
        return (0, 0);
    }

    let hint = block.hint_start.saturating_sub(1) as isize;
    let mut best_start: Option<usize> = None;
    let mut best_score = 0usize;

    for i in (hint - HINT_WINDOW)..=(hint + HINT_WINDOW) {
        if i < 0 {
            continue;
        }
        let i = i as usize;
        if i + target.len() > lines.len() {
            continue;
        }
        let score = target
            .iter()
            .zip(&lines[i..i + target.len()])
            .filter(|(a, b)| a.trim() == b.trim())
            .count();
        if score > best_score {
            best_score = score;
            best_start = Some(i);
        }
    }

    if let Some(start) = best_start {
        return (start, start + target.len());
    }

    if let Some(start) = find_exact_trimmed(lines, target) {
        return (start, start + target.len());
    }

    (0, lines.len())
}

fn find_exact_trimmed(lines: &[String], target: &[String]) -> Option<usize> {
    if target.len() > lines.len() {
        return None;
    }
    (0..=lines.len() - target.len()).find(|&i| {
        target
            .iter()
            .zip(&lines[i..i + target.len()])
            .all(|(a, b)| a.trim() == b.trim())
    })
}

/// A block validates when at least 70% of its original lines match the
/// file's lines at the resolved range, compared after trimming. An empty
/// original never validates.
pub fn validate_fuzzy(lines: &[String], start: usize, end: usize, expected: &[String]) -> bool {
    if expected.is_empty() || end > lines.len() || expected.len() != end - start {
        return false;
    }
    let matched = expected
        .iter()
        .zip(&lines[start..end])
        .filter(|(a, b)| a.trim() == b.trim())
        .count();
    matched as f64 / expected.len() as f64 >= FUZZY_THRESHOLD
}

/// Re-indent modified lines that begin with non-whitespace when the file's
/// corresponding line is indented. Hardens against model indent drift.
pub fn restore_leading_whitespace(
    lines: &[String],
    start: usize,
    modified: &[String],
) -> Vec<String> {
    modified
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let reference = if start + i < lines.len() {
                Some(&lines[start + i])
            } else if start > 0 {
                lines.get(start - 1)
            } else {
                None
            };
            let ws = reference.map(|r| leading_whitespace(r)).unwrap_or("");
            match line.chars().next() {
                Some(first) if !ws.is_empty() && first != ' ' && first != '\t' => {
                    format!("{ws}{line}")
                }
                _ => line.clone(),
            }
        })
        .collect()
}

fn leading_whitespace(line: &str) -> &str {
    let end = line
        .char_indices()
        .find(|(_, c)| *c != ' ' && *c != '\t')
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct AlwaysYes;
    impl ApplyPrompt for AlwaysYes {
        fn confirm_partial(&self, _path: &str, _valid: usize, _total: usize) -> bool {
            true
        }
    }

    struct AlwaysNo;
    impl ApplyPrompt for AlwaysNo {
        fn confirm_partial(&self, _path: &str, _valid: usize, _total: usize) -> bool {
            false
        }
    }

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    fn block(path: &str, original: &[&str], modified: &[&str], hint: usize) -> DiffBlock {
        DiffBlock {
            file_path: path.to_string(),
            original: lines(original),
            modified: lines(modified),
            hint_start: hint,
            hint_end: hint + original.len().saturating_sub(1),
            compile: None,
        }
    }

    fn engine(dir: &TempDir) -> DiffEngine {
        DiffEngine::new(PathSandbox::new(dir.path()).unwrap())
    }

    fn write_file(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    fn read_file(dir: &TempDir, name: &str) -> String {
        fs::read_to_string(dir.path().join(name)).unwrap()
    }

    #[test]
    fn smart_range_finds_exact_hint() {
        let file = lines(&["a", "b", "c", "d", "e"]);
        let b = block("f", &["c", "d"], &["C", "D"], 3);
        assert_eq!(smart_range(&file, &b), (2, 4));
    }

    #[test]
    fn smart_range_tolerates_off_by_a_few_hint() {
        let file = lines(&["a", "b", "c", "d", "e", "f", "g"]);
        // Hint points five lines early; the window still finds the match.
        let b = block("f", &["f", "g"], &["F"], 1);
        assert_eq!(smart_range(&file, &b), (5, 7));
    }

    #[test]
    fn smart_range_ignores_whitespace_when_scoring() {
        let file = lines(&["    indented line", "next"]);
        let b = block("f", &["indented line"], &["changed"], 1);
        assert_eq!(smart_range(&file, &b), (0, 1));
    }

    #[test]
    fn smart_range_falls_back_to_whole_file_scan() {
        let file: Vec<String> = (0..60).map(|i| format!("line{i}")).collect();
        // Hint is nowhere near the real location (outside the ±10 window).
        let b = block("f", &["line50"], &["changed"], 1);
        assert_eq!(smart_range(&file, &b), (50, 51));
    }

    #[test]
    fn smart_range_with_no_match_returns_whole_file() {
        let file = lines(&["a", "b"]);
        let b = block("f", &["zzz"], &["y"], 1);
        assert_eq!(smart_range(&file, &b), (0, 2));
    }

    #[test]
    fn validate_rejects_empty_original() {
        let file = lines(&["a", "b"]);
        assert!(!validate_fuzzy(&file, 0, 0, &[]));
    }

    #[test]
    fn validate_threshold_is_exactly_seventy_percent() {
        // 10-line range, 7 matches: exactly 70% — accepted.
        let file: Vec<String> = (0..10).map(|i| format!("l{i}")).collect();
        let mut expected = file.clone();
        for line in expected.iter_mut().take(3) {
            *line = "different".to_string();
        }
        assert!(validate_fuzzy(&file, 0, 10, &expected));

        // 6 of 10 (60%) and even 699/1000 fail.
        let mut expected = file.clone();
        for line in expected.iter_mut().take(4) {
            *line = "different".to_string();
        }
        assert!(!validate_fuzzy(&file, 0, 10, &expected));

        let big: Vec<String> = (0..1000).map(|i| format!("l{i}")).collect();
        let mut expected = big.clone();
        for line in expected.iter_mut().take(301) {
            *line = "different".to_string();
        }
        assert!(!validate_fuzzy(&big, 0, 1000, &expected));
    }

    #[test]
    fn whitespace_restoration_reindents_bare_lines() {
        let file = lines(&["    if x:", "        y()"]);
        let modified = lines(&["if x:", "        z()"]);
        let restored = restore_leading_whitespace(&file, 0, &modified);
        assert_eq!(restored[0], "    if x:");
        assert_eq!(restored[1], "        z()");
    }

    #[test]
    fn whitespace_restoration_uses_previous_line_past_the_end() {
        let file = lines(&["  a", "  b"]);
        let modified = lines(&["  kept", "new_tail"]);
        let restored = restore_leading_whitespace(&file, 1, &modified);
        assert_eq!(restored[0], "  kept");
        // start+1 is past the end; indent comes from the line before.
        assert_eq!(restored[1], "  new_tail");
    }

    #[test]
    fn single_patch_applies_and_writes_backup() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.go", "package main\n\nfunc main() {\n\tx := 1\n}\n");
        let blocks = vec![block("a.go", &["\tx := 1"], &["\tx := 42"], 4)];

        let batch = engine(&dir).apply_blocks(&blocks, true, None).unwrap();
        assert_eq!(batch.reports.len(), 1);
        assert_eq!(batch.reports[0].outcome(), FileOutcome::AllApplied);
        assert!(read_file(&dir, "a.go").contains("x := 42"));
        assert_eq!(read_file(&dir, "a.go.backup"), "package main\n\nfunc main() {\n\tx := 1\n}\n");
    }

    #[test]
    fn unmatched_lines_outside_patches_stay_byte_identical() {
        let dir = TempDir::new().unwrap();
        let original = "alpha\nbeta\ngamma\ndelta\nepsilon\n";
        write_file(&dir, "f.txt", original);
        let blocks = vec![block("f.txt", &["gamma"], &["GAMMA"], 3)];

        engine(&dir).apply_blocks(&blocks, true, None).unwrap();
        assert_eq!(read_file(&dir, "f.txt"), "alpha\nbeta\nGAMMA\ndelta\nepsilon\n");
    }

    #[test]
    fn partial_validation_applies_only_valid_blocks_in_auto_mode() {
        let dir = TempDir::new().unwrap();
        let content: String = (0..20).map(|i| format!("line{i}\n")).collect();
        write_file(&dir, "a.go", &content);

        let good = block("a.go", &["line2", "line3"], &["LINE2", "LINE3"], 3);
        let bad = block("a.go", &["line8", "nothere"], &["x", "y"], 9); // 50% match
        let batch = engine(&dir)
            .apply_blocks(&[good, bad], true, None)
            .unwrap();

        let report = &batch.reports[0];
        assert_eq!(report.applied, 1);
        assert_eq!(report.total, 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.outcome(),
            FileOutcome::PartiallyApplied {
                applied: 1,
                total: 2
            }
        );
        let result = read_file(&dir, "a.go");
        assert!(result.contains("LINE2"));
        assert!(result.contains("line8"));
    }

    #[test]
    fn interactive_decline_aborts_the_file() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.go", "one\ntwo\n");
        let good = block("a.go", &["one"], &["ONE"], 1);
        let bad = block("a.go", &["missing"], &["x"], 1);

        let batch = engine(&dir)
            .apply_blocks(&[good, bad], false, Some(&AlwaysNo))
            .unwrap();
        assert!(batch.reports.is_empty());
        assert!(matches!(
            batch.failures[0].1,
            PatchError::OperatorDeclined { .. }
        ));
        // Nothing was written.
        assert_eq!(read_file(&dir, "a.go"), "one\ntwo\n");
    }

    #[test]
    fn interactive_confirm_applies_valid_subset() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.go", "one\ntwo\n");
        let good = block("a.go", &["one"], &["ONE"], 1);
        let bad = block("a.go", &["missing"], &["x"], 1);

        let batch = engine(&dir)
            .apply_blocks(&[good, bad], false, Some(&AlwaysYes))
            .unwrap();
        assert_eq!(batch.reports[0].applied, 1);
        assert!(read_file(&dir, "a.go").contains("ONE"));
    }

    #[test]
    fn all_invalid_blocks_fail_the_file() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.go", "one\ntwo\n");
        let bad = block("a.go", &["missing"], &["x"], 1);

        let batch = engine(&dir).apply_blocks(&[bad], true, None).unwrap();
        assert!(matches!(
            batch.failures[0].1,
            PatchError::NoValidPatches { .. }
        ));
    }

    #[test]
    fn multiple_patches_apply_in_reverse_order() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.py", "a\nb\nc\nd\ne\nf\n");
        let first = block("a.py", &["b"], &["b1", "b2"], 2); // grows the file
        let second = block("a.py", &["e"], &["E"], 5);

        let batch = engine(&dir)
            .apply_blocks(&[first, second], true, None)
            .unwrap();
        assert_eq!(batch.reports[0].applied, 2);
        assert_eq!(read_file(&dir, "a.py"), "a\nb1\nb2\nc\nd\nE\nf\n");
    }

    #[test]
    fn sandbox_violation_aborts_only_that_file() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "ok.txt", "keep\n");
        let escape = block("../outside.txt", &["x"], &["y"], 1);
        let fine = block("ok.txt", &["keep"], &["kept"], 1);

        let batch = engine(&dir)
            .apply_blocks(&[escape, fine], true, None)
            .unwrap();
        assert_eq!(batch.failures.len(), 1);
        assert!(matches!(batch.failures[0].1, PatchError::Sandbox(_)));
        assert_eq!(batch.reports.len(), 1);
        assert!(read_file(&dir, "ok.txt").contains("kept"));
        assert!(!dir.path().parent().unwrap().join("outside.txt").exists());
    }

    #[test]
    fn skip_backup_leaves_no_backup_file() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.txt", "old\n");
        let engine = engine(&dir).with_skip_backup(true);
        let blocks = vec![block("a.txt", &["old"], &["new"], 1)];

        let batch = engine.apply_blocks(&blocks, true, None).unwrap();
        assert!(batch.reports[0].backup.is_none());
        assert!(!dir.path().join("a.txt.backup").exists());
    }

    #[test]
    fn overlapping_ranges_let_the_later_application_win() {
        // Documented source behavior: overlaps are not detected; patches
        // apply by descending start, so the lower-start patch applies last
        // over the already-modified lines.
        let dir = TempDir::new().unwrap();
        write_file(&dir, "a.txt", "p\nq\nr\ns\n");
        let wide = block("a.txt", &["p", "q", "r"], &["WIDE"], 1);
        let narrow = block("a.txt", &["q", "r"], &["NARROW"], 2);

        let batch = engine(&dir)
            .apply_blocks(&[wide, narrow], true, None)
            .unwrap();
        assert_eq!(batch.reports[0].applied, 2);
        let result = read_file(&dir, "a.txt");
        assert!(result.contains("WIDE"));
    }

    #[test]
    fn empty_batch_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            engine(&dir).apply_blocks(&[], true, None),
            Err(PatchError::EmptyBatch)
        ));
    }
}
