//! The request controller: one cancellable scope per query, dispatch by
//! request shape, and materialization of the classified reply.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cogitor_context::{extract_references, Reference};
use cogitor_patch::{ApplyPrompt, DiffEngine};
use cogitor_protocol::{parse_code_blocks, parse_diff_blocks, CodeFile, CompileInfo};
use cogitor_runner::{
    run_install, run_project, ProjectAnalyzer, RepairLoop, RepairMode, RunOutcome, RunnerError,
};

use crate::error::{EngineError, EngineResult};
use crate::prompt::{
    build_diff_prompt, build_prompt, build_url_prompt, explicit_search_query, has_code_marker,
    has_diff_marker, has_internet_marker, strip_markers, EXPLICIT_SEARCH_PHRASE,
};
use crate::session::Session;
use crate::websearch::{detect_language, fetch_top_text, should_search};
use crate::sys;

/// Hooks into the interactive collaborator. Auto mode never consults them.
pub trait OperatorPrompt: Send + Sync {
    /// Yes/no question; false aborts the guarded action.
    fn confirm(&self, question: &str) -> bool;
    /// Free-text input; `None` accepts the default.
    fn input(&self, prompt: &str) -> Option<String>;
}

/// Operator stand-in for non-interactive surfaces: confirms everything,
/// accepts every default.
pub struct AutoPilot;

impl OperatorPrompt for AutoPilot {
    fn confirm(&self, _question: &str) -> bool {
        true
    }
    fn input(&self, _prompt: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileIssue {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileApplySummary {
    pub path: String,
    pub applied: usize,
    pub total: usize,
    pub warnings: Vec<String>,
    pub apply_errors: Vec<String>,
}

/// Result of a `$diff` request: per-file apply summaries plus the build
/// checks that ran afterwards.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DiffReport {
    pub files: Vec<FileApplySummary>,
    pub failures: Vec<FileIssue>,
    pub check_errors: Vec<FileIssue>,
}

impl DiffReport {
    pub fn applied(&self) -> usize {
        self.files.iter().map(|f| f.applied).sum()
    }
    pub fn total(&self) -> usize {
        self.files.iter().map(|f| f.total).sum()
    }
}

/// Result of a code-generation reply: what landed on disk and how the run
/// went.
#[derive(Debug, Clone, Serialize, Default)]
pub struct GenerationReport {
    pub written: Vec<String>,
    pub skipped: Vec<FileIssue>,
    /// Install commands surfaced for manual execution.
    pub pending_installs: Vec<String>,
    pub run_output: Option<String>,
    pub run_error: Option<String>,
}

/// What one user request produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// A `:command`, forwarded to the command collaborator untouched.
    Command { raw: String },
    Prose { text: String },
    CodeGeneration(GenerationReport),
    DiffApplied(DiffReport),
    UrlOpened { url: String },
    /// The operator declined a guarded action.
    Declined { reason: String },
}

struct PartialApplyPrompt<'a> {
    operator: &'a dyn OperatorPrompt,
}

impl ApplyPrompt for PartialApplyPrompt<'_> {
    fn confirm_partial(&self, path: &str, valid: usize, total: usize) -> bool {
        self.operator.confirm(&format!(
            "Apply only {valid} valid patches out of {total} for {path}? (y/n)"
        ))
    }
}

impl Session {
    /// Process one free-text query. At most one request is in flight:
    /// entering here cancels the previous scope and installs a new one;
    /// the slot is cleared on every exit path.
    pub async fn process_query(
        self: &Arc<Self>,
        query: &str,
        auto_mode: bool,
        operator: &dyn OperatorPrompt,
    ) -> EngineResult<QueryOutcome> {
        let query = query.trim();
        if let Some(stripped) = query.strip_prefix(':') {
            return Ok(QueryOutcome::Command {
                raw: format!(":{stripped}"),
            });
        }

        let scope = self.begin_request();
        let token = scope.token().clone();
        info!(query, "processing request");

        if has_diff_marker(query) {
            return self.handle_diff_request(&token, query, auto_mode, operator).await;
        }
        if has_internet_marker(query) {
            return self.handle_internet_request(&token, query, auto_mode, operator).await;
        }
        self.handle_general_query(&token, query, auto_mode, operator).await
    }

    async fn handle_general_query(
        self: &Arc<Self>,
        token: &CancellationToken,
        query: &str,
        auto_mode: bool,
        operator: &dyn OperatorPrompt,
    ) -> EngineResult<QueryOutcome> {
        let references = extract_references(query);
        let is_text_request = is_text_file_request(&references);
        let mut context = self.assemble_context(token, &references).await;

        let config = self.config_snapshot();

        // The explicit search phrase always triggers a search; the
        // web_search flag gates only the automatic detection below.
        let mut explicit_search_done = false;
        if !auto_mode {
            if let Some((search_query, additional)) =
                explicit_search_query(query, EXPLICIT_SEARCH_PHRASE)
            {
                explicit_search_done = true;
                match fetch_top_text(&self.http, token, &search_query).await {
                    Ok(result) => {
                        context.push_str(&Session::render_search_section(&result, &additional));
                    }
                    Err(EngineError::CancelledByUser) => {
                        return Err(EngineError::CancelledByUser)
                    }
                    Err(err) => {
                        warn!(error = %err, "web search failed");
                        context.push_str("\n[internet search failed]\n");
                    }
                }
            }
        }

        if config.web_search && !auto_mode && !explicit_search_done {
            let language = detect_language(query);
            if let Some(reason) = should_search(query, language) {
                info!(reason, "automatic web search");
                match fetch_top_text(&self.http, token, query).await {
                    Ok(result) => {
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
                        context.push_str("\nInformation from the internet:\n");
                        context.push_str(&result.summary);
                        context.push_str(&format!("\nSources: {sources}"));
                        context.push_str(
                            "\nUse this information for the answer, but do not \
                             invent anything yourself.\n",
                        );
                    }
                    Err(EngineError::CancelledByUser) => {
                        return Err(EngineError::CancelledByUser)
                    }
                    Err(err) => {
                        warn!(error = %err, "automatic web search failed");
                    }
                }
            }
        }

        let prompt = build_prompt(query, &context, is_text_request);
        let response = self.send_llm(token, &prompt, "llm").await?;
        if token.is_cancelled() {
            return Err(EngineError::CancelledByUser);
        }

        let files = parse_code_blocks(&response);
        if files.is_empty() {
            self.history.add(query, &response).await;
            if config.auto_copy_responses && !has_code_marker(query) && !response.is_empty() {
                if let Err(err) = sys::write_clipboard(&response) {
                    warn!(error = %err, "clipboard copy failed");
                }
            }
            return Ok(QueryOutcome::Prose { text: response });
        }

        let report = self
            .process_code_generation(token, files, auto_mode, is_text_request, operator)
            .await?;
        self.history.add(query, &response).await;
        Ok(QueryOutcome::CodeGeneration(report))
    }

    async fn handle_diff_request(
        self: &Arc<Self>,
        token: &CancellationToken,
        query: &str,
        auto_mode: bool,
        operator: &dyn OperatorPrompt,
    ) -> EngineResult<QueryOutcome> {
        let clean_query = strip_markers(query, &["$diff", "$patch"]);
        let references = extract_references(query);
        let target_files: Vec<String> = references
            .iter()
            .filter_map(|r| match r {
                Reference::File { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect();
        if target_files.is_empty() {
            return Err(EngineError::NoReferencesResolved);
        }

        // Diff prompts always see whole files, whatever range the
        // reference carried.
        let mut context = String::new();
        for path in &target_files {
            context.push_str(&self.read_single_file(&Reference::File {
                path: path.clone(),
                line_start: 0,
                line_end: 0,
                is_absolute: false,
            }));
        }

        let prompt = build_diff_prompt(&clean_query, &context, &target_files);
        let response = self.send_llm(token, &prompt, "diff").await?;
        let blocks = parse_diff_blocks(&response);
        if blocks.is_empty() {
            return Err(EngineError::ParseFailed(
                "no diff blocks found in the reply".to_string(),
            ));
        }

        if !auto_mode {
            let file_count = blocks
                .iter()
                .map(|b| b.file_path.as_str())
                .collect::<std::collections::BTreeSet<_>>()
                .len();
            let question = format!(
                "Apply {} patches across {} files? (y/n)",
                blocks.len(),
                file_count
            );
            if !operator.confirm(&question) {
                return Ok(QueryOutcome::Declined {
                    reason: "patch application declined".to_string(),
                });
            }
        }
        if token.is_cancelled() {
            return Err(EngineError::CancelledByUser);
        }

        let engine = DiffEngine::new(self.sandbox.clone());
        let prompt_adapter = PartialApplyPrompt { operator };
        let batch = engine.apply_blocks(&blocks, auto_mode, Some(&prompt_adapter))?;

        let mut report = DiffReport {
            files: batch
                .reports
                .iter()
                .map(|r| FileApplySummary {
                    path: r.path.clone(),
                    applied: r.applied,
                    total: r.total,
                    warnings: r.warnings.clone(),
                    apply_errors: r.apply_errors.clone(),
                })
                .collect(),
            failures: batch
                .failures
                .iter()
                .map(|(path, err)| FileIssue {
                    path: path.clone(),
                    error: err.to_string(),
                })
                .collect(),
            check_errors: Vec::new(),
        };

        // Verify every touched file, feeding build errors back to the LLM.
        let config = self.config_snapshot();
        let triple = self.provider_triple();
        for summary in &report.files {
            let compile_info = blocks
                .iter()
                .find(|b| b.file_path == summary.path && b.compile.is_some())
                .and_then(|b| b.compile.clone());
            let repair = RepairLoop::new(self.as_ref(), triple.model.clone())
                .with_api_key(triple.api_key.clone())
                .with_max_retries(config.max_retries);
            match repair
                .repair_file(token, &self.sandbox, &summary.path, compile_info, RepairMode::Diff)
                .await
            {
                Ok(_) => {}
                Err(RunnerError::Cancelled) => return Err(EngineError::CancelledByUser),
                Err(err) => report.check_errors.push(FileIssue {
                    path: summary.path.clone(),
                    error: err.to_string(),
                }),
            }
        }

        self.history.add(query, &response).await;
        Ok(QueryOutcome::DiffApplied(report))
    }

    async fn handle_internet_request(
        self: &Arc<Self>,
        token: &CancellationToken,
        query: &str,
        auto_mode: bool,
        operator: &dyn OperatorPrompt,
    ) -> EngineResult<QueryOutcome> {
        let clean_query = strip_markers(query, &["$internet", "$int"]);
        if clean_query.is_empty() {
            return Err(EngineError::ParseFailed(
                "empty request after removing the $internet marker".to_string(),
            ));
        }

        let response = self
            .send_llm(token, &build_url_prompt(&clean_query), "internet")
            .await?;
        let url = response
            .trim()
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(EngineError::ParseFailed(format!(
                "the reply is not a valid URL: {url}"
            )));
        }

        if !auto_mode && !operator.confirm(&format!("Open {url} in the browser? (y/n)")) {
            return Ok(QueryOutcome::Declined {
                reason: "browser open declined".to_string(),
            });
        }
        if token.is_cancelled() {
            return Err(EngineError::CancelledByUser);
        }

        sys::open_url_in_browser(&url)?;
        self.history.add(query, &format!("Opened URL: {url}")).await;
        Ok(QueryOutcome::UrlOpened { url })
    }

    /// Write a whole-file generation to disk, install dependencies, and
    /// (interactively) run the result under the repair loop.
    async fn process_code_generation(
        self: &Arc<Self>,
        token: &CancellationToken,
        files: Vec<CodeFile>,
        auto_mode: bool,
        is_text_request: bool,
        operator: &dyn OperatorPrompt,
    ) -> EngineResult<GenerationReport> {
        let mut report = GenerationReport::default();

        for file in &files {
            match self.sandbox.resolve(&file.path) {
                Ok(resolved) => {
                    if let Some(parent) = resolved.parent() {
                        if let Err(err) = std::fs::create_dir_all(parent) {
                            report.skipped.push(FileIssue {
                                path: file.path.clone(),
                                error: err.to_string(),
                            });
                            continue;
                        }
                    }
                    match std::fs::write(&resolved, &file.content) {
                        Ok(()) => report.written.push(file.path.clone()),
                        Err(err) => report.skipped.push(FileIssue {
                            path: file.path.clone(),
                            error: err.to_string(),
                        }),
                    }
                }
                Err(err) => {
                    warn!(path = %file.path, error = %err, "write target refused");
                    report.skipped.push(FileIssue {
                        path: file.path.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        let config = self.config_snapshot();
        let installs: Vec<String> = files
            .iter()
            .filter_map(|f| f.compile.as_ref())
            .filter_map(|c| c.install_command.clone())
            .collect();
        if !installs.is_empty() {
            if config.skip_install {
                report.pending_installs = installs;
            } else {
                let proceed =
                    auto_mode || operator.confirm("Install the required dependencies? (y/n)");
                if proceed {
                    for command in &installs {
                        match run_install(token, command, self.working_root()).await {
                            Ok(()) => {}
                            Err(RunnerError::Cancelled) => {
                                return Err(EngineError::CancelledByUser)
                            }
                            Err(err) => {
                                if auto_mode
                                    || !operator.confirm(
                                        "Install failed. Install manually and continue? (y/n)",
                                    )
                                {
                                    return Err(err.into());
                                }
                                report.pending_installs.push(command.clone());
                            }
                        }
                    }
                } else {
                    report.pending_installs = installs;
                }
            }
        }

        let should_run =
            (!auto_mode || config.auto_execute) && !is_text_request && !report.written.is_empty();
        if !should_run {
            return Ok(report);
        }

        if report.written.len() == 1 {
            let path = report.written[0].clone();
            let compile_info = files.iter().find(|f| f.path == path).and_then(|f| f.compile.clone());
            self.run_single_generated(token, &path, compile_info, &mut report)
                .await?;
        } else {
            self.run_generated_project(token, &files, operator, &mut report)
                .await?;
        }

        Ok(report)
    }

    async fn run_single_generated(
        self: &Arc<Self>,
        token: &CancellationToken,
        path: &str,
        compile_info: Option<CompileInfo>,
        report: &mut GenerationReport,
    ) -> EngineResult<()> {
        let config = self.config_snapshot();
        let triple = self.provider_triple();
        let repair = RepairLoop::new(self.as_ref(), triple.model)
            .with_api_key(triple.api_key)
            .with_max_retries(config.max_retries);
        match repair
            .repair_file(token, &self.sandbox, path, compile_info, RepairMode::WholeFile)
            .await
        {
            Ok(outcome) => report.run_output = Some(outcome.output),
            Err(RunnerError::Cancelled) => return Err(EngineError::CancelledByUser),
            Err(err) => report.run_error = Some(err.to_string()),
        }
        Ok(())
    }

    async fn run_generated_project(
        self: &Arc<Self>,
        token: &CancellationToken,
        files: &[CodeFile],
        operator: &dyn OperatorPrompt,
        report: &mut GenerationReport,
    ) -> EngineResult<()> {
        let analyzer = ProjectAnalyzer::new(files.to_vec());
        let mut config = analyzer.analyze();

        let candidates = analyzer.available_entry_points();
        if candidates.len() > 1 {
            let menu = candidates
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}. {c}", i + 1))
                .collect::<Vec<_>>()
                .join("\n");
            let default = config.entry_point.clone().unwrap_or_default();
            if let Some(choice) = operator.input(&format!(
                "Entry points:\n{menu}\nChoose one (1-{}, Enter for '{default}'): ",
                candidates.len()
            )) {
                if let Ok(index) = choice.trim().parse::<usize>() {
                    if (1..=candidates.len()).contains(&index) {
                        config.entry_point = Some(candidates[index - 1].clone());
                    }
                }
            }
        }

        if let Some(args) = operator.input("Command line arguments (optional): ") {
            config.args = args.split_whitespace().map(str::to_string).collect();
        }

        match run_project(token, self.working_root(), &config).await {
            Ok(RunOutcome::Success { output }) => report.run_output = Some(output),
            Ok(RunOutcome::Failure { output }) => report.run_error = Some(output),
            Ok(RunOutcome::BrowserTarget { url }) => {
                sys::open_url_in_browser(&url)?;
                report.run_output = Some(format!("opened {url}"));
            }
            Err(RunnerError::Cancelled) => return Err(EngineError::CancelledByUser),
            Err(err) => report.run_error = Some(err.to_string()),
        }
        Ok(())
    }
}

fn is_text_file_request(references: &[Reference]) -> bool {
    references.iter().any(|reference| match reference {
        Reference::Url { .. } => true,
        Reference::File { path, .. } => path.to_lowercase().ends_with(".txt"),
        Reference::AllFiles => false,
    })
}
