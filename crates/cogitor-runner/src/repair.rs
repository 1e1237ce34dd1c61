//! Bounded build-run-reprompt cycles.
//!
//! Each attempt runs the target; on failure the captured compiler/runtime
//! output goes back to the LLM, which answers with either a whole-file
//! replacement or a single-error diff block. Progress stays on disk even
//! when the budget is exhausted.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cogitor_patch::{DiffEngine, PathSandbox};
use cogitor_protocol::{parse_code_blocks, parse_diff_blocks, CompileInfo};
use cogitor_runtime::{ChatProvider, ChatRequest, ProviderError};

use crate::error::{RunnerError, RunnerResult};
use crate::language::Language;
use crate::run::{run_file, RunOutcome};

/// Default attempt budget.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Which envelope the LLM is asked to answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    /// First-pass code generation failures: full file replacement.
    WholeFile,
    /// Diff-request failures: one surgical diff block at a time.
    Diff,
}

/// Successful loop exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub attempts: u32,
    pub output: String,
}

pub struct RepairLoop<'a> {
    provider: &'a dyn ChatProvider,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl<'a> RepairLoop<'a> {
    pub fn new(provider: &'a dyn ChatProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run the file under the attempt budget, feeding failures back to the
    /// LLM. The original file is kept as `<file>.backup` before the first
    /// rewrite.
    pub async fn repair_file(
        &self,
        scope: &CancellationToken,
        sandbox: &PathSandbox,
        rel_path: &str,
        mut compile_info: Option<CompileInfo>,
        mode: RepairMode,
    ) -> RunnerResult<RepairReport> {
        let resolved = sandbox.resolve(rel_path).map_err(cogitor_patch::PatchError::from)?;
        let language = Language::from_path(&resolved)
            .ok_or_else(|| RunnerError::UnsupportedLanguage(rel_path.to_string()))?;

        // Nothing to iterate on for browser and plain-text targets.
        if matches!(language, Language::Html | Language::Text) {
            let outcome = run_file(scope, &resolved, compile_info.as_ref()).await?;
            return Ok(RepairReport {
                attempts: 1,
                output: outcome_text(outcome),
            });
        }

        back_up_original(&resolved)?;
        let diff_engine = DiffEngine::new(sandbox.clone());

        let mut last_error = String::new();
        let mut fixes: u32 = 0;

        for attempt in 1..=self.max_retries {
            if scope.is_cancelled() {
                return Err(RunnerError::Cancelled);
            }
            info!(attempt, max = self.max_retries, path = rel_path, "build attempt");

            match run_file(scope, &resolved, compile_info.as_ref()).await? {
                RunOutcome::Success { output } => {
                    return Ok(RepairReport {
                        attempts: attempt,
                        output,
                    })
                }
                RunOutcome::BrowserTarget { url } => {
                    return Ok(RepairReport {
                        attempts: attempt,
                        output: url,
                    })
                }
                RunOutcome::Failure { output } => {
                    warn!(attempt, path = rel_path, "build failed");
                    last_error = output;
                }
            }

            if attempt == self.max_retries {
                break;
            }

            let current = std::fs::read_to_string(&resolved)?;
            let filename = resolved
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(rel_path);
            let prompt = match mode {
                RepairMode::WholeFile => {
                    whole_file_fix_prompt(filename, &last_error, &current, compile_info.as_ref())
                }
                RepairMode::Diff => diff_fix_prompt(filename, &last_error, &current),
            };

            let request = ChatRequest {
                message: prompt,
                model: self.model.clone(),
                api_key: self.api_key.clone(),
            };
            let reply = match self.provider.send(scope, request).await {
                Ok(reply) => reply,
                Err(ProviderError::Cancelled) => return Err(RunnerError::Cancelled),
                Err(err) if mode == RepairMode::Diff => {
                    // Diff mode keeps trying; the next run may still improve.
                    warn!(error = %err, "fix request failed");
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let applied = match mode {
                RepairMode::WholeFile => {
                    self.apply_whole_file(&resolved, &reply, &mut compile_info)?
                }
                RepairMode::Diff => self.apply_diff_fix(&diff_engine, &resolved, &reply)?,
            };
            if applied {
                fixes += 1;
            }

            tokio::time::sleep(self.retry_delay).await;
        }

        match mode {
            RepairMode::Diff if fixes > 0 => Err(RunnerError::PartialRepair {
                fixes,
                attempts: self.max_retries,
                last_error,
            }),
            _ => Err(RunnerError::BuildExhausted {
                attempts: self.max_retries,
                last_error,
            }),
        }
    }

    fn apply_whole_file(
        &self,
        resolved: &Path,
        reply: &str,
        compile_info: &mut Option<CompileInfo>,
    ) -> RunnerResult<bool> {
        let files = parse_code_blocks(reply);
        let Some(fixed) = files.into_iter().next() else {
            warn!("reply contained no file block");
            return Ok(false);
        };
        std::fs::write(resolved, &fixed.content)?;
        if fixed.compile.is_some() {
            *compile_info = fixed.compile;
        }
        Ok(true)
    }

    fn apply_diff_fix(
        &self,
        engine: &DiffEngine,
        resolved: &Path,
        reply: &str,
    ) -> RunnerResult<bool> {
        let blocks = parse_diff_blocks(reply);
        if blocks.is_empty() {
            // Fall back to a whole-file replacement if the model sent one.
            let files = parse_code_blocks(reply);
            let Some(fixed) = files.into_iter().next() else {
                warn!("reply contained neither diff nor file blocks");
                return Ok(false);
            };
            std::fs::write(resolved, &fixed.content)?;
            return Ok(true);
        }

        match engine.apply_blocks(&blocks, true, None) {
            Ok(batch) => Ok(batch.applied() > 0),
            Err(err) => {
                warn!(error = %err, "diff application failed");
                Ok(false)
            }
        }
    }
}

fn outcome_text(outcome: RunOutcome) -> String {
    match outcome {
        RunOutcome::Success { output } => output,
        RunOutcome::Failure { output } => output,
        RunOutcome::BrowserTarget { url } => url,
    }
}

fn back_up_original(resolved: &Path) -> std::io::Result<()> {
    let mut backup = resolved.as_os_str().to_os_string();
    backup.push(".backup");
    std::fs::copy(resolved, backup).map(|_| ())
}

fn whole_file_fix_prompt(
    filename: &str,
    error_output: &str,
    current_code: &str,
    compile_info: Option<&CompileInfo>,
) -> String {
    let mut prompt = format!(
        "Fix the following code with targeted changes, do not rewrite it from scratch.\n\n\
         File: {filename}\nCompiler/runtime output:\n{error_output}\n"
    );
    if let Some(info) = compile_info {
        if let Some(command) = info.command() {
            prompt.push_str(&format!("Build command in use: {command}\n"));
        } else if let Some(flags) = info.flags() {
            prompt.push_str(&format!("Build flags in use: {flags}\n"));
        }
    }
    prompt.push_str(&format!(
        "\nCURRENT CODE:\n{current_code}\n\n\
         Return ONLY the corrected code in this format:\n\
         --- File: {filename} ---\n\
         <corrected code, no markdown>\n\n\
         If specific build flags are needed, add:\n\
         --- Compile: <language> ---\n\
         <flags or command>\n\n\
         IMPORTANT:\n\
         - no markdown fences\n\
         - keep indentation intact\n\
         - the code must be clean and ready to run\n"
    ));
    prompt
}

fn diff_fix_prompt(filename: &str, error_output: &str, current_code: &str) -> String {
    format!(
        "Fix ONE specific error in the code using ONLY the diff format below. \
         Do not fix everything at once; focus on the first obvious error.\n\n\
         FILE: {filename}\nCompiler output:\n{error_output}\n\n\
         CURRENT CODE:\n{current_code}\n\n\
         RESPONSE FORMAT (diff only):\n\
         --- Diff: {filename} ---\n\
         Original lines X-Y:\n\
         line1\nline2\n\
         Modified:\n\
         new line1\nnew line2\n\n\
         IMPORTANT:\n\
         1. fix only ONE error at a time\n\
         2. keep indentation\n\
         3. give exact line numbers or enough context\n\
         4. return ONLY the diff block, no explanations\n\
         5. never place '--- File:' markers inside code\n"
    )
}
