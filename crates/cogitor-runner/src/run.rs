//! Single-file and project execution.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::info;

use cogitor_protocol::CompileInfo;

use crate::error::{RunnerError, RunnerResult};
use crate::exec::{run_captured, Exec, ExecOutput};
use crate::language::Language;
use crate::plan::{build_plan, RunAction};
use crate::project::ProjectConfig;

/// Result of building and running one target. Exit code zero is success;
/// anything else carries the combined compiler/runtime output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success { output: String },
    Failure { output: String },
    /// HTML targets are not executed; the caller opens this URL.
    BrowserTarget { url: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Failure { .. })
    }
}

/// Compile (when needed) and execute a single file.
pub async fn run_file(
    scope: &CancellationToken,
    file: &Path,
    compile_info: Option<&CompileInfo>,
) -> RunnerResult<RunOutcome> {
    let language = Language::from_path(file)
        .ok_or_else(|| RunnerError::UnsupportedLanguage(file.display().to_string()))?;
    if !language.is_runnable() {
        return Ok(RunOutcome::Success {
            output: String::new(),
        });
    }

    let plan = build_plan(file, language, compile_info)?;

    for step in &plan.compile_steps {
        let result = run_captured(scope, step, &plan.cwd).await?;
        if !result.success {
            return Ok(RunOutcome::Failure {
                output: result.output,
            });
        }
    }

    match plan.run {
        RunAction::Exec(exec) => {
            let result = run_captured(scope, &exec, &plan.cwd).await?;
            Ok(if result.success {
                RunOutcome::Success {
                    output: result.output,
                }
            } else {
                RunOutcome::Failure {
                    output: result.output,
                }
            })
        }
        RunAction::OpenBrowser(path) => {
            let absolute = path.canonicalize().unwrap_or(path);
            Ok(RunOutcome::BrowserTarget {
                url: format!("file://{}", absolute.display()),
            })
        }
        RunAction::None => Ok(RunOutcome::Success {
            output: String::new(),
        }),
    }
}

/// Run one shell command under the scope, in `cwd`.
pub async fn run_shell(
    scope: &CancellationToken,
    command: &str,
    cwd: &Path,
) -> RunnerResult<ExecOutput> {
    let exec = Exec::new("sh", vec!["-c".to_string(), command.to_string()]);
    run_captured(scope, &exec, cwd).await
}

/// Run an install command. Nonzero exit is an `InstallFailed` error with
/// the captured output.
pub async fn run_install(
    scope: &CancellationToken,
    command: &str,
    cwd: &Path,
) -> RunnerResult<()> {
    info!(command, "installing dependencies");
    let result = run_shell(scope, command, cwd).await?;
    if result.success {
        Ok(())
    } else {
        Err(RunnerError::InstallFailed(result.output))
    }
}

/// Run a multi-file project according to its analyzed configuration.
pub async fn run_project(
    scope: &CancellationToken,
    root: &Path,
    config: &ProjectConfig,
) -> RunnerResult<RunOutcome> {
    if config.language == Some(Language::Text) {
        return Ok(RunOutcome::Success {
            output: String::new(),
        });
    }

    if config.has_makefile {
        let result = run_shell(scope, "make", root).await?;
        if !result.success {
            return Ok(RunOutcome::Failure {
                output: result.output,
            });
        }
        return match &config.run_command {
            Some(run) => shell_outcome(scope, &with_args(run, &config.args), root).await,
            None => Ok(RunOutcome::Success {
                output: result.output,
            }),
        };
    }

    if config.language == Some(Language::Go) && config.has_module_manifest {
        let command = with_args("go run .", &config.args);
        return shell_outcome(scope, &command, root).await;
    }

    if let Some(compile) = &config.compile_command {
        let result = run_shell(scope, compile, root).await?;
        if !result.success {
            return Ok(RunOutcome::Failure {
                output: result.output,
            });
        }
    }

    if let Some(run) = &config.run_command {
        return shell_outcome(scope, &with_args(run, &config.args), root).await;
    }

    match &config.entry_point {
        Some(entry) => run_file(scope, &root.join(entry), None).await,
        None => Err(RunnerError::NoEntryPoint),
    }
}

async fn shell_outcome(
    scope: &CancellationToken,
    command: &str,
    cwd: &Path,
) -> RunnerResult<RunOutcome> {
    let result = run_shell(scope, command, cwd).await?;
    Ok(if result.success {
        RunOutcome::Success {
            output: result.output,
        }
    } else {
        RunOutcome::Failure {
            output: result.output,
        }
    })
}

fn with_args(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{command} {}", args.join(" "))
    }
}
