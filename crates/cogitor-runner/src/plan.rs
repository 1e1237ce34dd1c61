//! Build-plan construction.
//!
//! A plan is zero or more compile steps followed by a run action, all
//! executed in the file's directory. A `CompileInfo` command replaces the
//! default compile command verbatim; flags append to it.

use std::path::{Path, PathBuf};

use cogitor_protocol::CompileInfo;

use crate::error::{RunnerError, RunnerResult};
use crate::exec::Exec;
use crate::language::Language;

/// What happens after the compile steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunAction {
    Exec(Exec),
    /// HTML files open in the browser instead of executing.
    OpenBrowser(PathBuf),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub compile_steps: Vec<Exec>,
    pub run: RunAction,
    pub cwd: PathBuf,
}

/// Build the compile/run plan for a single file.
pub fn build_plan(
    file: &Path,
    language: Language,
    compile_info: Option<&CompileInfo>,
) -> RunnerResult<BuildPlan> {
    let cwd = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RunnerError::UnsupportedLanguage(file.display().to_string()))?
        .to_string();
    let stem = file
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or(&filename)
        .to_string();

    // A full command from the LLM replaces the default verbatim. When it
    // names an output with -o, that output is executed afterwards.
    if let Some(command) = compile_info.and_then(CompileInfo::command) {
        let exec = Exec::from_command_line(command)
            .ok_or_else(|| RunnerError::UnsupportedLanguage(filename.clone()))?;
        let output = exec
            .args
            .iter()
            .position(|a| a == "-o")
            .and_then(|i| exec.args.get(i + 1))
            .cloned();
        let run = match output {
            Some(out) if language.needs_compile() => {
                RunAction::Exec(Exec::new(format!("./{out}"), Vec::new()))
            }
            _ if language.needs_compile() => RunAction::None,
            _ => RunAction::None,
        };
        return Ok(if language.needs_compile() {
            BuildPlan {
                compile_steps: vec![exec],
                run,
                cwd,
            }
        } else {
            BuildPlan {
                compile_steps: Vec::new(),
                run: RunAction::Exec(exec),
                cwd,
            }
        });
    }

    let flags: Vec<String> = compile_info
        .and_then(CompileInfo::flags)
        .map(|f| f.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let plan = match language {
        Language::Go => {
            let mut args = vec!["run".to_string()];
            args.extend(flags);
            args.push(filename);
            BuildPlan {
                compile_steps: Vec::new(),
                run: RunAction::Exec(Exec::new("go", args)),
                cwd,
            }
        }
        Language::Python => {
            // Flags for Python are KEY=VALUE environment entries.
            let env: Vec<(String, String)> = flags
                .iter()
                .filter_map(|f| {
                    f.split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                })
                .collect();
            BuildPlan {
                compile_steps: Vec::new(),
                run: RunAction::Exec(Exec::new("python3", vec![filename]).with_env(env)),
                cwd,
            }
        }
        Language::Ruby => BuildPlan {
            compile_steps: Vec::new(),
            run: RunAction::Exec(Exec::new("ruby", vec![filename])),
            cwd,
        },
        Language::Lisp => BuildPlan {
            compile_steps: Vec::new(),
            run: RunAction::Exec(Exec::new("sbcl", vec!["--script".to_string(), filename])),
            cwd,
        },
        Language::C | Language::Cpp | Language::Fortran | Language::Swift => {
            let compiler = match language {
                Language::C => "gcc",
                Language::Cpp => "g++",
                Language::Fortran => "gfortran",
                Language::Swift => "swiftc",
                _ => unreachable!(),
            };
            let mut args = flags;
            args.extend(["-o".to_string(), stem.clone(), filename]);
            BuildPlan {
                compile_steps: vec![Exec::new(compiler, args)],
                run: RunAction::Exec(Exec::new(format!("./{stem}"), Vec::new())),
                cwd,
            }
        }
        Language::Kotlin => {
            let jar = format!("{stem}.jar");
            let mut args = flags;
            args.extend([
                "-include-runtime".to_string(),
                "-d".to_string(),
                jar.clone(),
                filename,
            ]);
            BuildPlan {
                compile_steps: vec![Exec::new("kotlinc", args)],
                run: RunAction::Exec(Exec::new("java", vec!["-jar".to_string(), jar])),
                cwd,
            }
        }
        Language::Assembly => {
            let object = format!("{stem}.o");
            let mut nasm_args = flags;
            nasm_args.extend([
                "-f".to_string(),
                "elf64".to_string(),
                filename,
                "-o".to_string(),
                object.clone(),
            ]);
            BuildPlan {
                compile_steps: vec![
                    Exec::new("nasm", nasm_args),
                    Exec::new("ld", vec!["-o".to_string(), stem.clone(), object]),
                ],
                run: RunAction::Exec(Exec::new(format!("./{stem}"), Vec::new())),
                cwd,
            }
        }
        Language::Html => BuildPlan {
            compile_steps: Vec::new(),
            run: RunAction::OpenBrowser(file.to_path_buf()),
            cwd,
        },
        Language::Text => BuildPlan {
            compile_steps: Vec::new(),
            run: RunAction::None,
            cwd,
        },
    };

    Ok(plan)
}
