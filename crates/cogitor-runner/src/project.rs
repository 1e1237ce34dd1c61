//! Project analysis for multi-file generations.

use std::path::Path;

use cogitor_protocol::CodeFile;
use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Derived build configuration for a set of generated files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub language: Option<Language>,
    pub entry_point: Option<String>,
    pub files: Vec<String>,
    pub compile_command: Option<String>,
    pub run_command: Option<String>,
    pub args: Vec<String>,
    pub has_makefile: bool,
    pub has_module_manifest: bool,
    /// Path to `__main__.py` when the project is a Python package.
    pub package_main_path: Option<String>,
}

/// Picks an entry point and build commands from a set of code files.
#[derive(Debug)]
pub struct ProjectAnalyzer {
    files: Vec<CodeFile>,
}

impl ProjectAnalyzer {
    pub fn new(files: Vec<CodeFile>) -> Self {
        Self { files }
    }

    pub fn analyze(&self) -> ProjectConfig {
        let language = self.majority_language();
        let entry_point = self.find_entry_point(language);
        let has_makefile = self.has_file("Makefile");
        let has_module_manifest = self.has_file("go.mod");
        let package_main_path = self.find_package_main();

        let mut config = ProjectConfig {
            language,
            entry_point,
            files: self.files.iter().map(|f| f.path.clone()).collect(),
            compile_command: None,
            run_command: None,
            args: Vec::new(),
            has_makefile,
            has_module_manifest,
            package_main_path,
        };
        let (compile, run) = self.build_commands(&config);
        config.compile_command = compile;
        config.run_command = run;
        config
    }

    /// Entry-point candidates: the convention pick, anything named "main",
    /// and `__main__.py`, sorted for stable display.
    pub fn available_entry_points(&self) -> Vec<String> {
        let mut points: Vec<String> = Vec::new();
        if let Some(entry) = self.find_entry_point(self.majority_language()) {
            points.push(entry);
        }
        for file in &self.files {
            let base = basename(&file.path);
            if base.contains("main") && !points.contains(&file.path) {
                points.push(file.path.clone());
            }
        }
        if let Some(main) = self.find_package_main() {
            if !points.contains(&main) {
                points.push(main);
            }
        }
        points.sort();
        points
    }

    fn majority_language(&self) -> Option<Language> {
        let mut counts: Vec<(Language, usize)> = Vec::new();
        for file in &self.files {
            if let Some(lang) = Language::from_path(Path::new(&file.path)) {
                match counts.iter_mut().find(|(l, _)| *l == lang) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((lang, 1)),
                }
            }
        }
        counts.into_iter().max_by_key(|(_, n)| *n).map(|(l, _)| l)
    }

    fn find_entry_point(&self, language: Option<Language>) -> Option<String> {
        let conventions: &[&str] = match language? {
            Language::Go => &["main.go", "cmd/main.go", "src/main.go"],
            Language::C => &["main.c", "src/main.c"],
            Language::Cpp => &["main.cpp", "main.cc", "src/main.cpp"],
            Language::Python => &["main.py", "__main__.py", "app.py"],
            Language::Ruby => &["main.rb", "app.rb"],
            Language::Fortran => &["main.f90", "program.f90"],
            Language::Swift => &["main.swift"],
            Language::Kotlin => &["Main.kt", "main.kt"],
            Language::Lisp => &["main.lisp", "main.cl"],
            Language::Assembly => &["main.asm"],
            Language::Html | Language::Text => &[],
        };
        for convention in conventions {
            if let Some(file) = self
                .files
                .iter()
                .find(|f| basename(&f.path) == basename(convention))
            {
                return Some(file.path.clone());
            }
        }

        // Fall back to any file with "main" in its name.
        if let Some(file) = self
            .files
            .iter()
            .find(|f| basename(&f.path).contains("main"))
        {
            return Some(file.path.clone());
        }

        // Last resort: the first file of the majority language.
        self.files
            .iter()
            .find(|f| Language::from_path(Path::new(&f.path)) == language)
            .map(|f| f.path.clone())
    }

    fn has_file(&self, name: &str) -> bool {
        self.files.iter().any(|f| basename(&f.path) == name)
    }

    fn find_package_main(&self) -> Option<String> {
        self.files
            .iter()
            .find(|f| basename(&f.path) == "__main__.py")
            .map(|f| f.path.clone())
    }

    fn files_with_suffixes(&self, suffixes: &[&str]) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| {
                let lower = f.path.to_ascii_lowercase();
                suffixes.iter().any(|s| lower.ends_with(s))
            })
            .map(|f| f.path.clone())
            .collect()
    }

    fn build_commands(&self, config: &ProjectConfig) -> (Option<String>, Option<String>) {
        let entry = config.entry_point.as_deref();
        match config.language {
            Some(Language::Go) => {
                if config.has_module_manifest {
                    (Some("go build -o main .".to_string()), Some("./main".to_string()))
                } else if let Some(entry) = entry {
                    (Some(format!("go build -o main {entry}")), Some("./main".to_string()))
                } else {
                    (None, None)
                }
            }
            Some(Language::C) => {
                compiled_commands("gcc", &self.files_with_suffixes(&[".c"]), entry)
            }
            Some(Language::Cpp) => {
                compiled_commands("g++", &self.files_with_suffixes(&[".cpp", ".cc"]), entry)
            }
            Some(Language::Fortran) => compiled_commands(
                "gfortran",
                &self.files_with_suffixes(&[".f90", ".f95", ".f"]),
                entry,
            ),
            Some(Language::Python) => {
                if let Some(main) = &config.package_main_path {
                    let package = Path::new(main)
                        .parent()
                        .and_then(|p| p.file_name())
                        .and_then(|n| n.to_str())
                        .unwrap_or("main");
                    (None, Some(format!("python3 -m {package}")))
                } else {
                    (None, entry.map(|e| format!("python3 {e}")))
                }
            }
            Some(Language::Ruby) => (None, entry.map(|e| format!("ruby {e}"))),
            Some(Language::Kotlin) => (
                entry.map(|e| format!("kotlinc -include-runtime {e} -d main.jar")),
                Some("java -jar main.jar".to_string()),
            ),
            Some(Language::Swift) => (
                entry.map(|e| format!("swiftc {e} -o main")),
                Some("./main".to_string()),
            ),
            Some(Language::Lisp) => (None, entry.map(|e| format!("sbcl --script {e}"))),
            Some(Language::Assembly) => (
                entry.map(|e| {
                    let stem = e.trim_end_matches(".asm");
                    format!("nasm -f elf64 {e} -o {stem}.o && ld -o {stem} {stem}.o")
                }),
                entry.map(|e| format!("./{}", e.trim_end_matches(".asm"))),
            ),
            _ => (None, None),
        }
    }
}

fn compiled_commands(
    compiler: &str,
    sources: &[String],
    entry: Option<&str>,
) -> (Option<String>, Option<String>) {
    let compile = if sources.len() > 1 {
        Some(format!("{compiler} {} -o main", sources.join(" ")))
    } else {
        entry.map(|e| format!("{compiler} {e} -o main"))
    };
    (compile, Some("./main".to_string()))
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_file(path: &str) -> CodeFile {
        CodeFile {
            path: path.to_string(),
            content: "x".to_string(),
            compile: None,
        }
    }

    #[test]
    fn majority_language_wins() {
        let analyzer = ProjectAnalyzer::new(vec![
            code_file("a.py"),
            code_file("b.py"),
            code_file("helper.c"),
        ]);
        let config = analyzer.analyze();
        assert_eq!(config.language, Some(Language::Python));
    }

    #[test]
    fn entry_point_prefers_name_conventions() {
        let analyzer = ProjectAnalyzer::new(vec![code_file("util.go"), code_file("main.go")]);
        let config = analyzer.analyze();
        assert_eq!(config.entry_point.as_deref(), Some("main.go"));
    }

    #[test]
    fn entry_point_falls_back_to_main_in_name() {
        let analyzer =
            ProjectAnalyzer::new(vec![code_file("util.py"), code_file("run_mainline.py")]);
        let config = analyzer.analyze();
        assert_eq!(config.entry_point.as_deref(), Some("run_mainline.py"));
    }

    #[test]
    fn entry_point_falls_back_to_first_of_majority_language() {
        let analyzer = ProjectAnalyzer::new(vec![code_file("alpha.rb"), code_file("beta.rb")]);
        let config = analyzer.analyze();
        assert_eq!(config.entry_point.as_deref(), Some("alpha.rb"));
    }

    #[test]
    fn go_module_project_builds_with_module_tool() {
        let analyzer = ProjectAnalyzer::new(vec![
            code_file("main.go"),
            code_file("go.mod"),
            code_file("util.go"),
        ]);
        let config = analyzer.analyze();
        assert!(config.has_module_manifest);
        assert_eq!(config.compile_command.as_deref(), Some("go build -o main ."));
        assert_eq!(config.run_command.as_deref(), Some("./main"));
    }

    #[test]
    fn multi_file_c_project_compiles_all_sources() {
        let analyzer = ProjectAnalyzer::new(vec![
            code_file("main.c"),
            code_file("util.c"),
            code_file("util.h"),
        ]);
        let config = analyzer.analyze();
        assert_eq!(
            config.compile_command.as_deref(),
            Some("gcc main.c util.c -o main")
        );
        assert_eq!(config.run_command.as_deref(), Some("./main"));
    }

    #[test]
    fn python_package_runs_with_module_flag() {
        let analyzer = ProjectAnalyzer::new(vec![
            code_file("tool/__main__.py"),
            code_file("tool/core.py"),
        ]);
        let config = analyzer.analyze();
        assert_eq!(config.package_main_path.as_deref(), Some("tool/__main__.py"));
        assert_eq!(config.run_command.as_deref(), Some("python3 -m tool"));
    }

    #[test]
    fn makefile_is_detected() {
        let analyzer = ProjectAnalyzer::new(vec![code_file("Makefile"), code_file("main.c")]);
        let config = analyzer.analyze();
        assert!(config.has_makefile);
    }

    #[test]
    fn available_entry_points_are_sorted_and_unique() {
        let analyzer = ProjectAnalyzer::new(vec![
            code_file("main.py"),
            code_file("pkg/__main__.py"),
            code_file("mainframe.py"),
        ]);
        let points = analyzer.available_entry_points();
        assert_eq!(points, vec!["main.py", "mainframe.py", "pkg/__main__.py"]);
    }
}
