//! Architectural Enforcement Integration Tests
//!
//! Shared source scanning for the tests in `tests/`, which enforce:
//! - No sleep() calls in production code
//! - No blocking I/O inside async functions
//! - No unwrap()/expect() outside test code
//!
//! The scanner works on lines, not on a syntax tree. It is good enough for
//! the code style of this workspace and cheap enough to run on every test.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Source directories holding production code, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["companion/core/src", "companion/daemon/src"];

/// Workspace root, found from this crate's manifest
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// A Rust file loaded for scanning
#[derive(Debug)]
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// File content split into lines
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Build from in-memory text
    #[must_use]
    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// Code of each line with its context, comments removed
    pub fn code_lines(&self) -> impl Iterator<Item = (usize, &str, Context)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .map(|(idx, line)| (idx, code_part(line), enclosing_context(&self.lines, idx)))
    }

    /// Report a finding on a line
    #[must_use]
    pub fn violation(&self, idx: usize, reason: &str) -> Violation {
        Violation {
            path: self.path.clone(),
            line: idx + 1,
            text: self.lines[idx].trim().to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Load every `.rs` file under [`PRODUCTION_DIRS`]
///
/// # Panics
///
/// Panics if a production directory is missing, so a renamed crate cannot
/// silently drop out of the checks.
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut sources = Vec::new();

    for dir in PRODUCTION_DIRS {
        let dir_path = root.join(dir);
        assert!(
            dir_path.is_dir(),
            "production directory {} does not exist",
            dir_path.display()
        );

        for entry in walkdir::WalkDir::new(&dir_path)
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(content) = fs::read_to_string(path) else {
                continue;
            };
            let relative = path.strip_prefix(&root).unwrap_or(path);
            sources.push(SourceFile::from_text(relative, &content));
        }
    }

    sources
}

/// A line that breaks a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File, relative to the workspace root
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
    /// Which rule it breaks
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.reason,
            self.text
        )
    }
}

/// Where a line sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Outside any function
    Module,
    /// Inside a `#[cfg(test)]` module or a test function
    Test,
    /// Inside an `async fn`
    AsyncFn,
    /// Inside a plain `fn`
    SyncFn,
}

/// The part of a line before any `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Classify the function or module enclosing `lines[idx]`
#[must_use]
pub fn enclosing_context(lines: &[String], idx: usize) -> Context {
    if in_test_module(lines, idx) {
        return Context::Test;
    }

    // Walk back counting braces. A function header reached while more braces
    // are open than closed is the one enclosing the line.
    let mut balance: i64 = 0;
    for i in (0..idx).rev() {
        let code = code_part(&lines[i]);
        balance += brace_delta(code);

        let Some(is_async) = fn_header(code) else {
            continue;
        };
        if balance >= 0 {
            continue;
        }

        if has_test_attribute(lines, i) {
            return Context::Test;
        }
        return if is_async {
            Context::AsyncFn
        } else {
            Context::SyncFn
        };
    }

    Context::Module
}

fn in_test_module(lines: &[String], idx: usize) -> bool {
    lines[..idx].windows(2).any(|pair| {
        pair[0].starts_with("#[cfg(test)]") && pair[1].trim_start().starts_with("mod ")
    })
}

/// Closing minus opening braces
fn brace_delta(code: &str) -> i64 {
    let mut delta = 0;
    for c in code.chars() {
        match c {
            '}' => delta += 1,
            '{' => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// `Some(is_async)` if the line starts a function
fn fn_header(code: &str) -> Option<bool> {
    let mut rest = code.trim_start();
    for prefix in ["pub(crate) ", "pub(super) ", "pub ", "const ", "unsafe "] {
        rest = rest.strip_prefix(prefix).unwrap_or(rest);
    }

    if rest.starts_with("async fn ") {
        Some(true)
    } else if rest.starts_with("fn ") {
        Some(false)
    } else {
        None
    }
}

fn has_test_attribute(lines: &[String], fn_idx: usize) -> bool {
    lines[..fn_idx]
        .iter()
        .rev()
        .map(|line| line.trim())
        .take_while(|line| line.starts_with("#[") || line.starts_with("///"))
        .any(|line| line.starts_with("#[test]") || line.contains("::test"))
}

/// Print findings and fail the calling test if there are any
///
/// # Panics
///
/// Panics when `violations` is not empty.
pub fn report(rule: &str, advice: &[&str], violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ CRITICAL: {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    eprintln!();
    for line in advice {
        eprintln!("  {line}");
    }

    panic!(
        "\nFound {} violation(s) in production code.\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    const SAMPLE: &str = r#"use std::path::Path;

pub fn read(path: &Path) -> String {
    let text = load(path);
    text
}

pub async fn serve(&self) {
    let run = async move {
        work().await;
    };
    run.await;
}

#[tokio::test]
async fn test_serve() {
    serve().await;
}

#[cfg(test)]
mod tests {
    fn helper() {}
}
"#;

    #[test]
    fn test_contexts() {
        let lines = lines(SAMPLE);
        assert_eq!(enclosing_context(&lines, 0), Context::Module);
        assert_eq!(enclosing_context(&lines, 3), Context::SyncFn);
        assert_eq!(enclosing_context(&lines, 6), Context::Module);
        assert_eq!(enclosing_context(&lines, 9), Context::AsyncFn);
        assert_eq!(enclosing_context(&lines, 11), Context::AsyncFn);
        assert_eq!(enclosing_context(&lines, 16), Context::Test);
        assert_eq!(enclosing_context(&lines, 21), Context::Test);
    }

    #[test]
    fn test_multiline_signature() {
        let lines = lines("pub fn new(\n    a: u32,\n) -> Self {\n    Self { a }\n}\n");
        assert_eq!(enclosing_context(&lines, 3), Context::SyncFn);
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // x.unwrap()"), "let x = 1; ");
        assert_eq!(code_part("/// docs"), "");
    }

    #[test]
    fn test_violation_display() {
        let file = SourceFile::from_text("src/lib.rs", "fn a() {\n    b.unwrap();\n}\n");
        let violation = file.violation(1, "Panic");
        assert_eq!(violation.to_string(), "src/lib.rs:2 - Panic: b.unwrap();");
    }

    #[test]
    fn test_workspace_root_holds_production_dirs() {
        let root = workspace_root();
        for dir in PRODUCTION_DIRS {
            assert!(root.join(dir).is_dir(), "{dir} missing");
        }
    }
}
