//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Async production code MUST NOT use blocking I/O.
//! **Required**: Use `tokio::fs`, `tokio::net`, `tokio::io`, not `std::fs`,
//! `std::net`, blocking stdin/stdout
//! **Exceptions**: non-async functions (config loading before or beside the
//! runtime), test code

use architectural_enforcement::{production_sources, report, Context, Violation};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = find_blocking_io_violations();

    report(
        "Blocking I/O calls found in production code!",
        &[
            "❌ FORBIDDEN: std::fs, std::net, std::process::Command, reqwest::blocking",
            "❌ FORBIDDEN: std::io::stdin()/stdout() inside async functions",
            "✅ ACCEPTABLE: non-async functions, test code",
        ],
        &violations,
    );
}

fn find_blocking_io_violations() -> Vec<Violation> {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (idx, code, context) in file.code_lines() {
            if matches!(context, Context::Test | Context::SyncFn) {
                continue;
            }

            if code.contains("std::fs") {
                violations.push(file.violation(idx, "Blocking file I/O"));
            }
            if code.contains("std::net") {
                violations.push(file.violation(idx, "Blocking network I/O"));
            }
            if code.contains("std::process::Command") {
                violations.push(file.violation(idx, "Blocking process I/O"));
            }
            if code.contains("reqwest::blocking") {
                violations.push(file.violation(idx, "Blocking HTTP client"));
            }
            if context == Context::AsyncFn
                && (code.contains("std::io::stdin()") || code.contains("std::io::stdout()"))
            {
                violations.push(file.violation(idx, "Blocking stdin/stdout in async"));
            }
        }
    }

    violations
}
