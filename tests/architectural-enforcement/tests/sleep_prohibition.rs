//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Motions complete
//! on frame ticks and replies arrive on channels; nothing needs to wait for
//! wall-clock time except the frame driver, which uses `tokio::time::interval`.
//! **Exceptions**: test code

use architectural_enforcement::{production_sources, report, Context, Violation};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    report(
        "Sleep calls found in production code!",
        &[
            "✅ ACCEPTABLE: test code, periodic work on tokio::time::interval()",
            "❌ FORBIDDEN: sleep in polling loops or as poor man's synchronization",
        ],
        &violations,
    );
}

fn find_sleep_violations() -> Vec<Violation> {
    let mut violations = Vec::new();

    for file in production_sources() {
        for (idx, code, context) in file.code_lines() {
            if context == Context::Test {
                continue;
            }
            if code.contains("::sleep(") || code.contains(".sleep(") {
                violations.push(file.violation(idx, "Sleep call"));
            }
        }
    }

    violations
}
