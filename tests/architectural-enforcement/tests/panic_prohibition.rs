//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors. It MUST NOT call
//! `unwrap()` or `expect()`; a dropped avatar or a failed backend must never
//! take the companion down.
//! **Exceptions**: test code

use architectural_enforcement::{production_sources, report, Context, Violation};

#[test]
fn test_no_unwrap_in_production_code() {
    let mut violations: Vec<Violation> = Vec::new();

    for file in production_sources() {
        for (idx, code, context) in file.code_lines() {
            if context == Context::Test {
                continue;
            }
            if code.contains(".unwrap()") || code.contains(".expect(") {
                violations.push(file.violation(idx, "Panicking call"));
            }
        }
    }

    report(
        "unwrap()/expect() found in production code!",
        &["✅ REQUIRED: propagate with `?`, or fall back with unwrap_or/unwrap_or_default"],
        &violations,
    );
}
