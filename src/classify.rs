//! Failure classification for captured step output.
//!
//! Converts raw captured text plus an exit code into one stable,
//! user-facing failure reason. Patterns are checked in priority order;
//! when none match, the fallbacks below keep the message actionable:
//! stderr verbatim, then an `[ERROR]`/`[FAIL]` line from the tail of
//! stdout, then a generic exit-code message.

use crate::phase::PhaseKind;

struct Rule {
    pattern: &'static str,
    reason: &'static str,
}

const UPDATE_RULES: &[Rule] = &[
    Rule {
        pattern: "Downgrades are not permitted",
        reason: "Downgrade not permitted: Target version is older than current version",
    },
    Rule {
        pattern: "Update not permitted",
        reason: "Update not permitted or cancelled by user",
    },
    Rule {
        pattern: "Failed to fetch latest version",
        reason: "Failed to fetch version information from server",
    },
    Rule {
        pattern: "Invalid version format",
        reason: "Invalid version format specified",
    },
];

const VERIFICATION_RULES: &[Rule] = &[
    Rule {
        pattern: "Critical Errors",
        reason: "Environment verification found critical errors",
    },
    Rule {
        pattern: "VERIFICATION FAILED",
        reason: "Environment verification failed",
    },
];

/// How many trailing stdout lines are scanned for an error marker.
const TAIL_SCAN_LINES: usize = 5;

pub fn classify_failure(kind: PhaseKind, stdout: &str, stderr: &str, exit_code: i32) -> String {
    let rules = match kind {
        PhaseKind::CodebaseUpdate => UPDATE_RULES,
        PhaseKind::EnvironmentVerification => VERIFICATION_RULES,
    };
    // The verification patterns only ever appear on stdout.
    let scan_stderr = matches!(kind, PhaseKind::CodebaseUpdate);
    for rule in rules {
        if stdout.contains(rule.pattern) || (scan_stderr && stderr.contains(rule.pattern)) {
            return rule.reason.to_string();
        }
    }

    let trimmed_stderr = stderr.trim();
    if !trimmed_stderr.is_empty() {
        return trimmed_stderr.to_string();
    }

    let trimmed_stdout = stdout.trim();
    if !trimmed_stdout.is_empty() {
        let lines: Vec<&str> = trimmed_stdout.lines().collect();
        for line in lines.iter().rev().take(TAIL_SCAN_LINES) {
            if line.contains("[ERROR]") || line.contains("[FAIL]") {
                return line.trim().to_string();
            }
        }
    }

    format!(
        "{} process failed with exit code {}",
        kind.process_label(),
        exit_code
    )
}
