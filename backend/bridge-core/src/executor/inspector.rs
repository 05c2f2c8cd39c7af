//! Pattern scan over generated code.
//!
//! Findings are logged and reported back to the caller; they never block
//! execution.

use std::sync::OnceLock;

use log::warn;
use regex::Regex;

const WATCHED_PATTERNS: [(&str, &str); 7] = [
    (r"\bimport\s+os\b", "os module import"),
    (r"\bimport\s+subprocess\b", "subprocess module import"),
    (r"\bimport\s+shutil\b", "shutil module import"),
    (r"\bopen\s*\(", "file open operation"),
    (r"\b__import__\s*\(", "dynamic import"),
    (r"\beval\s*\(", "eval call"),
    (r"\bexec\s*\(", "exec call"),
];

static WATCHED_REGEXES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

fn watched_regexes() -> &'static [(Regex, &'static str)] {
    WATCHED_REGEXES.get_or_init(|| {
        WATCHED_PATTERNS
            .iter()
            .map(|(pattern, label)| (Regex::new(pattern).expect("valid regex pattern"), *label))
            .collect()
    })
}

/// One watched construct found in a code string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub label: &'static str,
    /// 1-based line of the first match.
    pub line: usize,
}

impl Finding {
    pub fn describe(&self) -> String {
        format!("{} (line {})", self.label, self.line)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CodeInspector;

impl CodeInspector {
    pub fn new() -> Self {
        Self
    }

    /// Returns every watched construct in `code`, in pattern order.
    pub fn inspect(&self, code: &str) -> Vec<Finding> {
        let findings: Vec<Finding> = watched_regexes()
            .iter()
            .filter_map(|(regex, label)| {
                regex.find(code).map(|found| Finding {
                    label: *label,
                    line: code[..found.start()].matches('\n').count() + 1,
                })
            })
            .collect();

        for finding in &findings {
            warn!("Generated code contains {}", finding.describe());
        }
        findings
    }
}
