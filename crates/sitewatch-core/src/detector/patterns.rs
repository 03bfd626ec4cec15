//! Suspicious pattern scan
//!
//! An ordered list of (regex, description, severity) rules applied to a
//! fetched body. Every rule that matches yields one entry carrying its
//! occurrence count.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::incident::Severity;

/// One scan rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    regex: Regex,
    description: String,
    severity: Severity,
}

impl PatternRule {
    /// Compile a case-insensitive rule
    pub fn new(
        pattern: &str,
        description: impl Into<String>,
        severity: Severity,
    ) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            regex,
            description: description.into(),
            severity,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }
}

/// A rule that matched a body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub pattern: String,
    pub description: String,
    pub severity: Severity,
    pub occurrences: usize,
}

/// Ordered, immutable ruleset
#[derive(Debug, Clone)]
pub struct PatternScanner {
    rules: Vec<PatternRule>,
}

const DEFAULT_RULES: &[(&str, &str, Severity)] = &[
    (r"eval\s*\(", "eval()", Severity::High),
    (r"base64_decode\s*\(", "base64_decode()", Severity::High),
    (r"exec\s*\(", "exec()", Severity::High),
    (r"system\s*\(", "system()", Severity::High),
    (r"shell_exec\s*\(", "shell_exec()", Severity::High),
    (
        r"<script>[^<]*(alert|prompt|confirm)[^<]*</script>",
        "inline JavaScript dialog",
        Severity::High,
    ),
    (r"<iframe[^>]*src=[^>]*>", "embedded iframe", Severity::Medium),
];

impl Default for PatternScanner {
    fn default() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .filter_map(|(pattern, description, severity)| {
                PatternRule::new(pattern, *description, *severity).ok()
            })
            .collect();
        Self { rules }
    }
}

impl PatternScanner {
    /// Scanner over a custom ruleset
    pub fn with_rules(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Apply every rule, in order, to `body`
    pub fn scan(&self, body: &str) -> Vec<PatternMatch> {
        self.rules
            .iter()
            .filter_map(|rule| {
                let occurrences = rule.regex.find_iter(body).count();
                (occurrences > 0).then(|| PatternMatch {
                    pattern: rule.pattern().to_string(),
                    description: rule.description.clone(),
                    severity: rule.severity,
                    occurrences,
                })
            })
            .collect()
    }
}

/// Scan a body with the default ruleset
pub fn scan_for_suspicious_patterns(body: &str) -> Vec<PatternMatch> {
    PatternScanner::default().scan(body)
}
