//! Human-readable validation report.

use std::collections::BTreeMap;
use std::fmt::Write;

use super::{ValidationIssue, ValidationResult};

/// Renders the findings grouped by config section, errors before warnings.
pub fn format_report(result: &ValidationResult) -> String {
    if result.issues().is_empty() {
        return "Configuration is valid.".to_string();
    }

    let mut sections: BTreeMap<&str, Vec<&ValidationIssue>> = BTreeMap::new();
    for issue in result.issues() {
        sections.entry(issue.section()).or_default().push(issue);
    }

    let mut report = String::new();
    let error_count = result.error_count();
    let warning_count = result.warnings().count();

    if error_count > 0 {
        report.push_str("Config validation failed\n\n");
    }

    for (section, mut issues) in sections {
        issues.sort_by_key(|i| i.severity);
        let _ = writeln!(report, "[{}]", section);
        for issue in issues {
            write_issue(&mut report, issue);
        }
        report.push('\n');
    }

    let _ = writeln!(report, "{} error(s), {} warning(s)", error_count, warning_count);
    if error_count > 0 {
        report.push_str("Config rejected.\n");
    }

    report
}

fn write_issue(report: &mut String, issue: &ValidationIssue) {
    let _ = writeln!(report, "  {} {}: {}", issue.severity, issue.path, issue.message);
    if let Some(suggestion) = &issue.suggestion {
        let _ = writeln!(report, "      hint: {}", suggestion);
    }
}
