//! Configuration validation system.

pub mod report;
pub mod semantic;

use crate::config::model::AppConfig;

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    /// Refuses to start.
    Error,
    /// Logged, startup continues.
    Warning,
}

impl std::fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Warning => write!(f, "WARNING"),
        }
    }
}

/// One finding against a dotted config path such as `dispatcher.task.subnets`.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub path: String,
    pub message: String,
    /// How to fix it, when there is an obvious fix.
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    fn new(severity: ValidationSeverity, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Error, path, message)
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Warning, path, message)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Top-level config section the path belongs to.
    pub fn section(&self) -> &str {
        self.path.split('.').next().unwrap_or(&self.path)
    }
}

/// Findings collected over one or more config sections.
#[derive(Debug, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
    }

    /// Warnings alone never invalidate a config.
    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.with_severity(ValidationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.with_severity(ValidationSeverity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    fn with_severity(&self, severity: ValidationSeverity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }
}

/// Which process the configuration is loaded for. Each role only requires its own section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Dispatcher,
    Worker,
    All,
}

impl Role {
    fn checks_dispatcher(self) -> bool {
        matches!(self, Role::Dispatcher | Role::All)
    }

    fn checks_worker(self) -> bool {
        matches!(self, Role::Worker | Role::All)
    }
}

/// Validates the configuration sections relevant to `role`.
pub fn validate_config(config: &AppConfig, role: Role) -> ValidationResult {
    let mut result = ValidationResult::new();

    result.extend(semantic::validate_global(&config.global));

    if role.checks_dispatcher() {
        result.extend(semantic::validate_dispatcher(&config.dispatcher));
    }

    if role.checks_worker() {
        result.extend(semantic::validate_worker(&config.worker));
    }

    result
}
