//! Semantic checks on loaded configuration.

use serde::{Deserialize, Serialize};

use crate::config::{HiveConfig, ReviewMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

impl ValidationIssue {
    fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Error,
            code,
            message: message.into(),
        }
    }

    fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            level: ValidationLevel::Warning,
            code,
            message: message.into(),
        }
    }
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

/// First error-level issue, if any.
pub fn first_error(issues: &[ValidationIssue]) -> Option<&ValidationIssue> {
    issues
        .iter()
        .find(|issue| issue.level == ValidationLevel::Error)
}

impl Validate for HiveConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.agents.is_empty() {
            issues.push(ValidationIssue::error(
                "agents.empty",
                "no agents configured; tasks can only start with a custom command",
            ));
        }

        if !self.agents.is_empty() && !self.agents.contains_key(&self.default_agent) {
            issues.push(ValidationIssue::error(
                "default_agent.unknown",
                format!("default agent '{}' is not configured", self.default_agent),
            ));
        }

        for (name, agent) in &self.agents {
            if agent.command.trim().is_empty() {
                issues.push(ValidationIssue::error(
                    "agents.command.empty",
                    format!("agent '{name}' has an empty command"),
                ));
            }
        }

        if let Some(reviewer) = &self.review_agent {
            if !self.agents.contains_key(reviewer) {
                issues.push(ValidationIssue::error(
                    "review_agent.unknown",
                    format!("review agent '{reviewer}' is not configured"),
                ));
            }
        } else if self.review_mode == ReviewMode::Agent {
            issues.push(ValidationIssue::warning(
                "review_agent.implicit",
                format!(
                    "review_mode is agent without review_agent; '{}' will review",
                    self.default_agent
                ),
            ));
        }

        if self.ui.tick_ms == 0 {
            issues.push(ValidationIssue::error(
                "ui.tick_ms.zero",
                "tick interval cannot be 0",
            ));
        } else if self.ui.tick_ms < 100 {
            issues.push(ValidationIssue::warning(
                "ui.tick_ms.low",
                format!(
                    "tick interval {}ms probes every session very often",
                    self.ui.tick_ms
                ),
            ));
        }

        if self.ui.transcript_limit == 0 {
            issues.push(ValidationIssue::warning(
                "ui.transcript_limit.zero",
                "transcript_limit 0 hides the whole transcript",
            ));
        }

        issues
    }
}
