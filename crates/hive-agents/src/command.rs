//! Agent command resolution from configured templates.

use hive_core::config::HiveConfig;
use hive_core::types::Task;

use crate::error::SessionError;
use crate::util::shell_quote;

/// What the operator picked in the start dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentChoice {
    Named(String),
    /// Ad hoc command line, used verbatim.
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    /// Recorded on the task as the bound worker.
    pub agent: String,
    /// Shell command line handed to the session backend.
    pub command: String,
}

/// Substitute `{task_id}`, `{title}` and `{description}` with shell-quoted values.
pub fn render_command_template(template: &str, task: &Task) -> String {
    template
        .replace("{task_id}", &task.id.to_string())
        .replace("{title}", &shell_quote(&task.title))
        .replace("{description}", &shell_quote(&task.description))
}

pub fn resolve_agent_command(
    config: &HiveConfig,
    choice: &AgentChoice,
    task: &Task,
) -> Result<AgentCommand, SessionError> {
    match choice {
        AgentChoice::Named(name) => {
            let template = config
                .agent_command(name)
                .ok_or_else(|| SessionError::UnknownAgent { name: name.clone() })?;
            if template.trim().is_empty() {
                return Err(SessionError::EmptyCommand);
            }
            Ok(AgentCommand {
                agent: name.clone(),
                command: render_command_template(template, task),
            })
        }
        AgentChoice::Custom(command) => {
            let command = command.trim();
            if command.is_empty() {
                return Err(SessionError::EmptyCommand);
            }
            Ok(AgentCommand {
                agent: command.to_string(),
                command: command.to_string(),
            })
        }
    }
}

/// Command for the reviewer session in agent review mode.
pub fn resolve_review_command(
    config: &HiveConfig,
    task: &Task,
) -> Result<AgentCommand, SessionError> {
    resolve_agent_command(config, &AgentChoice::Named(config.reviewer().to_string()), task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hive_core::config::AgentConfig;
    use hive_core::types::TaskId;

    fn task() -> Task {
        let mut task = Task::new(TaskId(42), "Fix user's login", Utc::now());
        task.description = "Session expires too early".to_string();
        task
    }

    #[test]
    fn template_placeholders_are_shell_quoted() {
        let rendered = render_command_template(
            "claude --task {task_id} --title {title} -p {description}",
            &task(),
        );
        assert_eq!(
            rendered,
            "claude --task 42 --title 'Fix user'\"'\"'s login' -p 'Session expires too early'"
        );
    }

    #[test]
    fn named_agent_uses_configured_template() {
        let mut config = HiveConfig::default();
        config
            .agents
            .insert("aider".to_string(), AgentConfig::new("aider -m {title}"));
        let resolved = resolve_agent_command(&config, &AgentChoice::Named("aider".into()), &task())
            .expect("resolve");
        assert_eq!(resolved.agent, "aider");
        assert_eq!(resolved.command, "aider -m 'Fix user'\"'\"'s login'");
    }

    #[test]
    fn unknown_agent_and_empty_custom_are_rejected() {
        let config = HiveConfig::default();
        let err = resolve_agent_command(&config, &AgentChoice::Named("nope".into()), &task())
            .expect_err("unknown");
        assert!(matches!(err, SessionError::UnknownAgent { name } if name == "nope"));

        let err = resolve_agent_command(&config, &AgentChoice::Custom("  ".into()), &task())
            .expect_err("empty");
        assert!(matches!(err, SessionError::EmptyCommand));
    }

    #[test]
    fn custom_command_is_used_verbatim() {
        let config = HiveConfig::default();
        let resolved = resolve_agent_command(
            &config,
            &AgentChoice::Custom(" bash -lc 'make {title}' ".into()),
            &task(),
        )
        .expect("custom");
        assert_eq!(resolved.command, "bash -lc 'make {title}'");
        assert_eq!(resolved.agent, resolved.command);
    }

    #[test]
    fn review_command_uses_reviewer_agent() {
        let mut config = HiveConfig::default();
        config.review_agent = Some("codex".to_string());
        let resolved = resolve_review_command(&config, &task()).expect("review");
        assert_eq!(resolved.agent, "codex");
    }
}
