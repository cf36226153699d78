use promptgate_core::{ExecutionContext, Stage, StageError, StageFlow};

/// Rejects commands the pipeline cannot act on
#[derive(Debug, Default)]
pub struct ValidateCommandStage;

impl Stage for ValidateCommandStage {
    fn id(&self) -> &'static str {
        "command.validate"
    }

    fn description(&self) -> &'static str {
        "Check that the command names a prompt or a session and a valid step"
    }

    fn run(&self, ctx: &mut ExecutionContext) -> Result<StageFlow, StageError> {
        let command = ctx.command();

        if command.prompt_id.is_none() && command.session_id.is_none() {
            return Err(StageError::ValidationFailed(
                "command needs a prompt id or a session id to resume".to_string(),
            ));
        }
        if command.prompt_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(StageError::ValidationFailed("prompt id is empty".to_string()));
        }
        if command.session_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(StageError::ValidationFailed("session id is empty".to_string()));
        }

        let total = command.total_steps();
        if let Some(step) = command.current_step {
            if step == 0 || step > total {
                return Err(StageError::ValidationFailed(format!(
                    "step {} is outside 1..={}",
                    step, total
                )));
            }
        }
        if command.steps.iter().any(|s| s.prompt_id.trim().is_empty()) {
            return Err(StageError::ValidationFailed("chain step without a prompt id".to_string()));
        }

        Ok(StageFlow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptgate_core::{ChainStep, ParsedCommand};

    fn run(command: ParsedCommand) -> Result<StageFlow, StageError> {
        ValidateCommandStage.run(&mut ExecutionContext::new(command))
    }

    #[test]
    fn test_accepts_single_and_resume() {
        assert!(run(ParsedCommand::single("summarize")).is_ok());
        assert!(run(ParsedCommand::resume("s-1")).is_ok());
    }

    #[test]
    fn test_rejects_empty_command() {
        assert!(matches!(run(ParsedCommand::default()), Err(StageError::ValidationFailed(_))));
    }

    #[test]
    fn test_rejects_blank_session_id() {
        let err = run(ParsedCommand::single("summarize").with_session("  ")).unwrap_err();
        assert!(matches!(err, StageError::ValidationFailed(ref msg) if msg.contains("session id")));
        assert!(run(ParsedCommand::resume("")).is_err());
    }

    #[test]
    fn test_rejects_step_out_of_range() {
        let cmd = ParsedCommand::chain("flow", vec![ChainStep::new("a"), ChainStep::new("b")]).at_step(3);
        assert!(run(cmd).is_err());
    }
}
