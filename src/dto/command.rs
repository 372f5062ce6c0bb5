use serde::Deserialize;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::state::{lobby::PlayerId, state_machine::GameCommand};

/// Longest free-text field a command may carry.
const MAX_COMMAND_TEXT: usize = 200;

#[derive(Debug, Deserialize, ToSchema, Validate)]
/// A game move submitted over HTTP.
pub struct CommandRequest {
    pub player_id: PlayerId,
    /// Rejects the command with `409` unless the lobby is still at this version.
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[validate(custom(function = "validate_command"))]
    pub command: GameCommand,
}

/// Bound the free-text fields of a command.
pub fn validate_command(command: &GameCommand) -> Result<(), ValidationError> {
    let text = match command {
        GameCommand::SubmitWord { word } => word,
        GameCommand::CricketConfess { confession } => confession,
        GameCommand::StartCharityVote { reason, .. } => reason,
        GameCommand::StartSwapVote { excuse, .. } => excuse,
        _ => return Ok(()),
    };

    let length = text.trim().chars().count();
    if length == 0 || length > MAX_COMMAND_TEXT {
        let mut err = ValidationError::new("command_text");
        err.message = Some(
            format!(
                "`{}` text must be between 1 and {MAX_COMMAND_TEXT} characters",
                command.name()
            )
            .into(),
        );
        return Err(err);
    }
    Ok(())
}
