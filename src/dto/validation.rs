//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of a lobby join code.
pub const LOBBY_CODE_LEN: usize = 6;
/// Longest accepted player name, after trimming.
pub const MAX_NAME_LEN: usize = 24;
/// Longest accepted chat message, after trimming.
pub const MAX_CHAT_LEN: usize = 500;

/// Validates that a lobby code is six uppercase letters or digits.
///
/// # Examples
///
/// ```ignore
/// validate_lobby_code("K3TQ9Z") // Ok
/// validate_lobby_code("k3tq9z") // Err - lowercase
/// validate_lobby_code("K3TQ9")  // Err - too short
/// ```
pub fn validate_lobby_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != LOBBY_CODE_LEN {
        let mut err = ValidationError::new("lobby_code_length");
        err.message = Some(
            format!(
                "Lobby code must be exactly {LOBBY_CODE_LEN} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        let mut err = ValidationError::new("lobby_code_format");
        err.message = Some("Lobby code must contain only A-Z and 0-9".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a player name is 1 to 24 characters once trimmed.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    validate_trimmed(name, MAX_NAME_LEN, "player_name", "Name")
}

/// Validates that a chat message is 1 to 500 characters once trimmed.
pub fn validate_chat_message(message: &str) -> Result<(), ValidationError> {
    validate_trimmed(message, MAX_CHAT_LEN, "chat_message", "Message")
}

fn validate_trimmed(
    value: &str,
    max: usize,
    code: &'static str,
    label: &str,
) -> Result<(), ValidationError> {
    let length = value.trim().chars().count();
    if length == 0 || length > max {
        let mut err = ValidationError::new(code);
        err.message = Some(format!("{label} must be between 1 and {max} characters").into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_lobby_code_valid() {
        assert!(validate_lobby_code("K3TQ9Z").is_ok());
        assert!(validate_lobby_code("000000").is_ok());
        assert!(validate_lobby_code("ABCDEF").is_ok());
    }

    #[test]
    fn test_validate_lobby_code_invalid() {
        assert!(validate_lobby_code("K3TQ9").is_err()); // too short
        assert!(validate_lobby_code("K3TQ9ZZ").is_err()); // too long
        assert!(validate_lobby_code("k3tq9z").is_err()); // lowercase
        assert!(validate_lobby_code("K3-Q9Z").is_err()); // punctuation
    }

    #[test]
    fn test_validate_player_name() {
        assert!(validate_player_name("Dennis").is_ok());
        assert!(validate_player_name("  Dee  ").is_ok());
        assert!(validate_player_name("   ").is_err());
        assert!(validate_player_name(&"x".repeat(25)).is_err());
        assert!(validate_player_name(&format!("  {}  ", "x".repeat(24))).is_ok());
    }

    #[test]
    fn test_validate_chat_message() {
        assert!(validate_chat_message("wildcard!").is_ok());
        assert!(validate_chat_message("").is_err());
        assert!(validate_chat_message(&"é".repeat(500)).is_ok());
        assert!(validate_chat_message(&"é".repeat(501)).is_err());
    }
}
