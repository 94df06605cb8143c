//! Error types for the moderation core
//!
//! Actuator failures are always caught at the call site and logged; they never
//! abort sibling side effects. Validation failures are surfaced to the caller.

use thiserror::Error;

/// Errors that can occur during moderation operations
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Duration string did not match the `^\d+[smhd]$` grammar
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    /// Discord API error from an actuator call
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// Failed to resolve a guild, member, channel, or role
    #[error("Failed to resolve guild or member: {0}")]
    GuildOrMemberNotFound(String),

    /// Generic error
    #[error("Moderation error: {0}")]
    Other(String),
}

impl From<poise::serenity_prelude::Error> for ModerationError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

impl From<String> for ModerationError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

/// Result type for moderation operations
pub type ModResult<T> = Result<T, ModerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ModerationError::InvalidDuration("soon".to_string());
        assert_eq!(error.to_string(), "Invalid duration: soon");

        let error = ModerationError::GuildOrMemberNotFound("guild 1".to_string());
        assert_eq!(error.to_string(), "Failed to resolve guild or member: guild 1");

        let error = ModerationError::from("something broke".to_string());
        assert_eq!(error.to_string(), "Moderation error: something broke");
    }
}
