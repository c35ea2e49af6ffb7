use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Input errors
    #[error("{message}")]
    Validation { message: String },

    // Status / role errors
    #[error("{message}")]
    Precondition { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    // Bracket provider errors
    #[error("Bracket provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Could not reach bracket provider: {message}")]
    ProviderTransport { message: String },

    // State errors
    #[error("Failed to save state to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize state: {source}")]
    StateParse {
        #[source]
        source: serde_json::Error,
    },

    // Configuration errors
    #[error("Missing required environment variable {key}")]
    ConfigMissing { key: String },

    #[error("Invalid value for {key}: {message}")]
    ConfigInvalid { key: String, message: String },

    // Discord errors
    #[error("Discord API error: {message}")]
    Discord { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BotError {
    pub fn validation(message: impl Into<String>) -> Self {
        BotError::Validation {
            message: message.into(),
        }
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        BotError::Precondition {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        BotError::PermissionDenied {
            message: message.into(),
        }
    }

    /// Text shown to the member who triggered the failing action
    pub fn user_message(&self) -> String {
        match self {
            BotError::Validation { message } | BotError::Precondition { message } => {
                format!("❌ {}", message)
            }
            BotError::PermissionDenied { message } => format!("❌ Not allowed: {}", message),
            BotError::Provider { body, .. } => {
                format!("❌ Challonge rejected the request: {}", body.trim())
            }
            BotError::ProviderTransport { .. } => {
                "❌ Could not reach Challonge. Please try again.".to_string()
            }
            BotError::StateSave { .. } => {
                "⚠️ The change was applied but could not be saved to disk.".to_string()
            }
            _ => "❓ Something went wrong handling that request.".to_string(),
        }
    }

    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            BotError::Provider { .. } | BotError::ProviderTransport { .. }
        )
    }
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::ProviderTransport {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::StateParse { source: err }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

use poise::serenity_prelude as serenity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_keeps_validation_text() {
        let err = BotError::validation("Nickname is too long");
        assert_eq!(err.user_message(), "❌ Nickname is too long");
    }

    #[test]
    fn test_provider_errors_are_flagged() {
        let err = BotError::Provider {
            status: 422,
            body: "Tournament already started".to_string(),
        };
        assert!(err.is_provider());
        assert!(err.user_message().contains("Tournament already started"));
        assert!(!BotError::precondition("x").is_provider());
    }
}
