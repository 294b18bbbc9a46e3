use thiserror::Error;

/// Main error type for EC2 ChatOps
#[derive(Error, Debug, Clone)]
pub enum ChatOpsError {
    #[error("API error: {0}")]
    Api(ApiError),

    #[error("Conversation error: {0}")]
    Conversation(ConversationError),

    #[error("Workflow error: {0}")]
    Workflow(WorkflowError),

    #[error("Configuration error: {0}")]
    Config(ConfigError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("TOML error: {0}")]
    Toml(String),
}

/// Errors raised at the HTTP API boundary
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Network failure: {message}")]
    Network { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Unexpected response envelope: {message}")]
    Envelope { message: String },

    #[error("Missing required field: {field}")]
    Validation { field: String },
}

/// Conversation-level errors
#[derive(Error, Debug, Clone)]
pub enum ConversationError {
    #[error("Empty input")]
    EmptyInput,

    #[error("No account selected")]
    NoAccountSelected,
}

/// Wizard workflow errors
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Nothing selected")]
    NothingSelected,

    #[error("Parameter {name}={value} out of range [{min}, {max}]")]
    ParameterOutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Result type alias for EC2 ChatOps operations
pub type Result<T> = std::result::Result<T, ChatOpsError>;

// From trait implementations for error conversion
impl From<ApiError> for ChatOpsError {
    fn from(err: ApiError) -> Self {
        ChatOpsError::Api(err)
    }
}

impl From<ConversationError> for ChatOpsError {
    fn from(err: ConversationError) -> Self {
        ChatOpsError::Conversation(err)
    }
}

impl From<WorkflowError> for ChatOpsError {
    fn from(err: WorkflowError) -> Self {
        ChatOpsError::Workflow(err)
    }
}

impl From<ConfigError> for ChatOpsError {
    fn from(err: ConfigError) -> Self {
        ChatOpsError::Config(err)
    }
}

impl From<std::io::Error> for ChatOpsError {
    fn from(err: std::io::Error) -> Self {
        ChatOpsError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChatOpsError {
    fn from(err: serde_json::Error) -> Self {
        ChatOpsError::Json(err.to_string())
    }
}

impl From<toml::de::Error> for ChatOpsError {
    fn from(err: toml::de::Error) -> Self {
        ChatOpsError::Toml(err.to_string())
    }
}

impl From<reqwest::Error> for ChatOpsError {
    fn from(err: reqwest::Error) -> Self {
        ChatOpsError::Api(ApiError::from(err))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ApiError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ApiError::Network {
                message: err.to_string(),
            }
        }
    }
}

impl ChatOpsError {
    /// Check if error is recoverable via a user-triggered retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            ChatOpsError::Api(ApiError::Network { .. }) => true,
            ChatOpsError::Api(ApiError::Http { status, .. }) => *status >= 500,
            ChatOpsError::Conversation(ConversationError::EmptyInput) => true,
            ChatOpsError::Io(_) => true,
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ChatOpsError::Config(_) => ErrorSeverity::High,
            ChatOpsError::Api(ApiError::Envelope { .. }) => ErrorSeverity::High,
            ChatOpsError::Api(_) => ErrorSeverity::Medium,
            ChatOpsError::Workflow(_) => ErrorSeverity::Medium,
            ChatOpsError::Conversation(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Get user-friendly error message for the transcript or a wizard banner
    pub fn user_message(&self) -> String {
        match self {
            ChatOpsError::Api(ApiError::Network { .. }) => {
                "Could not reach the backend service. Check the connection and try again."
                    .to_string()
            }
            ChatOpsError::Api(ApiError::Http { message, .. }) => message.clone(),
            ChatOpsError::Api(ApiError::Validation { field }) => {
                format!("Missing required field: {}", field)
            }
            ChatOpsError::Conversation(ConversationError::EmptyInput) => {
                "Please type a message first.".to_string()
            }
            ChatOpsError::Conversation(ConversationError::NoAccountSelected) => {
                "Select an account before managing instances.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Low => "LOW",
            ErrorSeverity::Medium => "MEDIUM",
            ErrorSeverity::High => "HIGH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_errors_are_recoverable() {
        let err = ChatOpsError::Api(ApiError::Network {
            message: "connection refused".to_string(),
        });
        assert!(err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::Medium);
    }

    #[test]
    fn test_client_http_errors_are_not_recoverable() {
        let bad_request = ChatOpsError::Api(ApiError::Http {
            status: 400,
            message: "Missing instanceId parameter".to_string(),
        });
        assert!(!bad_request.is_recoverable());

        let server_error = ChatOpsError::Api(ApiError::Http {
            status: 502,
            message: "bad gateway".to_string(),
        });
        assert!(server_error.is_recoverable());
    }

    #[test]
    fn test_user_message_prefers_server_text() {
        let err = ChatOpsError::Api(ApiError::Http {
            status: 500,
            message: "Alarm configuration failed".to_string(),
        });
        assert_eq!(err.user_message(), "Alarm configuration failed");
    }
}
