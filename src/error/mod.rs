use thiserror::Error;

/// Failures while retrieving a page of notifications or a versioned resource.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to parse payload: {0}")]
    Parse(String),

    #[error("Invalid page limit {limit} (allowed 1..={max})")]
    InvalidLimit { limit: u32, max: u32 },

    #[error("Resource {name}/{id} not found at version {version}")]
    ResourceNotFound {
        name: String,
        id: String,
        version: String,
    },
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Parse(e.to_string())
    }
}

#[derive(Error, Debug, Clone)]
pub enum NotificationError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Subscriber is already subscribed")]
    AlreadySubscribed,

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for NotificationError {
    fn from(e: config::ConfigError) -> Self {
        NotificationError::Config(e.to_string())
    }
}

impl NotificationError {
    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        NotificationError::Validation(message.into())
    }

    /// Stable machine-readable code, used as a log field
    pub fn code(&self) -> &'static str {
        match self {
            NotificationError::Validation(_) => "VALIDATION_ERROR",
            NotificationError::AlreadySubscribed => "ALREADY_SUBSCRIBED",
            NotificationError::Fetch(FetchError::Transport(_)) => "FETCH_TRANSPORT_ERROR",
            NotificationError::Fetch(FetchError::Parse(_)) => "FETCH_PARSE_ERROR",
            NotificationError::Fetch(FetchError::InvalidLimit { .. }) => "FETCH_INVALID_LIMIT",
            NotificationError::Fetch(FetchError::ResourceNotFound { .. }) => "RESOURCE_NOT_FOUND",
            NotificationError::Config(_) => "CONFIG_ERROR",
            NotificationError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, NotificationError::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, NotificationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(NotificationError::validation("x").code(), "VALIDATION_ERROR");
        assert_eq!(
            NotificationError::from(FetchError::Transport("down".into())).code(),
            "FETCH_TRANSPORT_ERROR"
        );
        assert_eq!(NotificationError::AlreadySubscribed.code(), "ALREADY_SUBSCRIBED");
    }

    #[test]
    fn test_parse_error_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let fetch: FetchError = err.into();
        assert!(matches!(fetch, FetchError::Parse(_)));
    }
}
