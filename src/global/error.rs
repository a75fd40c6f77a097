#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure taxonomy of the Movieo REST boundary.
///
/// Messages are kept as strings so one settled result can be handed to every
/// caller that was coalesced onto the same write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// Transport failure, timeout or an unusable server status
    #[error("network error: {0}")]
    Network(String),

    /// Missing bearer credential or a 401 from the server
    #[error("not authenticated: {0}")]
    Auth(String),

    /// Payload rejected, either locally or by a 4xx from the server
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Body could not be decoded into the expected schema
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Whether the caller may reasonably retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseEnumError {
    pub enum_name: &'static str,
    pub value: String,
    pub expected: &'static [&'static str],
}

impl std::fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed to parse {} from '{}'. Expected one of: {:?}",
            self.enum_name, self.value, self.expected
        )
    }
}

impl std::error::Error for ParseEnumError {}
