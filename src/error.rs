use thiserror::Error;

/// Library-level failures. Iteration failures are counted as metrics, not surfaced here.
#[derive(Debug, Error)]
pub enum LoadgenError {
    #[error("Invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error in scenario '{scenario}': {message}")]
    Validation { scenario: String, message: String },

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Summary export failed: {0}")]
    Export(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Scenario '{0}' task failed")]
    ScenarioPanicked(String),
}

impl From<figment::Error> for LoadgenError {
    fn from(error: figment::Error) -> Self {
        LoadgenError::Config(error.to_string())
    }
}

impl From<serde_json::Error> for LoadgenError {
    fn from(error: serde_json::Error) -> Self {
        LoadgenError::Serialization(error.to_string())
    }
}

impl From<toml::ser::Error> for LoadgenError {
    fn from(error: toml::ser::Error) -> Self {
        LoadgenError::Serialization(error.to_string())
    }
}

/// Iteration-level failure returned by an action.
#[derive(Debug, Error)]
pub enum IterationError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("iteration panicked: {0}")]
    Panicked(String),
}

impl From<reqwest::Error> for IterationError {
    fn from(error: reqwest::Error) -> Self {
        IterationError::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = LoadgenError::Validation {
            scenario: "constant_request_rate".to_string(),
            message: "maxVUs must be >= preAllocatedVUs".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Validation error in scenario 'constant_request_rate': maxVUs must be >= preAllocatedVUs"
        );
        assert_eq!(
            IterationError::UnexpectedStatus(503).to_string(),
            "unexpected status 503"
        );
        assert_eq!(
            IterationError::Panicked("boom".to_string()).to_string(),
            "iteration panicked: boom"
        );
    }
}
