use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationError {
    /// Every strategy of a query was tried and none produced an accepted candidate.
    #[error("Element not found: {query} (tried: {})", attempted.join(", "))]
    ElementNotFound {
        query: String,
        attempted: Vec<String>,
    },

    #[error("Stale element reference: {0}")]
    StaleElement(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Gesture failed (native: {native}; fallback: {fallback})")]
    InteractionFailed { native: String, fallback: String },

    #[error("Element is not enabled: {0}")]
    ElementNotEnabled(String),

    #[error("Driver disconnected: {0}")]
    DriverDisconnected(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AutomationError {
    /// Shorthand for a driver-level "no such element" with no strategy bookkeeping.
    pub fn not_found(what: impl Into<String>) -> Self {
        AutomationError::ElementNotFound {
            query: what.into(),
            attempted: Vec::new(),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, AutomationError::StaleElement(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AutomationError::ElementNotFound { .. })
    }

    /// Errors that describe a transient tree state rather than a broken session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AutomationError::StaleElement(_)
                | AutomationError::ElementNotFound { .. }
                | AutomationError::Timeout(_)
        )
    }
}
