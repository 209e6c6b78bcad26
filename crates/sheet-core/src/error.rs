//! # Sheet Error Types
//!
//! Typed error handling for the customer sheet.
//! Collaborator calls return `BackendResult<T>`, which pairs a machine
//! cause with an optional message that is safe to show to the customer.

use thiserror::Error;

/// Fallback text shown when a failure carries no display message.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// Core error type for all sheet operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SheetError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A late-bound dependency never became available
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    ProviderError { provider: String, message: String },

    /// Network/HTTP error communicating with provider
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The intent cannot be used to save payment methods
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),

    /// A selection this surface does not offer (Link, new methods)
    #[error("Unsupported payment selection: {0}")]
    UnsupportedSelection(String),

    /// No confirmation launcher is registered
    #[error("Confirmation UI unavailable: {0}")]
    ConfirmationUnavailable(String),

    /// Work was cancelled before it completed
    #[error("Canceled: {0}")]
    Canceled(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SheetError {
    /// Returns true if retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SheetError::NetworkError(_) | SheetError::ProviderError { .. }
        )
    }

    /// Message suitable for the customer.
    ///
    /// Provider messages are already customer-facing; everything else
    /// falls back to [`GENERIC_ERROR_MESSAGE`].
    pub fn display_message(&self) -> String {
        match self {
            SheetError::ProviderError { message, .. } => message.clone(),
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Result type alias for sheet operations
pub type SheetResult<T> = Result<T, SheetError>;

/// Failure returned by the customer backend and other collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{cause}")]
pub struct BackendFailure {
    /// Machine-readable cause
    pub cause: SheetError,
    /// Customer-facing message, if the backend supplied one
    pub display_message: Option<String>,
}

impl BackendFailure {
    pub fn new(cause: SheetError) -> Self {
        Self {
            cause,
            display_message: None,
        }
    }

    /// Builder: attach a customer-facing message
    pub fn with_display_message(mut self, message: impl Into<String>) -> Self {
        self.display_message = Some(message.into());
        self
    }

    /// The supplied display message, or the cause's fallback
    pub fn message_or_fallback(&self) -> String {
        self.display_message
            .clone()
            .unwrap_or_else(|| self.cause.display_message())
    }
}

impl From<SheetError> for BackendFailure {
    fn from(cause: SheetError) -> Self {
        Self::new(cause)
    }
}

/// Result type alias for collaborator calls
pub type BackendResult<T> = Result<T, BackendFailure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SheetError::NetworkError("timeout".into()).is_retryable());
        assert!(SheetError::ProviderError {
            provider: "stripe".into(),
            message: "try later".into()
        }
        .is_retryable());
        assert!(!SheetError::InvalidRequest("bad data".into()).is_retryable());
        assert!(!SheetError::DependencyUnavailable("adapter".into()).is_retryable());
    }

    #[test]
    fn test_display_message_fallback() {
        let failure = BackendFailure::new(SheetError::NetworkError("reset".into()));
        assert_eq!(failure.message_or_fallback(), GENERIC_ERROR_MESSAGE);

        let failure = failure.with_display_message("Card was declined");
        assert_eq!(failure.message_or_fallback(), "Card was declined");
    }

    #[test]
    fn test_provider_message_is_customer_facing() {
        let failure = BackendFailure::from(SheetError::ProviderError {
            provider: "stripe".into(),
            message: "Your card has expired.".into(),
        });
        assert_eq!(failure.message_or_fallback(), "Your card has expired.");
    }
}
