// Error handling module
// Defines the error taxonomy surfaced to resource operations

use thiserror::Error;

/// Errors that can occur while configuring the client or issuing a management API call
#[derive(Error, Debug)]
pub enum ApiError {
    /// Bad or contradictory credentials, detected before any network call
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Token acquisition failed, or a request stayed unauthorized after the forced refresh
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Transport-level failure (connect, timeout, body read)
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Non-2xx business response from the management API
    #[error("Apigee API error: {status} - {body}")]
    ApigeeApiError { status: u16, body: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::ApigeeApiError { status, .. } => Some(*status),
            ApiError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a caller may reasonably retry the same call.
    ///
    /// The client never retries on its own; idempotency is the caller's call.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::NetworkError(_) => true,
            ApiError::ApigeeApiError { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// Whether the resource addressed by the request does not exist
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ApiError::AuthError("Invalid token".to_string());
        assert_eq!(err.to_string(), "Authentication failed: Invalid token");

        let err = ApiError::ApigeeApiError {
            status: 429,
            body: "Rate limit exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "Apigee API error: 429 - Rate limit exceeded");
    }

    #[test]
    fn test_config_error_message() {
        let err = ApiError::ConfigError("organization is required".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: organization is required"
        );
    }

    #[test]
    fn test_internal_error_message() {
        let err = ApiError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_retryable_classification() {
        for status in [429, 500, 502, 503, 599] {
            let err = ApiError::ApigeeApiError {
                status,
                body: String::new(),
            };
            assert!(err.is_retryable(), "{} should be retryable", status);
        }

        for status in [400, 401, 403, 404, 409] {
            let err = ApiError::ApigeeApiError {
                status,
                body: String::new(),
            };
            assert!(!err.is_retryable(), "{} should be fatal", status);
        }

        assert!(!ApiError::AuthError("nope".to_string()).is_retryable());
        assert!(!ApiError::ConfigError("nope".to_string()).is_retryable());
    }

    #[test]
    fn test_status_and_not_found() {
        let err = ApiError::ApigeeApiError {
            status: 404,
            body: "{\"code\":\"keymanagement.service.app_doesnot_exist\"}".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert!(err.is_not_found());

        let err = ApiError::AuthError("expired".to_string());
        assert_eq!(err.status(), None);
        assert!(!err.is_not_found());
    }
}
