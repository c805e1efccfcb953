//! Västtrafik client error types.

/// Errors from the upstream transit API.
#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON deserialization failed
    #[error("JSON parse error: {message}{}", .body.as_ref().map(|b| format!(" (body: {b})")).unwrap_or_default())]
    Json {
        message: String,
        body: Option<String>,
    },

    /// API returned an error status code
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Exchanging client credentials for an access token failed
    #[error("token exchange failed ({status})")]
    TokenExchange { status: u16 },

    /// Invalid client credentials or expired token
    #[error("unauthorized (check VASTTRAFIK_CLIENT_ID and VASTTRAFIK_CLIENT_SECRET)")]
    Unauthorized,

    /// Rate limited by the API
    #[error("rate limited by Västtrafik API")]
    RateLimited,

    /// The requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Client is missing configuration
    #[error("not configured: {0}")]
    NotConfigured(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TransitError::Api {
            status: 500,
            message: "Internal Server Error".into(),
        };
        assert_eq!(err.to_string(), "API error 500: Internal Server Error");

        let err = TransitError::Json {
            message: "expected string".into(),
            body: Some("{}".into()),
        };
        assert_eq!(err.to_string(), "JSON parse error: expected string (body: {})");

        let err = TransitError::Json {
            message: "eof".into(),
            body: None,
        };
        assert_eq!(err.to_string(), "JSON parse error: eof");

        let err = TransitError::TokenExchange { status: 401 };
        assert_eq!(err.to_string(), "token exchange failed (401)");

        let err = TransitError::NotFound("journey abc".into());
        assert_eq!(err.to_string(), "not found: journey abc");
    }
}
