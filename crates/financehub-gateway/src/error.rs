use thiserror::Error;

/// Failures raised while building gateway state or forwarding to the origin.
///
/// None of these reach the client as a raw 5xx: the catch-all handler logs
/// them and answers with the error redirect.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Origin base URL could not be combined with the request path
    #[error("invalid origin URL: {0}")]
    InvalidOrigin(String),

    /// Request method cannot be represented by the HTTP client
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Origin unreachable or returned an unreadable response
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Origin response exceeded the configured body limit
    #[error("upstream response too large (max {max} bytes)")]
    ResponseTooLarge { max: usize },

    /// Client request body exceeded the configured limit
    #[error("request body too large (max {max} bytes)")]
    RequestTooLarge { max: usize },

    /// Client request body could not be read
    #[error("failed to read request body: {0}")]
    RequestBody(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Short, stable label used for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            GatewayError::InvalidOrigin(_) => "invalid_origin",
            GatewayError::UnsupportedMethod(_) => "unsupported_method",
            GatewayError::Upstream(_) => "upstream",
            GatewayError::ResponseTooLarge { .. } => "too_large",
            GatewayError::RequestTooLarge { .. } => "request_too_large",
            GatewayError::RequestBody(_) => "request_body",
            GatewayError::Internal(_) => "internal",
        }
    }
}

/// Cap an error message before it is logged so upstream bodies cannot flood
/// the log stream.
pub fn truncate_for_log(msg: &str) -> String {
    const MAX_LOG_CHARS: usize = 200;
    if msg.chars().count() <= MAX_LOG_CHARS {
        return msg.to_string();
    }
    let mut out: String = msg.chars().take(MAX_LOG_CHARS).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_message_untouched() {
        assert_eq!(truncate_for_log("connection refused"), "connection refused");
    }

    #[test]
    fn test_truncate_long_message() {
        let long = "x".repeat(500);
        let out = truncate_for_log(&long);
        assert_eq!(out.len(), 203);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(300);
        let out = truncate_for_log(&long);
        assert_eq!(out.chars().count(), 203);
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(GatewayError::Upstream("x".into()).reason(), "upstream");
        assert_eq!(
            GatewayError::ResponseTooLarge { max: 1 }.reason(),
            "too_large"
        );
        assert_eq!(
            GatewayError::RequestTooLarge { max: 1 }.reason(),
            "request_too_large"
        );
    }
}
