//! Error type for remote API fetches

/// Failure fetching one page from the remote API.
///
/// `Http { status: None }` covers transport failures (connect, timeout,
/// reset) where no response was received.
#[derive(Debug)]
pub enum FetchError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Response arrived but could not be interpreted as a page
    Decode(String),
    /// Still throttled (429) after every retry was spent
    RateLimitExceeded { attempts: u32 },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Decode(msg) => write!(f, "malformed response: {msg}"),
            Self::RateLimitExceeded { attempts } => {
                write!(f, "rate limit exceeded after {attempts} attempts")
            }
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create HTTP error from reqwest error.
    ///
    /// The request URL is stripped so query strings never reach the logs.
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16());
        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connect"
        } else if e.is_body() || e.is_decode() {
            "body"
        } else {
            "request"
        };
        let message = match std::error::Error::source(e) {
            Some(source) => format!("{kind}: {source}"),
            None => kind.to_string(),
        };
        Self::Http { status, message }
    }

    /// HTTP status of the last response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            Self::RateLimitExceeded { .. } => Some(429),
            Self::Decode(_) => None,
        }
    }

    /// Throttled by the server (429), whether or not retries remain.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }

    /// Transient network failures, 5xx, 408 and 429 are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status: None, .. } => true,
            Self::Http {
                status: Some(s), ..
            } => matches!(s, 408 | 429 | 500..=599),
            Self::Decode(_) | Self::RateLimitExceeded { .. } => false,
        }
    }

    /// Whether this failure points at the network or the server rather than
    /// at one bad response body.
    pub fn is_connectivity(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> FetchError {
        FetchError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn http_5xx_retryable() {
        assert!(http_err(500).is_retryable());
        assert!(http_err(503).is_retryable());
    }

    #[test]
    fn http_429_retryable_and_rate_limited() {
        let err = http_err(429);
        assert!(err.is_retryable());
        assert!(err.is_rate_limited());
    }

    #[test]
    fn http_4xx_not_retryable() {
        assert!(!http_err(400).is_retryable());
        assert!(!http_err(404).is_retryable());
    }

    #[test]
    fn transport_error_retryable() {
        let err = FetchError::Http {
            status: None,
            message: "connect".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn decode_not_retryable_nor_connectivity() {
        let err = FetchError::Decode("missing data".to_string());
        assert!(!err.is_retryable());
        assert!(!err.is_connectivity());
    }

    #[test]
    fn rate_limit_exceeded_is_distinct() {
        let err = FetchError::RateLimitExceeded { attempts: 5 };
        assert!(!err.is_retryable());
        assert!(err.is_rate_limited());
        assert_eq!(err.to_string(), "rate limit exceeded after 5 attempts");
    }

    #[test]
    fn display_includes_status() {
        assert_eq!(format!("{}", http_err(502)), "HTTP 502: test");
    }
}
