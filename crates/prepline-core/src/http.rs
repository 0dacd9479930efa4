//! Blocking HTTP GET over a shared async client.
//!
//! Uses async reqwest internally, but presents a sync interface so the
//! harvester can run on plain threads or rayon workers.

use std::sync::LazyLock;
use std::time::Duration;

use crate::error::FetchError;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in a [`FetchError`] message
const MAX_ERROR_BODY: usize = 200;

static USER_AGENT: &str = concat!("prepline/", env!("CARGO_PKG_VERSION"));

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// GET `url` and return the body as text.
///
/// Non-2xx responses become [`FetchError::Http`] with the status and the
/// start of the response body. `bearer` is sent as an `Authorization`
/// header when present.
pub fn get_text(url: &str, bearer: Option<&str>, timeout: Duration) -> Result<String, FetchError> {
    SHARED_RUNTIME.handle().block_on(async {
        let mut request = SHARED_CLIENT
            .get(url)
            .timeout(timeout)
            .header(reqwest::header::ACCEPT, "application/vnd.api+json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Http {
                status: Some(status.as_u16()),
                message: error_snippet(status, &body),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))
    })
}

fn error_snippet(status: reqwest::StatusCode, body: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("unexpected status");
    let body = body.trim();
    if body.is_empty() {
        return reason.to_string();
    }
    let mut end = body.len().min(MAX_ERROR_BODY);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{reason}: {}", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_snippet_empty_body_uses_reason() {
        let msg = error_snippet(reqwest::StatusCode::BAD_GATEWAY, "  ");
        assert_eq!(msg, "Bad Gateway");
    }

    #[test]
    fn error_snippet_truncates_long_body() {
        let body = "x".repeat(1000);
        let msg = error_snippet(reqwest::StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(msg.starts_with("Internal Server Error: "));
        assert!(msg.len() < 300);
    }

    #[test]
    fn error_snippet_respects_char_boundaries() {
        let body = "é".repeat(150);
        let msg = error_snippet(reqwest::StatusCode::TOO_MANY_REQUESTS, &body);
        assert!(msg.starts_with("Too Many Requests"));
    }

    #[test]
    #[ignore] // requires network
    fn get_text_unreachable_host_is_transport_error() {
        let err = get_text(
            "http://127.0.0.1:9/never",
            None,
            Duration::from_secs(2),
        )
        .unwrap_err();
        assert_eq!(err.status(), None);
        assert!(err.is_retryable());
    }
}
