//! HTTP client utilities shared by telemetry source adapters.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{PvError, Result};

/// Default timeout for telemetry requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("pvstat/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PvError::SourceUnavailable {
            message: format!("build HTTP client: {e}"),
        })
}

/// Fetch JSON from a URL.
///
/// `timeout` is only used to label a timeout error; the client enforces it.
///
/// # Errors
///
/// - `SourceTimeout` when the request exceeds the client timeout
/// - `SourceUnavailable` on connect failures and non-2xx responses
/// - `MalformedResponse` when the body is not the expected JSON
pub async fn fetch_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: &str,
    bearer: Option<&str>,
    timeout: Duration,
) -> Result<T> {
    let mut request = client.get(url);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            PvError::SourceTimeout {
                seconds: timeout.as_secs(),
            }
        } else {
            PvError::SourceUnavailable {
                message: e.to_string(),
            }
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(PvError::SourceUnavailable {
            message: format!("HTTP {status} from {url}"),
        });
    }

    response.json().await.map_err(|e| {
        if e.is_timeout() {
            PvError::SourceTimeout {
                seconds: timeout.as_secs(),
            }
        } else {
            PvError::MalformedResponse(e.to_string())
        }
    })
}
