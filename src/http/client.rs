use reqwest::{self, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tokio::{
    sync::Mutex,
    time::{Instant, sleep_until},
};

/// Custom error type for HTTP requests.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("HTTP error: {0} returned {1}. Response body: {2}")]
    HttpError(Url, u16, String),
    #[error("Error deserializing JSON: {0}")]
    JsonError(String),
    #[error("Exchange API error {code}: {message}")]
    Api { code: String, message: String },
    #[error("Other error: {0}")]
    Other(String),
}

/// Builds the HTTP client used by one exchange connection.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, RequestError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RequestError::Other(e.to_string()))
}

/// Makes a GET request against `base` joined with `path` and decodes the JSON body.
pub async fn get<T: DeserializeOwned>(
    client: &reqwest::Client,
    base: &Url,
    path: &str,                   // API path, relative to base.
    params: &[(&str, String)],    // Query parameters.
    headers: &[(&str, &str)],     // Extra header parameters.
) -> Result<T, RequestError> {
    // Construct the URL.
    let mut url = base
        .join(path)
        .map_err(|e| RequestError::Other(e.to_string()))?;
    if !params.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
    }

    let mut req = client.get(url.as_str());
    for (k, v) in headers {
        req = req.header(*k, *v);
    }

    let response = req
        .send()
        .await
        .map_err(|e| RequestError::Other(e.to_string()))?;

    // Get the response status code.
    let status = response.status();

    // Handle non-success status codes.
    if !status.is_success() {
        let body = response
            .text()
            .await
            .map_err(|e| RequestError::Other(e.to_string()))?;
        return Err(RequestError::HttpError(url, status.as_u16(), body));
    }

    // Deserialize the JSON response.
    response
        .json()
        .await
        .map_err(|e| RequestError::JsonError(e.to_string()))
}

/// Keeps consecutive requests of one client at least `interval` apart.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Waits until the next request is allowed and records it as sent.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.interval;
            if ready > Instant::now() {
                sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}
