//! A small wrapper on an HTTP client used by every remote data source. Sets
//! sensible defaults such as timeouts and user-agent and applies retry
//! middleware for transient failures.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::CertError;

/// Shared HTTP client with timeout and retry defaults.
pub struct Request {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// Initializes a new `Request` instance.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3, // total attempts = 4
        }
    }

    /// Creates a GET request builder with defaults applied.
    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .request(Method::GET, url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("certkit-core/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    /// Sends a GET request and decodes the JSON response body.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Network`] on transport failure or a non-success
    /// status and [`CertError::Serialization`] on an undecodable body.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CertError> {
        let response = self.handle(self.get(url)).await?;
        response
            .json()
            .await
            .map_err(|err| CertError::Serialization(err.to_string()))
    }

    /// Sends a GET request and returns the response body as text.
    ///
    /// # Errors
    ///
    /// Returns [`CertError::Network`] on transport failure or a non-success
    /// status.
    pub(crate) async fn get_text(&self, url: &str) -> Result<String, CertError> {
        let response = self.handle(self.get(url)).await?;
        response.text().await.map_err(Into::into)
    }

    /// Sends a request with retries for transient failures (timeouts,
    /// connection errors, 429 and 5xx responses).
    pub(crate) async fn handle(
        &self,
        request_builder: RequestBuilder,
    ) -> Result<Response, CertError> {
        let Some(template) = request_builder.try_clone() else {
            // Streaming bodies cannot be retried; send once.
            return execute(request_builder).await.map_err(Into::into);
        };

        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries as usize);

        (|| async {
            let request_builder = template.try_clone().ok_or_else(|| {
                HandleError::permanent(
                    "<unknown>".to_string(),
                    None,
                    "request cannot be retried because it is not cloneable".to_string(),
                )
            })?;
            execute(request_builder).await
        })
        .retry(backoff)
        .when(HandleError::is_retryable)
        .await
        .map_err(Into::into)
    }
}

#[derive(Debug)]
struct HandleError {
    url: String,
    status: Option<u16>,
    error: String,
    retryable: bool,
}

impl HandleError {
    fn retryable(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: true,
        }
    }

    fn permanent(url: String, status: Option<u16>, error: String) -> Self {
        Self {
            url,
            status,
            error,
            retryable: false,
        }
    }

    fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl From<HandleError> for CertError {
    fn from(value: HandleError) -> Self {
        Self::Network {
            url: value.url,
            status: value.status,
            error: value.error,
        }
    }
}

async fn execute(request_builder: RequestBuilder) -> Result<Response, HandleError> {
    let (client, request) = request_builder.build_split();
    let request = request.map_err(|err| {
        HandleError::permanent(
            err.url()
                .map(ToString::to_string)
                .unwrap_or_else(|| "<unknown>".to_string()),
            None,
            format!("request build failed: {err}"),
        )
    })?;
    let url = request.url().to_string();

    match client.execute(request).await {
        Ok(response) => {
            let status = response.status().as_u16();
            if status == 429 || (500..600).contains(&status) {
                return Err(HandleError::retryable(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            if !response.status().is_success() {
                return Err(HandleError::permanent(
                    url,
                    Some(status),
                    format!("request error with bad status code {status}"),
                ));
            }
            Ok(response)
        }
        Err(err) => {
            if err.is_timeout() || err.is_connect() {
                return Err(HandleError::retryable(
                    url,
                    None,
                    format!("request timeout/connect error: {err}"),
                ));
            }
            Err(HandleError::permanent(
                url,
                None,
                format!("request failed: {err}"),
            ))
        }
    }
}
