//! reqwest-backed implementation of the transport contract.

use reqtrack_core::{ApiError, ApiResponse, Method, RequestSpec, Transport, TransportFuture};
use std::collections::HashMap;
use std::time::Duration;

/// HTTP transport speaking through a shared [`reqwest::Client`].
///
/// Success statuses settle as an owned [`ApiResponse`]; any other status
/// settles as [`ApiError::Response`] with the body captured as text so the
/// normalizer and error transforms can inspect it. Failures that never
/// produced a response settle as [`ApiError::Network`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport, applying `timeout` client-wide when given.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] when the underlying client cannot be
    /// constructed (TLS backend initialization, for example).
    pub fn new(timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|error| ApiError::Network(error.to_string()))?;
        Ok(Self { client })
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Delete => reqwest::Method::DELETE,
        Method::Get => reqwest::Method::GET,
        Method::Patch => reqwest::Method::PATCH,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
    }
}

impl Transport for HttpTransport {
    fn send(&self, spec: RequestSpec) -> TransportFuture<'_> {
        Box::pin(async move {
            let mut request = self.client.request(to_reqwest(spec.method), spec.url.as_str());
            for (name, value) in &spec.headers {
                request = request.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &spec.body {
                request = request.json(body);
            }
            if let Some(timeout) = spec.timeout {
                request = request.timeout(timeout);
            }

            tracing::debug!(method = %spec.method, url = %spec.url, "issuing request");
            let response = request
                .send()
                .await
                .map_err(|error| ApiError::Network(error.to_string()))?;

            let status = response.status();
            let url = response.url().to_string();
            let headers: HashMap<String, String> = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|error| ApiError::Network(error.to_string()))?
                .to_vec();

            if status.is_success() {
                Ok(ApiResponse {
                    status: status.as_u16(),
                    url,
                    headers,
                    body,
                })
            } else {
                tracing::warn!(status = status.as_u16(), url = %url, "request settled with an error status");
                Err(ApiError::Response {
                    status: status.as_u16(),
                    url,
                    body: String::from_utf8_lossy(&body).into_owned(),
                    is_401: false,
                    is_502: false,
                })
            }
        })
    }
}
