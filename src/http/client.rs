//! Production HTTP client backed by reqwest.

use std::time::Duration;

use crate::error::Error;
use crate::user_agent;

use super::{HttpClient, HttpRequest, HttpResponse};

/// [`HttpClient`] implementation over a shared [`reqwest::Client`].
///
/// The underlying client keeps its own socket pool per host; the
/// per-attempt deadline comes from the request, not the client, so per-call
/// timeout overrides work without rebuilding the client.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl std::fmt::Debug for ReqwestHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestHttpClient").finish_non_exhaustive()
    }
}

impl ReqwestHttpClient {
    /// Creates the client with transport defaults: a 10 second connect
    /// timeout, gzip response decompression, and the crate's User-Agent.
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent::user_agent())
            .build()
            .map_err(|e| {
                Error::configuration(format!("failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    /// Wraps an externally configured [`reqwest::Client`] (custom TLS
    /// roots, proxies, socket pool tuning).
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .timeout(request.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;

        let status_code = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(classify_reqwest_error)?;

        Ok(HttpResponse {
            status_code,
            headers,
            body,
        })
    }
}

/// Maps a reqwest failure onto the transport taxonomy. Timeouts and
/// connect-level failures are the retriable kinds; everything else at this
/// layer is still a failure to reach the node.
fn classify_reqwest_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::timeout(err.to_string())
    } else {
        Error::connection(err.to_string())
    }
}
