use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::config::EndpointConfig;
use crate::error::CoreError;
use crate::provider::Endpoint;

use super::connection::{parse_connection, resolve_auth};
use super::protocol::{classify_status, parse_jsonrpc_error, JsonRpcRequest, JsonRpcResponse};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// A single REST or JSON-RPC backend reached over HTTP(S).
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
    auth: Option<(String, String)>,
    limiter: Option<DirectRateLimiter>,
    next_id: AtomicU64,
}

impl HttpEndpoint {
    /// Create an endpoint from its configuration.
    ///
    /// If `requests_per_second` is set, every outbound HTTP request waits
    /// for the limiter first.
    pub fn new(config: &EndpointConfig) -> Result<Self, CoreError> {
        let auth = resolve_auth(config.user.as_deref(), config.pass.as_deref())?;
        let url = parse_connection(&config.url)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build HTTP client: {e}")))?;

        let limiter = match config.requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::Config("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            url,
            auth,
            limiter,
            next_id: AtomicU64::new(1),
        })
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    fn url_for(&self, path: &str) -> String {
        if path.is_empty() {
            self.url.clone()
        } else {
            format!("{}/{}", self.url, path.trim_start_matches('/'))
        }
    }

    async fn read_body(&self, response: reqwest::Response, label: &str) -> Result<String, CoreError> {
        let status = response.status();
        let body = response.text().await?;
        debug!(request = label, %status, body_len = body.len(), "http response");
        trace!(request = label, body = %body, "http response body");
        match classify_status(status, &body) {
            Some(err) => Err(err),
            None => Ok(body),
        }
    }

    /// `GET {base}/{path}` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, CoreError> {
        self.wait_for_rate_limit().await;
        let url = self.url_for(path);
        debug!(url = %url, "http get");
        let response = self.with_auth(self.client.get(&url)).send().await?;
        let body = self.read_body(response, path).await?;
        serde_json::from_str(&body)
            .map_err(|e| CoreError::Network(format!("decode response from {url}: {e}")))
    }

    /// `POST {base}/{path}` with a plain-text body, returning the text reply.
    pub async fn post_text(&self, path: &str, payload: String) -> Result<String, CoreError> {
        self.wait_for_rate_limit().await;
        let url = self.url_for(path);
        debug!(url = %url, payload_len = payload.len(), "http post");
        let request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(payload);
        let response = self.with_auth(request).send().await?;
        self.read_body(response, path).await
    }

    /// Single JSON-RPC 2.0 call against the endpoint's base URL.
    pub async fn rpc_call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, CoreError> {
        self.wait_for_rate_limit().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(
            rpc.id = id,
            rpc.method = method,
            rpc.params = params.len(),
            "rpc call"
        );
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let request = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&req);
        let response = self.with_auth(request).send().await?;
        let body = self.read_body(response, method).await?;

        let decoded: JsonRpcResponse = serde_json::from_str(&body).map_err(|e| {
            CoreError::Network(format!("decode JSON-RPC response: {e}; body={body}"))
        })?;

        if let Some(err) = decoded.error {
            return Err(parse_jsonrpc_error(err));
        }

        Ok(decoded.result.unwrap_or(serde_json::Value::Null))
    }
}

impl Endpoint for HttpEndpoint {
    fn base_url(&self) -> &str {
        &self.url
    }
}
