use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use ltv_guard_core::config::BinanceConfig;
use ltv_guard_core::error::GatewayError;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::signing::ApiCredentials;

/// Venue error codes that indicate dead credentials rather than a bad
/// request: invalid key, key format, and signature failures.
const AUTH_ERROR_CODES: [i64; 3] = [-1022, -2014, -2015];

/// Signed Binance REST client.
///
/// Every request is rate limited and carries the configured timeout, so a
/// stalled venue call cannot hold a portfolio guard indefinitely.
pub struct BinanceClient {
    http_client: Client,
    base_url: String,
    credentials: ApiCredentials,
    recv_window_ms: u64,
    rate_limiter: Arc<RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>>,
}

impl BinanceClient {
    /// Creates a client against the configured base URL.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &BinanceConfig, credentials: ApiCredentials) -> anyhow::Result<Self> {
        // 1200 request weight per minute = 20 per second
        let quota = Quota::per_second(NonZeroU32::new(20).unwrap());
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms: config.recv_window_ms,
            rate_limiter,
        })
    }

    /// Unsigned GET for public market data.
    ///
    /// # Errors
    /// Returns a [`GatewayError`] classifying the failure.
    pub async fn get_public(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value, GatewayError> {
        let query = build_query(params);
        self.send(Method::GET, endpoint, &query, false).await
    }

    /// Signed GET, with timestamp, recvWindow, and signature appended.
    ///
    /// # Errors
    /// Returns a [`GatewayError`] classifying the failure.
    pub async fn get_signed(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value, GatewayError> {
        let query = self.signed_query(params);
        self.send(Method::GET, endpoint, &query, true).await
    }

    /// Signed POST. Binance reads parameters from the query string.
    ///
    /// # Errors
    /// Returns a [`GatewayError`] classifying the failure.
    pub async fn post_signed(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value, GatewayError> {
        let query = self.signed_query(params);
        self.send(Method::POST, endpoint, &query, true).await
    }

    /// Decodes a payload into its typed shape.
    ///
    /// # Errors
    /// Maps unexpected response shapes to a transient failure so the cycle
    /// retries rather than acting on a payload it cannot trust.
    pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, GatewayError> {
        serde_json::from_value(value)
            .map_err(|err| GatewayError::Transient(format!("unexpected response shape: {err}")))
    }

    fn signed_query(&self, params: &[(&str, String)]) -> String {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let mut query = build_query(params);
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(&format!(
            "recvWindow={}&timestamp={timestamp}",
            self.recv_window_ms
        ));
        let signature = self.credentials.sign(&query);
        query.push_str(&format!("&signature={signature}"));
        query
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        query: &str,
        signed: bool,
    ) -> Result<Value, GatewayError> {
        self.rate_limiter.until_ready().await;

        let mut url = format!("{}{endpoint}", self.base_url);
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }

        let mut request = self.http_client.request(method, &url);
        if signed {
            request = request.header("X-MBX-APIKEY", &self.credentials.api_key);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        // The signature is part of the query string; log the endpoint only.
        tracing::debug!(endpoint, status = status.as_u16(), "venue response");
        let body: Value = response.json().await.map_err(map_transport_error)?;

        if status.is_success() {
            return check_embedded_error(body);
        }
        Err(map_http_error(status, &body))
    }
}

fn check_embedded_error(body: Value) -> Result<Value, GatewayError> {
    // Some endpoints answer 200 with an error object in the body.
    if let Some(code) = body.get("code").and_then(Value::as_i64) {
        if code != 0 && body.get("msg").is_some() {
            let message = body
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(classify_venue_error(code, message));
        }
    }
    Ok(body)
}

fn build_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn map_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Transient(format!("request timed out: {err}"))
    } else {
        GatewayError::Transient(format!("network failure: {err}"))
    }
}

fn map_http_error(status: StatusCode, body: &Value) -> GatewayError {
    let code = body.get("code").and_then(Value::as_i64).unwrap_or(-1);
    let message = body
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::IM_A_TEAPOT => {
            GatewayError::Transient(format!("rate limited: {message}"))
        }
        status if status.is_server_error() => {
            GatewayError::Transient(format!("venue error {status}: {message}"))
        }
        _ => classify_venue_error(code, message),
    }
}

fn classify_venue_error(code: i64, message: String) -> GatewayError {
    if AUTH_ERROR_CODES.contains(&code) {
        GatewayError::Auth(format!("code {code}: {message}"))
    } else {
        GatewayError::Rejected { code, message }
    }
}
