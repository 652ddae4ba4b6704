//! `ServiceHttpClient` — the per-service handle returned by
//! [`super::http_client_factory::HttpClientFactory`] (spec §4.1, component C1).
//!
//! Every outbound fetch in the system (source pull, logo fetch, live stream
//! open) goes through one of these so retries, circuit breaking, and the
//! response size cap are applied uniformly.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::{Client, Method};
use tracing::{debug, warn};

use super::circuit_breaker::{Admission, CircuitBreaker, ErrorCategory};
use super::decompression::DecompressionService;
use super::status_code_matcher::{is_retryable_status, is_status_acceptable};
use crate::errors::{AppError, AppResult};

const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br";

#[derive(Debug, Clone)]
pub struct ResolvedHttpSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub max_response_size: u64,
    pub user_agent: String,
    pub acceptable_status_codes: Vec<String>,
}

/// A client bound to one service name, sharing that service's circuit
/// breaker with every other client created for the same name.
#[derive(Clone)]
pub struct ServiceHttpClient {
    service_name: String,
    client: Client,
    breaker: Arc<CircuitBreaker>,
    settings: ResolvedHttpSettings,
}

impl ServiceHttpClient {
    pub fn new(service_name: impl Into<String>, client: Client, breaker: Arc<CircuitBreaker>, settings: ResolvedHttpSettings) -> Self {
        Self { service_name: service_name.into(), client, breaker, settings }
    }

    pub async fn get(&self, url: &str) -> AppResult<Bytes> {
        self.request(Method::GET, url, None).await
    }

    pub async fn is_available(&self) -> bool {
        !matches!(self.breaker.allow().await, Admission::Denied)
    }

    /// Execute a request following the retry/backoff/circuit-breaker
    /// contract of spec §4.1 steps 1-7.
    pub async fn request(&self, method: Method, url: &str, body: Option<Bytes>) -> AppResult<Bytes> {
        let mut attempt: u32 = 0;
        loop {
            let probe = match self.breaker.allow().await {
                Admission::Denied => {
                    warn!(service = %self.service_name, url, "circuit open, request blocked");
                    return Err(AppError::CircuitOpen { service: self.service_name.clone() });
                }
                Admission::Allowed { probe } => probe,
            };

            let mut req = self
                .client
                .request(method.clone(), url)
                .timeout(self.settings.timeout)
                .header(reqwest::header::USER_AGENT, &self.settings.user_agent)
                .header(reqwest::header::ACCEPT_ENCODING, DEFAULT_ACCEPT_ENCODING);
            if let Some(body) = &body {
                req = req.body(body.clone());
            }

            debug!(service = %self.service_name, url, attempt, probe, "sending request");
            match req.send().await {
                Err(err) => {
                    let category = if err.is_timeout() { ErrorCategory::Timeout } else { ErrorCategory::NetworkError };
                    self.breaker.record_failure(category).await;
                    if attempt >= self.settings.max_retries {
                        return Err(AppError::transient(self.service_name.clone(), format!("max retries exceeded: {err}")));
                    }
                    self.backoff(attempt).await;
                    attempt += 1;
                    continue;
                }
                Ok(response) => {
                    let status = response.status().as_u16();

                    if is_retryable_status(status) {
                        self.breaker.record_failure(ErrorCategory::ServerError5xx).await;
                        if attempt >= self.settings.max_retries {
                            return Err(AppError::transient(self.service_name.clone(), format!("max retries exceeded, last status {status}")));
                        }
                        self.backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }

                    if is_status_acceptable(status, &self.settings.acceptable_status_codes) {
                        self.breaker.record_success().await;
                        return read_limited(response, self.settings.max_response_size, &self.service_name).await;
                    }

                    let category = if (400..500).contains(&status) { ErrorCategory::ClientError4xx } else { ErrorCategory::ServerError5xx };
                    self.breaker.record_failure(category).await;
                    return Err(AppError::fatal_upstream(self.service_name.clone(), format!("unacceptable status {status}")));
                }
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let exp = self.settings.backoff_multiplier.powi(attempt as i32);
        let delay = self.settings.base_delay.mul_f64(exp).min(self.settings.max_delay);
        tokio::time::sleep(delay).await;
    }
}

/// Reads the (already transparently decompressed by `reqwest`) body,
/// enforcing the byte cap *after* decompression so a small compressed
/// payload that balloons on expansion is still caught (spec §4.1 step 7,
/// §8 "decompression bomb" property), then runs magic-byte detection for
/// the case a server serves a pre-compressed file without the matching
/// `Content-Encoding` header (reqwest only decodes that transport-level
/// case, not a `.xml.gz` body served as-is).
async fn read_limited(response: reqwest::Response, max_response_size: u64, service_name: &str) -> AppResult<Bytes> {
    let raw = if max_response_size == 0 {
        response.bytes().await.map_err(AppError::Http)?
    } else {
        let mut stream = response.bytes_stream();
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(AppError::Http)?;
            if buf.len() as u64 + chunk.len() as u64 > max_response_size {
                return Err(AppError::fatal_upstream(service_name.to_string(), format!("response exceeded {max_response_size} byte limit")));
            }
            buf.extend_from_slice(&chunk);
        }
        buf.freeze()
    };

    match DecompressionService::detect_compression_format(&raw) {
        crate::utils::CompressionFormat::Uncompressed => Ok(raw),
        _ => DecompressionService::decompress(raw).map(Bytes::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerProfile;

    fn settings() -> ResolvedHttpSettings {
        ResolvedHttpSettings {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            base_delay: Duration::from_millis(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(10),
            max_response_size: 0,
            user_agent: "test/0.1".to_string(),
            acceptable_status_codes: vec![],
        }
    }

    #[tokio::test]
    async fn circuit_open_short_circuits_without_network_call() {
        let breaker = Arc::new(CircuitBreaker::new("test_service", CircuitBreakerProfile { failure_threshold: 1, ..CircuitBreakerProfile::default() }));
        breaker.force_open().await;
        let client = ServiceHttpClient::new("test_service", Client::new(), breaker, settings());
        let err = client.get("http://127.0.0.1:1/unreachable").await.unwrap_err();
        assert!(matches!(err, AppError::CircuitOpen { .. }));
    }
}
