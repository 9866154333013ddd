use crate::errors::AppError;
use async_trait::async_trait;
use std::time::Duration;

/// ERP XML-RPC endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Session-less services: `version`, `authenticate`.
    Common,
    /// Model access: `execute_kw`.
    Object,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Common => "/xmlrpc/2/common",
            Endpoint::Object => "/xmlrpc/2/object",
        }
    }
}

/// Sends one request body and returns the raw response text.
#[async_trait]
pub trait XmlRpcTransport: Send + Sync {
    async fn send(&self, endpoint: Endpoint, body: String) -> Result<String, AppError>;
}

/// Bounded retry policy shared by every outbound ERP call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, initial try included.
    pub max_attempts: usize,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`.
    pub fn backoff_delay(&self, retry: usize) -> Duration {
        let shift = retry.saturating_sub(1).min(8) as u32;
        self.base_backoff.saturating_mul(1u32 << shift)
    }
}

/// HTTP transport to the ERP with retry on transport failures.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Creates a new transport.
    ///
    /// `base_url` is only checked when a request is made, so the service can
    /// start without ERP settings.
    pub fn new(base_url: Option<String>, retry: RetryPolicy) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create ERP HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.unwrap_or_default(),
            retry,
        })
    }

    fn url_for(&self, endpoint: Endpoint) -> Result<reqwest::Url, AppError> {
        if self.base_url.trim().is_empty() {
            return Err(AppError::ConfigurationError(
                "ODOO_URL is not configured".to_string(),
            ));
        }
        let joined = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint.path());
        reqwest::Url::parse(&joined)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid ODOO_URL: {}", e)))
    }

    async fn send_once(&self, url: &reqwest::Url, body: &str) -> Result<String, AppError> {
        let response = self
            .client
            .post(url.clone())
            .header("Content-Type", "text/xml")
            .header("Accept", "text/xml")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| AppError::TransportError(format!("ERP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::TransportError(format!(
                "ERP returned HTTP {}",
                status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::TransportError(format!("Failed to read ERP response: {}", e)))
    }
}

#[async_trait]
impl XmlRpcTransport for HttpTransport {
    async fn send(&self, endpoint: Endpoint, body: String) -> Result<String, AppError> {
        let url = self.url_for(endpoint)?;
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            tracing::debug!(attempt, endpoint = endpoint.path(), "sending XML-RPC request");
            match self.send_once(&url, &body).await {
                Ok(text) => {
                    tracing::debug!(
                        attempt,
                        endpoint = endpoint.path(),
                        bytes = text.len(),
                        "received XML-RPC response"
                    );
                    return Ok(text);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.retry.backoff_delay(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "ERP call failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempt, endpoint = endpoint.path(), error = %e, "ERP call failed");
                    return Err(e);
                }
            }
        }
    }
}
