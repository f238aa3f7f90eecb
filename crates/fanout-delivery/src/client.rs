//! HTTP client for outbound webhook delivery.
//!
//! A thin wrapper over a shared `reqwest::Client` that builds the outbound
//! POST with the gateway's header contract and categorizes the outcome.
//! The underlying client handle is cheap to clone and pools connections
//! across every sender.

use std::time::Duration;

use bytes::Bytes;
use tracing::{info_span, Instrument};

use crate::{
    error::{DeliveryError, Result},
    signing::SIGNATURE_HEADER,
};

/// Header carrying the event name on every outbound request.
pub const EVENT_HEADER: &str = "X-Webpa-Event";
/// Header carrying the correlation id on every outbound request.
pub const TRANSACTION_HEADER: &str = "X-Webpa-Transaction-Id";
/// Header carrying the originating device id on every outbound request.
pub const DEVICE_ID_HEADER: &str = "X-Webpa-Device-Id";

/// Configuration for the delivery client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout applied to every outbound request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "fanout-webhook-delivery/0.1".to_string(),
            max_redirects: 3,
        }
    }
}

/// One prepared outbound POST.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Destination URL.
    pub url: String,
    /// `Content-Type` header value.
    pub content_type: String,
    /// Event name for the `X-Webpa-Event` header.
    pub event: String,
    /// Device id for the `X-Webpa-Device-Id` header.
    pub device_id: String,
    /// Correlation id for the `X-Webpa-Transaction-Id` header.
    pub transaction_id: String,
    /// Precomputed `sha1=<hex>` signature, when the listener has a secret.
    pub signature: Option<String>,
    /// Payload, forwarded byte-for-byte.
    pub body: Bytes,
}

/// Result of one delivery attempt that reached the endpoint.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryOutcome {
    /// HTTP status code returned by the endpoint.
    pub status: u16,
    /// Total request duration.
    pub duration: Duration,
    /// Whether the endpoint answered with a 2xx status.
    pub is_success: bool,
}

/// HTTP client optimized for fan-out delivery.
///
/// All senders share one handle so connections are pooled per endpoint.
/// The handle must be treated as immutable shared state.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl DeliveryClient {
    /// Creates a delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, timeout: config.timeout })
    }

    /// Creates a delivery client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Delivers one prepared event to a listener endpoint.
    ///
    /// A response of any status is an `Ok` outcome; the caller decides what
    /// a non-2xx means. Transport failures and timeouts are errors.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Timeout` or `DeliveryError::Network` when the
    /// endpoint was never reached.
    pub async fn deliver(&self, request: OutboundRequest) -> Result<DeliveryOutcome> {
        let span = info_span!(
            "webhook_delivery",
            url = %request.url,
            event = %request.event,
            transaction_id = %request.transaction_id,
        );

        async move {
            let start = std::time::Instant::now();

            let mut http_request = self
                .client
                .post(&request.url)
                .header("Content-Type", &request.content_type)
                .header(EVENT_HEADER, &request.event)
                .header(TRANSACTION_HEADER, &request.transaction_id)
                .header(DEVICE_ID_HEADER, &request.device_id)
                .body(request.body.clone());

            if let Some(signature) = &request.signature {
                http_request = http_request.header(SIGNATURE_HEADER, signature);
            }

            let response = http_request.send().await.map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout { timeout_seconds: self.timeout.as_secs() }
                } else {
                    DeliveryError::network(e.to_string())
                }
            })?;

            let duration = start.elapsed();
            let status = response.status().as_u16();
            let is_success = response.status().is_success();

            if is_success {
                tracing::debug!(status, duration_ms = duration.as_millis() as u64, "delivered");
            } else {
                tracing::warn!(
                    status,
                    duration_ms = duration.as_millis() as u64,
                    "endpoint rejected delivery"
                );
            }

            Ok(DeliveryOutcome { status, duration, is_success })
        }
        .instrument(span)
        .await
    }

    /// Posts a cut-off notification document to a listener's failure URL.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Timeout` or `DeliveryError::Network` when the
    /// failure URL was never reached.
    pub async fn notify_cut_off(
        &self,
        failure_url: &str,
        body: Bytes,
        signature: Option<String>,
    ) -> Result<u16> {
        let mut http_request = self
            .client
            .post(failure_url)
            .header("Content-Type", "application/json")
            .body(body);

        if let Some(signature) = signature {
            http_request = http_request.header(SIGNATURE_HEADER, signature);
        }

        let response = http_request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout { timeout_seconds: self.timeout.as_secs() }
            } else {
                DeliveryError::network(e.to_string())
            }
        })?;

        Ok(response.status().as_u16())
    }
}
