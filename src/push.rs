//! Push-delivery channel seam.
//!
//! The alerting core only needs "send this payload to that destination" plus
//! a way to tell permanent failure apart from transient failure, so that is
//! the whole interface. The production implementation posts the payload to
//! the destination endpoint over HTTP; tests substitute an in-memory channel.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::model::NotificationPayload;

/// Per-delivery timeout. Push endpoints are treated as bounded-latency
/// dependencies.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Failure modes of a single delivery attempt.
#[derive(Debug, Error)]
pub enum PushError {
    /// The destination no longer exists; the subscriber should be removed.
    #[error("destination is no longer valid")]
    Gone,
    /// Anything recoverable: network trouble, timeouts, 5xx responses.
    /// Logged and skipped; never retried within the pass.
    #[error("delivery failed: {0}")]
    Transient(String),
}

/// A fire-and-forget notification sink.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn deliver(
        &self,
        destination: &str,
        payload: &NotificationPayload,
    ) -> Result<(), PushError>;
}

/// HTTP push channel: POSTs the JSON payload to the destination endpoint.
///
/// An HTTP 410 from the endpoint maps to [`PushError::Gone`]; everything else
/// that fails is transient.
#[derive(Clone, Default)]
pub struct HttpPushChannel {
    client: reqwest::Client,
}

impl HttpPushChannel {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PushChannel for HttpPushChannel {
    async fn deliver(
        &self,
        destination: &str,
        payload: &NotificationPayload,
    ) -> Result<(), PushError> {
        let response = self
            .client
            .post(destination)
            .timeout(DELIVERY_TIMEOUT)
            .json(payload)
            .send()
            .await
            .map_err(|e| PushError::Transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::GONE {
            return Err(PushError::Gone);
        }
        if !status.is_success() {
            return Err(PushError::Transient(format!(
                "endpoint returned {status}"
            )));
        }

        debug!(destination, title = %payload.title, "push delivered");
        Ok(())
    }
}
