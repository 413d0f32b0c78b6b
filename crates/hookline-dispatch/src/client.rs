//! HTTP client invoking consumer callbacks.
//!
//! Responses of any status are returned as an outcome; only transport
//! failures error. The dispatcher decides retry behavior from the outcome,
//! the client just performs the exchange and stamps the broker headers.

use std::time::{Duration, Instant};

use hookline_core::DeliveryJob;
use tracing::{debug, warn};

use crate::{
    error::{CallbackError, Result},
    signing,
};

/// Response body bytes kept for logging and audit.
const MAX_BODY_CAPTURE: usize = 1024;

/// Configuration for the callback client.
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent presented to consumers.
    pub user_agent: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30), user_agent: "Hookline-Broker/1.0".to_string() }
    }
}

/// Outcome of one callback attempt that produced an HTTP response.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    /// HTTP status code returned by the consumer.
    pub status_code: u16,
    /// True for 2xx responses.
    pub is_success: bool,
    /// Leading response body bytes, for diagnostics.
    pub body: String,
    /// Wall-clock duration of the exchange.
    pub duration: Duration,
}

/// HTTP client POSTing messages to consumer callback URLs.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: reqwest::Client,
    config: CallbackConfig,
}

impl CallbackClient {
    /// Builds a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackError::Configuration`] when the underlying HTTP
    /// client rejects the settings.
    pub fn new(config: CallbackConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|err| CallbackError::configuration(err.to_string()))?;

        Ok(Self { client, config })
    }

    /// POSTs the job's message to its consumer.
    ///
    /// The request carries the payload verbatim with its original content
    /// type, the broker identification headers, and an HMAC-SHA256
    /// signature of the payload under the consumer token.
    ///
    /// # Errors
    ///
    /// [`CallbackError::Timeout`] and [`CallbackError::Network`] for
    /// transport failures; every HTTP status is a successful outcome.
    pub async fn deliver(&self, job: &DeliveryJob) -> Result<CallbackOutcome> {
        let message = &job.message;
        let consumer = &job.consumer;
        let attempt = job.retry_attempt_count + 1;
        let started = Instant::now();

        debug!(
            job_id = %job.id,
            consumer = %consumer.public_id,
            url = %consumer.callback_url,
            attempt,
            "invoking callback"
        );

        let signature = signing::sign(&consumer.token, message.payload.as_bytes());
        let request = self
            .client
            .post(&consumer.callback_url)
            .header("content-type", &message.content_type)
            .header("X-Hookline-Message-Id", &message.source_message_id)
            .header("X-Hookline-Channel-Id", &message.channel.public_id)
            .header("X-Hookline-Consumer-Id", &consumer.public_id)
            .header("X-Hookline-Attempt", attempt.to_string())
            .header(signing::SIGNATURE_HEADER, signature)
            .body(message.payload.clone());

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "callback transport failure");
                if err.is_timeout() {
                    return Err(CallbackError::timeout(self.config.timeout.as_secs()));
                }
                return Err(CallbackError::network(err.to_string()));
            },
        };

        let status_code = response.status().as_u16();
        let is_success = response.status().is_success();
        let body = match response.bytes().await {
            Ok(bytes) => {
                let end = bytes.len().min(MAX_BODY_CAPTURE);
                String::from_utf8_lossy(&bytes[..end]).into_owned()
            },
            Err(err) => format!("[failed to read response body: {err}]"),
        };

        let duration = started.elapsed();
        debug!(job_id = %job.id, status = status_code, duration_ms = duration.as_millis() as u64, "callback responded");

        Ok(CallbackOutcome { status_code, is_success, body, duration })
    }
}

#[cfg(test)]
mod tests {
    use hookline_core::{Channel, Consumer, Message, Producer};
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn job_for(url: &str) -> DeliveryJob {
        let channel = Channel::new("orders", "channel-token").unwrap();
        let producer = Producer::new("erp", "producer-token").unwrap();
        let consumer = Consumer::new(&channel, "billing", "consumer-token", url).unwrap();
        let message = Message::new(&channel, &producer, "some payload", "text/plain").unwrap();
        DeliveryJob::new(&message, &consumer).unwrap()
    }

    #[tokio::test]
    async fn successful_delivery_reports_success() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/hook"))
            .and(matchers::body_string("some payload"))
            .and(matchers::header("content-type", "text/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&server)
            .await;

        let client = CallbackClient::new(CallbackConfig::default()).unwrap();
        let outcome = client.deliver(&job_for(&format!("{}/hook", server.uri()))).await.unwrap();

        assert_eq!(outcome.status_code, 200);
        assert!(outcome.is_success);
        assert_eq!(outcome.body, "OK");
    }

    #[tokio::test]
    async fn broker_headers_and_signature_present() {
        let server = MockServer::start().await;
        let expected_signature = signing::sign("consumer-token", b"some payload");

        Mock::given(matchers::method("POST"))
            .and(matchers::header("X-Hookline-Channel-Id", "orders"))
            .and(matchers::header("X-Hookline-Consumer-Id", "billing"))
            .and(matchers::header("X-Hookline-Attempt", "1"))
            .and(matchers::header(signing::SIGNATURE_HEADER, expected_signature.as_str()))
            .and(matchers::header_exists("X-Hookline-Message-Id"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = CallbackClient::new(CallbackConfig::default()).unwrap();
        let outcome = client.deliver(&job_for(&server.uri())).await.unwrap();
        assert!(outcome.is_success);
    }

    #[tokio::test]
    async fn server_errors_are_outcomes_not_errors() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = CallbackClient::new(CallbackConfig::default()).unwrap();
        let outcome = client.deliver(&job_for(&server.uri())).await.unwrap();

        assert_eq!(outcome.status_code, 503);
        assert!(!outcome.is_success);
        assert_eq!(outcome.body, "overloaded");
    }

    #[tokio::test]
    async fn unreachable_consumer_is_a_transport_error() {
        // Nothing listens on this port.
        let client = CallbackClient::new(CallbackConfig {
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
        let err = client.deliver(&job_for("http://127.0.0.1:1/hook")).await.unwrap_err();
        assert!(matches!(err, CallbackError::Network { .. } | CallbackError::Timeout { .. }));
    }
}
