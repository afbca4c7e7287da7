//! Request layer
//!
//! [`Transport`] runs one GraphQL operation with a bounded attempt budget:
//! - 200 without top-level `errors`: decode `data` into the caller's type
//! - 200 with `errors`, or any other non-429 status: fail, no retry
//! - 429: wait `retry_after * 2^attempt`, retry
//! - network or undecodable body: wait `base * 2^attempt`, retry
//!
//! Typed store operations live in [`shop`].

pub mod endpoint;
pub mod shop;

pub use endpoint::{Endpoint, GraphQlRequest, HttpEndpoint, RawResponse};
pub use shop::{ShopApi, TagUpdate};

use crate::cancel::CancelSignal;
use crate::config::RetryPolicy;
use crate::error::TransportError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A named GraphQL operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// Operation name, as declared in the document
    pub name: &'static str,
    /// Operation document
    pub document: &'static str,
}

/// Delay before retrying a rate-limited call
///
/// `hint_secs * 2^attempt_index`, saturating.
#[must_use]
pub fn rate_limit_delay(hint_secs: u64, attempt_index: u32) -> Duration {
    Duration::from_secs(hint_secs.saturating_mul(pow2(attempt_index)))
}

/// Delay before retrying a network or decode failure
///
/// `base * 2^attempt_index`, saturating.
#[must_use]
pub fn transient_delay(base: Duration, attempt_index: u32) -> Duration {
    let millis = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(millis.saturating_mul(pow2(attempt_index)))
}

fn pow2(exp: u32) -> u64 {
    1u64.checked_shl(exp).unwrap_or(u64::MAX)
}

/// Top-level GraphQL response envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlErrorEntry>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    #[serde(default)]
    message: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, Value>,
}

impl GraphQlErrorEntry {
    fn describe(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => Value::Object(self.rest.clone()).to_string(),
        }
    }
}

/// GraphQL request executor with retry and backoff
#[derive(Clone)]
pub struct Transport {
    endpoint: Arc<dyn Endpoint>,
    policy: RetryPolicy,
    cancel: CancelSignal,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("policy", &self.policy)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create transport over an endpoint
    #[must_use]
    pub fn new(endpoint: Arc<dyn Endpoint>, policy: RetryPolicy) -> Self {
        Self {
            endpoint,
            policy,
            cancel: CancelSignal::new(),
        }
    }

    /// With a cancellation signal that cuts backoff waits short
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Retry policy in effect
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation and decode its `data` payload
    ///
    /// Only the calling task sleeps during backoff. A request already sent is
    /// always awaited; cancellation only ends a backoff wait.
    ///
    /// # Errors
    /// - `TransportError::GraphQl`, `Status`, `Malformed` on protocol failures (not retried)
    /// - `TransportError::RateLimited` when still throttled after the last attempt
    /// - `TransportError::AttemptsExhausted` when network/decode failures persist
    /// - `TransportError::Cancelled` when cancelled during a backoff wait
    pub async fn execute<T: DeserializeOwned>(
        &self,
        operation: Operation,
        variables: Value,
    ) -> Result<T, TransportError> {
        let request = GraphQlRequest {
            query: operation.document.to_string(),
            variables,
            operation_name: Some(operation.name.to_string()),
        };
        let max_attempts = self.policy.max_attempts.max(1);

        let mut last = None;
        for attempt in 0..max_attempts {
            let (result, hint) = match self.endpoint.post(&request).await {
                Ok(response) => {
                    let hint = response.retry_after;
                    (Self::judge(operation, response, attempt), hint)
                }
                Err(e) => {
                    tracing::error!(
                        operation = operation.name,
                        "Exception during API request: {} (attempt {}/{})",
                        e,
                        attempt + 1,
                        max_attempts
                    );
                    (Err(TransportError::Network(e)), None)
                }
            };

            let cause = match result {
                Ok(data) => return Ok(data),
                Err(cause) if cause.is_retryable() => cause,
                Err(cause) => return Err(cause),
            };
            let rate_limited = matches!(cause, TransportError::RateLimited { .. });
            last = Some(cause);
            if attempt + 1 >= max_attempts {
                break;
            }

            let delay = if rate_limited {
                let delay = rate_limit_delay(
                    hint.unwrap_or(self.policy.default_retry_after_secs),
                    attempt,
                );
                tracing::info!(
                    operation = operation.name,
                    "API Rate Limited | Waiting {}s before retry (attempt {}/{})",
                    delay.as_secs(),
                    attempt + 1,
                    max_attempts
                );
                delay
            } else {
                transient_delay(
                    Duration::from_millis(self.policy.transient_backoff_base_ms),
                    attempt,
                )
            };

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.cancel.cancelled() => {
                    tracing::error!(
                        operation = operation.name,
                        "API request abandoned: cancelled during backoff"
                    );
                    return Err(TransportError::Cancelled);
                }
            }
        }

        let err = match last {
            Some(TransportError::RateLimited { .. }) => TransportError::RateLimited {
                attempts: max_attempts,
            },
            Some(cause) => TransportError::AttemptsExhausted {
                attempts: max_attempts,
                last: Box::new(cause),
            },
            None => TransportError::AttemptsExhausted {
                attempts: max_attempts,
                last: Box::new(TransportError::Malformed("no attempt made".into())),
            },
        };
        tracing::error!(operation = operation.name, "API request failed: {}", err);
        Err(err)
    }

    /// Classify one HTTP response
    fn judge<T: DeserializeOwned>(
        operation: Operation,
        response: RawResponse,
        attempt: u32,
    ) -> Result<T, TransportError> {
        match response.status {
            200 => {}
            429 => {
                return Err(TransportError::RateLimited {
                    attempts: attempt + 1,
                })
            }
            status => {
                tracing::error!(
                    operation = operation.name,
                    "API request failed with status {}: {}",
                    status,
                    response.body
                );
                return Err(TransportError::Status {
                    status,
                    body: response.body,
                });
            }
        }

        let envelope: Envelope = serde_json::from_str(&response.body).map_err(|e| {
            tracing::error!(
                operation = operation.name,
                "Exception during API request: undecodable body: {}",
                e
            );
            TransportError::Decode(e.to_string())
        })?;

        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<String> = errors.iter().map(GraphQlErrorEntry::describe).collect();
            tracing::error!(
                operation = operation.name,
                "GraphQL errors: {}",
                messages.join("; ")
            );
            return Err(TransportError::GraphQl(messages));
        }

        match envelope.data {
            Some(data) => serde_json::from_value(data).map_err(|e| {
                tracing::error!(operation = operation.name, "Malformed response: {}", e);
                TransportError::Malformed(e.to_string())
            }),
            None => {
                tracing::error!(operation = operation.name, "Response carried no data");
                Err(TransportError::Malformed("response carried no data".into()))
            }
        }
    }
}
