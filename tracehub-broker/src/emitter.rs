// crates/tracehub-broker/src/emitter.rs
// ============================================================================
// Module: Case/Notification Emitter
// Description: Creates a Case on ESCALATE and delivers an at-most-once
//              webhook notification, recording the outcome.
// Purpose: Back the case-creation and webhook-delivery step of the decision
//          pipeline (§4.7).
// Dependencies: reqwest, tracehub_core::{store, entities}
// ============================================================================

//! ## Overview
//! [`CaseEmitter::emit`] is called once per `ESCALATE` decision. It always
//! creates the `Case` row (via `Store::create_case`); if the project has a
//! configured webhook target, it also attempts exactly one delivery attempt
//! — no retries, no queue — and records the outcome via
//! `Store::record_notification_outcome`. A delivery failure is logged and
//! recorded but never propagated to the caller: the decision itself already
//! succeeded, and notification delivery is best-effort.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;
use tracehub_core::TraceHubError;
use tracehub_core::entities::Case;
use tracehub_core::entities::Notification;
use tracehub_core::entities::NotificationStatus;
use tracehub_core::ids::ProjectId;
use tracehub_core::ids::TraceId;
use tracehub_core::store::Store;

use crate::host_policy::HostPolicy;

/// Maximum number of characters kept from a webhook response body or error
/// message when recording a notification outcome.
const RESPONSE_SNIPPET_LIMIT: usize = 500;

/// Creates cases and delivers at-most-once webhook notifications.
pub struct CaseEmitter {
    store: Arc<dyn Store>,
    client: reqwest::Client,
    host_policy: HostPolicy,
}

impl CaseEmitter {
    /// Builds an emitter with the default (production) host policy and a
    /// client timing out after `webhook_timeout`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, webhook_timeout: Duration) -> Self {
        Self::with_host_policy(store, webhook_timeout, HostPolicy::new())
    }

    /// Builds an emitter with an explicit host policy, for tests that
    /// deliver to a loopback HTTP server.
    #[must_use]
    pub fn with_host_policy(
        store: Arc<dyn Store>,
        webhook_timeout: Duration,
        host_policy: HostPolicy,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(webhook_timeout)
            .build()
            .unwrap_or_default();
        Self { store, client, host_policy }
    }

    /// Creates a `Case` for `trace_id` and, if `webhook_url` is set,
    /// attempts exactly one webhook delivery. Returns the created case and,
    /// if a delivery was attempted, the resulting notification.
    ///
    /// # Errors
    /// Returns [`TraceHubError`] only if case creation itself fails; a
    /// webhook delivery failure is recorded on the notification row and
    /// never surfaces here.
    pub async fn emit(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
        reason_code: String,
        webhook_url: Option<&str>,
    ) -> Result<(Case, Option<Notification>), TraceHubError> {
        let notification_target = webhook_url.map(|url| {
            let payload = webhook_payload(trace_id, &reason_code);
            (url.to_string(), payload)
        });

        let (case, notification) = self
            .store
            .create_case(project_id, trace_id, reason_code, notification_target)
            .await?;

        let Some(notification) = notification else {
            return Ok((case, None));
        };

        let delivered = self.deliver(&notification).await;
        let notification = self
            .store
            .record_notification_outcome(notification.id, delivered.status, delivered.snippet)
            .await?;

        Ok((case, Some(notification)))
    }

    /// Attempts a single webhook delivery, never returning an `Err`: every
    /// failure mode (bad URL, private-network target, network error,
    /// non-2xx response) becomes a [`DeliveryOutcome::Failed`].
    async fn deliver(&self, notification: &Notification) -> DeliveryOutcome {
        let url = match self.host_policy.validate(&notification.target_url) {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(
                    target_url = %notification.target_url,
                    error = %err,
                    "webhook target rejected by host policy"
                );
                return DeliveryOutcome::failed(truncate(&err.to_string()));
            }
        };

        match self.client.post(url).json(&notification.payload).send().await {
            Ok(response) if response.status().is_success() => {
                let body = response.text().await.unwrap_or_default();
                DeliveryOutcome::sent(truncate(&body))
            }
            Ok(response) => {
                let status = response.status();
                tracing::warn!(status = %status, "webhook delivery received non-2xx response");
                DeliveryOutcome::failed(truncate(&format!("http {status}")))
            }
            Err(err) => {
                tracing::warn!(error = %err, "webhook delivery failed");
                DeliveryOutcome::failed(truncate(&err.to_string()))
            }
        }
    }
}

/// The result of one delivery attempt, already mapped to a persistable
/// `NotificationStatus` and response snippet.
struct DeliveryOutcome {
    status: NotificationStatus,
    snippet: Option<String>,
}

impl DeliveryOutcome {
    fn sent(snippet: String) -> Self {
        Self { status: NotificationStatus::Sent, snippet: Some(snippet) }
    }

    fn failed(snippet: String) -> Self {
        Self { status: NotificationStatus::Failed, snippet: Some(snippet) }
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(RESPONSE_SNIPPET_LIMIT).collect()
}

/// Builds the decision-context payload a webhook would receive, exposed
/// separately so callers (and tests) can inspect it without dispatching a
/// request.
#[must_use]
pub fn webhook_payload(trace_id: TraceId, reason_code: &str) -> Value {
    json!({
        "trace_id": trace_id.to_string(),
        "reason_code": reason_code,
    })
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncate_caps_at_limit() {
        let long = "x".repeat(1000);
        assert_eq!(truncate(&long).chars().count(), 500);
    }

    #[test]
    fn truncate_keeps_short_strings_whole() {
        assert_eq!(truncate("short"), "short");
    }
}
