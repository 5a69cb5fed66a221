// tracehub-broker/tests/emitter_delivery.rs
// ============================================================================
// Module: Case Emitter Integration Tests
// Description: Exercises CaseEmitter against a loopback HTTP server and an
//              in-memory fake Store.
// ============================================================================
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "test-only assertions"
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tiny_http::Response;
use tiny_http::Server;
use tracehub_broker::CaseEmitter;
use tracehub_broker::HostPolicy;
use tracehub_core::TraceHubError;
use tracehub_core::entities::Case;
use tracehub_core::entities::CaseStatus;
use tracehub_core::entities::Evaluation;
use tracehub_core::entities::JudgeCache;
use tracehub_core::entities::JudgeRun;
use tracehub_core::entities::Notification;
use tracehub_core::entities::NotificationStatus;
use tracehub_core::entities::Policy;
use tracehub_core::entities::PolicyVersion;
use tracehub_core::entities::Project;
use tracehub_core::entities::Span;
use tracehub_core::entities::SpanEvent;
use tracehub_core::entities::Trace;
use tracehub_core::entities::TraceDecision;
use tracehub_core::ids::CaseId;
use tracehub_core::ids::JudgeCacheId;
use tracehub_core::ids::NotificationId;
use tracehub_core::ids::PolicyId;
use tracehub_core::ids::ProjectId;
use tracehub_core::ids::SpanId;
use tracehub_core::ids::TraceId;
use tracehub_core::store::Page;
use tracehub_core::store::Store;
use tracehub_core::store::TraceFilter;
use tracehub_core::time::Timestamp;

/// A minimal `Store` fake that only implements the case/notification path
/// `CaseEmitter` actually exercises; every other method returns an error.
#[derive(Default)]
struct FakeStore {
    cases: Mutex<HashMap<CaseId, Case>>,
    notifications: Mutex<HashMap<NotificationId, Notification>>,
}

fn unsupported() -> TraceHubError {
    TraceHubError::Store("not supported by fake store".to_string())
}

#[async_trait]
impl Store for FakeStore {
    async fn get_project(&self, _id: ProjectId) -> Result<Option<Project>, TraceHubError> {
        Err(unsupported())
    }
    async fn get_active_project_by_key_hash(
        &self,
        _api_key_hash: &str,
    ) -> Result<Option<Project>, TraceHubError> {
        Err(unsupported())
    }
    async fn create_project(&self, _project: Project) -> Result<Project, TraceHubError> {
        Err(unsupported())
    }
    async fn update_project(&self, _project: Project) -> Result<Project, TraceHubError> {
        Err(unsupported())
    }
    async fn list_projects(&self) -> Result<Vec<Project>, TraceHubError> {
        Err(unsupported())
    }
    async fn delete_project(&self, _id: ProjectId) -> Result<(), TraceHubError> {
        Err(unsupported())
    }
    async fn ingest_trace_batch(
        &self,
        _project_id: ProjectId,
        _trace: Trace,
        _spans: Vec<Span>,
        _allow_missing_parent: bool,
    ) -> Result<Trace, TraceHubError> {
        Err(unsupported())
    }
    async fn ingest_span_events(
        &self,
        _project_id: ProjectId,
        _events: Vec<SpanEvent>,
        _allow_missing_parent: bool,
    ) -> Result<(Trace, u32), TraceHubError> {
        Err(unsupported())
    }
    async fn get_trace(
        &self,
        _project_id: ProjectId,
        _trace_id: TraceId,
    ) -> Result<Option<Trace>, TraceHubError> {
        Err(unsupported())
    }
    async fn list_spans(
        &self,
        _project_id: ProjectId,
        _trace_id: TraceId,
    ) -> Result<Vec<Span>, TraceHubError> {
        Err(unsupported())
    }
    async fn list_span_events(
        &self,
        _project_id: ProjectId,
        _trace_id: TraceId,
    ) -> Result<Vec<SpanEvent>, TraceHubError> {
        Err(unsupported())
    }
    async fn list_evaluations_for_trace(
        &self,
        _project_id: ProjectId,
        _trace_id: TraceId,
    ) -> Result<Vec<Evaluation>, TraceHubError> {
        Err(unsupported())
    }
    async fn create_evaluation(&self, _evaluation: Evaluation) -> Result<Evaluation, TraceHubError> {
        Err(unsupported())
    }
    async fn list_traces(
        &self,
        _project_id: ProjectId,
        _filter: TraceFilter,
    ) -> Result<Page<Trace>, TraceHubError> {
        Err(unsupported())
    }
    async fn trace_status_counts(
        &self,
        _project_id: ProjectId,
        _since: Timestamp,
    ) -> Result<Vec<(String, u64)>, TraceHubError> {
        Err(unsupported())
    }
    async fn get_decision_by_idempotency_key(
        &self,
        _project_id: ProjectId,
        _idempotency_key: &str,
    ) -> Result<Option<TraceDecision>, TraceHubError> {
        Err(unsupported())
    }
    async fn list_decisions_for_trace(
        &self,
        _project_id: ProjectId,
        _trace_id: TraceId,
    ) -> Result<Vec<TraceDecision>, TraceHubError> {
        Err(unsupported())
    }
    async fn resolve_active_policy_version(
        &self,
        _project_id: ProjectId,
        _policy_id: Option<PolicyId>,
        _version: Option<u32>,
        _now: Timestamp,
    ) -> Result<Option<(Policy, PolicyVersion)>, TraceHubError> {
        Err(unsupported())
    }
    async fn get_judge_cache(
        &self,
        _project_id: ProjectId,
        _input_hash: &str,
        _policy_version: &str,
    ) -> Result<Option<JudgeCache>, TraceHubError> {
        Err(unsupported())
    }
    async fn put_judge_cache(&self, _cache: JudgeCache) -> Result<JudgeCache, TraceHubError> {
        Err(unsupported())
    }
    async fn persist_decision(
        &self,
        _project_id: ProjectId,
        _trace_id: TraceId,
        _judge_runs: Vec<JudgeRun>,
        _judge_span: Span,
        _judge_event: SpanEvent,
        _decision: TraceDecision,
    ) -> Result<TraceDecision, TraceHubError> {
        Err(unsupported())
    }
    async fn recent_judge_runs(
        &self,
        _project_id: ProjectId,
        _trace_id: TraceId,
        _limit: u32,
    ) -> Result<Vec<JudgeRun>, TraceHubError> {
        Err(unsupported())
    }
    async fn create_policy(
        &self,
        _policy: Policy,
        _version: PolicyVersion,
    ) -> Result<(Policy, PolicyVersion), TraceHubError> {
        Err(unsupported())
    }
    async fn list_policies(&self, _project_id: ProjectId) -> Result<Vec<Policy>, TraceHubError> {
        Err(unsupported())
    }
    async fn list_policy_versions(
        &self,
        _project_id: ProjectId,
        _policy_id: PolicyId,
    ) -> Result<Vec<PolicyVersion>, TraceHubError> {
        Err(unsupported())
    }
    async fn activate_policy_version(
        &self,
        _project_id: ProjectId,
        _policy_id: PolicyId,
        _version: u32,
    ) -> Result<PolicyVersion, TraceHubError> {
        Err(unsupported())
    }

    async fn create_case(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
        reason_code: String,
        notification_target: Option<(String, Value)>,
    ) -> Result<(Case, Option<Notification>), TraceHubError> {
        let now = Timestamp::now();
        let case = Case {
            id: CaseId::generate(),
            project_id,
            trace_id,
            reason_code,
            status: CaseStatus::Open,
            assignee: None,
            acknowledged_at: None,
            resolved_at: None,
            created_at: now,
        };
        self.cases.lock().unwrap().insert(case.id, case.clone());

        let notification = notification_target.map(|(target_url, payload)| {
            let notification = Notification {
                id: NotificationId::generate(),
                project_id,
                case_id: case.id,
                channel: "webhook".to_string(),
                target_url,
                status: NotificationStatus::Pending,
                payload,
                response_snippet: None,
                created_at: now,
            };
            self.notifications
                .lock()
                .unwrap()
                .insert(notification.id, notification.clone());
            notification
        });

        Ok((case, notification))
    }

    async fn record_notification_outcome(
        &self,
        notification_id: NotificationId,
        status: NotificationStatus,
        response_snippet: Option<String>,
    ) -> Result<Notification, TraceHubError> {
        let mut notifications = self.notifications.lock().unwrap();
        let notification = notifications
            .get_mut(&notification_id)
            .ok_or_else(|| TraceHubError::NotFound("notification".to_string()))?;
        notification.status = status;
        notification.response_snippet = response_snippet;
        Ok(notification.clone())
    }

    async fn get_case(&self, _project_id: ProjectId, case_id: CaseId) -> Result<Option<Case>, TraceHubError> {
        Ok(self.cases.lock().unwrap().get(&case_id).cloned())
    }
    async fn list_cases(&self, _project_id: ProjectId) -> Result<Vec<Case>, TraceHubError> {
        Err(unsupported())
    }
    async fn ack_case(&self, _project_id: ProjectId, _case_id: CaseId, _now: Timestamp) -> Result<Case, TraceHubError> {
        Err(unsupported())
    }
    async fn resolve_case(&self, _project_id: ProjectId, _case_id: CaseId, _now: Timestamp) -> Result<Case, TraceHubError> {
        Err(unsupported())
    }
    async fn get_judge_cache_by_id(&self, _id: JudgeCacheId) -> Result<Option<JudgeCache>, TraceHubError> {
        Err(unsupported())
    }
    async fn get_span(&self, _project_id: ProjectId, _span_id: SpanId) -> Result<Option<Span>, TraceHubError> {
        Err(unsupported())
    }
}

#[tokio::test]
async fn emit_creates_case_without_webhook() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::default());
    let emitter = CaseEmitter::new(store, Duration::from_secs(1));

    let (case, notification) = emitter
        .emit(ProjectId::generate(), TraceId::generate(), "PII_DETECTED".to_string(), None)
        .await
        .unwrap();

    assert_eq!(case.reason_code, "PII_DETECTED");
    assert!(notification.is_none());
}

#[tokio::test]
async fn emit_delivers_webhook_and_records_sent() {
    let server = Server::http("127.0.0.1:0").expect("bind loopback server");
    let addr = server.server_addr();

    let handle = thread::spawn(move || {
        if let Ok(request) = server.recv() {
            let response = Response::from_string("{\"ok\":true}");
            request.respond(response).expect("respond");
        }
    });

    let store: Arc<dyn Store> = Arc::new(FakeStore::default());
    let emitter = CaseEmitter::with_host_policy(
        store,
        Duration::from_secs(2),
        HostPolicy::allow_private_networks(),
    );

    let webhook_url = format!("http://{addr}/hooks/trace");
    let (_case, notification) = emitter
        .emit(
            ProjectId::generate(),
            TraceId::generate(),
            "FINANCIAL_RISK".to_string(),
            Some(&webhook_url),
        )
        .await
        .unwrap();

    let notification = notification.expect("webhook target was configured");
    assert_eq!(notification.status, NotificationStatus::Sent);
    handle.join().expect("server thread");
}

#[tokio::test]
async fn emit_records_failed_when_target_is_private_network() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::default());
    let emitter = CaseEmitter::new(store, Duration::from_secs(1));

    let (_case, notification) = emitter
        .emit(
            ProjectId::generate(),
            TraceId::generate(),
            "PII_DETECTED".to_string(),
            Some("http://127.0.0.1:9/hooks/trace"),
        )
        .await
        .unwrap();

    let notification = notification.expect("webhook target was configured");
    assert_eq!(notification.status, NotificationStatus::Failed);
}
