// crates/tracehub-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Store
// Description: The `Store` trait implementation over rusqlite.
// Purpose: Durable, transactional persistence for the ingestion and
//          decision core without a running database server.
// Dependencies: rusqlite, tokio, tracehub_core
// ============================================================================

//! ## Overview
//! `SqliteStore` owns a single `rusqlite::Connection` behind a
//! `tokio::sync::Mutex`, bootstraps its own schema on construction via a
//! `store_meta(version)` table, and maps unique-constraint violations to
//! `TraceHubError::Conflict`. Every write path that touches more than one
//! row runs inside a single `rusqlite::Transaction`.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::Transaction;
use rusqlite::params;
use serde_json::Value;
use tokio::sync::Mutex;
use tracehub_core::TraceHubError;
use tracehub_core::entities::AttributeMap;
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
use tracehub_core::entities::SpanEventType;
use tracehub_core::entities::Trace;
use tracehub_core::entities::TraceDecision;
use tracehub_core::entities::TraceStatus;
use tracehub_core::ids::CaseId;
use tracehub_core::ids::EvaluationId;
use tracehub_core::ids::JudgeCacheId;
use tracehub_core::ids::JudgeRunId;
use tracehub_core::ids::NotificationId;
use tracehub_core::ids::PolicyId;
use tracehub_core::ids::PolicyVersionId;
use tracehub_core::ids::ProjectId;
use tracehub_core::ids::SpanEventId;
use tracehub_core::ids::SpanId;
use tracehub_core::ids::TraceDecisionId;
use tracehub_core::ids::TraceId;
use tracehub_core::store::Page;
use tracehub_core::store::Store;
use tracehub_core::store::TraceFilter;
use tracehub_core::time::Timestamp;

/// Schema version written to `store_meta` on first boot.
pub const SCHEMA_VERSION: i64 = 1;

/// Default `SQLite` busy timeout, in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for [`SqliteStore::open`].
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout, applied via `PRAGMA busy_timeout`.
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Builds a config pointing at `path` with the default busy timeout.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed [`Store`] implementation with WAL journaling.
pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (creating if necessary) a `SQLite`-backed store at
    /// `config.path`, applying durability pragmas and bootstrapping the
    /// schema.
    ///
    /// # Errors
    /// Returns [`TraceHubError::Store`] if the database cannot be opened,
    /// pragmas cannot be applied, or schema bootstrap fails.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, TraceHubError> {
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Mutex::new(connection) })
    }
}

fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, TraceHubError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_err(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), TraceHubError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")
        .map_err(|err| db_err(&err))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_err(&err))?;
    Ok(())
}

fn initialize_schema(connection: &mut Connection) -> Result<(), TraceHubError> {
    let tx = connection.transaction().map_err(|err| db_err(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_err(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_err(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_err(&err))?;
            create_tables(&tx)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(TraceHubError::Store(format!("unsupported schema version: {value}")));
        }
    }
    tx.commit().map_err(|err| db_err(&err))
}

fn create_tables(tx: &Transaction<'_>) -> Result<(), TraceHubError> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            api_key_hash TEXT NOT NULL UNIQUE,
            current_api_key TEXT,
            is_active INTEGER NOT NULL,
            key_activated INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS traces (
            id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            external_trace_id TEXT,
            status TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT,
            attributes TEXT NOT NULL,
            model TEXT,
            environment TEXT,
            user_id TEXT,
            session_id TEXT,
            input_text TEXT,
            output_text TEXT,
            has_open_spans INTEGER NOT NULL,
            total_spans INTEGER NOT NULL,
            ended_spans INTEGER NOT NULL,
            completion_rate REAL NOT NULL,
            decision TEXT,
            user_review_passed INTEGER,
            PRIMARY KEY (project_id, id)
        );
        CREATE TABLE IF NOT EXISTS spans (
            id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            trace_id TEXT NOT NULL,
            parent_span_id TEXT,
            name TEXT NOT NULL,
            span_type TEXT NOT NULL,
            status TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT,
            error TEXT,
            attributes TEXT NOT NULL,
            idempotency_key TEXT NOT NULL,
            PRIMARY KEY (project_id, id),
            UNIQUE (project_id, idempotency_key)
        );
        CREATE INDEX IF NOT EXISTS idx_spans_trace ON spans (project_id, trace_id);
        CREATE INDEX IF NOT EXISTS idx_spans_parent ON spans (project_id, trace_id, parent_span_id);
        CREATE TABLE IF NOT EXISTS span_events (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            trace_id TEXT NOT NULL,
            span_id TEXT,
            event_type TEXT NOT NULL,
            event_time TEXT NOT NULL,
            payload TEXT NOT NULL,
            idempotency_key TEXT NOT NULL,
            UNIQUE (project_id, idempotency_key)
        );
        CREATE INDEX IF NOT EXISTS idx_span_events_trace ON span_events (project_id, trace_id, event_time);
        CREATE TABLE IF NOT EXISTS evaluations (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            trace_id TEXT,
            span_id TEXT,
            eval_name TEXT NOT NULL,
            eval_model TEXT NOT NULL,
            score REAL NOT NULL,
            passed INTEGER NOT NULL,
            metadata TEXT NOT NULL,
            user_review_passed INTEGER,
            idempotency_key TEXT NOT NULL,
            UNIQUE (project_id, idempotency_key)
        );
        CREATE INDEX IF NOT EXISTS idx_evaluations_trace ON evaluations (project_id, trace_id);
        CREATE TABLE IF NOT EXISTS policies (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT
        );
        CREATE TABLE IF NOT EXISTS policy_versions (
            id TEXT PRIMARY KEY,
            policy_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            effective_from TEXT NOT NULL,
            active INTEGER NOT NULL,
            definition TEXT NOT NULL,
            UNIQUE (policy_id, version)
        );
        CREATE TABLE IF NOT EXISTS trace_decisions (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            trace_id TEXT NOT NULL,
            action TEXT NOT NULL,
            reason_code TEXT NOT NULL,
            severity TEXT NOT NULL,
            confidence REAL NOT NULL,
            policy_version TEXT NOT NULL,
            judge_model TEXT,
            signals TEXT NOT NULL,
            rationale TEXT,
            idempotency_key TEXT NOT NULL,
            UNIQUE (project_id, idempotency_key)
        );
        CREATE TABLE IF NOT EXISTS judge_runs (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            trace_id TEXT NOT NULL,
            span_id TEXT,
            provider TEXT NOT NULL,
            model TEXT,
            action TEXT NOT NULL,
            reason_code TEXT NOT NULL,
            confidence REAL NOT NULL,
            output TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_judge_runs_trace ON judge_runs (project_id, trace_id, created_at);
        CREATE TABLE IF NOT EXISTS judge_cache (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            input_hash TEXT NOT NULL,
            policy_version TEXT NOT NULL,
            decision TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (project_id, input_hash, policy_version)
        );
        CREATE TABLE IF NOT EXISTS cases (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            trace_id TEXT NOT NULL,
            reason_code TEXT NOT NULL,
            status TEXT NOT NULL,
            assignee TEXT,
            acknowledged_at TEXT,
            resolved_at TEXT,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            case_id TEXT NOT NULL,
            channel TEXT NOT NULL,
            target_url TEXT NOT NULL,
            status TEXT NOT NULL,
            payload TEXT NOT NULL,
            response_snippet TEXT,
            created_at TEXT NOT NULL
        );",
    )
    .map_err(|err| db_err(&err))
}

// ============================================================================
// SECTION: Error mapping
// ============================================================================

fn db_err(err: &rusqlite::Error) -> TraceHubError {
    TraceHubError::Store(err.to_string())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(sqlite_err, _) if sqlite_err.code == ErrorCode::ConstraintViolation
    )
}

/// Maps a write error to `Conflict` when it is a unique-constraint
/// violation, else to `Store`.
fn write_err(err: rusqlite::Error) -> TraceHubError {
    if let rusqlite::Error::SqliteFailure(_, ref message) = err
        && is_constraint_violation(&err)
    {
        let message = message.clone().unwrap_or_else(|| "unique constraint violation".to_string());
        tracing::debug!(error = %message, "write rejected by a unique constraint");
        return TraceHubError::Conflict(message);
    }
    TraceHubError::Store(err.to_string())
}

fn json_err(err: serde_json::Error) -> TraceHubError {
    TraceHubError::Store(format!("json encode/decode error: {err}"))
}

fn time_fmt_err(err: time::error::Format) -> TraceHubError {
    TraceHubError::Store(format!("timestamp format error: {err}"))
}

fn time_parse_err(err: time::error::Parse) -> TraceHubError {
    TraceHubError::Store(format!("timestamp parse error: {err}"))
}

fn uuid_err(err: uuid::Error) -> TraceHubError {
    TraceHubError::Store(format!("invalid stored id: {err}"))
}

// ============================================================================
// SECTION: Row mapping helpers
// ============================================================================

fn ts_to_text(ts: Timestamp) -> Result<String, TraceHubError> {
    ts.to_rfc3339().map_err(time_fmt_err)
}

fn text_to_ts(text: &str) -> Result<Timestamp, TraceHubError> {
    Timestamp::parse_rfc3339(text).map_err(time_parse_err)
}

fn opt_ts_to_text(ts: Option<Timestamp>) -> Result<Option<String>, TraceHubError> {
    ts.map(ts_to_text).transpose()
}

fn opt_text_to_ts(text: Option<String>) -> Result<Option<Timestamp>, TraceHubError> {
    text.as_deref().map(text_to_ts).transpose()
}

fn attrs_to_text(attrs: &AttributeMap) -> Result<String, TraceHubError> {
    serde_json::to_string(attrs).map_err(json_err)
}

fn text_to_attrs(text: &str) -> Result<AttributeMap, TraceHubError> {
    serde_json::from_str(text).map_err(json_err)
}

fn value_to_text(value: &Value) -> Result<String, TraceHubError> {
    serde_json::to_string(value).map_err(json_err)
}

fn text_to_value(text: &str) -> Result<Value, TraceHubError> {
    serde_json::from_str(text).map_err(json_err)
}

fn span_event_type_label(event_type: SpanEventType) -> &'static str {
    match event_type {
        SpanEventType::SpanStarted => "SPAN_STARTED",
        SpanEventType::SpanEnded => "SPAN_ENDED",
        SpanEventType::Log => "LOG",
        SpanEventType::Event => "EVENT",
        SpanEventType::Amendment => "AMENDMENT",
    }
}

fn parse_span_event_type(label: &str) -> Result<SpanEventType, TraceHubError> {
    match label {
        "SPAN_STARTED" => Ok(SpanEventType::SpanStarted),
        "SPAN_ENDED" => Ok(SpanEventType::SpanEnded),
        "LOG" => Ok(SpanEventType::Log),
        "EVENT" => Ok(SpanEventType::Event),
        "AMENDMENT" => Ok(SpanEventType::Amendment),
        other => Err(TraceHubError::Store(format!("unknown span event type: {other}"))),
    }
}

fn trace_status_label(status: TraceStatus) -> &'static str {
    match status {
        TraceStatus::Running => "running",
        TraceStatus::Success => "success",
        TraceStatus::Error => "error",
    }
}

fn parse_trace_status(label: &str) -> Result<TraceStatus, TraceHubError> {
    match label {
        "running" => Ok(TraceStatus::Running),
        "success" => Ok(TraceStatus::Success),
        "error" => Ok(TraceStatus::Error),
        other => Err(TraceHubError::Store(format!("unknown trace status: {other}"))),
    }
}

fn case_status_label(status: CaseStatus) -> &'static str {
    match status {
        CaseStatus::Open => "open",
        CaseStatus::Acknowledged => "acknowledged",
        CaseStatus::Resolved => "resolved",
    }
}

fn parse_case_status(label: &str) -> Result<CaseStatus, TraceHubError> {
    match label {
        "open" => Ok(CaseStatus::Open),
        "acknowledged" => Ok(CaseStatus::Acknowledged),
        "resolved" => Ok(CaseStatus::Resolved),
        other => Err(TraceHubError::Store(format!("unknown case status: {other}"))),
    }
}

fn notification_status_label(status: NotificationStatus) -> &'static str {
    match status {
        NotificationStatus::Pending => "pending",
        NotificationStatus::Sent => "sent",
        NotificationStatus::Failed => "failed",
    }
}

fn parse_notification_status(label: &str) -> Result<NotificationStatus, TraceHubError> {
    match label {
        "pending" => Ok(NotificationStatus::Pending),
        "sent" => Ok(NotificationStatus::Sent),
        "failed" => Ok(NotificationStatus::Failed),
        other => Err(TraceHubError::Store(format!("unknown notification status: {other}"))),
    }
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<(String, String, String, Option<String>, bool, bool, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get::<_, i64>(4)? != 0,
        row.get::<_, i64>(5)? != 0,
        row.get(6)?,
    ))
}

fn build_project(
    raw: (String, String, String, Option<String>, bool, bool, String),
) -> Result<Project, TraceHubError> {
    let (id, name, api_key_hash, current_api_key, is_active, key_activated, created_at) = raw;
    Ok(Project {
        id: id.parse().map_err(uuid_err)?,
        name,
        api_key_hash,
        current_api_key,
        is_active,
        key_activated,
        created_at: text_to_ts(&created_at)?,
    })
}

#[allow(clippy::type_complexity, reason = "one row, many columns, no natural grouping")]
fn row_to_trace_raw(
    row: &Row<'_>,
) -> rusqlite::Result<(
    String,
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    bool,
    u32,
    u32,
    f64,
    Option<String>,
    Option<bool>,
)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get::<_, i64>(13)? != 0,
        row.get::<_, i64>(14)?.try_into().unwrap_or(0),
        row.get::<_, i64>(15)?.try_into().unwrap_or(0),
        row.get(16)?,
        row.get(17)?,
        row.get::<_, Option<i64>>(18)?.map(|value| value != 0),
    ))
}

#[allow(clippy::type_complexity, reason = "mirrors row_to_trace_raw's tuple")]
fn build_trace(
    raw: (
        String,
        String,
        Option<String>,
        String,
        String,
        Option<String>,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        bool,
        u32,
        u32,
        f64,
        Option<String>,
        Option<bool>,
    ),
) -> Result<Trace, TraceHubError> {
    let (
        id,
        project_id,
        external_trace_id,
        status,
        start_time,
        end_time,
        attributes,
        model,
        environment,
        user_id,
        session_id,
        input_text,
        output_text,
        has_open_spans,
        total_spans,
        ended_spans,
        completion_rate,
        decision,
        user_review_passed,
    ) = raw;
    Ok(Trace {
        id: id.parse().map_err(uuid_err)?,
        project_id: project_id.parse().map_err(uuid_err)?,
        external_trace_id,
        status: parse_trace_status(&status)?,
        start_time: text_to_ts(&start_time)?,
        end_time: opt_text_to_ts(end_time)?,
        attributes: text_to_attrs(&attributes)?,
        model,
        environment,
        user_id,
        session_id,
        input_text,
        output_text,
        has_open_spans,
        total_spans,
        ended_spans,
        completion_rate,
        decision: decision.map(|text| text_to_value(&text)).transpose()?,
        user_review_passed,
    })
}

#[allow(clippy::type_complexity, reason = "one row, many columns, no natural grouping")]
fn row_to_span_raw(
    row: &Row<'_>,
) -> rusqlite::Result<(
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

#[allow(clippy::type_complexity, reason = "mirrors row_to_span_raw's tuple")]
fn build_span(
    raw: (
        String,
        String,
        String,
        Option<String>,
        String,
        String,
        String,
        String,
        Option<String>,
        Option<String>,
        String,
        String,
    ),
) -> Result<Span, TraceHubError> {
    let (
        id,
        project_id,
        trace_id,
        parent_span_id,
        name,
        span_type,
        status,
        start_time,
        end_time,
        error,
        attributes,
        idempotency_key,
    ) = raw;
    Ok(Span {
        id: id.parse().map_err(uuid_err)?,
        project_id: project_id.parse().map_err(uuid_err)?,
        trace_id: trace_id.parse().map_err(uuid_err)?,
        parent_span_id: parent_span_id.map(|value| value.parse()).transpose().map_err(uuid_err)?,
        name,
        span_type,
        status,
        start_time: text_to_ts(&start_time)?,
        end_time: opt_text_to_ts(end_time)?,
        error,
        attributes: text_to_attrs(&attributes)?,
        idempotency_key,
    })
}

#[allow(clippy::type_complexity, reason = "one row, many columns, no natural grouping")]
fn row_to_span_event_raw(
    row: &Row<'_>,
) -> rusqlite::Result<(String, String, String, Option<String>, String, String, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn build_span_event(
    raw: (String, String, String, Option<String>, String, String, String, String),
) -> Result<SpanEvent, TraceHubError> {
    let (id, project_id, trace_id, span_id, event_type, event_time, payload, idempotency_key) = raw;
    Ok(SpanEvent {
        id: id.parse().map_err(uuid_err)?,
        project_id: project_id.parse().map_err(uuid_err)?,
        trace_id: trace_id.parse().map_err(uuid_err)?,
        span_id: span_id.map(|value| value.parse()).transpose().map_err(uuid_err)?,
        event_type: parse_span_event_type(&event_type)?,
        event_time: text_to_ts(&event_time)?,
        payload: text_to_value(&payload)?,
        idempotency_key,
    })
}

#[allow(clippy::type_complexity, reason = "one row, many columns, no natural grouping")]
fn row_to_evaluation_raw(
    row: &Row<'_>,
) -> rusqlite::Result<(
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    f64,
    bool,
    String,
    Option<bool>,
    String,
)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get::<_, i64>(7)? != 0,
        row.get(8)?,
        row.get::<_, Option<i64>>(9)?.map(|value| value != 0),
        row.get(10)?,
    ))
}

#[allow(clippy::type_complexity, reason = "mirrors row_to_evaluation_raw's tuple")]
fn build_evaluation(
    raw: (
        String,
        String,
        Option<String>,
        Option<String>,
        String,
        String,
        f64,
        bool,
        String,
        Option<bool>,
        String,
    ),
) -> Result<Evaluation, TraceHubError> {
    let (
        id,
        project_id,
        trace_id,
        span_id,
        eval_name,
        eval_model,
        score,
        passed,
        metadata,
        user_review_passed,
        idempotency_key,
    ) = raw;
    Ok(Evaluation {
        id: id.parse().map_err(uuid_err)?,
        project_id: project_id.parse().map_err(uuid_err)?,
        trace_id: trace_id.map(|value| value.parse()).transpose().map_err(uuid_err)?,
        span_id: span_id.map(|value| value.parse()).transpose().map_err(uuid_err)?,
        eval_name,
        eval_model,
        score,
        passed,
        metadata: text_to_value(&metadata)?,
        user_review_passed,
        idempotency_key,
    })
}

fn build_policy(row: (String, String, String, Option<String>)) -> Result<Policy, TraceHubError> {
    let (id, project_id, name, description) = row;
    Ok(Policy {
        id: id.parse().map_err(uuid_err)?,
        project_id: project_id.parse().map_err(uuid_err)?,
        name,
        description,
    })
}

fn build_policy_version(
    row: (String, String, u32, String, bool, String),
) -> Result<PolicyVersion, TraceHubError> {
    let (id, policy_id, version, effective_from, active, definition) = row;
    Ok(PolicyVersion {
        id: id.parse().map_err(uuid_err)?,
        policy_id: policy_id.parse().map_err(uuid_err)?,
        version,
        effective_from: text_to_ts(&effective_from)?,
        active,
        definition: text_to_value(&definition)?,
    })
}

#[allow(clippy::type_complexity, reason = "one row, many columns, no natural grouping")]
fn build_trace_decision(
    raw: (String, String, String, String, String, String, f64, String, Option<String>, String, Option<String>, String),
) -> Result<TraceDecision, TraceHubError> {
    let (
        id,
        project_id,
        trace_id,
        action,
        reason_code,
        severity,
        confidence,
        policy_version,
        judge_model,
        signals,
        rationale,
        idempotency_key,
    ) = raw;
    Ok(TraceDecision {
        id: id.parse().map_err(uuid_err)?,
        project_id: project_id.parse().map_err(uuid_err)?,
        trace_id: trace_id.parse().map_err(uuid_err)?,
        action,
        reason_code,
        severity,
        confidence,
        policy_version,
        judge_model,
        signals: text_to_value(&signals)?,
        rationale,
        idempotency_key,
    })
}

#[allow(clippy::type_complexity, reason = "one row, many columns, no natural grouping")]
fn build_judge_run(
    raw: (String, String, String, Option<String>, String, Option<String>, String, String, f64, String, String),
) -> Result<JudgeRun, TraceHubError> {
    let (id, project_id, trace_id, span_id, provider, model, action, reason_code, confidence, output, created_at) =
        raw;
    Ok(JudgeRun {
        id: id.parse().map_err(uuid_err)?,
        project_id: project_id.parse().map_err(uuid_err)?,
        trace_id: trace_id.parse().map_err(uuid_err)?,
        span_id: span_id.map(|value| value.parse()).transpose().map_err(uuid_err)?,
        provider,
        model,
        action,
        reason_code,
        confidence,
        output: text_to_value(&output)?,
        created_at: text_to_ts(&created_at)?,
    })
}

fn build_judge_cache(
    raw: (String, String, String, String, String, String),
) -> Result<JudgeCache, TraceHubError> {
    let (id, project_id, input_hash, policy_version, decision, created_at) = raw;
    Ok(JudgeCache {
        id: id.parse().map_err(uuid_err)?,
        project_id: project_id.parse().map_err(uuid_err)?,
        input_hash,
        policy_version,
        decision: text_to_value(&decision)?,
        created_at: text_to_ts(&created_at)?,
    })
}

#[allow(clippy::type_complexity, reason = "one row, many columns, no natural grouping")]
fn build_case(
    raw: (String, String, String, String, String, Option<String>, Option<String>, Option<String>, String),
) -> Result<Case, TraceHubError> {
    let (id, project_id, trace_id, reason_code, status, assignee, acknowledged_at, resolved_at, created_at) = raw;
    Ok(Case {
        id: id.parse().map_err(uuid_err)?,
        project_id: project_id.parse().map_err(uuid_err)?,
        trace_id: trace_id.parse().map_err(uuid_err)?,
        reason_code,
        status: parse_case_status(&status)?,
        assignee,
        acknowledged_at: opt_text_to_ts(acknowledged_at)?,
        resolved_at: opt_text_to_ts(resolved_at)?,
        created_at: text_to_ts(&created_at)?,
    })
}

#[allow(clippy::type_complexity, reason = "one row, many columns, no natural grouping")]
fn build_notification(
    raw: (String, String, String, String, String, String, String, Option<String>, String),
) -> Result<Notification, TraceHubError> {
    let (id, project_id, case_id, channel, target_url, status, payload, response_snippet, created_at) = raw;
    Ok(Notification {
        id: id.parse().map_err(uuid_err)?,
        project_id: project_id.parse().map_err(uuid_err)?,
        case_id: case_id.parse().map_err(uuid_err)?,
        channel,
        target_url,
        status: parse_notification_status(&status)?,
        payload: text_to_value(&payload)?,
        response_snippet,
        created_at: text_to_ts(&created_at)?,
    })
}

// ============================================================================
// SECTION: Transaction-scoped helpers (projection + lookups)
// ============================================================================

fn fetch_trace_tx(
    tx: &Transaction<'_>,
    project_id: ProjectId,
    trace_id: TraceId,
) -> Result<Option<Trace>, TraceHubError> {
    tx.query_row(
        "SELECT id, project_id, external_trace_id, status, start_time, end_time, attributes, \
         model, environment, user_id, session_id, input_text, output_text, has_open_spans, \
         total_spans, ended_spans, completion_rate, decision, user_review_passed \
         FROM traces WHERE project_id = ?1 AND id = ?2",
        params![project_id.to_string(), trace_id.to_string()],
        row_to_trace_raw,
    )
    .optional()
    .map_err(|err| db_err(&err))?
    .map(build_trace)
    .transpose()
}

fn upsert_trace_tx(tx: &Transaction<'_>, trace: &Trace) -> Result<(), TraceHubError> {
    tx.execute(
        "INSERT INTO traces (id, project_id, external_trace_id, status, start_time, end_time, \
         attributes, model, environment, user_id, session_id, input_text, output_text, \
         has_open_spans, total_spans, ended_spans, completion_rate, decision, \
         user_review_passed) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19) \
         ON CONFLICT(project_id, id) DO UPDATE SET \
         external_trace_id = excluded.external_trace_id, \
         status = excluded.status, \
         start_time = excluded.start_time, \
         end_time = excluded.end_time, \
         attributes = excluded.attributes, \
         model = excluded.model, \
         environment = excluded.environment, \
         user_id = excluded.user_id, \
         session_id = excluded.session_id, \
         input_text = excluded.input_text, \
         output_text = excluded.output_text, \
         has_open_spans = excluded.has_open_spans, \
         total_spans = excluded.total_spans, \
         ended_spans = excluded.ended_spans, \
         completion_rate = excluded.completion_rate, \
         decision = excluded.decision, \
         user_review_passed = excluded.user_review_passed",
        params![
            trace.id.to_string(),
            trace.project_id.to_string(),
            trace.external_trace_id,
            trace_status_label(trace.status),
            ts_to_text(trace.start_time)?,
            opt_ts_to_text(trace.end_time)?,
            attrs_to_text(&trace.attributes)?,
            trace.model,
            trace.environment,
            trace.user_id,
            trace.session_id,
            trace.input_text,
            trace.output_text,
            i64::from(trace.has_open_spans),
            i64::from(trace.total_spans),
            i64::from(trace.ended_spans),
            trace.completion_rate,
            trace.decision.as_ref().map(value_to_text).transpose()?,
            trace.user_review_passed.map(i64::from),
        ],
    )
    .map_err(write_err)?;
    Ok(())
}

/// Merges an incoming trace update into `existing`, per §4.3.A merge rules:
/// status/end_time replace; textual fields replace only when non-empty;
/// attributes merge last-write-wins; `user_review_passed` replaces only
/// when explicitly set.
fn merge_trace(existing: &mut Trace, incoming: Trace) {
    existing.status = incoming.status;
    existing.end_time = incoming.end_time;
    if incoming.external_trace_id.as_ref().is_some_and(|value| !value.is_empty()) {
        existing.external_trace_id = incoming.external_trace_id;
    }
    if incoming.model.as_ref().is_some_and(|value| !value.is_empty()) {
        existing.model = incoming.model;
    }
    if incoming.environment.as_ref().is_some_and(|value| !value.is_empty()) {
        existing.environment = incoming.environment;
    }
    if incoming.user_id.as_ref().is_some_and(|value| !value.is_empty()) {
        existing.user_id = incoming.user_id;
    }
    if incoming.session_id.as_ref().is_some_and(|value| !value.is_empty()) {
        existing.session_id = incoming.session_id;
    }
    if incoming.input_text.as_ref().is_some_and(|value| !value.is_empty()) {
        existing.input_text = incoming.input_text;
    }
    if incoming.output_text.as_ref().is_some_and(|value| !value.is_empty()) {
        existing.output_text = incoming.output_text;
    }
    for (key, value) in incoming.attributes {
        existing.attributes.insert(key, value);
    }
    if incoming.user_review_passed.is_some() {
        existing.user_review_passed = incoming.user_review_passed;
    }
}

fn span_exists_tx(tx: &Transaction<'_>, project_id: ProjectId, span_id: SpanId) -> Result<bool, TraceHubError> {
    tx.query_row(
        "SELECT 1 FROM spans WHERE project_id = ?1 AND id = ?2",
        params![project_id.to_string(), span_id.to_string()],
        |_row| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|err| db_err(&err))
}

fn span_idempotency_exists_tx(
    tx: &Transaction<'_>,
    project_id: ProjectId,
    idempotency_key: &str,
) -> Result<bool, TraceHubError> {
    tx.query_row(
        "SELECT 1 FROM spans WHERE project_id = ?1 AND idempotency_key = ?2",
        params![project_id.to_string(), idempotency_key],
        |_row| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|err| db_err(&err))
}

fn span_event_idempotency_exists_tx(
    tx: &Transaction<'_>,
    project_id: ProjectId,
    idempotency_key: &str,
) -> Result<bool, TraceHubError> {
    tx.query_row(
        "SELECT 1 FROM span_events WHERE project_id = ?1 AND idempotency_key = ?2",
        params![project_id.to_string(), idempotency_key],
        |_row| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|err| db_err(&err))
}

fn insert_span_tx(tx: &Transaction<'_>, span: &Span) -> Result<(), TraceHubError> {
    tx.execute(
        "INSERT INTO spans (id, project_id, trace_id, parent_span_id, name, span_type, status, \
         start_time, end_time, error, attributes, idempotency_key) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
        params![
            span.id.to_string(),
            span.project_id.to_string(),
            span.trace_id.to_string(),
            span.parent_span_id.map(|id| id.to_string()),
            span.name,
            span.span_type,
            span.status,
            ts_to_text(span.start_time)?,
            opt_ts_to_text(span.end_time)?,
            span.error,
            attrs_to_text(&span.attributes)?,
            span.idempotency_key,
        ],
    )
    .map_err(write_err)?;
    Ok(())
}

fn update_span_tx(tx: &Transaction<'_>, span: &Span) -> Result<(), TraceHubError> {
    tx.execute(
        "UPDATE spans SET parent_span_id = ?3, name = ?4, span_type = ?5, status = ?6, \
         start_time = ?7, end_time = ?8, error = ?9, attributes = ?10 \
         WHERE project_id = ?1 AND id = ?2",
        params![
            span.project_id.to_string(),
            span.id.to_string(),
            span.parent_span_id.map(|id| id.to_string()),
            span.name,
            span.span_type,
            span.status,
            ts_to_text(span.start_time)?,
            opt_ts_to_text(span.end_time)?,
            span.error,
            attrs_to_text(&span.attributes)?,
        ],
    )
    .map_err(write_err)?;
    Ok(())
}

fn fetch_span_tx(tx: &Transaction<'_>, project_id: ProjectId, span_id: SpanId) -> Result<Option<Span>, TraceHubError> {
    tx.query_row(
        "SELECT id, project_id, trace_id, parent_span_id, name, span_type, status, start_time, \
         end_time, error, attributes, idempotency_key FROM spans WHERE project_id = ?1 AND id = ?2",
        params![project_id.to_string(), span_id.to_string()],
        row_to_span_raw,
    )
    .optional()
    .map_err(|err| db_err(&err))?
    .map(build_span)
    .transpose()
}

fn insert_span_event_tx(tx: &Transaction<'_>, event: &SpanEvent) -> Result<(), TraceHubError> {
    tx.execute(
        "INSERT INTO span_events (id, project_id, trace_id, span_id, event_type, event_time, \
         payload, idempotency_key) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        params![
            event.id.to_string(),
            event.project_id.to_string(),
            event.trace_id.to_string(),
            event.span_id.map(|id| id.to_string()),
            span_event_type_label(event.event_type),
            ts_to_text(event.event_time)?,
            value_to_text(&event.payload)?,
            event.idempotency_key,
        ],
    )
    .map_err(write_err)?;
    Ok(())
}

fn recalculate_trace_projection_tx(
    tx: &Transaction<'_>,
    project_id: ProjectId,
    trace_id: TraceId,
) -> Result<Trace, TraceHubError> {
    let mut trace = fetch_trace_tx(tx, project_id, trace_id)?
        .ok_or_else(|| TraceHubError::NotFound(format!("trace {trace_id}")))?;
    let (total, ended): (i64, i64) = tx
        .query_row(
            "SELECT COUNT(*), SUM(CASE WHEN end_time IS NOT NULL THEN 1 ELSE 0 END) FROM spans \
             WHERE project_id = ?1 AND trace_id = ?2",
            params![project_id.to_string(), trace_id.to_string()],
            |row| Ok((row.get(0)?, row.get::<_, Option<i64>>(1)?.unwrap_or(0))),
        )
        .map_err(|err| db_err(&err))?;
    trace.recalculate_metrics(total.try_into().unwrap_or(0), ended.try_into().unwrap_or(0));
    upsert_trace_tx(tx, &trace)?;
    Ok(trace)
}

fn derive_span_event_id(seed: &str) -> SpanEventId {
    SpanEventId::new(uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, seed.as_bytes()))
}

// ============================================================================
// SECTION: Store trait impl
// ============================================================================

#[async_trait]
impl Store for SqliteStore {
    async fn get_project(&self, id: ProjectId) -> Result<Option<Project>, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .query_row(
                "SELECT id, name, api_key_hash, current_api_key, is_active, key_activated, \
                 created_at FROM projects WHERE id = ?1",
                params![id.to_string()],
                row_to_project,
            )
            .optional()
            .map_err(|err| db_err(&err))?
            .map(build_project)
            .transpose()
    }

    async fn get_active_project_by_key_hash(
        &self,
        api_key_hash: &str,
    ) -> Result<Option<Project>, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .query_row(
                "SELECT id, name, api_key_hash, current_api_key, is_active, key_activated, \
                 created_at FROM projects WHERE api_key_hash = ?1 AND is_active = 1",
                params![api_key_hash],
                row_to_project,
            )
            .optional()
            .map_err(|err| db_err(&err))?
            .map(build_project)
            .transpose()
    }

    async fn create_project(&self, project: Project) -> Result<Project, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "INSERT INTO projects (id, name, api_key_hash, current_api_key, is_active, \
                 key_activated, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![
                    project.id.to_string(),
                    project.name,
                    project.api_key_hash,
                    project.current_api_key,
                    i64::from(project.is_active),
                    i64::from(project.key_activated),
                    ts_to_text(project.created_at)?,
                ],
            )
            .map_err(write_err)?;
        Ok(project)
    }

    async fn update_project(&self, project: Project) -> Result<Project, TraceHubError> {
        let connection = self.connection.lock().await;
        let affected = connection
            .execute(
                "UPDATE projects SET name = ?2, api_key_hash = ?3, current_api_key = ?4, \
                 is_active = ?5, key_activated = ?6 WHERE id = ?1",
                params![
                    project.id.to_string(),
                    project.name,
                    project.api_key_hash,
                    project.current_api_key,
                    i64::from(project.is_active),
                    i64::from(project.key_activated),
                ],
            )
            .map_err(write_err)?;
        if affected == 0 {
            return Err(TraceHubError::NotFound(format!("project {}", project.id)));
        }
        Ok(project)
    }

    async fn list_projects(&self) -> Result<Vec<Project>, TraceHubError> {
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare(
                "SELECT id, name, api_key_hash, current_api_key, is_active, key_activated, \
                 created_at FROM projects ORDER BY created_at ASC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = stmt.query_map([], row_to_project).map_err(|err| db_err(&err))?;
        rows.map(|row| row.map_err(|err| db_err(&err)).and_then(build_project)).collect()
    }

    async fn delete_project(&self, id: ProjectId) -> Result<(), TraceHubError> {
        let mut connection = self.connection.lock().await;
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        let project_id = id.to_string();
        tx.execute(
            "DELETE FROM policy_versions WHERE policy_id IN (SELECT id FROM policies WHERE \
             project_id = ?1)",
            params![project_id],
        )
        .map_err(|err| db_err(&err))?;
        for table in [
            "notifications",
            "cases",
            "judge_cache",
            "judge_runs",
            "trace_decisions",
            "policies",
            "evaluations",
            "span_events",
            "spans",
            "traces",
        ] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE project_id = ?1"),
                params![project_id],
            )
            .map_err(|err| db_err(&err))?;
        }
        let affected = tx
            .execute("DELETE FROM projects WHERE id = ?1", params![project_id])
            .map_err(|err| db_err(&err))?;
        if affected == 0 {
            return Err(TraceHubError::NotFound(format!("project {id}")));
        }
        tx.commit().map_err(|err| db_err(&err))
    }

    async fn ingest_trace_batch(
        &self,
        project_id: ProjectId,
        trace: Trace,
        spans: Vec<Span>,
        allow_missing_parent: bool,
    ) -> Result<Trace, TraceHubError> {
        let mut connection = self.connection.lock().await;
        let tx = connection.transaction().map_err(|err| db_err(&err))?;

        let existing = fetch_trace_tx(&tx, project_id, trace.id)?;
        let merged = match existing {
            Some(mut current) => {
                merge_trace(&mut current, trace);
                current
            }
            None => trace,
        };
        upsert_trace_tx(&tx, &merged)?;

        let batch_span_ids: BTreeSet<SpanId> = spans.iter().map(|span| span.id).collect();
        for span in &spans {
            if span_idempotency_exists_tx(&tx, project_id, &span.idempotency_key)? {
                continue;
            }
            if let Some(parent_id) = span.parent_span_id {
                let resolvable = batch_span_ids.contains(&parent_id)
                    || span_exists_tx(&tx, project_id, parent_id)?;
                if !resolvable && !allow_missing_parent {
                    return Err(TraceHubError::Validation(format!(
                        "unknown parent_span_id {parent_id}"
                    )));
                }
            }
            insert_span_tx(&tx, span)?;

            let started = SpanEvent {
                id: derive_span_event_id(&format!("{}:started", span.idempotency_key)),
                project_id,
                trace_id: span.trace_id,
                span_id: Some(span.id),
                event_type: SpanEventType::SpanStarted,
                event_time: span.start_time,
                payload: Value::Null,
                idempotency_key: format!("{}:started", span.idempotency_key),
            };
            insert_span_event_tx(&tx, &started)?;

            if let Some(end_time) = span.end_time {
                let ended = SpanEvent {
                    id: derive_span_event_id(&format!("{}:ended", span.idempotency_key)),
                    project_id,
                    trace_id: span.trace_id,
                    span_id: Some(span.id),
                    event_type: SpanEventType::SpanEnded,
                    event_time: end_time,
                    payload: Value::Null,
                    idempotency_key: format!("{}:ended", span.idempotency_key),
                };
                insert_span_event_tx(&tx, &ended)?;
            }
        }

        let result = recalculate_trace_projection_tx(&tx, project_id, merged.id)?;
        tx.commit().map_err(|err| db_err(&err))?;
        Ok(result)
    }

    async fn ingest_span_events(
        &self,
        project_id: ProjectId,
        events: Vec<SpanEvent>,
        allow_missing_parent: bool,
    ) -> Result<(Trace, u32), TraceHubError> {
        let Some(primary_trace_id) = events.first().map(|event| event.trace_id) else {
            return Err(TraceHubError::Validation("empty span event batch".to_string()));
        };

        let mut connection = self.connection.lock().await;
        let tx = connection.transaction().map_err(|err| db_err(&err))?;

        let mut touched_traces: BTreeSet<TraceId> = BTreeSet::new();
        let mut batch_span_ids: BTreeSet<SpanId> = BTreeSet::new();
        let mut applied: u32 = 0;

        for event in &events {
            touched_traces.insert(event.trace_id);
            if span_event_idempotency_exists_tx(&tx, project_id, &event.idempotency_key)? {
                continue;
            }
            applied += 1;

            match event.event_type {
                SpanEventType::SpanStarted => {
                    if let Some(span_id) = event.span_id
                        && !span_exists_tx(&tx, project_id, span_id)?
                        && !batch_span_ids.contains(&span_id)
                    {
                        let parent_span_id = event
                            .payload
                            .get("parent_span_id")
                            .and_then(Value::as_str)
                            .map(str::parse)
                            .transpose()
                            .map_err(uuid_err)?;
                        if let Some(parent_id) = parent_span_id {
                            let resolvable = batch_span_ids.contains(&parent_id)
                                || span_exists_tx(&tx, project_id, parent_id)?;
                            if !resolvable && !allow_missing_parent {
                                return Err(TraceHubError::Validation(format!(
                                    "unknown parent_span_id {parent_id}"
                                )));
                            }
                        }
                        let synthesized = Span {
                            id: span_id,
                            project_id,
                            trace_id: event.trace_id,
                            parent_span_id,
                            name: event
                                .payload
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or("span")
                                .to_string(),
                            span_type: event
                                .payload
                                .get("span_type")
                                .and_then(Value::as_str)
                                .unwrap_or("generic")
                                .to_string(),
                            status: event
                                .payload
                                .get("status")
                                .and_then(Value::as_str)
                                .unwrap_or("running")
                                .to_string(),
                            start_time: event.event_time,
                            end_time: None,
                            error: None,
                            attributes: event
                                .payload
                                .get("attributes")
                                .cloned()
                                .map(serde_json::from_value)
                                .transpose()
                                .map_err(json_err)?
                                .unwrap_or_default(),
                            idempotency_key: event.idempotency_key.clone(),
                        };
                        insert_span_tx(&tx, &synthesized)?;
                        batch_span_ids.insert(span_id);
                    }
                }
                SpanEventType::SpanEnded => {
                    if let Some(span_id) = event.span_id
                        && let Some(mut span) = fetch_span_tx(&tx, project_id, span_id)?
                    {
                        span.end_time = Some(event.event_time);
                        if let Some(status) = event.payload.get("status").and_then(Value::as_str) {
                            span.status = status.to_string();
                        }
                        if let Some(error) = event.payload.get("error").and_then(Value::as_str) {
                            span.error = Some(error.to_string());
                        }
                        update_span_tx(&tx, &span)?;
                    }
                }
                SpanEventType::Amendment => {
                    if let Some(span_id) = event.span_id
                        && let Some(mut span) = fetch_span_tx(&tx, project_id, span_id)?
                    {
                        if let Some(patch_attrs) =
                            event.payload.pointer("/patch/attributes").and_then(Value::as_object)
                        {
                            for (key, value) in patch_attrs {
                                span.attributes.insert(key.clone(), value.clone());
                            }
                        }
                        if let Some(status) =
                            event.payload.pointer("/patch/status").and_then(Value::as_str)
                        {
                            span.status = status.to_string();
                        }
                        update_span_tx(&tx, &span)?;
                    }
                }
                SpanEventType::Log | SpanEventType::Event => {}
            }

            insert_span_event_tx(&tx, event)?;
        }

        let mut primary: Option<Trace> = None;
        for trace_id in touched_traces {
            let recalculated = recalculate_trace_projection_tx(&tx, project_id, trace_id)?;
            if trace_id == primary_trace_id {
                primary = Some(recalculated);
            }
        }
        let result = primary.ok_or_else(|| TraceHubError::NotFound(format!("trace {primary_trace_id}")))?;
        tx.commit().map_err(|err| db_err(&err))?;
        Ok((result, applied))
    }

    async fn get_trace(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<Option<Trace>, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .query_row(
                "SELECT id, project_id, external_trace_id, status, start_time, end_time, \
                 attributes, model, environment, user_id, session_id, input_text, output_text, \
                 has_open_spans, total_spans, ended_spans, completion_rate, decision, \
                 user_review_passed FROM traces WHERE project_id = ?1 AND id = ?2",
                params![project_id.to_string(), trace_id.to_string()],
                row_to_trace_raw,
            )
            .optional()
            .map_err(|err| db_err(&err))?
            .map(build_trace)
            .transpose()
    }

    async fn list_spans(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<Vec<Span>, TraceHubError> {
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare(
                "SELECT id, project_id, trace_id, parent_span_id, name, span_type, status, \
                 start_time, end_time, error, attributes, idempotency_key FROM spans \
                 WHERE project_id = ?1 AND trace_id = ?2 ORDER BY start_time ASC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = stmt
            .query_map(params![project_id.to_string(), trace_id.to_string()], row_to_span_raw)
            .map_err(|err| db_err(&err))?;
        rows.map(|row| row.map_err(|err| db_err(&err)).and_then(build_span)).collect()
    }

    async fn list_span_events(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<Vec<SpanEvent>, TraceHubError> {
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare(
                "SELECT id, project_id, trace_id, span_id, event_type, event_time, payload, \
                 idempotency_key FROM span_events WHERE project_id = ?1 AND trace_id = ?2 \
                 ORDER BY event_time ASC, rowid ASC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = stmt
            .query_map(params![project_id.to_string(), trace_id.to_string()], row_to_span_event_raw)
            .map_err(|err| db_err(&err))?;
        rows.map(|row| row.map_err(|err| db_err(&err)).and_then(build_span_event)).collect()
    }

    async fn list_evaluations_for_trace(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<Vec<Evaluation>, TraceHubError> {
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare(
                "SELECT id, project_id, trace_id, span_id, eval_name, eval_model, score, passed, \
                 metadata, user_review_passed, idempotency_key FROM evaluations \
                 WHERE project_id = ?1 AND trace_id = ?2",
            )
            .map_err(|err| db_err(&err))?;
        let rows = stmt
            .query_map(params![project_id.to_string(), trace_id.to_string()], row_to_evaluation_raw)
            .map_err(|err| db_err(&err))?;
        rows.map(|row| row.map_err(|err| db_err(&err)).and_then(build_evaluation)).collect()
    }

    async fn create_evaluation(&self, evaluation: Evaluation) -> Result<Evaluation, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "INSERT INTO evaluations (id, project_id, trace_id, span_id, eval_name, \
                 eval_model, score, passed, metadata, user_review_passed, idempotency_key) \
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![
                    evaluation.id.to_string(),
                    evaluation.project_id.to_string(),
                    evaluation.trace_id.map(|id| id.to_string()),
                    evaluation.span_id.map(|id| id.to_string()),
                    evaluation.eval_name,
                    evaluation.eval_model,
                    evaluation.score,
                    i64::from(evaluation.passed),
                    value_to_text(&evaluation.metadata)?,
                    evaluation.user_review_passed.map(i64::from),
                    evaluation.idempotency_key,
                ],
            )
            .map_err(write_err)?;
        Ok(evaluation)
    }

    #[allow(clippy::too_many_lines, reason = "single dynamic filter builder")]
    async fn list_traces(
        &self,
        project_id: ProjectId,
        filter: TraceFilter,
    ) -> Result<Page<Trace>, TraceHubError> {
        let connection = self.connection.lock().await;

        let mut clauses = vec!["project_id = ?1".to_string()];
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(project_id.to_string())];

        macro_rules! bind {
            ($clause:expr, $value:expr) => {{
                bound.push(Box::new($value));
                clauses.push(format!("{} ?{}", $clause, bound.len()));
            }};
        }

        if let Some(start_after) = filter.start_after {
            bind!("start_time >=", ts_to_text(start_after)?);
        }
        if let Some(start_before) = filter.start_before {
            bind!("start_time <=", ts_to_text(start_before)?);
        }
        if let Some(status) = &filter.status {
            bind!("status =", status.clone());
        }
        if let Some(model) = &filter.model {
            bind!("model =", model.clone());
        }
        if let Some(environment) = &filter.environment {
            bind!("environment =", environment.clone());
        }
        if let Some(user_id) = &filter.user_id {
            bind!("user_id =", user_id.clone());
        }
        if let Some(session_id) = &filter.session_id {
            bind!("session_id =", session_id.clone());
        }
        if let Some(tag) = &filter.tag {
            bind!("attributes LIKE", format!("%\"{tag}\"%"));
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{}%", search.to_lowercase());
            bound.push(Box::new(pattern.clone()));
            let input_idx = bound.len();
            bound.push(Box::new(pattern.clone()));
            let output_idx = bound.len();
            bound.push(Box::new(pattern));
            let payload_idx = bound.len();
            clauses.push(format!(
                "(LOWER(input_text) LIKE ?{input_idx} OR LOWER(output_text) LIKE ?{output_idx} \
                 OR id IN (SELECT trace_id FROM span_events WHERE project_id = ?1 \
                 AND LOWER(payload) LIKE ?{payload_idx}))"
            ));
        }

        let where_clause = clauses.join(" AND ");
        let params_ref: Vec<&dyn rusqlite::ToSql> = bound.iter().map(AsRef::as_ref).collect();

        let total: i64 = connection
            .query_row(
                &format!("SELECT COUNT(*) FROM traces WHERE {where_clause}"),
                params_ref.as_slice(),
                |row| row.get(0),
            )
            .map_err(|err| db_err(&err))?;

        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, 100);
        let offset = (i64::from(page) - 1) * i64::from(page_size);

        let query = format!(
            "SELECT id, project_id, external_trace_id, status, start_time, end_time, \
             attributes, model, environment, user_id, session_id, input_text, output_text, \
             has_open_spans, total_spans, ended_spans, completion_rate, decision, \
             user_review_passed FROM traces WHERE {where_clause} \
             ORDER BY start_time DESC LIMIT {page_size} OFFSET {offset}"
        );
        let mut stmt = connection.prepare(&query).map_err(|err| db_err(&err))?;
        let rows = stmt.query_map(params_ref.as_slice(), row_to_trace_raw).map_err(|err| db_err(&err))?;
        let items = rows
            .map(|row| row.map_err(|err| db_err(&err)).and_then(build_trace))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page { items, total: total.try_into().unwrap_or(0) })
    }

    async fn trace_status_counts(
        &self,
        project_id: ProjectId,
        since: Timestamp,
    ) -> Result<Vec<(String, u64)>, TraceHubError> {
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare(
                "SELECT status, COUNT(*) FROM traces WHERE project_id = ?1 AND start_time >= ?2 \
                 GROUP BY status",
            )
            .map_err(|err| db_err(&err))?;
        let rows = stmt
            .query_map(params![project_id.to_string(), ts_to_text(since)?], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|err| db_err(&err))?;
        rows.map(|row| {
            let (status, count) = row.map_err(|err| db_err(&err))?;
            Ok((status, count.try_into().unwrap_or(0)))
        })
        .collect()
    }

    async fn get_decision_by_idempotency_key(
        &self,
        project_id: ProjectId,
        idempotency_key: &str,
    ) -> Result<Option<TraceDecision>, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .query_row(
                "SELECT id, project_id, trace_id, action, reason_code, severity, confidence, \
                 policy_version, judge_model, signals, rationale, idempotency_key FROM \
                 trace_decisions WHERE project_id = ?1 AND idempotency_key = ?2",
                params![project_id.to_string(), idempotency_key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, String>(9)?,
                        row.get::<_, Option<String>>(10)?,
                        row.get::<_, String>(11)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| db_err(&err))?
            .map(build_trace_decision)
            .transpose()
    }

    async fn list_decisions_for_trace(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
    ) -> Result<Vec<TraceDecision>, TraceHubError> {
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare(
                "SELECT id, project_id, trace_id, action, reason_code, severity, confidence, \
                 policy_version, judge_model, signals, rationale, idempotency_key FROM \
                 trace_decisions WHERE project_id = ?1 AND trace_id = ?2 ORDER BY rowid DESC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = stmt
            .query_map(params![project_id.to_string(), trace_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, Option<String>>(10)?,
                    row.get::<_, String>(11)?,
                ))
            })
            .map_err(|err| db_err(&err))?;
        rows.map(|row| row.map_err(|err| db_err(&err)).and_then(build_trace_decision))
            .collect()
    }

    async fn resolve_active_policy_version(
        &self,
        project_id: ProjectId,
        policy_id: Option<PolicyId>,
        version: Option<u32>,
        now: Timestamp,
    ) -> Result<Option<(Policy, PolicyVersion)>, TraceHubError> {
        let connection = self.connection.lock().await;

        let row: Option<(String, String, String, Option<String>, String, u32, String, bool, String)> =
            match (policy_id, version) {
                (Some(policy_id), Some(version)) => connection
                    .query_row(
                        "SELECT p.id, p.project_id, p.name, p.description, pv.id, pv.version, \
                         pv.effective_from, pv.active, pv.definition FROM policy_versions pv \
                         JOIN policies p ON p.id = pv.policy_id \
                         WHERE p.project_id = ?1 AND p.id = ?2 AND pv.version = ?3",
                        params![project_id.to_string(), policy_id.to_string(), version],
                        policy_join_row,
                    )
                    .optional()
                    .map_err(|err| db_err(&err))?,
                (Some(policy_id), None) => connection
                    .query_row(
                        "SELECT p.id, p.project_id, p.name, p.description, pv.id, pv.version, \
                         pv.effective_from, pv.active, pv.definition FROM policy_versions pv \
                         JOIN policies p ON p.id = pv.policy_id \
                         WHERE p.project_id = ?1 AND p.id = ?2 AND pv.active = 1",
                        params![project_id.to_string(), policy_id.to_string()],
                        policy_join_row,
                    )
                    .optional()
                    .map_err(|err| db_err(&err))?,
                (None, _) => connection
                    .query_row(
                        "SELECT p.id, p.project_id, p.name, p.description, pv.id, pv.version, \
                         pv.effective_from, pv.active, pv.definition FROM policy_versions pv \
                         JOIN policies p ON p.id = pv.policy_id \
                         WHERE p.project_id = ?1 AND pv.active = 1 AND pv.effective_from <= ?2 \
                         ORDER BY pv.effective_from DESC, pv.version DESC LIMIT 1",
                        params![project_id.to_string(), ts_to_text(now)?],
                        policy_join_row,
                    )
                    .optional()
                    .map_err(|err| db_err(&err))?,
            };

        row.map(|raw| {
            let (policy_id, project_id, name, description, version_id, version, effective_from, active, definition) =
                raw;
            let policy = build_policy((policy_id, project_id, name, description))?;
            let policy_version =
                build_policy_version((version_id, policy.id.to_string(), version, effective_from, active, definition))?;
            Ok::<_, TraceHubError>((policy, policy_version))
        })
        .transpose()
    }

    async fn get_judge_cache(
        &self,
        project_id: ProjectId,
        input_hash: &str,
        policy_version: &str,
    ) -> Result<Option<JudgeCache>, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .query_row(
                "SELECT id, project_id, input_hash, policy_version, decision, created_at FROM \
                 judge_cache WHERE project_id = ?1 AND input_hash = ?2 AND policy_version = ?3",
                params![project_id.to_string(), input_hash, policy_version],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| db_err(&err))?
            .map(build_judge_cache)
            .transpose()
    }

    async fn put_judge_cache(&self, cache: JudgeCache) -> Result<JudgeCache, TraceHubError> {
        let connection = self.connection.lock().await;
        let outcome = connection.execute(
            "INSERT INTO judge_cache (id, project_id, input_hash, policy_version, decision, \
             created_at) VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                cache.id.to_string(),
                cache.project_id.to_string(),
                cache.input_hash,
                cache.policy_version,
                value_to_text(&cache.decision)?,
                ts_to_text(cache.created_at)?,
            ],
        );
        match outcome {
            Ok(_) => Ok(cache),
            Err(ref err) if is_constraint_violation(err) => connection
                .query_row(
                    "SELECT id, project_id, input_hash, policy_version, decision, created_at \
                     FROM judge_cache WHERE project_id = ?1 AND input_hash = ?2 AND \
                     policy_version = ?3",
                    params![cache.project_id.to_string(), cache.input_hash, cache.policy_version],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    },
                )
                .map_err(|err| db_err(&err))
                .and_then(build_judge_cache),
            Err(err) => Err(TraceHubError::Store(err.to_string())),
        }
    }

    #[allow(clippy::too_many_arguments, reason = "mirrors one atomic transaction")]
    async fn persist_decision(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
        judge_runs: Vec<JudgeRun>,
        judge_span: Span,
        judge_event: SpanEvent,
        decision: TraceDecision,
    ) -> Result<TraceDecision, TraceHubError> {
        let mut connection = self.connection.lock().await;
        let tx = connection.transaction().map_err(|err| db_err(&err))?;

        for run in &judge_runs {
            tx.execute(
                "INSERT INTO judge_runs (id, project_id, trace_id, span_id, provider, model, \
                 action, reason_code, confidence, output, created_at) \
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
                params![
                    run.id.to_string(),
                    run.project_id.to_string(),
                    run.trace_id.to_string(),
                    run.span_id.map(|id| id.to_string()),
                    run.provider,
                    run.model,
                    run.action,
                    run.reason_code,
                    run.confidence,
                    value_to_text(&run.output)?,
                    ts_to_text(run.created_at)?,
                ],
            )
            .map_err(write_err)?;
        }

        insert_span_tx(&tx, &judge_span)?;
        insert_span_event_tx(&tx, &judge_event)?;

        tx.execute(
            "INSERT INTO trace_decisions (id, project_id, trace_id, action, reason_code, \
             severity, confidence, policy_version, judge_model, signals, rationale, \
             idempotency_key) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                decision.id.to_string(),
                decision.project_id.to_string(),
                decision.trace_id.to_string(),
                decision.action,
                decision.reason_code,
                decision.severity,
                decision.confidence,
                decision.policy_version,
                decision.judge_model,
                value_to_text(&decision.signals)?,
                decision.rationale,
                decision.idempotency_key,
            ],
        )
        .map_err(write_err)?;

        let mut trace = fetch_trace_tx(&tx, project_id, trace_id)?
            .ok_or_else(|| TraceHubError::NotFound(format!("trace {trace_id}")))?;
        trace.decision = Some(
            serde_json::json!({
                "action": decision.action,
                "reason_code": decision.reason_code,
                "severity": decision.severity,
                "confidence": decision.confidence,
                "policy_version": decision.policy_version,
            }),
        );
        upsert_trace_tx(&tx, &trace)?;
        recalculate_trace_projection_tx(&tx, project_id, trace_id)?;

        tx.commit().map_err(|err| db_err(&err))?;
        Ok(decision)
    }

    async fn recent_judge_runs(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
        limit: u32,
    ) -> Result<Vec<JudgeRun>, TraceHubError> {
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare(
                "SELECT id, project_id, trace_id, span_id, provider, model, action, \
                 reason_code, confidence, output, created_at FROM judge_runs \
                 WHERE project_id = ?1 AND trace_id = ?2 ORDER BY created_at DESC LIMIT ?3",
            )
            .map_err(|err| db_err(&err))?;
        let rows = stmt
            .query_map(params![project_id.to_string(), trace_id.to_string(), limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, f64>(8)?,
                    row.get::<_, String>(9)?,
                    row.get::<_, String>(10)?,
                ))
            })
            .map_err(|err| db_err(&err))?;
        rows.map(|row| row.map_err(|err| db_err(&err)).and_then(build_judge_run)).collect()
    }

    async fn create_policy(
        &self,
        policy: Policy,
        version: PolicyVersion,
    ) -> Result<(Policy, PolicyVersion), TraceHubError> {
        let mut connection = self.connection.lock().await;
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        tx.execute(
            "INSERT INTO policies (id, project_id, name, description) VALUES (?1,?2,?3,?4)",
            params![policy.id.to_string(), policy.project_id.to_string(), policy.name, policy.description],
        )
        .map_err(write_err)?;
        tx.execute(
            "INSERT INTO policy_versions (id, policy_id, version, effective_from, active, \
             definition) VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                version.id.to_string(),
                version.policy_id.to_string(),
                version.version,
                ts_to_text(version.effective_from)?,
                i64::from(version.active),
                value_to_text(&version.definition)?,
            ],
        )
        .map_err(write_err)?;
        tx.commit().map_err(|err| db_err(&err))?;
        Ok((policy, version))
    }

    async fn list_policies(&self, project_id: ProjectId) -> Result<Vec<Policy>, TraceHubError> {
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare("SELECT id, project_id, name, description FROM policies WHERE project_id = ?1")
            .map_err(|err| db_err(&err))?;
        let rows = stmt
            .query_map(params![project_id.to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, Option<String>>(3)?))
            })
            .map_err(|err| db_err(&err))?;
        rows.map(|row| row.map_err(|err| db_err(&err)).and_then(build_policy)).collect()
    }

    async fn list_policy_versions(
        &self,
        project_id: ProjectId,
        policy_id: PolicyId,
    ) -> Result<Vec<PolicyVersion>, TraceHubError> {
        let connection = self.connection.lock().await;
        let owner_ok: Option<i64> = connection
            .query_row(
                "SELECT 1 FROM policies WHERE id = ?1 AND project_id = ?2",
                params![policy_id.to_string(), project_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        if owner_ok.is_none() {
            return Err(TraceHubError::NotFound(format!("policy {policy_id}")));
        }
        let mut stmt = connection
            .prepare(
                "SELECT id, policy_id, version, effective_from, active, definition FROM \
                 policy_versions WHERE policy_id = ?1 ORDER BY version ASC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = stmt
            .query_map(params![policy_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)? != 0,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|err| db_err(&err))?;
        rows.map(|row| row.map_err(|err| db_err(&err)).and_then(build_policy_version)).collect()
    }

    async fn activate_policy_version(
        &self,
        project_id: ProjectId,
        policy_id: PolicyId,
        version: u32,
    ) -> Result<PolicyVersion, TraceHubError> {
        let mut connection = self.connection.lock().await;
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
        let owner_ok: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM policies WHERE id = ?1 AND project_id = ?2",
                params![policy_id.to_string(), project_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        if owner_ok.is_none() {
            return Err(TraceHubError::NotFound(format!("policy {policy_id}")));
        }
        tx.execute(
            "UPDATE policy_versions SET active = 0 WHERE policy_id = ?1",
            params![policy_id.to_string()],
        )
        .map_err(write_err)?;
        let affected = tx
            .execute(
                "UPDATE policy_versions SET active = 1 WHERE policy_id = ?1 AND version = ?2",
                params![policy_id.to_string(), version],
            )
            .map_err(write_err)?;
        if affected == 0 {
            return Err(TraceHubError::NotFound(format!("policy version {policy_id}:v{version}")));
        }
        let activated = tx
            .query_row(
                "SELECT id, policy_id, version, effective_from, active, definition FROM \
                 policy_versions WHERE policy_id = ?1 AND version = ?2",
                params![policy_id.to_string(), version],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)? != 0,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .map_err(|err| db_err(&err))
            .and_then(build_policy_version)?;
        tx.commit().map_err(|err| db_err(&err))?;
        Ok(activated)
    }

    async fn create_case(
        &self,
        project_id: ProjectId,
        trace_id: TraceId,
        reason_code: String,
        notification_target: Option<(String, Value)>,
    ) -> Result<(Case, Option<Notification>), TraceHubError> {
        let mut connection = self.connection.lock().await;
        let tx = connection.transaction().map_err(|err| db_err(&err))?;
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
        tx.execute(
            "INSERT INTO cases (id, project_id, trace_id, reason_code, status, assignee, \
             acknowledged_at, resolved_at, created_at) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                case.id.to_string(),
                case.project_id.to_string(),
                case.trace_id.to_string(),
                case.reason_code,
                case_status_label(case.status),
                case.assignee,
                opt_ts_to_text(case.acknowledged_at)?,
                opt_ts_to_text(case.resolved_at)?,
                ts_to_text(case.created_at)?,
            ],
        )
        .map_err(write_err)?;

        let notification = match notification_target {
            Some((target_url, payload)) => {
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
                tx.execute(
                    "INSERT INTO notifications (id, project_id, case_id, channel, target_url, \
                     status, payload, response_snippet, created_at) \
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                    params![
                        notification.id.to_string(),
                        notification.project_id.to_string(),
                        notification.case_id.to_string(),
                        notification.channel,
                        notification.target_url,
                        notification_status_label(notification.status),
                        value_to_text(&notification.payload)?,
                        notification.response_snippet,
                        ts_to_text(notification.created_at)?,
                    ],
                )
                .map_err(write_err)?;
                Some(notification)
            }
            None => None,
        };

        tx.commit().map_err(|err| db_err(&err))?;
        Ok((case, notification))
    }

    async fn record_notification_outcome(
        &self,
        notification_id: NotificationId,
        status: NotificationStatus,
        response_snippet: Option<String>,
    ) -> Result<Notification, TraceHubError> {
        let connection = self.connection.lock().await;
        let affected = connection
            .execute(
                "UPDATE notifications SET status = ?2, response_snippet = ?3 WHERE id = ?1",
                params![notification_id.to_string(), notification_status_label(status), response_snippet],
            )
            .map_err(write_err)?;
        if affected == 0 {
            return Err(TraceHubError::NotFound(format!("notification {notification_id}")));
        }
        connection
            .query_row(
                "SELECT id, project_id, case_id, channel, target_url, status, payload, \
                 response_snippet, created_at FROM notifications WHERE id = ?1",
                params![notification_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .map_err(|err| db_err(&err))
            .and_then(build_notification)
    }

    async fn get_case(&self, project_id: ProjectId, case_id: CaseId) -> Result<Option<Case>, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .query_row(
                "SELECT id, project_id, trace_id, reason_code, status, assignee, \
                 acknowledged_at, resolved_at, created_at FROM cases WHERE project_id = ?1 AND id = ?2",
                params![project_id.to_string(), case_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| db_err(&err))?
            .map(build_case)
            .transpose()
    }

    async fn list_cases(&self, project_id: ProjectId) -> Result<Vec<Case>, TraceHubError> {
        let connection = self.connection.lock().await;
        let mut stmt = connection
            .prepare(
                "SELECT id, project_id, trace_id, reason_code, status, assignee, \
                 acknowledged_at, resolved_at, created_at FROM cases WHERE project_id = ?1 \
                 ORDER BY created_at DESC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = stmt
            .query_map(params![project_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })
            .map_err(|err| db_err(&err))?;
        rows.map(|row| row.map_err(|err| db_err(&err)).and_then(build_case)).collect()
    }

    async fn ack_case(&self, project_id: ProjectId, case_id: CaseId, now: Timestamp) -> Result<Case, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "UPDATE cases SET status = 'acknowledged', acknowledged_at = COALESCE(acknowledged_at, ?3) \
                 WHERE project_id = ?1 AND id = ?2",
                params![project_id.to_string(), case_id.to_string(), ts_to_text(now)?],
            )
            .map_err(write_err)?;
        self.get_case(project_id, case_id)
            .await?
            .ok_or_else(|| TraceHubError::NotFound(format!("case {case_id}")))
    }

    async fn resolve_case(&self, project_id: ProjectId, case_id: CaseId, now: Timestamp) -> Result<Case, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .execute(
                "UPDATE cases SET status = 'resolved', acknowledged_at = COALESCE(acknowledged_at, ?3), \
                 resolved_at = COALESCE(resolved_at, ?3) WHERE project_id = ?1 AND id = ?2",
                params![project_id.to_string(), case_id.to_string(), ts_to_text(now)?],
            )
            .map_err(write_err)?;
        self.get_case(project_id, case_id)
            .await?
            .ok_or_else(|| TraceHubError::NotFound(format!("case {case_id}")))
    }

    async fn get_judge_cache_by_id(&self, id: JudgeCacheId) -> Result<Option<JudgeCache>, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .query_row(
                "SELECT id, project_id, input_hash, policy_version, decision, created_at FROM \
                 judge_cache WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| db_err(&err))?
            .map(build_judge_cache)
            .transpose()
    }

    async fn get_span(&self, project_id: ProjectId, span_id: SpanId) -> Result<Option<Span>, TraceHubError> {
        let connection = self.connection.lock().await;
        connection
            .query_row(
                "SELECT id, project_id, trace_id, parent_span_id, name, span_type, status, \
                 start_time, end_time, error, attributes, idempotency_key FROM spans \
                 WHERE project_id = ?1 AND id = ?2",
                params![project_id.to_string(), span_id.to_string()],
                row_to_span_raw,
            )
            .optional()
            .map_err(|err| db_err(&err))?
            .map(build_span)
            .transpose()
    }
}

#[allow(clippy::type_complexity, reason = "one row, many columns, no natural grouping")]
fn policy_join_row(
    row: &Row<'_>,
) -> rusqlite::Result<(String, String, String, Option<String>, String, u32, String, bool, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get::<_, i64>(7)? != 0,
        row.get(8)?,
    ))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
