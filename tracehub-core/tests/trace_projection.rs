// Integration tests for `Trace::recalculate_metrics`, exercising the
// projection invariants from the design document's testable-properties
// section directly against the core entity type (no store involved).

use std::collections::BTreeMap;

use tracehub_core::entities::Trace;
use tracehub_core::entities::TraceStatus;
use tracehub_core::ids::ProjectId;
use tracehub_core::ids::TraceId;
use tracehub_core::time::Timestamp;

fn running_trace() -> Trace {
    Trace {
        id: TraceId::generate(),
        project_id: ProjectId::generate(),
        external_trace_id: None,
        status: TraceStatus::Running,
        start_time: Timestamp::now(),
        end_time: None,
        attributes: BTreeMap::new(),
        model: None,
        environment: None,
        user_id: None,
        session_id: None,
        input_text: None,
        output_text: None,
        has_open_spans: false,
        total_spans: 0,
        ended_spans: 0,
        completion_rate: 1.0,
        decision: None,
        user_review_passed: None,
    }
}

#[test]
fn empty_trace_is_fully_complete() {
    let mut trace = running_trace();
    trace.recalculate_metrics(0, 0);
    assert!((trace.completion_rate - 1.0).abs() < f64::EPSILON);
    assert!(!trace.has_open_spans);
}

#[test]
fn partial_completion_keeps_trace_open() {
    let mut trace = running_trace();
    trace.recalculate_metrics(4, 2);
    assert!((trace.completion_rate - 0.5).abs() < f64::EPSILON);
    assert!(trace.has_open_spans);
    assert_eq!(trace.status, TraceStatus::Running);
}

#[test]
fn promotion_requires_both_end_time_and_no_open_spans() {
    let mut trace = running_trace();
    trace.recalculate_metrics(2, 2);
    // All spans ended, but the trace itself has no end_time yet: stays running.
    assert_eq!(trace.status, TraceStatus::Running);

    trace.end_time = Some(Timestamp::now());
    trace.recalculate_metrics(2, 2);
    assert_eq!(trace.status, TraceStatus::Success);
}

#[test]
fn error_status_is_not_overwritten_by_promotion() {
    let mut trace = running_trace();
    trace.status = TraceStatus::Error;
    trace.end_time = Some(Timestamp::now());
    trace.recalculate_metrics(1, 1);
    assert_eq!(trace.status, TraceStatus::Error);
}
