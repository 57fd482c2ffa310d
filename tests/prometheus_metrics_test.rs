mod common;

use common::{parse_prometheus_output, sample_payload};
use ecall_incidents::{
    metrics::{self, INCIDENTS_COMPLETED_TOTAL, INCIDENTS_CREATED_TOTAL, TRANSCRIPT_MESSAGES_TOTAL},
    models::{IncidentPatch, TranscriptMessage},
    repository::IncidentRepository,
    state::create_in_memory_store,
};

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

#[test]
fn test_exported_metric_names_follow_conventions() {
    metrics::init_metrics().unwrap();
    INCIDENTS_CREATED_TOTAL.inc_by(0.0);

    let output = metrics::gather_metrics();
    let parsed = parse_prometheus_output(&output);

    assert!(parsed.contains_key("ecall_incidents_incidents_created_total"));
    assert!(parsed.contains_key("ecall_incidents_index_cas_conflicts_total"));
    for name in parsed.keys() {
        assert!(is_valid_metric_name(name), "invalid metric name: {}", name);
        assert!(name.starts_with("ecall_incidents_"), "unnamespaced metric: {}", name);
    }
}

#[tokio::test]
async fn test_repository_operations_move_counters() {
    metrics::init_metrics().unwrap();
    let repository = IncidentRepository::new(create_in_memory_store());

    let created_before = INCIDENTS_CREATED_TOTAL.get();
    let messages_before = TRANSCRIPT_MESSAGES_TOTAL.get();
    let completed_before = INCIDENTS_COMPLETED_TOTAL.get();

    let incident = repository.create(sample_payload("Kim")).await.unwrap();
    repository
        .append_transcript(&incident.id, TranscriptMessage::new("caller", "help", "10:00"))
        .await
        .unwrap();
    repository
        .patch(&incident.id, IncidentPatch::new().with("severity", "low"))
        .await
        .unwrap();
    repository
        .patch(&incident.id, IncidentPatch::complete())
        .await
        .unwrap();

    // Counters are process-wide and other tests run in parallel
    assert!(INCIDENTS_CREATED_TOTAL.get() >= created_before + 1.0);
    assert!(TRANSCRIPT_MESSAGES_TOTAL.get() >= messages_before + 1.0);
    assert!(INCIDENTS_COMPLETED_TOTAL.get() >= completed_before + 1.0);
}
