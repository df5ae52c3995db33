//! Transcript export, import, and JSON persistence tests.

use graphflow::filter::FilterSet;
use graphflow::graph::GraphBuilder;
use graphflow::scheduler::RunStatus;
use graphflow::termination::TerminationCondition;
use graphflow::transcript::Transcript;

use crate::fixtures::{fast_config, scripted, RunHarness};

fn small_run_graph() -> graphflow::graph::FlowGraph {
    GraphBuilder::new()
        .add_agent("Writer", scripted("a draft"), FilterSet::all())
        .add_agent("Editor", scripted("an edit"), FilterSet::all())
        .add_edge("Writer", "Editor")
        .build()
        .unwrap()
}

/// Test: Export and re-import preserve order and content
#[tokio::test]
async fn test_export_import_round_trip() {
    let harness = RunHarness::new(
        small_run_graph(),
        TerminationCondition::message_count(100),
        fast_config(),
    );
    let (result, _events) = harness.run("seed").await;
    assert_eq!(result.status, RunStatus::Completed);

    let records = result.transcript.export();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].sequence, 1);

    let restored = Transcript::from_records(records).unwrap();
    assert_eq!(restored.len(), result.transcript.len());
    for (restored_msg, original) in restored
        .messages()
        .iter()
        .zip(result.transcript.messages())
    {
        assert_eq!(restored_msg.sequence, original.sequence);
        assert_eq!(restored_msg.source, original.source);
        assert_eq!(restored_msg.content, original.content);
        assert_eq!(restored_msg.timestamp, original.timestamp);
    }
}

/// Test: JSON file persistence round trip
#[tokio::test]
async fn test_json_file_round_trip() {
    let harness = RunHarness::new(
        small_run_graph(),
        TerminationCondition::message_count(100),
        fast_config(),
    );
    let (result, _events) = harness.run("seed").await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transcript.json");
    result.transcript.save_json(&path).unwrap();

    let loaded = Transcript::load_json(&path).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(
        loaded.messages()[1].content,
        result.transcript.messages()[1].content
    );
}

/// Test: Tampered export with a sequence gap is rejected
#[tokio::test]
async fn test_gapped_records_rejected() {
    let harness = RunHarness::new(
        small_run_graph(),
        TerminationCondition::message_count(100),
        fast_config(),
    );
    let (result, _events) = harness.run("seed").await;

    let mut records = result.transcript.export();
    records.remove(1); // leaves 1, 3
    assert!(Transcript::from_records(records).is_err());
}

/// Test: An aborted run's partial transcript still persists cleanly
#[tokio::test]
async fn test_partial_transcript_persists() {
    use crate::fixtures::FailingWorker;

    let graph = GraphBuilder::new()
        .add_agent("Ok", scripted("fine"), FilterSet::all())
        .add_agent("Bad", FailingWorker::new("nope"), FilterSet::all())
        .add_edge("Ok", "Bad")
        .build()
        .unwrap();

    let harness = RunHarness::new(
        graph,
        TerminationCondition::message_count(100),
        fast_config(),
    );
    let (result, _events) = harness.run("seed").await;
    assert!(matches!(result.status, RunStatus::Aborted(_)));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.json");
    result.transcript.save_json(&path).unwrap();

    let loaded = Transcript::load_json(&path).unwrap();
    assert_eq!(loaded.len(), 2);
}
