//! Retry budget and run abort tests.

use graphflow::config::RunConfig;
use graphflow::filter::FilterSet;
use graphflow::graph::GraphBuilder;
use graphflow::scheduler::{NodeState, RunEvent, RunStatus};
use graphflow::termination::TerminationCondition;
use graphflow::transcript::AgentId;

use crate::fixtures::{fast_config, scripted, FailingWorker, RunHarness};

/// Test: Failure mid-chain aborts the run
/// Given A -> B -> C where B always fails
/// When the run executes
/// Then the run aborts, the partial transcript survives, and C never runs
#[tokio::test]
async fn test_mid_chain_failure_aborts() {
    let graph = GraphBuilder::new()
        .add_agent("A", scripted("upstream ok"), FilterSet::all())
        .add_agent("B", FailingWorker::new("connection refused"), FilterSet::all())
        .add_agent("C", scripted("never spoken"), FilterSet::all())
        .add_edge("A", "B")
        .add_edge("B", "C")
        .build()
        .unwrap();

    let harness = RunHarness::new(
        graph,
        TerminationCondition::message_count(100),
        fast_config(),
    );
    let (result, events) = harness.run("seed").await;

    assert!(
        matches!(result.status, RunStatus::Aborted(ref reason) if reason.contains("B")),
        "Expected abort naming agent B, got {:?}",
        result.status
    );

    // Partial transcript: seed and A's message, nothing silently dropped.
    let messages = result.transcript.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "upstream ok");

    assert_eq!(result.agents[&AgentId::new("A")].state, NodeState::Done);
    assert_eq!(result.agents[&AgentId::new("B")].state, NodeState::Failed);
    assert_eq!(result.agents[&AgentId::new("C")].state, NodeState::Pending);

    assert!(matches!(
        events.last(),
        Some(RunEvent::Finished(RunStatus::Aborted(_)))
    ));
}

/// Test: Retry budget is honored before failing
/// Given max_attempts = 3 and a worker that always fails
/// When the run executes
/// Then two retry events fire and the node records three attempts
#[tokio::test]
async fn test_retry_budget_consumed() {
    let graph = GraphBuilder::new()
        .add_agent("Flaky", FailingWorker::new("boom"), FilterSet::all())
        .build()
        .unwrap();

    let config = RunConfig {
        invocation_timeout_secs: 5,
        max_attempts: 3,
        max_concurrency: 4,
    };
    let harness = RunHarness::new(graph, TerminationCondition::message_count(100), config);
    let (result, events) = harness.run("seed").await;

    let record = &result.agents[&AgentId::new("Flaky")];
    assert_eq!(record.state, NodeState::Failed);
    assert_eq!(record.attempts, 3);

    let retries: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::AgentRetrying { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![1, 2]);
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::AgentFailed { agent, .. } if agent.as_str() == "Flaky")));
}

/// Test: Failure in one branch aborts siblings' downstream work
/// Given A -> (B fails, C succeeds) -> D
/// When the run executes
/// Then the run aborts and D stays pending even though C succeeded
#[tokio::test]
async fn test_branch_failure_blocks_join() {
    let graph = GraphBuilder::new()
        .add_agent("A", scripted("root"), FilterSet::all())
        .add_agent("B", FailingWorker::new("dead branch"), FilterSet::all())
        .add_agent("C", scripted("alive branch"), FilterSet::all())
        .add_agent("D", scripted("join"), FilterSet::all())
        .add_edge("A", "B")
        .add_edge("A", "C")
        .add_edge("B", "D")
        .add_edge("C", "D")
        .build()
        .unwrap();

    let harness = RunHarness::new(
        graph,
        TerminationCondition::message_count(100),
        fast_config(),
    );
    let (result, _events) = harness.run("seed").await;

    assert!(matches!(result.status, RunStatus::Aborted(_)));
    assert_eq!(result.agents[&AgentId::new("D")].state, NodeState::Pending);
    // D never appended anything.
    assert!(result
        .transcript
        .messages()
        .iter()
        .all(|m| m.source != AgentId::new("D")));
}

/// Test: Abort result is Ok at the API level
/// A failed run is a run outcome, not an infrastructure error; the caller
/// still receives the partial transcript.
#[tokio::test]
async fn test_abort_preserves_partial_transcript() {
    let graph = GraphBuilder::new()
        .add_agent("First", scripted("step one"), FilterSet::all())
        .add_agent("Second", scripted("step two"), FilterSet::all())
        .add_agent("Third", FailingWorker::new("gone"), FilterSet::all())
        .add_edge("First", "Second")
        .add_edge("Second", "Third")
        .build()
        .unwrap();

    let harness = RunHarness::new(
        graph,
        TerminationCondition::message_count(100),
        fast_config(),
    );
    let (result, _events) = harness.run("seed").await;

    assert!(matches!(result.status, RunStatus::Aborted(_)));
    let contents: Vec<&str> = result
        .transcript
        .messages()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["seed", "step one", "step two"]);
}
