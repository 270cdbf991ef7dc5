//! Workflow execution scheduler.
//!
//! `Scheduler` is the central orchestrator. Given a workflow, an execution
//! id, and optional trigger data it:
//! 1. Statically validates kind-specific required fields.
//! 2. Builds the adjacency view of the graph.
//! 3. Seeds trigger data under webhook-kind start nodes.
//! 4. Walks the graph breadth-first, gating each node on completion of all
//!    of its parents, dispatching through [`NodeDispatcher`].
//! 5. On a node failure, marks every downstream-reachable pending node
//!    `skipped` and fails the execution; on a drained queue, completes it.
//!
//! Every state change is persisted through the [`Store`] facade and
//! broadcast as a full [`ExecutionProgress`] snapshot on the
//! [`ProgressBus`]. The entry point never returns an error: anything that
//! escapes the expected failure paths is reported as execution `failed`
//! with an `Unexpected error:` prefix.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::dag::{self, Graph};
use crate::dispatch::NodeDispatcher;
use crate::models::{
    Context, ExecutionProgress, ExecutionStatus, NodeKind, NodeProgress, NodeRunStatus, Workflow,
};
use crate::progress::ProgressBus;
use crate::store::{ExecutionUpdate, Store};
use crate::EngineError;

/// Tuning knobs for the scheduler.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// Reject workflows whose edges reference unknown node ids instead of
    /// tolerating them.
    pub strict_graph: bool,
}

/// Stateless orchestrator; one instance serves every execution, each run
/// in its own task.
pub struct Scheduler {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn NodeDispatcher>,
    bus: ProgressBus,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn NodeDispatcher>,
        bus: ProgressBus,
    ) -> Self {
        Self::with_config(store, dispatcher, bus, SchedulerConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn Store>,
        dispatcher: Arc<dyn NodeDispatcher>,
        bus: ProgressBus,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            bus,
            config,
        }
    }

    /// Run one execution to a terminal status.
    ///
    /// Infallible by contract: all failure modes end as a `failed`
    /// execution row plus a terminal progress snapshot.
    #[instrument(skip(self, workflow, trigger_data), fields(workflow_id = workflow.id))]
    pub async fn run(&self, workflow: Workflow, execution_id: i64, trigger_data: Option<Value>) {
        if let Err(err) = self.run_inner(&workflow, execution_id, trigger_data).await {
            let message = format!("Unexpected error: {err}");
            error!(execution_id, "{message}");

            if let Err(store_err) = self
                .store
                .update_execution(execution_id, ExecutionUpdate::failed(message.clone(), None))
                .await
            {
                error!(execution_id, "could not record execution failure: {store_err}");
            }

            let mut tracker = ProgressTracker::new(&workflow, execution_id);
            tracker.fail_execution(message);
            self.bus.emit(tracker.snapshot()).await;
        }

        self.bus.cleanup_idle().await;
    }

    async fn run_inner(
        &self,
        workflow: &Workflow,
        execution_id: i64,
        trigger_data: Option<Value>,
    ) -> Result<(), EngineError> {
        let mut tracker = ProgressTracker::new(workflow, execution_id);

        // ------------------------------------------------------------------
        // Phase 1 — static validation.
        // ------------------------------------------------------------------
        if let Err(err) = dag::validate(workflow, self.config.strict_graph) {
            let message = err.to_string();
            warn!(execution_id, "workflow rejected: {message}");

            self.store
                .update_execution(execution_id, ExecutionUpdate::failed(message.clone(), None))
                .await?;
            tracker.fail_execution(message);
            self.bus.emit(tracker.snapshot()).await;
            return Ok(());
        }

        // ------------------------------------------------------------------
        // Phase 2 — graph construction.
        // ------------------------------------------------------------------
        let graph = Graph::build(workflow);

        // ------------------------------------------------------------------
        // Phase 3 — seed trigger data under webhook start nodes.
        // ------------------------------------------------------------------
        let mut context = Context::new();
        let start_nodes = graph.start_nodes(workflow);

        if let Some(trigger) = &trigger_data {
            for node in &start_nodes {
                if node.kind == NodeKind::Webhook {
                    context.insert(node.id.clone(), trigger.clone());
                }
            }
        }

        self.store
            .update_execution(execution_id, ExecutionUpdate::running())
            .await?;
        tracker.status = ExecutionStatus::Running;
        self.bus.emit(tracker.snapshot()).await;

        info!(
            execution_id,
            nodes = workflow.nodes.len(),
            edges = workflow.edges.len(),
            "execution started"
        );

        // ------------------------------------------------------------------
        // Phase 4 — breadth-first traversal with parent-completion gating.
        // ------------------------------------------------------------------
        let mut queue: VecDeque<String> =
            start_nodes.iter().map(|n| n.id.clone()).collect();
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(current_id) = queue.pop_front() {
            if visited.contains(&current_id) {
                continue;
            }
            let Some(&node) = graph.nodes.get(current_id.as_str()) else {
                continue;
            };

            tracker.set_running(&current_id);
            self.bus.emit(tracker.snapshot()).await;

            match self.dispatcher.dispatch(node, &context).await {
                Ok(output) => {
                    info!(execution_id, node_id = %current_id, "node succeeded");
                    context.insert(current_id.clone(), output.clone());
                    tracker.set_success(&current_id, output);
                    self.bus.emit(tracker.snapshot()).await;

                    visited.insert(current_id.clone());
                    for child in graph.children(&current_id) {
                        // A node with multiple parents waits for all of them.
                        let ready = graph
                            .parents(child)
                            .iter()
                            .all(|parent| visited.contains(parent));
                        if ready {
                            queue.push_back(child.clone());
                        }
                    }
                }

                Err(err) => {
                    let node_message = err.to_string();
                    error!(execution_id, node_id = %current_id, "node failed: {node_message}");

                    tracker.set_error(&current_id, node_message.clone());
                    tracker.skip_pending(graph.descendants(&current_id));

                    let message = format!("Node '{current_id}' failed: {node_message}");
                    tracker.fail_execution(message.clone());

                    let final_context = context_to_value(&context);
                    if let Err(store_err) = self
                        .store
                        .update_execution(
                            execution_id,
                            ExecutionUpdate::failed(message, Some(final_context)),
                        )
                        .await
                    {
                        // Already reporting a failure; log and move on.
                        error!(execution_id, "store error while reporting node failure: {store_err}");
                    }

                    self.bus.emit(tracker.snapshot()).await;
                    return Ok(());
                }
            }
        }

        // ------------------------------------------------------------------
        // Phase 5 — completion.
        // ------------------------------------------------------------------
        let final_context = context_to_value(&context);
        self.store
            .update_execution(execution_id, ExecutionUpdate::completed(final_context))
            .await?;
        tracker.status = ExecutionStatus::Completed;
        self.bus.emit(tracker.snapshot()).await;

        info!(execution_id, "execution completed");
        Ok(())
    }
}

fn context_to_value(context: &Context) -> Value {
    Value::Object(
        context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Progress tracking
// ---------------------------------------------------------------------------

/// Mutable per-execution progress state; snapshots of it are what the bus
/// broadcasts. Holds exactly one entry per workflow node, in document
/// order.
struct ProgressTracker {
    execution_id: i64,
    workflow_id: i64,
    status: ExecutionStatus,
    nodes: Vec<NodeProgress>,
    index: HashMap<String, usize>,
    error: Option<String>,
}

impl ProgressTracker {
    fn new(workflow: &Workflow, execution_id: i64) -> Self {
        let nodes: Vec<NodeProgress> = workflow
            .nodes
            .iter()
            .map(|n| NodeProgress::pending(&n.id))
            .collect();
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.node_id.clone(), i))
            .collect();

        Self {
            execution_id,
            workflow_id: workflow.id,
            status: ExecutionStatus::Pending,
            nodes,
            index,
            error: None,
        }
    }

    fn entry(&mut self, node_id: &str) -> &mut NodeProgress {
        let idx = self.index[node_id];
        &mut self.nodes[idx]
    }

    fn set_running(&mut self, node_id: &str) {
        let entry = self.entry(node_id);
        entry.status = NodeRunStatus::Running;
        entry.started_at = Some(Utc::now());
    }

    fn set_success(&mut self, node_id: &str, output: Value) {
        let entry = self.entry(node_id);
        entry.status = NodeRunStatus::Success;
        entry.output = Some(output);
        entry.finished_at = Some(Utc::now());
    }

    fn set_error(&mut self, node_id: &str, message: String) {
        let entry = self.entry(node_id);
        entry.status = NodeRunStatus::Error;
        entry.error = Some(message);
        entry.finished_at = Some(Utc::now());
    }

    /// Mark nodes `skipped`, but only while still `pending` — a terminal
    /// or running status is never overwritten.
    fn skip_pending(&mut self, node_ids: Vec<String>) {
        for node_id in node_ids {
            let entry = self.entry(&node_id);
            if entry.status == NodeRunStatus::Pending {
                entry.status = NodeRunStatus::Skipped;
            }
        }
    }

    fn fail_execution(&mut self, message: String) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(message);
    }

    fn snapshot(&self) -> ExecutionProgress {
        ExecutionProgress {
            execution_id: self.execution_id,
            workflow_id: self.workflow_id,
            status: self.status,
            nodes: self.nodes.clone(),
            error: self.error.clone(),
        }
    }
}
