//! Coordinator: executes a validated `TaskGraph` under its policy.
//!
//! - **Sequential**: declaration order, one task at a time; the first failing
//!   task stops the graph.
//! - **Hierarchical**: the manager dispatches every ready task (all upstream
//!   tasks succeeded) to the provider picked from its delegation table.
//!   Ready tasks run concurrently on a `JoinSet` bounded by a semaphore and
//!   their results are recorded in declaration order. A human gate always
//!   runs alone. A failed task refuses all of its transitive dependents while
//!   independent branches keep running.
//!
//! The coordinator never retries a task; a failure becomes the graph's
//! `Verdict::Failed` and the engine decides what to do with it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use reforge_types::event::EngineEvent;
use reforge_types::task::{CapabilityKind, TaskResult};

use crate::capability::{BoxCapabilityProvider, CapabilityRegistry, TaskInput, TaskRequest};
use crate::event::EventBus;

use super::context::{GraphContext, ResultStore};
use super::dag::{GraphError, GraphPolicy, HierarchicalPolicy, TaskGraph};
use super::delegation::{DEFAULT_SYNTHESIS_INSTRUCTION, ManagerSpec, bind_direct};
use super::worker::{Worker, WorkerReport, prepare_input};

/// Task id under which the manager's synthesis is reported.
pub const MANAGER_TASK_ID: &str = "manager";

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Where the graph's decision string came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionSource {
    HumanGate(String),
    Synthesizer(String),
    /// Raw text of the last task in declaration order.
    TerminalTask(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The graph produced a decision string (not yet parsed).
    Decided { raw: String, source: DecisionSource },
    /// A task failed and no human decision overrides it.
    Failed { task_id: String, error: String },
}

/// Everything one graph run produced.
#[derive(Debug, Clone)]
pub struct GraphOutcome {
    /// Every recorded result, refused tasks included, in recording order.
    pub results: Vec<(String, TaskResult)>,
    /// Tasks actually handed to a provider, in dispatch order.
    pub execution_order: Vec<String>,
    pub verdict: Verdict,
}

impl GraphOutcome {
    pub fn result(&self, task_id: &str) -> Option<&TaskResult> {
        self.results
            .iter()
            .find(|(id, _)| id == task_id)
            .map(|(_, r)| r)
    }

    pub fn results_map(&self) -> BTreeMap<String, TaskResult> {
        self.results.iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Runs task graphs against a fixed capability registry.
#[derive(Debug, Clone)]
pub struct Coordinator {
    registry: Arc<CapabilityRegistry>,
    events: Option<EventBus>,
}

impl Coordinator {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            events: None,
        }
    }

    /// Publish task start/finish events on `bus`.
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Check that every task (and the synthesizer) resolves to a provider of
    /// the right kind, without running anything.
    pub fn validate(&self, graph: &TaskGraph) -> Result<(), GraphError> {
        self.bind(graph).map(|_| ())
    }

    /// Execute `graph` in `ctx`.
    ///
    /// Returns `Err` only for definition problems (unknown capability, kind
    /// mismatch), detected before any task runs.
    pub async fn run(
        &self,
        graph: &TaskGraph,
        ctx: &GraphContext,
    ) -> Result<GraphOutcome, GraphError> {
        let providers = self.bind(graph)?;
        tracing::debug!(
            step_id = %ctx.step.id,
            tasks = graph.len(),
            policy = policy_name(graph.policy()),
            "running task graph"
        );

        match graph.policy() {
            GraphPolicy::Sequential => self.run_sequential(graph, ctx, providers).await,
            GraphPolicy::Hierarchical(policy) => {
                let mut run = HierarchicalRun::new(self, graph, ctx, providers, policy);
                run.drive().await?;
                run.finish().await
            }
        }
    }

    fn bind(&self, graph: &TaskGraph) -> Result<Vec<BoxCapabilityProvider>, GraphError> {
        match graph.policy() {
            GraphPolicy::Sequential => graph
                .nodes()
                .iter()
                .map(|node| bind_direct(node, &self.registry))
                .collect(),
            GraphPolicy::Hierarchical(policy) => {
                if let Some(name) = &policy.manager.synthesizer {
                    let provider =
                        self.registry
                            .get(name)
                            .ok_or_else(|| GraphError::UnknownCapability {
                                task: MANAGER_TASK_ID.to_string(),
                                capability: name.clone(),
                            })?;
                    if provider.kind() != CapabilityKind::Reasoning {
                        return Err(GraphError::CapabilityKindMismatch {
                            task: MANAGER_TASK_ID.to_string(),
                            capability: name.clone(),
                            expected: CapabilityKind::Reasoning,
                            actual: provider.kind(),
                        });
                    }
                }
                graph
                    .nodes()
                    .iter()
                    .map(|node| policy.manager.assign(node, &self.registry))
                    .collect()
            }
        }
    }

    async fn run_sequential(
        &self,
        graph: &TaskGraph,
        ctx: &GraphContext,
        providers: Vec<BoxCapabilityProvider>,
    ) -> Result<GraphOutcome, GraphError> {
        let mut results = ResultStore::new();
        let mut order = Vec::with_capacity(graph.len());
        let mut failure = None;

        for (idx, provider) in providers.into_iter().enumerate() {
            let (worker, input) = self.start_task(graph, idx, ctx, &results, provider);
            let report = worker.execute(input).await;
            self.publish_finished(ctx, &report);

            let id = graph.nodes()[idx].id.clone();
            order.push(id.clone());
            let failed = !report.result.is_success();
            if failed {
                failure = Some((id.clone(), report.result.raw_text.clone()));
            }
            results.insert(&id, report.result)?;
            if failed {
                tracing::info!(step_id = %ctx.step.id, task_id = %id, "task failed, stopping graph");
                break;
            }
        }

        let verdict = match decided_by_gate(graph, &results) {
            Some(verdict) => verdict,
            None => match failure {
                Some((task_id, error)) => Verdict::Failed { task_id, error },
                None => terminal_verdict(graph, &results),
            },
        };
        Ok(GraphOutcome {
            results: results.into_ordered(),
            execution_order: order,
            verdict,
        })
    }

    /// Prepare a worker and its input for node `idx`, announcing the dispatch.
    fn start_task(
        &self,
        graph: &TaskGraph,
        idx: usize,
        ctx: &GraphContext,
        results: &ResultStore,
        provider: BoxCapabilityProvider,
    ) -> (Worker, TaskInput) {
        let node = &graph.nodes()[idx];
        let upstream: Vec<&str> = graph
            .upstream_of(idx)
            .iter()
            .map(|&d| graph.nodes()[d].id.as_str())
            .collect();
        let input = prepare_input(node, &upstream, ctx, results);

        tracing::debug!(
            step_id = %ctx.step.id,
            task_id = %node.id,
            capability = %node.kind.capability(),
            provider = %provider.name(),
            "dispatching task"
        );
        self.publish(EngineEvent::TaskStarted {
            step_id: ctx.step.id.clone(),
            task_id: node.id.clone(),
            provider: provider.name().to_string(),
        });

        (Worker::new(node.id.clone(), provider), input)
    }

    fn publish_finished(&self, ctx: &GraphContext, report: &WorkerReport) {
        self.publish(EngineEvent::TaskFinished {
            step_id: ctx.step.id.clone(),
            task_id: report.task_id.clone(),
            status: report.result.status,
            duration_ms: report.elapsed.as_millis() as u64,
        });
    }

    fn publish(&self, event: EngineEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    /// Ask the manager's synthesizer for the decision.
    async fn synthesize(
        &self,
        name: &str,
        manager: &ManagerSpec,
        ctx: &GraphContext,
        results: &ResultStore,
    ) -> Verdict {
        let Some(provider) = self.registry.get(name) else {
            return Verdict::Failed {
                task_id: MANAGER_TASK_ID.to_string(),
                error: format!("synthesizer '{name}' is not registered"),
            };
        };

        let instruction = manager
            .instruction
            .as_deref()
            .unwrap_or(DEFAULT_SYNTHESIS_INSTRUCTION);
        let input = TaskInput {
            task_id: MANAGER_TASK_ID.to_string(),
            step: ctx.step.clone(),
            feedback: ctx.feedback.clone(),
            working_dir: ctx.working_dir.clone(),
            request: TaskRequest::Reasoning {
                instruction: ctx.resolve_template(instruction, results),
            },
            inputs: BTreeMap::new(),
            upstream: results
                .order()
                .iter()
                .filter_map(|id| results.get(id).map(|r| (id.clone(), r.clone())))
                .collect(),
        };

        let report = Worker::new(MANAGER_TASK_ID, provider.clone())
            .execute(input)
            .await;
        if report.result.is_success() {
            Verdict::Decided {
                raw: report.result.raw_text,
                source: DecisionSource::Synthesizer(name.to_string()),
            }
        } else {
            Verdict::Failed {
                task_id: MANAGER_TASK_ID.to_string(),
                error: report.result.raw_text,
            }
        }
    }
}

fn policy_name(policy: &GraphPolicy) -> &'static str {
    match policy {
        GraphPolicy::Sequential => "sequential",
        GraphPolicy::Hierarchical(_) => "hierarchical",
    }
}

/// A human gate that answered decides the graph, whatever else failed.
fn decided_by_gate(graph: &TaskGraph, results: &ResultStore) -> Option<Verdict> {
    let gate = graph.human_gate()?;
    let result = results.get(&gate.id).filter(|r| r.is_success())?;
    Some(Verdict::Decided {
        raw: result.raw_text.clone(),
        source: DecisionSource::HumanGate(gate.id.clone()),
    })
}

fn terminal_verdict(graph: &TaskGraph, results: &ResultStore) -> Verdict {
    let last = &graph.nodes()[graph.len() - 1];
    match results.get(&last.id) {
        Some(result) => Verdict::Decided {
            raw: result.raw_text.clone(),
            source: DecisionSource::TerminalTask(last.id.clone()),
        },
        None => Verdict::Failed {
            task_id: last.id.clone(),
            error: "terminal task produced no result".to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Hierarchical execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Pending,
    Succeeded,
    Failed,
}

/// State of one hierarchical graph run.
struct HierarchicalRun<'a> {
    coordinator: &'a Coordinator,
    graph: &'a TaskGraph,
    ctx: &'a GraphContext,
    policy: &'a HierarchicalPolicy,
    providers: Vec<BoxCapabilityProvider>,
    semaphore: Arc<Semaphore>,
    slots: Vec<Slot>,
    results: ResultStore,
    order: Vec<String>,
    first_failure: Option<(String, String)>,
}

impl<'a> HierarchicalRun<'a> {
    fn new(
        coordinator: &'a Coordinator,
        graph: &'a TaskGraph,
        ctx: &'a GraphContext,
        providers: Vec<BoxCapabilityProvider>,
        policy: &'a HierarchicalPolicy,
    ) -> Self {
        Self {
            coordinator,
            graph,
            ctx,
            policy,
            providers,
            semaphore: Arc::new(Semaphore::new(policy.max_parallel)),
            slots: vec![Slot::Pending; graph.len()],
            results: ResultStore::new(),
            order: Vec::with_capacity(graph.len()),
            first_failure: None,
        }
    }

    /// Pending tasks whose upstream all succeeded, in declaration order.
    fn ready(&self) -> Vec<usize> {
        (0..self.graph.len())
            .filter(|&i| self.slots[i] == Slot::Pending)
            .filter(|&i| {
                self.graph
                    .upstream_of(i)
                    .iter()
                    .all(|&d| self.slots[d] == Slot::Succeeded)
            })
            .collect()
    }

    async fn drive(&mut self) -> Result<(), GraphError> {
        loop {
            let ready = self.ready();
            if ready.is_empty() {
                return Ok(());
            }

            let mut batch = Vec::new();
            for idx in ready {
                if self.graph.nodes()[idx].kind.is_human_gate() {
                    self.run_batch(std::mem::take(&mut batch)).await?;
                    tracing::info!(
                        step_id = %self.ctx.step.id,
                        task_id = %self.graph.nodes()[idx].id,
                        "human gate suspends the graph"
                    );
                    self.run_batch(vec![idx]).await?;
                } else {
                    batch.push(idx);
                }
            }
            self.run_batch(batch).await?;
        }
    }

    async fn run_batch(&mut self, batch: Vec<usize>) -> Result<(), GraphError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut set = JoinSet::new();
        for (pos, &idx) in batch.iter().enumerate() {
            let provider = self.providers[idx].clone();
            let (worker, input) =
                self.coordinator
                    .start_task(self.graph, idx, self.ctx, &self.results, provider);
            let semaphore = Arc::clone(&self.semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (pos, worker.execute(input).await)
            });
        }

        let mut reports: Vec<Option<WorkerReport>> = batch.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((pos, report)) => reports[pos] = Some(report),
                Err(e) => tracing::error!(step_id = %self.ctx.step.id, error = %e, "worker task aborted"),
            }
        }

        for (idx, report) in batch.into_iter().zip(reports) {
            let id = self.graph.nodes()[idx].id.clone();
            let result = match report {
                Some(report) => {
                    self.coordinator.publish_finished(self.ctx, &report);
                    report.result
                }
                None => TaskResult::error("worker aborted before producing a result"),
            };
            self.order.push(id.clone());
            self.record(idx, &id, result)?;
        }
        Ok(())
    }

    fn record(&mut self, idx: usize, id: &str, result: TaskResult) -> Result<(), GraphError> {
        if result.is_success() {
            self.slots[idx] = Slot::Succeeded;
            return self.results.insert(id, result);
        }

        self.slots[idx] = Slot::Failed;
        if self.first_failure.is_none() {
            self.first_failure = Some((id.to_string(), result.raw_text.clone()));
        }
        self.results.insert(id, result)?;

        let mut refused: Vec<usize> = self.graph.dependents_of(idx).into_iter().collect();
        refused.sort_unstable();
        for dependent in refused {
            if self.slots[dependent] != Slot::Pending {
                continue;
            }
            self.slots[dependent] = Slot::Failed;
            let dependent_id = &self.graph.nodes()[dependent].id;
            tracing::info!(
                step_id = %self.ctx.step.id,
                task_id = %dependent_id,
                failed = %id,
                "refusing task with failed dependency"
            );
            self.results.insert(
                dependent_id,
                TaskResult::error(format!("refused: dependency '{id}' failed")),
            )?;
        }
        Ok(())
    }

    async fn finish(self) -> Result<GraphOutcome, GraphError> {
        let verdict = if let Some(verdict) = decided_by_gate(self.graph, &self.results) {
            verdict
        } else if let Some((task_id, error)) = self.first_failure {
            Verdict::Failed { task_id, error }
        } else if let Some(name) = &self.policy.manager.synthesizer {
            self.coordinator
                .synthesize(name, &self.policy.manager, self.ctx, &self.results)
                .await
        } else {
            terminal_verdict(self.graph, &self.results)
        };

        Ok(GraphOutcome {
            results: self.results.into_ordered(),
            execution_order: self.order,
            verdict,
        })
    }
}
