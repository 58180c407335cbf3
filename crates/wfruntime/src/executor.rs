use crate::runtime::RuntimeConfig;
use crate::template;
use crate::validator::ValidationWarning;
use chrono::Utc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;
use wfcore::{
    DeclaredOutput, EventBus, ExecutionEvent, ExecutionId, Node, NodeContext, NodeError, NodeId,
    NodePhase, RetryPolicy, RuntimeError, Value, ValueStore, DEFAULT_ACTION,
};

/// A node instance bound to its params and policies.
pub struct CompiledNode {
    pub id: NodeId,
    pub node_type: String,
    /// Params as written in the document; resolved per run
    pub params: HashMap<String, Value>,
    pub verbatim_params: Vec<String>,
    pub retry: RetryPolicy,
    pub timeout_ms: Option<u64>,
    pub instance: Box<dyn Node>,
}

/// The compiled form of a workflow document, ready to run once.
pub struct ExecutableGraph {
    pub(crate) graph: DiGraph<CompiledNode, String>,
    pub(crate) entry: NodeIndex,
    pub(crate) inputs: HashMap<String, Value>,
    pub(crate) outputs: BTreeMap<String, DeclaredOutput>,
    pub(crate) warnings: Vec<ValidationWarning>,
    pub(crate) event_bus: Arc<EventBus>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) config: RuntimeConfig,
    pub(crate) depth: usize,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    /// Final value store
    pub store: ValueStore,
    /// Declared outputs found in the final store
    pub outputs: BTreeMap<String, Value>,
    /// Ids of the nodes visited, in order
    pub path: Vec<NodeId>,
    pub duration_ms: u64,
}

impl ExecutableGraph {
    pub fn entry_node(&self) -> &str {
        &self.graph[self.entry].id
    }

    pub fn node_ids(&self) -> Vec<&str> {
        self.graph.node_weights().map(|n| n.id.as_str()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Inputs the store is seeded with
    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    /// Advisory findings from compilation
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// Token that stops the walk before the next node when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Cancel this run together with `parent`
    pub fn link_cancellation(&mut self, parent: &CancellationToken) {
        self.cancellation = parent.child_token();
    }

    /// Walk the graph from the entry node.
    ///
    /// The store starts from the resolved inputs, overlaid with
    /// `initial_store`. The first unrecovered error aborts the walk.
    pub async fn run(self, initial_store: Option<ValueStore>) -> Result<ExecutionResult, RuntimeError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        let mut store: ValueStore = self.inputs.clone().into();
        if let Some(initial) = initial_store {
            store.extend(initial.into_inner());
        }

        self.event_bus.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            entry_node: self.entry_node().to_string(),
            timestamp: Utc::now(),
        });
        tracing::info!(
            "Starting execution {} at node '{}'",
            execution_id,
            self.entry_node()
        );

        let mut path = Vec::new();
        let result = self.walk(execution_id, &mut store, &mut path).await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        self.event_bus.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            success: result.is_ok(),
            steps: path.len(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match result {
            Ok(()) => {
                tracing::info!(
                    "Execution {} completed after {} step(s) in {}ms",
                    execution_id,
                    path.len(),
                    duration_ms
                );
                let outputs = self.collect_outputs(&store);
                Ok(ExecutionResult {
                    execution_id,
                    store,
                    outputs,
                    path,
                    duration_ms,
                })
            }
            Err(e) => {
                tracing::error!("Execution {} failed: {}", execution_id, e);
                Err(e)
            }
        }
    }

    async fn walk(
        &self,
        execution_id: ExecutionId,
        store: &mut ValueStore,
        path: &mut Vec<NodeId>,
    ) -> Result<(), RuntimeError> {
        let mut current = Some(self.entry);

        while let Some(idx) = current {
            let node = &self.graph[idx];

            if self.cancellation.is_cancelled() {
                tracing::warn!("Execution {} cancelled before node '{}'", execution_id, node.id);
                return Err(RuntimeError::Cancelled {
                    next_node: node.id.clone(),
                });
            }
            if path.len() >= self.config.max_steps {
                return Err(RuntimeError::StepLimitExceeded(self.config.max_steps));
            }
            path.push(node.id.clone());

            let action = match self.run_node(node, store, execution_id).await {
                Ok(action) => action,
                Err(e) => {
                    self.event_bus.emit(ExecutionEvent::NodeFailed {
                        execution_id,
                        node_id: node.id.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(e);
                }
            };

            current = self.route(idx, &action)?;
        }

        Ok(())
    }

    /// One full prep → exec → post cycle. Returns the node's action.
    async fn run_node(
        &self,
        node: &CompiledNode,
        store: &mut ValueStore,
        execution_id: ExecutionId,
    ) -> Result<String, RuntimeError> {
        let start = Instant::now();

        let params = template::resolve_params(&node.params, store, &node.verbatim_params)
            .map_err(|source| RuntimeError::Resolution {
                node_id: node.id.clone(),
                source,
            })?;

        let ctx = NodeContext {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            params,
            depth: self.depth,
            events: self.event_bus.create_emitter(execution_id, node.id.clone()),
            cancellation: self.cancellation.clone(),
        };

        self.event_bus.emit(ExecutionEvent::NodeStarted {
            execution_id,
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            timestamp: Utc::now(),
        });
        tracing::debug!("Running node '{}' ({})", node.id, node.node_type);

        let prepared = node
            .instance
            .prep(&ctx, store)
            .await
            .map_err(|source| RuntimeError::PhaseFailed {
                node_id: node.id.clone(),
                phase: NodePhase::Prep,
                source,
            })?;

        let (result, attempts) = self.exec_with_retry(node, &ctx, &prepared, execution_id).await?;

        let action = node
            .instance
            .post(&ctx, store, &prepared, result)
            .await
            .map_err(|source| RuntimeError::PhaseFailed {
                node_id: node.id.clone(),
                phase: NodePhase::Post,
                source,
            })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Node '{}' completed in {}ms with action '{}'",
            node.id,
            duration_ms,
            action
        );
        self.event_bus.emit(ExecutionEvent::NodeCompleted {
            execution_id,
            node_id: node.id.clone(),
            action: action.clone(),
            attempts,
            duration_ms,
            timestamp: Utc::now(),
        });

        Ok(action)
    }

    /// Run exec up to the node's attempt limit with identical inputs, then
    /// hand the last error to the node's fallback.
    async fn exec_with_retry(
        &self,
        node: &CompiledNode,
        ctx: &NodeContext,
        prepared: &Value,
        execution_id: ExecutionId,
    ) -> Result<(Value, u32), RuntimeError> {
        let max_attempts = node.retry.attempts();
        let mut attempt = 1u32;

        loop {
            let outcome = match node.timeout_ms {
                Some(millis) => {
                    match timeout(Duration::from_millis(millis), node.instance.exec(ctx, prepared)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(NodeError::Timeout { millis }),
                    }
                }
                None => node.instance.exec(ctx, prepared).await,
            };

            let error = match outcome {
                Ok(value) => return Ok((value, attempt)),
                Err(NodeError::Cancelled) => {
                    return Err(RuntimeError::PhaseFailed {
                        node_id: node.id.clone(),
                        phase: NodePhase::Exec,
                        source: NodeError::Cancelled,
                    })
                }
                Err(e) => e,
            };

            if attempt >= max_attempts {
                tracing::warn!(
                    "Node '{}' exhausted {} attempt(s): {}",
                    node.id,
                    max_attempts,
                    error
                );
                return node
                    .instance
                    .exec_fallback(ctx, prepared, error)
                    .await
                    .map(|value| (value, attempt))
                    .map_err(|source| RuntimeError::ExecExhausted {
                        node_id: node.id.clone(),
                        attempts: attempt,
                        source,
                    });
            }

            let delay = node.retry.delay_after(attempt);
            tracing::warn!(
                "Node '{}' attempt {}/{} failed: {}. Retrying in {}ms",
                node.id,
                attempt,
                max_attempts,
                error,
                delay.as_millis()
            );
            self.event_bus.emit(ExecutionEvent::NodeRetrying {
                execution_id,
                node_id: node.id.clone(),
                attempt,
                max_attempts,
                error: error.to_string(),
                delay_ms: delay.as_millis() as u64,
                timestamp: Utc::now(),
            });

            if !delay.is_zero() {
                sleep(delay).await;
            }
            attempt += 1;
        }
    }

    /// Pick the next node for an action. A node without outgoing edges, or
    /// one returning the default action with no default edge, ends the walk.
    fn route(&self, idx: NodeIndex, action: &str) -> Result<Option<NodeIndex>, RuntimeError> {
        let mut has_edges = false;
        for edge in self.graph.edges(idx) {
            has_edges = true;
            if edge.weight() == action {
                return Ok(Some(edge.target()));
            }
        }

        if !has_edges || action == DEFAULT_ACTION {
            Ok(None)
        } else {
            Err(RuntimeError::UnroutedAction {
                node_id: self.graph[idx].id.clone(),
                action: action.to_string(),
            })
        }
    }

    fn collect_outputs(&self, store: &ValueStore) -> BTreeMap<String, Value> {
        let mut outputs = BTreeMap::new();
        for (name, declared) in &self.outputs {
            match store.get(name) {
                Some(value) => {
                    if let Some(hint) = declared.type_hint {
                        if !hint.matches(value) {
                            tracing::warn!("Output '{}' is not a {}", name, hint);
                        }
                    }
                    outputs.insert(name.clone(), value.clone());
                }
                None => tracing::warn!("Declared output '{}' was not produced", name),
            }
        }
        outputs
    }
}
