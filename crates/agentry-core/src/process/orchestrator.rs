//! The process orchestrator.
//!
//! Owns the per-agent action registries and drives every dispatch through the
//! same protocol:
//!
//! 1. Resolve the agent and action, validate the input, and gate on the
//!    current process state (initializers create a fresh process id).
//! 2. Commit a `processing` marker carrying the action name.
//! 3. Run the handler with an [`ActionContext`].
//! 4. Commit exactly one terminal transition: the handler's next state,
//!    `http_error`, or `unhandled_error`.
//!
//! Steps 1 and 2 always run on the caller, so an acknowledged background
//! dispatch is already visible to `status` and `list`. Steps 3 and 4 run on
//! the caller for synchronous dispatches and on the [`BackgroundPool`]
//! otherwise.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use agentry_types::action::{ActionSummary, AgentSummary};
use agentry_types::config::DispatchConfig;
use agentry_types::error::{ActionError, DispatchError, RegistryError};
use agentry_types::event::ProcessEvent;
use agentry_types::paging::{Page, PageRequest};
use agentry_types::process::{
    DispatchAck, DispatchOutcome, DispatchRequest, ExecutionMode, HTTP_ERROR, PROCESSING,
    ProcessId, ProcessSnapshot, ProcessSummary, ProcessTransition, UNHANDLED_ERROR,
    UNINITIALIZED,
};
use futures_util::FutureExt;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::action::{ActionContext, ActionDescriptor, ActionOutcome, ActionRegistry};
use crate::callback::BoxCallbackNotifier;
use crate::event::{EventBus, ProcessWatch};
use crate::execution::{BackgroundPool, resolve_mode};
use crate::memory::AgentMemory;

use super::store::ProcessStore;

/// Builder for [`ProcessOrchestrator`]. Agents are registered once here and
/// are immutable afterwards.
pub struct OrchestratorBuilder {
    memory: Arc<AgentMemory>,
    agents: HashMap<String, ActionRegistry>,
    notifier: BoxCallbackNotifier,
    workers: usize,
    event_capacity: usize,
    max_page_size: u64,
}

impl OrchestratorBuilder {
    pub fn new(memory: Arc<AgentMemory>) -> Self {
        let defaults = DispatchConfig::default();
        Self {
            memory,
            agents: HashMap::new(),
            notifier: BoxCallbackNotifier::default(),
            workers: defaults.workers,
            event_capacity: defaults.event_capacity,
            max_page_size: defaults.max_page_size,
        }
    }

    /// Register an agent and its action table.
    ///
    /// Fails on a repeated agent name, an agent without any initializer, or
    /// any registry error (duplicate action names).
    pub fn agent(
        mut self,
        name: impl Into<String>,
        actions: Vec<ActionDescriptor>,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        if self.agents.contains_key(&name) {
            return Err(RegistryError::DuplicateAgent(name));
        }
        let registry = ActionRegistry::new(actions)?;
        if !registry.has_initializer() {
            return Err(RegistryError::NoInitializer(name));
        }
        self.agents.insert(name, registry);
        Ok(self)
    }

    /// Apply worker, page and event settings from configuration.
    pub fn dispatch_config(mut self, config: &DispatchConfig) -> Self {
        self.workers = config.workers;
        self.event_capacity = config.event_capacity;
        self.max_page_size = config.max_page_size;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn notifier(mut self, notifier: BoxCallbackNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn max_page_size(mut self, max: u64) -> Self {
        self.max_page_size = max;
        self
    }

    pub fn build(self) -> ProcessOrchestrator {
        let pool = BackgroundPool::new(self.workers);
        tracing::info!(
            agents = self.agents.len(),
            workers = pool.workers(),
            "process orchestrator ready"
        );
        ProcessOrchestrator {
            store: ProcessStore::new(Arc::clone(&self.memory)),
            agents: Arc::new(self.agents),
            memory: self.memory,
            pool,
            notifier: Arc::new(self.notifier),
            events: EventBus::new(self.event_capacity),
            max_page_size: self.max_page_size.max(1),
        }
    }
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut agents: Vec<_> = self.agents.keys().collect();
        agents.sort();
        f.debug_struct("OrchestratorBuilder")
            .field("agents", &agents)
            .field("workers", &self.workers)
            .field("event_capacity", &self.event_capacity)
            .field("max_page_size", &self.max_page_size)
            .finish()
    }
}

/// Dispatches actions against processes and answers status/list queries.
///
/// Cheap to clone; clones share registries, storage, pool and event bus.
#[derive(Clone)]
pub struct ProcessOrchestrator {
    agents: Arc<HashMap<String, ActionRegistry>>,
    memory: Arc<AgentMemory>,
    store: ProcessStore,
    pool: BackgroundPool,
    notifier: Arc<BoxCallbackNotifier>,
    events: EventBus,
    max_page_size: u64,
}

/// What a gated dispatch will run against.
enum Target {
    New(ProcessId),
    Existing(ProcessTransition),
}

impl Target {
    fn process_id(&self) -> ProcessId {
        match self {
            Target::New(id) => *id,
            Target::Existing(current) => current.process_id,
        }
    }
}

/// A dispatch that passed gating and is ready to execute.
struct Job {
    agent: String,
    action: String,
    input: Value,
    callback_url: Option<String>,
}

impl ProcessOrchestrator {
    pub fn builder(memory: Arc<AgentMemory>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(memory)
    }

    pub fn memory(&self) -> &Arc<AgentMemory> {
        &self.memory
    }

    /// Background dispatches and callback deliveries not yet finished.
    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.events.subscribe()
    }

    /// Follow the events of one process.
    pub fn watch(&self, process_id: ProcessId) -> ProcessWatch {
        self.events.watch(process_id)
    }

    /// Run `request.action` for `request.agent`.
    ///
    /// Gating errors (unknown agent, action or process, invalid input, state
    /// conflict) are returned directly and nothing is committed. Once gating
    /// passes, handler failures are committed to the process log rather than
    /// returned; only storage failures surface as errors.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let DispatchRequest {
            agent,
            action,
            process_id,
            input,
            mode,
            callback_url,
        } = request;

        let descriptor = self.descriptor(&agent, &action)?;
        if !(input.is_object() || input.is_null()) {
            return Err(DispatchError::InvalidRequest(
                "input must be a JSON object".to_string(),
            ));
        }

        let target = match process_id {
            None if descriptor.is_initializer() => Target::New(ProcessId::new()),
            None => {
                return Err(DispatchError::InvalidRequest(format!(
                    "action '{action}' requires a process id"
                )));
            }
            Some(_) if descriptor.is_initializer() => {
                return Err(DispatchError::InvalidRequest(format!(
                    "action '{action}' starts a new process and does not accept a process id"
                )));
            }
            Some(process_id) => {
                let current = self
                    .store
                    .latest(&agent, process_id)
                    .await?
                    .ok_or_else(|| DispatchError::process_not_found(process_id))?;
                if !descriptor.allows(&current.state) {
                    tracing::debug!(
                        process_id = %process_id,
                        action = %action,
                        state = %current.state,
                        "dispatch rejected by state gate"
                    );
                    return Err(DispatchError::Conflict {
                        action,
                        state: current.state,
                    });
                }
                Target::Existing(current)
            }
        };

        let mode = resolve_mode(mode, callback_url.as_deref());
        if matches!(mode, ExecutionMode::Background) && self.pool.is_closed() {
            return Err(DispatchError::ShuttingDown);
        }
        let job = Job {
            agent,
            action,
            input,
            callback_url,
        };
        let marker = self.mark_processing(&job, &target).await?;

        match mode {
            ExecutionMode::Sync => {
                let callback_url = job.callback_url.clone();
                let snapshot = self.execute(job, marker).await?;
                if let Some(url) = callback_url {
                    self.schedule_callback(url, snapshot.clone());
                }
                Ok(DispatchOutcome::Completed(snapshot))
            }
            ExecutionMode::Background => {
                let process_id = marker.process_id;
                let agent = job.agent.clone();
                let action = job.action.clone();
                let pending = marker.clone();
                let this = self.clone();
                let submitted = self
                    .pool
                    .submit(async move { this.run_detached(job, marker).await });
                if submitted.is_err() {
                    self.abandon(&pending, &action).await?;
                    return Err(DispatchError::ShuttingDown);
                }
                tracing::info!(process_id = %process_id, agent = %agent, action = %action, "background dispatch accepted");
                self.events.publish_accepted(process_id, &agent, &action);
                Ok(DispatchOutcome::Accepted(DispatchAck::accepted(process_id)))
            }
        }
    }

    /// The current snapshot of a process.
    pub async fn status(
        &self,
        agent: &str,
        process_id: ProcessId,
    ) -> Result<ProcessSnapshot, DispatchError> {
        let registry = self.registry(agent)?;
        let current = self
            .store
            .latest(agent, process_id)
            .await?
            .ok_or_else(|| DispatchError::process_not_found(process_id))?;
        Ok(snapshot_of(registry, current))
    }

    /// Every committed transition of a process, oldest first.
    pub async fn history(
        &self,
        agent: &str,
        process_id: ProcessId,
    ) -> Result<Vec<ProcessTransition>, DispatchError> {
        self.registry(agent)?;
        let history = self.store.history(agent, process_id).await?;
        if history.is_empty() {
            return Err(DispatchError::process_not_found(process_id));
        }
        Ok(history)
    }

    /// One page of an agent's processes. `limit` is clamped to the configured
    /// maximum page size.
    pub async fn list(
        &self,
        agent: &str,
        request: PageRequest,
    ) -> Result<Page<ProcessSummary>, DispatchError> {
        self.registry(agent)?;
        let request = request.clamped(self.max_page_size);
        Ok(self.store.page(agent, &request).await?)
    }

    pub fn actions(&self, agent: &str) -> Result<Vec<ActionSummary>, DispatchError> {
        Ok(self.registry(agent)?.summaries())
    }

    /// Every registered agent, sorted by name.
    pub fn agents(&self) -> Vec<AgentSummary> {
        let mut agents: Vec<_> = self
            .agents
            .iter()
            .map(|(name, registry)| AgentSummary {
                name: name.clone(),
                actions: registry.iter().map(|d| d.name().to_string()).collect(),
            })
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        agents
    }

    /// Stop accepting background work and wait for accepted work to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    fn registry(&self, agent: &str) -> Result<&ActionRegistry, DispatchError> {
        self.agents
            .get(agent)
            .ok_or_else(|| DispatchError::agent_not_found(agent))
    }

    fn descriptor(&self, agent: &str, action: &str) -> Result<&ActionDescriptor, DispatchError> {
        self.registry(agent)?
            .get(action)
            .ok_or_else(|| DispatchError::action_not_found(action))
    }

    /// Step 2 of the dispatch protocol.
    async fn mark_processing(&self, job: &Job, target: &Target) -> Result<ProcessTransition, DispatchError> {
        let previous = match target {
            Target::New(_) => None,
            Target::Existing(current) => Some(current),
        };
        let marker = self
            .store
            .commit(
                previous,
                target.process_id(),
                &job.agent,
                PROCESSING,
                json!({ "action": job.action }),
            )
            .await?;
        self.events.publish_transition(&marker, &job.action);
        Ok(marker)
    }

    /// Steps 3 and 4: run the handler and commit its terminal transition.
    async fn execute(&self, job: Job, marker: ProcessTransition) -> Result<ProcessSnapshot, DispatchError> {
        let Job {
            agent,
            action,
            input,
            callback_url,
        } = job;
        let registry = self.registry(&agent)?;
        let handler = self.descriptor(&agent, &action)?.handler().clone();
        let process_id = marker.process_id;

        let ctx = ActionContext {
            process_id,
            agent: agent.clone(),
            action: action.clone(),
            memory: Arc::clone(&self.memory),
            callback_url,
        };
        let result = AssertUnwindSafe(handler.handle(ctx, input))
            .catch_unwind()
            .await;
        let (state, data) = settle(&agent, &action, process_id, result);

        let terminal = self
            .store
            .commit(Some(&marker), process_id, &agent, &state, data)
            .await?;
        self.events.publish_transition(&terminal, &action);
        tracing::info!(
            process_id = %process_id,
            agent = %agent,
            action = %action,
            state = %terminal.state,
            "dispatch completed"
        );
        Ok(snapshot_of(registry, terminal))
    }

    /// Close out a marker whose work was refused by a closing pool.
    async fn abandon(&self, marker: &ProcessTransition, action: &str) -> Result<(), DispatchError> {
        let error = "orchestrator shut down before the action ran";
        tracing::warn!(process_id = %marker.process_id, action, "background dispatch abandoned at shutdown");
        let terminal = self
            .store
            .commit(
                Some(marker),
                marker.process_id,
                &marker.agent,
                UNHANDLED_ERROR,
                json!({ "error": error }),
            )
            .await?;
        self.events.publish_transition(&terminal, action);
        Ok(())
    }

    async fn run_detached(&self, job: Job, marker: ProcessTransition) {
        let process_id = marker.process_id;
        let callback_url = job.callback_url.clone();
        match self.execute(job, marker).await {
            Ok(snapshot) => {
                if let Some(url) = callback_url {
                    self.deliver(&url, &snapshot).await;
                }
            }
            Err(e) => {
                tracing::error!(process_id = %process_id, error = %e, "background dispatch failed");
            }
        }
    }

    fn schedule_callback(&self, url: String, snapshot: ProcessSnapshot) {
        let this = self.clone();
        let process_id = snapshot.process_id;
        let submitted = self
            .pool
            .submit(async move { this.deliver(&url, &snapshot).await });
        if submitted.is_err() {
            tracing::warn!(process_id = %process_id, "pool closed, callback not delivered");
        }
    }

    async fn deliver(&self, url: &str, snapshot: &ProcessSnapshot) {
        let process_id = snapshot.process_id;
        let result = self.notifier.notify(url, snapshot).await;
        match &result {
            Ok(()) => tracing::info!(process_id = %process_id, url, "callback delivered"),
            Err(e) => {
                tracing::warn!(process_id = %process_id, url, error = %e, "callback delivery failed");
            }
        }
        self.events.publish_callback(process_id, url, &result);
    }
}

impl std::fmt::Debug for ProcessOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut agents: Vec<_> = self.agents.keys().collect();
        agents.sort();
        f.debug_struct("ProcessOrchestrator")
            .field("agents", &agents)
            .field("pool", &self.pool)
            .field("max_page_size", &self.max_page_size)
            .finish()
    }
}

fn snapshot_of(registry: &ActionRegistry, transition: ProcessTransition) -> ProcessSnapshot {
    ProcessSnapshot {
        available_actions: registry.available_actions(&transition.state),
        process_id: transition.process_id,
        agent: transition.agent,
        state: transition.state,
        data: transition.data,
        created_at: transition.created_at,
        updated_at: transition.updated_at,
    }
}

/// Map a handler result (or panic) to the terminal state and payload.
fn settle(
    agent: &str,
    action: &str,
    process_id: ProcessId,
    result: Result<Result<ActionOutcome, ActionError>, Box<dyn Any + Send>>,
) -> (String, Value) {
    match result {
        Ok(Ok(outcome)) if outcome.state == UNINITIALIZED || outcome.state == PROCESSING => {
            let error = format!("handler returned reserved state '{}'", outcome.state);
            tracing::error!(process_id = %process_id, agent, action, error = %error, "handler misbehaved");
            (UNHANDLED_ERROR.to_string(), json!({ "error": error }))
        }
        Ok(Ok(outcome)) => (outcome.state, outcome.data),
        Ok(Err(ActionError::User {
            status_code,
            detail,
        })) => {
            if status_code >= 500 {
                tracing::error!(
                    process_id = %process_id,
                    agent,
                    action,
                    status_code,
                    detail = %detail,
                    "handler reported a server-side user failure"
                );
            } else {
                tracing::debug!(
                    process_id = %process_id,
                    agent,
                    action,
                    status_code,
                    detail = %detail,
                    "handler reported a user failure"
                );
            }
            (
                HTTP_ERROR.to_string(),
                json!({ "status_code": status_code, "detail": detail }),
            )
        }
        Ok(Err(ActionError::Unhandled(error))) => {
            tracing::error!(process_id = %process_id, agent, action, error = %error, "handler failed");
            (UNHANDLED_ERROR.to_string(), json!({ "error": error }))
        }
        Err(payload) => {
            let error = panic_message(payload.as_ref());
            tracing::error!(process_id = %process_id, agent, action, error = %error, "handler panicked");
            (UNHANDLED_ERROR.to_string(), json!({ "error": error }))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionHandler, handler_fn};
    use crate::callback::CallbackNotifier;
    use crate::memory::{BoxSymbolicMemory, EphemeralSymbolicMemory};
    use agentry_types::error::CallbackError;
    use agentry_types::paging::SortDirection;
    use agentry_types::process::TERMINATED;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tokio::sync::{Semaphore, mpsc};

    async fn memory() -> Arc<AgentMemory> {
        let memory = AgentMemory::new(BoxSymbolicMemory::new(EphemeralSymbolicMemory::new()));
        memory.start().await.unwrap();
        Arc::new(memory)
    }

    fn weather_actions() -> Vec<ActionDescriptor> {
        vec![
            ActionDescriptor::builder(
                "ask",
                handler_fn(|_ctx, input: Value| async move {
                    let city = input["city"].as_str().unwrap_or("nowhere").to_string();
                    Ok(ActionOutcome::next("idle", json!({ "city": city })))
                }),
            )
            .initializer()
            .build()
            .unwrap(),
            ActionDescriptor::builder(
                "followup",
                handler_fn(|_ctx, input: Value| async move {
                    Ok(ActionOutcome::next("idle", json!({ "answer": input["q"] })))
                }),
            )
            .allowed_states(["idle"])
            .build()
            .unwrap(),
            ActionDescriptor::builder(
                "reject",
                handler_fn(|_ctx, _input| async {
                    Err(ActionError::user(418, "no forecasts for teapots"))
                }),
            )
            .allowed_states(["idle"])
            .build()
            .unwrap(),
            ActionDescriptor::builder(
                "explode",
                handler_fn(|_ctx, _input| async { Err(ActionError::unhandled("disk on fire")) }),
            )
            .allowed_states(["idle"])
            .build()
            .unwrap(),
            ActionDescriptor::builder("panic", PanickingHandler)
                .allowed_states(["idle"])
                .build()
                .unwrap(),
            ActionDescriptor::builder(
                "finish",
                handler_fn(|_ctx, _input| async {
                    Ok(ActionOutcome::terminated(json!({ "bye": true })))
                }),
            )
            .allowed_states(["idle"])
            .build()
            .unwrap(),
        ]
    }

    struct PanickingHandler;

    impl ActionHandler for PanickingHandler {
        async fn handle(&self, _ctx: ActionContext, _input: Value) -> Result<ActionOutcome, ActionError> {
            panic!("gauge snapped")
        }
    }

    /// Handlers that report their process on `entered`, then block until
    /// `gate` hands out a permit.
    fn gated_actions(
        gate: Arc<Semaphore>,
        entered: mpsc::UnboundedSender<ProcessId>,
    ) -> Vec<ActionDescriptor> {
        let step = move || {
            let gate = Arc::clone(&gate);
            let entered = entered.clone();
            handler_fn(move |ctx: ActionContext, _input: Value| {
                let gate = Arc::clone(&gate);
                let entered = entered.clone();
                async move {
                    let _ = entered.send(ctx.process_id);
                    gate.acquire().await.unwrap().forget();
                    Ok(ActionOutcome::next("idle", Value::Null))
                }
            })
        };
        vec![
            ActionDescriptor::builder("start", step())
                .initializer()
                .build()
                .unwrap(),
            ActionDescriptor::builder("again", step())
                .allowed_states(["idle"])
                .build()
                .unwrap(),
        ]
    }

    async fn orchestrator() -> ProcessOrchestrator {
        ProcessOrchestrator::builder(memory().await)
            .agent("weather", weather_actions())
            .unwrap()
            .build()
    }

    fn completed(outcome: DispatchOutcome) -> ProcessSnapshot {
        match outcome {
            DispatchOutcome::Completed(snapshot) => snapshot,
            DispatchOutcome::Accepted(ack) => panic!("expected completion, got {ack:?}"),
        }
    }

    async fn ask(orch: &ProcessOrchestrator, city: &str) -> ProcessSnapshot {
        completed(
            orch.dispatch(DispatchRequest::new("weather", "ask").input(json!({ "city": city })))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn initializer_then_followup() {
        let orch = orchestrator().await;
        let created = ask(&orch, "Boston").await;
        assert_eq!(created.state, "idle");
        assert_eq!(created.data, json!({ "city": "Boston" }));
        assert_eq!(
            created.available_actions,
            vec!["followup", "reject", "explode", "panic", "finish"]
        );

        let followed = completed(
            orch.dispatch(
                DispatchRequest::new("weather", "followup")
                    .process(created.process_id)
                    .input(json!({ "q": "tomorrow?" })),
            )
            .await
            .unwrap(),
        );
        assert_eq!(followed.process_id, created.process_id);
        assert_eq!(followed.state, "idle");
        assert_eq!(followed.created_at, created.created_at);

        let err = orch
            .dispatch(DispatchRequest::new("weather", "ask").process(created.process_id))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn new_process_starts_with_processing_marker() {
        let orch = orchestrator().await;
        let created = ask(&orch, "Oslo").await;
        let history = orch.history("weather", created.process_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].state, PROCESSING);
        assert_eq!(history[0].data, json!({ "action": "ask" }));
        assert_eq!(history[1].state, "idle");
    }

    #[tokio::test]
    async fn processing_marker_is_visible_while_handler_runs() {
        let gate = Arc::new(Semaphore::new(0));
        let (entered, mut entries) = mpsc::unbounded_channel();
        let orch = ProcessOrchestrator::builder(memory().await)
            .agent("slow", gated_actions(Arc::clone(&gate), entered))
            .unwrap()
            .build();

        let running = tokio::spawn({
            let orch = orch.clone();
            async move { orch.dispatch(DispatchRequest::new("slow", "start")).await }
        });
        let pid = entries.recv().await.unwrap();
        let during = orch.status("slow", pid).await.unwrap();
        assert_eq!(during.state, PROCESSING);
        assert_eq!(during.data, json!({ "action": "start" }));
        assert!(during.available_actions.is_empty());
        gate.add_permits(1);
        assert_eq!(completed(running.await.unwrap().unwrap()).state, "idle");

        let resumed = tokio::spawn({
            let orch = orch.clone();
            async move {
                orch.dispatch(DispatchRequest::new("slow", "again").process(pid))
                    .await
            }
        });
        assert_eq!(entries.recv().await, Some(pid));
        let during = orch.status("slow", pid).await.unwrap();
        assert_eq!(during.state, PROCESSING);
        assert_eq!(during.data, json!({ "action": "again" }));
        let err = orch
            .dispatch(DispatchRequest::new("slow", "again").process(pid))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conflict { state, .. } if state == PROCESSING));

        gate.add_permits(1);
        assert_eq!(completed(resumed.await.unwrap().unwrap()).state, "idle");
    }

    #[tokio::test]
    async fn resumer_requires_process_id() {
        let orch = orchestrator().await;
        let err = orch
            .dispatch(DispatchRequest::new("weather", "followup"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn non_object_input_is_invalid() {
        let orch = orchestrator().await;
        let err = orch
            .dispatch(DispatchRequest::new("weather", "ask").input(json!([1, 2])))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn unknown_names_are_not_found() {
        let orch = orchestrator().await;
        let err = orch
            .dispatch(DispatchRequest::new("climate", "ask"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { kind: "agent", .. }));

        let err = orch
            .dispatch(DispatchRequest::new("weather", "forecast"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { kind: "action", .. }));

        let err = orch
            .dispatch(DispatchRequest::new("weather", "followup").process(ProcessId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { kind: "process", .. }));

        let err = orch.status("weather", ProcessId::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { kind: "process", .. }));
    }

    #[tokio::test]
    async fn conflict_when_state_not_allowed() {
        let orch = orchestrator().await;
        let created = ask(&orch, "Lima").await;
        let finished = completed(
            orch.dispatch(DispatchRequest::new("weather", "finish").process(created.process_id))
                .await
                .unwrap(),
        );
        assert_eq!(finished.state, TERMINATED);
        assert!(finished.available_actions.is_empty());

        let err = orch
            .dispatch(DispatchRequest::new("weather", "followup").process(created.process_id))
            .await
            .unwrap_err();
        match err {
            DispatchError::Conflict { action, state } => {
                assert_eq!(action, "followup");
                assert_eq!(state, TERMINATED);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        // Rejected dispatches commit nothing.
        let history = orch.history("weather", created.process_id).await.unwrap();
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn status_is_idempotent() {
        let orch = orchestrator().await;
        let created = ask(&orch, "Quito").await;
        let first = orch.status("weather", created.process_id).await.unwrap();
        let second = orch.status("weather", created.process_id).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, created);
    }

    #[tokio::test]
    async fn user_failure_is_committed_as_http_error() {
        let orch = orchestrator().await;
        let created = ask(&orch, "Rome").await;
        let failed = completed(
            orch.dispatch(DispatchRequest::new("weather", "reject").process(created.process_id))
                .await
                .unwrap(),
        );
        assert_eq!(failed.state, HTTP_ERROR);
        assert_eq!(
            failed.user_failure(),
            Some((418, "no forecasts for teapots".to_string()))
        );
        assert!(failed.available_actions.is_empty());

        let err = orch
            .dispatch(DispatchRequest::new("weather", "followup").process(created.process_id))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Conflict { .. }));
    }

    #[tokio::test]
    async fn unhandled_failure_and_panic_are_committed() {
        let orch = orchestrator().await;
        let created = ask(&orch, "Cairo").await;
        let failed = completed(
            orch.dispatch(DispatchRequest::new("weather", "explode").process(created.process_id))
                .await
                .unwrap(),
        );
        assert_eq!(failed.state, UNHANDLED_ERROR);
        assert_eq!(failed.unhandled_failure().as_deref(), Some("disk on fire"));

        let other = ask(&orch, "Tunis").await;
        let panicked = completed(
            orch.dispatch(DispatchRequest::new("weather", "panic").process(other.process_id))
                .await
                .unwrap(),
        );
        assert_eq!(panicked.state, UNHANDLED_ERROR);
        assert!(panicked.unhandled_failure().unwrap().contains("gauge snapped"));
    }

    #[tokio::test]
    async fn error_state_can_be_resumed_when_listed() {
        let retry = ActionDescriptor::builder(
            "retry",
            handler_fn(|_ctx, _input| async { Ok(ActionOutcome::next("idle", Value::Null)) }),
        )
        .allowed_states([HTTP_ERROR])
        .build()
        .unwrap();
        let mut actions = weather_actions();
        actions.push(retry);
        let orch = ProcessOrchestrator::builder(memory().await)
            .agent("weather", actions)
            .unwrap()
            .build();

        let created = ask(&orch, "Perth").await;
        let failed = completed(
            orch.dispatch(DispatchRequest::new("weather", "reject").process(created.process_id))
                .await
                .unwrap(),
        );
        assert_eq!(failed.available_actions, vec!["retry"]);
        let recovered = completed(
            orch.dispatch(DispatchRequest::new("weather", "retry").process(created.process_id))
                .await
                .unwrap(),
        );
        assert_eq!(recovered.state, "idle");
    }

    #[tokio::test]
    async fn reserved_state_from_handler_is_unhandled() {
        let sneaky = ActionDescriptor::builder(
            "start",
            handler_fn(|_ctx, _input| async {
                Ok(ActionOutcome::next(UNINITIALIZED, Value::Null))
            }),
        )
        .initializer()
        .build()
        .unwrap();
        let orch = ProcessOrchestrator::builder(memory().await)
            .agent("sneaky", vec![sneaky])
            .unwrap()
            .build();
        let snapshot = completed(orch.dispatch(DispatchRequest::new("sneaky", "start")).await.unwrap());
        assert_eq!(snapshot.state, UNHANDLED_ERROR);
    }

    #[tokio::test]
    async fn listing_pages_through_processes() {
        let orch = orchestrator().await;
        let mut created = Vec::new();
        for city in ["Boston", "Denver", "Austin"] {
            created.push(ask(&orch, city).await.process_id);
        }

        let first = orch
            .list("weather", PageRequest::new(1, 0, SortDirection::Ascending))
            .await
            .unwrap();
        assert_eq!(first.total_count, 3);
        assert_eq!(first.items.len(), 1);
        assert!(first.has_next);
        assert_eq!(first.items[0].process_id, created[0]);

        let second = orch
            .list("weather", PageRequest::new(1, 1, SortDirection::Ascending))
            .await
            .unwrap();
        assert_eq!(second.items[0].process_id, created[1]);
        assert!(second.has_next);

        let third = orch
            .list("weather", PageRequest::new(1, 2, SortDirection::Ascending))
            .await
            .unwrap();
        assert_eq!(third.items[0].process_id, created[2]);
        assert!(!third.has_next);
    }

    #[tokio::test]
    async fn concatenated_pages_cover_every_process_once() {
        let orch = orchestrator().await;
        for i in 0..7 {
            ask(&orch, &format!("city-{i}")).await;
        }
        let mut seen = HashSet::new();
        let mut request = PageRequest::new(3, 0, SortDirection::Descending);
        let mut total = 0;
        loop {
            let page = orch.list("weather", request).await.unwrap();
            total = page.total_count;
            if page.items.is_empty() {
                break;
            }
            for item in page.items {
                assert!(seen.insert(item.process_id));
            }
            request = request.next();
        }
        assert_eq!(seen.len() as u64, total);
        assert_eq!(total, 7);
    }

    #[tokio::test]
    async fn list_limit_is_clamped() {
        let orch = ProcessOrchestrator::builder(memory().await)
            .agent("weather", weather_actions())
            .unwrap()
            .max_page_size(2)
            .build();
        for city in ["a", "b", "c"] {
            ask(&orch, city).await;
        }
        let page = orch
            .list("weather", PageRequest::new(50, 0, SortDirection::Ascending))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.has_next);
    }

    #[tokio::test]
    async fn background_dispatch_acknowledges_then_completes() {
        let orch = orchestrator().await;
        let mut events = orch.subscribe();
        let outcome = orch
            .dispatch(
                DispatchRequest::new("weather", "ask")
                    .input(json!({ "city": "Nairobi" }))
                    .mode(ExecutionMode::Background),
            )
            .await
            .unwrap();
        let DispatchOutcome::Accepted(ack) = outcome else {
            panic!("expected acknowledgement");
        };
        assert!(ack.accepted);

        orch.shutdown().await;
        let snapshot = orch.status("weather", ack.process_id).await.unwrap();
        assert_eq!(snapshot.state, "idle");
        assert_eq!(snapshot.data, json!({ "city": "Nairobi" }));

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ProcessEvent::Transitioned { state, .. } = event {
                states.push(state);
            }
        }
        assert_eq!(states, vec![PROCESSING.to_string(), "idle".to_string()]);
    }

    #[tokio::test]
    async fn background_ack_is_visible_before_a_worker_runs() {
        let gate = Arc::new(Semaphore::new(0));
        let (entered, mut entries) = mpsc::unbounded_channel();
        let orch = ProcessOrchestrator::builder(memory().await)
            .agent("slow", gated_actions(Arc::clone(&gate), entered))
            .unwrap()
            .workers(1)
            .build();

        let start = || DispatchRequest::new("slow", "start").mode(ExecutionMode::Background);
        let first = orch.dispatch(start()).await.unwrap().process_id();
        let second = orch.dispatch(start()).await.unwrap().process_id();

        // One of them holds the only worker; the other is still queued.
        let running = entries.recv().await.unwrap();
        assert!(running == first || running == second);
        for pid in [first, second] {
            let snapshot = orch.status("slow", pid).await.unwrap();
            assert_eq!(snapshot.state, PROCESSING);
            assert_eq!(snapshot.data, json!({ "action": "start" }));
        }
        let page = orch.list("slow", PageRequest::default()).await.unwrap();
        assert_eq!(page.total_count, 2);

        let mut watch = orch.watch(second);
        gate.add_permits(2);
        assert!(watch.until_state("idle").await.is_some());
        orch.shutdown().await;
        for pid in [first, second] {
            assert_eq!(orch.status("slow", pid).await.unwrap().state, "idle");
        }
    }

    #[tokio::test]
    async fn dispatch_after_shutdown_in_background_is_refused() {
        let orch = orchestrator().await;
        orch.shutdown().await;
        let err = orch
            .dispatch(DispatchRequest::new("weather", "ask").mode(ExecutionMode::Background))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ShuttingDown));
        let page = orch.list("weather", PageRequest::default()).await.unwrap();
        assert_eq!(page.total_count, 0);
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        delivered: Arc<Mutex<Vec<(String, ProcessSnapshot)>>>,
        fail: bool,
    }

    impl CallbackNotifier for RecordingNotifier {
        async fn notify(&self, url: &str, snapshot: &ProcessSnapshot) -> Result<(), CallbackError> {
            if self.fail {
                return Err(CallbackError::Delivery {
                    attempts: 2,
                    message: "connection refused".to_string(),
                });
            }
            self.delivered
                .lock()
                .unwrap()
                .push((url.to_string(), snapshot.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn callback_receives_final_snapshot() {
        let notifier = RecordingNotifier::default();
        let orch = ProcessOrchestrator::builder(memory().await)
            .agent("weather", weather_actions())
            .unwrap()
            .notifier(BoxCallbackNotifier::new(notifier.clone()))
            .build();

        // A callback url without an explicit mode runs in the background.
        let outcome = orch
            .dispatch(
                DispatchRequest::new("weather", "ask")
                    .input(json!({ "city": "Seoul" }))
                    .callback("http://caller.test/done"),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Accepted(_)));

        let sync = completed(
            orch.dispatch(
                DispatchRequest::new("weather", "ask")
                    .input(json!({ "city": "Busan" }))
                    .mode(ExecutionMode::Sync)
                    .callback("http://caller.test/sync"),
            )
            .await
            .unwrap(),
        );

        orch.shutdown().await;
        let delivered = notifier.delivered.lock().unwrap().clone();
        assert_eq!(delivered.len(), 2);
        assert!(delivered.iter().all(|(_, snapshot)| snapshot.state == "idle"));
        assert!(
            delivered
                .iter()
                .any(|(url, snapshot)| url == "http://caller.test/sync" && *snapshot == sync)
        );
        assert!(
            delivered
                .iter()
                .any(|(url, snapshot)| url == "http://caller.test/done"
                    && snapshot.process_id == outcome.process_id())
        );
    }

    #[tokio::test]
    async fn failed_callback_leaves_state_untouched() {
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let orch = ProcessOrchestrator::builder(memory().await)
            .agent("weather", weather_actions())
            .unwrap()
            .notifier(BoxCallbackNotifier::new(notifier))
            .build();
        let mut events = orch.subscribe();

        let snapshot = completed(
            orch.dispatch(
                DispatchRequest::new("weather", "ask")
                    .mode(ExecutionMode::Sync)
                    .callback("http://caller.test/down"),
            )
            .await
            .unwrap(),
        );
        orch.shutdown().await;

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            if let ProcessEvent::CallbackFailed { process_id, .. } = event {
                failed = process_id == snapshot.process_id;
            }
        }
        assert!(failed);
        assert_eq!(orch.status("weather", snapshot.process_id).await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn concurrent_dispatches_both_commit() {
        let orch = orchestrator().await;
        let created = ask(&orch, "Lagos").await;
        let request = |q: &str| {
            DispatchRequest::new("weather", "followup")
                .process(created.process_id)
                .input(json!({ "q": q }))
        };
        let (a, b) = tokio::join!(orch.dispatch(request("a")), orch.dispatch(request("b")));
        assert_eq!(completed(a.unwrap()).state, "idle");
        assert_eq!(completed(b.unwrap()).state, "idle");

        let history = orch.history("weather", created.process_id).await.unwrap();
        assert_eq!(history.len(), 6);
        assert!(history.windows(2).all(|w| w[0].updated_at <= w[1].updated_at));
    }

    #[tokio::test]
    async fn registration_rules() {
        let err = ProcessOrchestrator::builder(memory().await)
            .agent("weather", weather_actions())
            .unwrap()
            .agent("weather", weather_actions())
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAgent(name) if name == "weather"));

        let resumer_only = ActionDescriptor::builder(
            "followup",
            handler_fn(|_ctx, _input| async { Ok(ActionOutcome::terminated(Value::Null)) }),
        )
        .allowed_states(["idle"])
        .build()
        .unwrap();
        let err = ProcessOrchestrator::builder(memory().await)
            .agent("lonely", vec![resumer_only])
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoInitializer(name) if name == "lonely"));

        let builder = ProcessOrchestrator::builder(memory().await)
            .agent("weather", weather_actions())
            .unwrap()
            .workers(3);
        let debug = format!("{builder:?}");
        assert!(debug.contains("OrchestratorBuilder"));
        assert!(debug.contains("weather"));
    }

    #[tokio::test]
    async fn agents_and_actions_are_listed() {
        let orch = ProcessOrchestrator::builder(memory().await)
            .agent("weather", weather_actions())
            .unwrap()
            .agent(
                "echo",
                vec![
                    ActionDescriptor::builder(
                        "say",
                        handler_fn(|_ctx, input| async move { Ok(ActionOutcome::terminated(input)) }),
                    )
                    .initializer()
                    .build()
                    .unwrap(),
                ],
            )
            .unwrap()
            .build();
        let agents = orch.agents();
        let names: Vec<_> = agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "weather"]);

        let actions = orch.actions("weather").unwrap();
        assert_eq!(actions[0].name, "ask");
        assert!(actions[0].initializer);
        assert!(matches!(
            orch.actions("climate"),
            Err(DispatchError::NotFound { kind: "agent", .. })
        ));
    }
}
