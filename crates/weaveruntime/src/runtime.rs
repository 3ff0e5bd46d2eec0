use crate::executor::Executor;
use crate::invoker::LocalInvoker;
use crate::registry::ActivityRegistry;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use weavecore::{Bindings, EngineError, EventBus, ExecutionEvent, Workflow};

/// Main entry point for running workflows against the in-process substrate.
pub struct WeaveRuntime {
    registry: Arc<ActivityRegistry>,
    event_bus: Arc<EventBus>,
}

impl WeaveRuntime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(ActivityRegistry::new()), config)
    }

    pub fn with_registry(registry: Arc<ActivityRegistry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
        }
    }

    pub fn registry(&self) -> &Arc<ActivityRegistry> {
        &self.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Run a workflow to completion and return the final bindings.
    pub async fn run(&self, workflow: &Workflow) -> Result<Bindings, EngineError> {
        self.run_with_cancel(workflow, CancellationToken::new())
            .await
    }

    /// Run a workflow under an external cancellation token; firing the token
    /// aborts the run with a cancellation error.
    pub async fn run_with_cancel(
        &self,
        workflow: &Workflow,
        cancel: CancellationToken,
    ) -> Result<Bindings, EngineError> {
        let run_id = Uuid::new_v4();
        let emitter = self.event_bus.create_emitter(run_id);
        tracing::info!(%run_id, version = %workflow.version, "starting workflow run");
        emitter.workflow_started(&workflow.version);
        let started = Instant::now();

        let invoker = Arc::new(LocalInvoker::new(
            self.registry.clone(),
            emitter.clone(),
            cancel.clone(),
        ));
        let executor = Executor::new(invoker, emitter.clone());
        let result = executor.run(workflow, cancel).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        emitter.workflow_completed(result.is_ok(), duration_ms);
        match &result {
            Ok(_) => tracing::info!(%run_id, duration_ms, "workflow run completed"),
            Err(err) => tracing::error!(%run_id, duration_ms, error = %err, "workflow run failed"),
        }
        result
    }
}

impl Default for WeaveRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
        }
    }
}
