//! The endpoint runtime: receive loops feeding the step pipeline.
//!
//! ```text
//!             ┌──────────── Runtime ─────────────┐
//! Transport ──┤ worker 0 ─┐                      │
//!   receive() │ worker 1 ─┼─ Semaphore ─▶ task ─▶│ Pipeline::run (one unit of work)
//!             │ worker N ─┘  (max_parallelism)   │
//!             └──────────────────────────────────┘
//! ```
//!
//! Each receive loop takes a permit before receiving, so at most
//! `max_parallelism` messages are in flight across all workers. Every message
//! runs in its own task with a fresh `StepContext`; nothing orders messages
//! relative to each other.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use conveyor_runtime::Runtime;
//!
//! // Loads conveyor.toml from the current directory and discovers
//! // `#[register_handler]` handlers.
//! let runtime = Runtime::new()?;
//! runtime.run().await?;
//!
//! let runtime = Runtime::builder()
//!     .config_file("config/conveyor.toml")
//!     .step(Timing, RelativePosition::After(LoggingStep::NAME))
//!     .build()?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use conveyor_core::{BoxError, Bus, EventBus, InboundMessage, Transport};
use conveyor_framework::{
    ActivateHandlersStep, BoxedStep, HandlerRegistry, IncomingStep, LoggingStep, Pipeline,
    PipelineBuilder, RelativePosition, StepContext,
};
use tokio::signal;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::schema::MEMORY_ADDRESS;
use crate::config::{ConfigLoader, ConveyorConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::transport::MemoryBroker;

/// Pause after a failed `receive` before the loop tries again.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A running message endpoint.
///
/// A runtime runs once: after [`run`](Self::run) or
/// [`run_until`](Self::run_until) returns, build a new one to start again.
pub struct Runtime {
    config: ConveyorConfig,
    transport: Arc<dyn Transport>,
    bus: Arc<Bus>,
    pipeline: Pipeline,
    shutdown: CancellationToken,
    started: AtomicBool,
}

impl Runtime {
    /// Builds a runtime from the default configuration sources, with the
    /// handlers discovered from `#[register_handler]`.
    pub fn new() -> RuntimeResult<Self> {
        Self::builder().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Builds a runtime from an already loaded configuration.
    pub fn from_config(config: ConveyorConfig) -> RuntimeResult<Self> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &ConveyorConfig {
        &self.config
    }

    /// The bus handlers publish through; usable before and during `run`.
    pub fn bus(&self) -> Arc<dyn EventBus> {
        self.bus.clone()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Token that stops the receive loops when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stops receiving. Messages already in flight still finish.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!(
            queue = %self.transport.address(),
            "Conveyor endpoint is now running. Press Ctrl+C to stop."
        );
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes, [`shutdown`](Self::shutdown) is
    /// called, or the transport closes; then waits for in-flight messages.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyStarted);
        }

        let tracker = TaskTracker::new();
        let permits = Arc::new(Semaphore::new(self.config.bus.max_parallelism));
        for worker in 0..self.config.bus.workers {
            tracker.spawn(receive_loop(Worker {
                id: worker,
                transport: self.transport.clone(),
                pipeline: self.pipeline.clone(),
                permits: permits.clone(),
                tracker: tracker.clone(),
                shutdown: self.shutdown.clone(),
            }));
        }
        tracker.close();
        info!(
            workers = self.config.bus.workers,
            max_parallelism = self.config.bus.max_parallelism,
            "Receive loops started"
        );

        tokio::select! {
            _ = shutdown => info!("Shutdown requested"),
            _ = self.shutdown.cancelled() => info!("Shutdown requested"),
            _ = tracker.wait() => info!("Transport closed"),
        }

        self.shutdown.cancel();
        tracker.wait().await;
        info!("Runtime stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("queue", &self.transport.address())
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Receive loop
// =============================================================================

struct Worker {
    id: usize,
    transport: Arc<dyn Transport>,
    pipeline: Pipeline,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

async fn receive_loop(worker: Worker) {
    debug!(worker = worker.id, "Receive loop started");

    loop {
        let permit = tokio::select! {
            _ = worker.shutdown.cancelled() => break,
            permit = worker.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let received = tokio::select! {
            _ = worker.shutdown.cancelled() => break,
            received = worker.transport.receive() => received,
        };

        match received {
            Ok(Some(message)) => {
                let pipeline = worker.pipeline.clone();
                let transport = worker.transport.clone();
                worker.tracker.spawn(async move {
                    process(&pipeline, transport.as_ref(), message).await;
                    drop(permit);
                });
            }
            Ok(None) => {
                debug!(worker = worker.id, "Input queue closed");
                break;
            }
            Err(e) => {
                error!(worker = worker.id, error = %e, "Failed to receive message");
                drop(permit);
                tokio::select! {
                    _ = worker.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                }
            }
        }
    }

    debug!(worker = worker.id, "Receive loop stopped");
}

/// Runs one message through the pipeline and reports a failure back to the
/// transport.
async fn process(pipeline: &Pipeline, transport: &dyn Transport, message: InboundMessage) {
    let mut ctx = StepContext::new(message);
    let Err(e) = pipeline.run_with(&mut ctx).await else {
        return;
    };

    let (message, _) = ctx.into_parts();
    error!(
        message_type = message.message_type().unwrap_or("<none>"),
        message_id = message.message_id().unwrap_or("<none>"),
        error = %e,
        "Failed to process message"
    );

    let error: BoxError = Box::new(e);
    if let Err(e) = transport.fail(&message, &error).await {
        error!(
            message_id = message.message_id().unwrap_or("<none>"),
            error = %e,
            "Failed to report message failure to transport"
        );
    }
}

/// Waits for Ctrl+C or SIGTERM. If no signal can be listened for, waits
/// forever and leaves shutdown to the cancellation token.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = signal::ctrl_c() => match result {
                        Ok(()) => info!("Received Ctrl+C, shutting down"),
                        Err(e) => {
                            error!(error = %e, "Failed to listen for Ctrl+C");
                            sigterm.recv().await;
                            info!("Received SIGTERM, shutting down");
                        }
                    },
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Assembles a [`Runtime`]: configuration, transport, handlers and any
/// extra pipeline steps.
///
/// Steps added with [`step`](Self::step) are inserted after the built-in
/// ones, in the order given, so they may anchor on each other.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<ConveyorConfig>,
    transport: Option<Arc<dyn Transport>>,
    handlers: Option<HandlerRegistry>,
    steps: Vec<(BoxedStep, RelativePosition)>,
    logging_step: LoggingStep,
    init_logging: bool,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            transport: None,
            handlers: None,
            steps: Vec::new(),
            logging_step: LoggingStep::new(),
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration over the loaded sources.
    pub fn merge(mut self, config: ConveyorConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as is instead of loading one.
    pub fn config(mut self, config: ConveyorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses `transport` instead of the one selected by `bus.address`.
    pub fn transport<T: Transport>(mut self, transport: Arc<T>) -> Self {
        let transport: Arc<dyn Transport> = transport;
        self.transport = Some(transport);
        self
    }

    /// Uses `registry` instead of the discovered handlers.
    pub fn handlers(mut self, registry: HandlerRegistry) -> Self {
        self.handlers = Some(registry);
        self
    }

    /// Inserts an extra step into the pipeline.
    pub fn step(mut self, step: impl IncomingStep, position: RelativePosition) -> Self {
        self.steps.push((Arc::new(step), position));
        self
    }

    /// Adds a static field to the logging scope of every message.
    pub fn logging_scope(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.logging_step = self.logging_step.with_scope_field(key, value);
        self
    }

    /// Leaves the global `tracing` subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn build(self) -> RuntimeResult<Runtime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let registry = self.handlers.unwrap_or_else(HandlerRegistry::discover);
        if registry.is_empty() {
            warn!("No message handlers registered; every message will fail");
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None if config.bus.address == MEMORY_ADDRESS => {
                let broker = MemoryBroker::new();
                for message_type in registry.message_types() {
                    broker.subscribe(config.bus.input_queue.as_str(), message_type);
                }
                Arc::new(broker.endpoint(config.bus.input_queue.as_str()))
            }
            None => return Err(RuntimeError::UnsupportedAddress(config.bus.address.clone())),
        };

        let bus = Arc::new(Bus::new(transport.clone()));
        let handler_count = registry.handler_count();
        let activate = ActivateHandlersStep::new(Arc::new(registry), bus.clone());

        let mut pipeline =
            PipelineBuilder::new(activate).with_default_steps_using(self.logging_step)?;
        for (step, position) in self.steps {
            pipeline = pipeline.insert_boxed(step, position)?;
        }
        let pipeline = pipeline.build();

        if config.bus.log_pipeline {
            info!(
                queue = %transport.address(),
                handlers = handler_count,
                pipeline = %pipeline.describe(),
                "Message pipeline assembled"
            );
        }

        Ok(Runtime {
            config,
            transport,
            bus,
            pipeline,
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
