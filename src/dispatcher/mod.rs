//! Concurrent request dispatcher.
//!
//! A fixed pool of worker tasks consumes one bounded intake queue. Each worker
//! waits on the shared [`RateBudget`], sends through the [`Transport`], and
//! either delivers a result to the caller's slot or re-enqueues the request
//! after the delay chosen by the [`BackoffPolicy`](crate::retry::BackoffPolicy).
//!
//! Callers use [`Dispatcher::fetch`] to wait for a result, or
//! [`Dispatcher::submit`] to get a [`PendingHandle`] back immediately.

mod pending;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DispatcherConfig;
use crate::error_handling::{
    ConfigError, DispatchError, DispatchEvent, DispatchStats, InitializationError, MetricsFanout,
    MetricsSink,
};
use crate::rate_budget::{RateBudget, ServerThrottleState, SlidingWindowLimiter};
use crate::transport::{HttpTransport, Transport};

pub use pending::{Outcome, Payload, PendingHandle, Request, RequestId};
use pending::PendingRequest;
use worker::{run_worker, Intake, WorkerContext};

/// Rate-limited dispatcher. Must be created inside a Tokio runtime.
pub struct Dispatcher {
    ctx: Arc<WorkerContext>,
    intake: mpsc::Sender<PendingRequest>,
    queue: Intake,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pool_size: usize,
    accepting: AtomicBool,
    next_id: AtomicU64,
    max_attempts: u32,
    wait_timeout: Duration,
    shutdown_grace: Duration,
}

impl Dispatcher {
    /// Starts the worker pool over the given transport.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration is invalid. The API key is
    /// not checked here; it belongs to the transport.
    pub fn start(
        config: &DispatcherConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        Self::start_with_sink(config, transport, None)
    }

    /// Like [`start`](Self::start), also reporting every event to `sink`.
    pub fn start_with_sink(
        config: &DispatcherConfig,
        transport: Arc<dyn Transport>,
        sink: Option<Arc<dyn MetricsSink>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (intake, receiver) = mpsc::channel(config.queue_capacity);
        let queue: Intake = Arc::new(TokioMutex::new(receiver));
        let ctx = Arc::new(WorkerContext {
            budget: Arc::new(RateBudget::new(config.rate_windows.clone())),
            advisory: config.advisory_window.map(SlidingWindowLimiter::new),
            policy: config.backoff_policy(),
            transport,
            metrics: MetricsFanout::new(sink),
            server_state: Mutex::new(None),
            requeue: intake.clone(),
            cancel: CancellationToken::new(),
            request_timeout: config.request_timeout,
            text_fallback: config.text_fallback,
        });

        let workers = (0..config.workers)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&ctx),
                    Arc::clone(&queue),
                ))
            })
            .collect();

        log::info!(
            "Dispatcher started: {} workers, rate windows [{}], queue capacity {}",
            config.workers,
            config
                .rate_windows
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            config.queue_capacity
        );

        Ok(Dispatcher {
            ctx,
            intake,
            queue,
            workers: Mutex::new(workers),
            pool_size: config.workers,
            accepting: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            max_attempts: config.max_attempts,
            wait_timeout: config.wait_timeout,
            shutdown_grace: config.shutdown_grace,
        })
    }

    /// Starts a dispatcher that talks to the Riot API over HTTP.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, a missing API key, or if the HTTP client
    /// cannot be built.
    pub fn from_config(config: &DispatcherConfig) -> Result<Self, InitializationError> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::start(config, Arc::new(transport))?)
    }

    /// Queues a request and returns a handle without waiting.
    ///
    /// # Errors
    ///
    /// `QueueFull` if the intake queue has no room, `ShuttingDown` once
    /// [`shutdown`](Self::shutdown) has begun.
    pub fn submit(&self, request: Request) -> Result<PendingHandle, DispatchError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(self.reject(request.url(), DispatchError::ShuttingDown));
        }

        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let timeout = request.wait_timeout().unwrap_or(self.wait_timeout);
        let (slot, receiver) = oneshot::channel();
        let pending = PendingRequest::new(id, request, self.max_attempts, slot);

        match self.intake.try_send(pending) {
            Ok(()) => {
                self.ctx.metrics.event(DispatchEvent::Submitted);
                Ok(PendingHandle::new(
                    id,
                    receiver,
                    timeout,
                    self.ctx.metrics.clone(),
                ))
            }
            Err(TrySendError::Full(pending)) => {
                Err(self.reject(&pending.url, DispatchError::QueueFull))
            }
            Err(TrySendError::Closed(pending)) => {
                Err(self.reject(&pending.url, DispatchError::ShuttingDown))
            }
        }
    }

    /// Submits a request and waits for its result or its timeout.
    pub async fn fetch(&self, request: Request) -> Outcome {
        self.submit(request)?.wait().await
    }

    /// Fetches `url` with query `params`, returning `None` on any failure.
    ///
    /// Failures are logged where they happen.
    pub async fn get<K, V>(
        &self,
        url: &str,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Option<Payload>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.fetch(Request::new(url).params(params)).await.ok()
    }

    /// Stops accepting requests and winds the workers down.
    ///
    /// Workers finish the request they are sending, for up to the configured
    /// grace period, and are then aborted. Anything still queued or waiting to
    /// retry completes with `ShuttingDown`. Calling this more than once is a
    /// no-op.
    pub async fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return;
        }
        log::info!("Shutting down dispatcher");
        self.ctx.cancel.cancel();

        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(self.shutdown_grace, join_all(workers))
            .await
            .is_err()
        {
            log::warn!(
                "Workers still busy after {:?}, aborting in-flight requests",
                self.shutdown_grace
            );
            for abort in aborts {
                abort.abort();
            }
        }

        let mut queue = self.queue.lock().await;
        queue.close();
        let mut drained = 0usize;
        while let Ok(request) = queue.try_recv() {
            self.ctx.finish(request, Err(DispatchError::ShuttingDown));
            drained += 1;
        }
        if drained > 0 {
            log::info!("Cancelled {} queued request(s) at shutdown", drained);
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Counters for this dispatcher.
    pub fn stats(&self) -> Arc<DispatchStats> {
        self.ctx.metrics.stats()
    }

    pub fn budget(&self) -> &Arc<RateBudget> {
        &self.ctx.budget
    }

    /// Number of workers started, whether or not they are still running.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Caller timeout applied to requests that do not set their own.
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Rate-limit state from the most recent response that carried it.
    pub fn server_state(&self) -> Option<ServerThrottleState> {
        self.ctx
            .server_state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Denials from the advisory limiter, if one is configured.
    pub fn advisory_hits(&self) -> Option<u64> {
        self.ctx.advisory.as_ref().map(SlidingWindowLimiter::hits)
    }

    fn reject(&self, url: &str, error: DispatchError) -> DispatchError {
        log::warn!("Rejected request for {}: {}", url, error);
        self.ctx.metrics.rejected(error.kind());
        error
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.ctx.cancel.cancel();
    }
}
