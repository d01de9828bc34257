//! Worker loop: budget, send, classify, retry or deliver.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::pending::{Outcome, Payload, PendingRequest};
use crate::config::ADVISORY_DEFER;
use crate::error_handling::{DispatchError, DispatchEvent, MetricsFanout, WaitKind};
use crate::rate_budget::{RateBudget, RateLimitScope, ServerThrottleState, SlidingWindowLimiter};
use crate::retry::{classify_status, BackoffPolicy, FailureSignal, RetryDecision};
use crate::transport::{RawResponse, Transport};

pub(crate) type Intake = Arc<TokioMutex<mpsc::Receiver<PendingRequest>>>;

/// Everything a worker needs, shared by all workers and retry timers.
pub(crate) struct WorkerContext {
    pub(crate) budget: Arc<RateBudget>,
    pub(crate) advisory: Option<SlidingWindowLimiter>,
    pub(crate) policy: BackoffPolicy,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) metrics: MetricsFanout,
    pub(crate) server_state: Mutex<Option<ServerThrottleState>>,
    pub(crate) requeue: mpsc::Sender<PendingRequest>,
    pub(crate) cancel: CancellationToken,
    pub(crate) request_timeout: Duration,
    pub(crate) text_fallback: bool,
}

/// Pulls requests off the shared queue until cancelled.
pub(crate) async fn run_worker(worker_id: usize, ctx: Arc<WorkerContext>, intake: Intake) {
    log::debug!("Worker {} started", worker_id);
    loop {
        let next = {
            let mut queue = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break,
                queue = intake.lock() => queue,
            };
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break,
                next = queue.recv() => next,
            }
        };
        match next {
            Some(request) => ctx.process(request).await,
            None => break,
        }
    }
    log::debug!("Worker {} stopped", worker_id);
}

impl WorkerContext {
    async fn process(self: &Arc<Self>, mut request: PendingRequest) {
        if let Some(advisory) = &self.advisory {
            if !advisory.allow() {
                log::trace!("Advisory limiter deferred request {}", request.id);
                self.metrics.event(DispatchEvent::AdvisoryDeferred);
                self.requeue_after(request, ADVISORY_DEFER);
                return;
            }
        }

        let waited = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.finish(request, Err(DispatchError::ShuttingDown));
                return;
            }
            waited = self.budget.acquire() => waited,
        };
        self.metrics.wait(WaitKind::Budget, waited);

        request.attempts += 1;
        self.metrics.event(DispatchEvent::Issued);
        log::debug!(
            "Request {} attempt {}: GET {}",
            request.id,
            request.attempts,
            request.url
        );

        let started = Instant::now();
        let result = self
            .transport
            .send(&request.transport_request(self.request_timeout))
            .await;
        self.metrics.wait(WaitKind::Request, started.elapsed());

        match result {
            Ok(response) => {
                self.observe_limits(&response);
                match classify_status(response.status, &response.headers) {
                    None => {
                        let outcome = self.decode(response.body);
                        self.finish(request, outcome);
                    }
                    Some(signal) => self.handle_failure(request, signal, Some(response)),
                }
            }
            Err(error) => {
                self.handle_failure(request, FailureSignal::from(&error), None);
            }
        }
    }

    fn observe_limits(&self, response: &RawResponse) {
        if let Some(state) = ServerThrottleState::from_headers(&response.headers) {
            self.budget.reconcile(&state);
            let mut current = self
                .server_state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *current = Some(state);
        }
    }

    fn decode(&self, body: String) -> Outcome {
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(Payload::Json(value)),
            Err(_) if self.text_fallback => {
                self.metrics.event(DispatchEvent::TextFallback);
                Ok(Payload::Text(body))
            }
            Err(e) => Err(DispatchError::ContentDecode(e.to_string())),
        }
    }

    fn handle_failure(
        self: &Arc<Self>,
        mut request: PendingRequest,
        signal: FailureSignal,
        response: Option<RawResponse>,
    ) {
        match &signal {
            FailureSignal::NetworkError(_) => {
                request.failures += 1;
                self.metrics.event(DispatchEvent::NetworkError);
            }
            FailureSignal::ServerError(_) => {
                request.failures += 1;
                self.metrics.event(DispatchEvent::ServerError);
            }
            FailureSignal::TooManyRequests { retry_after } => {
                request.throttles += 1;
                self.metrics.event(DispatchEvent::Throttled);
                // An application-scope limit covers the whole key, so every
                // worker has to wait it out
                let scope = response
                    .as_ref()
                    .and_then(|r| RateLimitScope::from_headers(&r.headers));
                if let (Some(wait), Some(RateLimitScope::Application)) = (retry_after, scope) {
                    log::info!("Application rate limit hit, holding all requests for {:?}", wait);
                    self.budget.hold_for(*wait);
                }
            }
            FailureSignal::ClientError(_) => {}
        }

        match self.policy.decide(&request.progress(), &signal) {
            RetryDecision::Retry(delay) => {
                if signal.is_throttle() {
                    log::info!(
                        "Request {} throttled ({}), retrying in {:?}",
                        request.id,
                        signal,
                        delay
                    );
                } else {
                    log::debug!(
                        "Request {} failed ({}), retry {} in {:?}",
                        request.id,
                        signal,
                        request.failures,
                        delay
                    );
                }
                self.metrics.event(DispatchEvent::Retried);
                self.metrics.wait(WaitKind::Backoff, delay);
                self.requeue_after(request, delay);
            }
            RetryDecision::GiveUp => {
                let error = match signal {
                    FailureSignal::ClientError(status) => DispatchError::ClientError {
                        status,
                        body: response.map(|r| r.body).unwrap_or_default(),
                    },
                    FailureSignal::TooManyRequests { .. } => DispatchError::ThrottleExhausted {
                        retries: request.throttles.saturating_sub(1),
                    },
                    FailureSignal::NetworkError(_) | FailureSignal::ServerError(_) => {
                        DispatchError::AttemptsExhausted {
                            attempts: request.failures,
                            last: signal.to_string(),
                        }
                    }
                };
                self.finish(request, Err(error));
            }
        }
    }

    /// Puts the request back on the queue after `delay`.
    ///
    /// Runs on its own task so the worker is free while the request waits.
    fn requeue_after(self: &Arc<Self>, request: PendingRequest, delay: Duration) {
        let ctx = Arc::clone(self);
        tokio::spawn(async move {
            let cancelled = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if cancelled {
                ctx.finish(request, Err(DispatchError::ShuttingDown));
                return;
            }

            let permit = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => None,
                permit = ctx.requeue.reserve() => permit.ok(),
            };
            match permit {
                Some(permit) => permit.send(request),
                None => ctx.finish(request, Err(DispatchError::ShuttingDown)),
            }
        });
    }

    /// Delivers a terminal outcome and records it.
    pub(crate) fn finish(&self, request: PendingRequest, outcome: Outcome) {
        let id = request.id;
        let kind = outcome.as_ref().err().map(DispatchError::kind);
        if let Err(error) = &outcome {
            log::warn!(
                "Request {} failed after {} attempt(s) [{}]: {} ({})",
                id,
                request.attempts,
                error.kind(),
                error,
                request.url
            );
        }

        if request.deliver(outcome) {
            match kind {
                None => self.metrics.event(DispatchEvent::Succeeded),
                Some(kind) => self.metrics.failure(kind),
            }
        } else {
            log::debug!("Request {} finished after its caller stopped waiting", id);
            self.metrics.event(DispatchEvent::LateResult);
        }
    }
}
