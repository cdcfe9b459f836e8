//! Long-running operation polling
//!
//! Admin operations (database and keyspace lifecycle) are accepted by the
//! server long before they take effect. [`OperationPoller`] starts such an
//! operation and, when blocking, polls its status until the target state is
//! observed, an unexpected state shows up, or the budget runs out.

use std::future::Future;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AdminError, DataApiError, Result, TransportError};
use crate::events::{CommandEvent, EventBus, EventMeta};
use crate::timeout::TimeoutBudget;

/// Per-request timeout when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one status check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// The target state was reached.
    Complete,
    /// A legal intermediate state; keep polling.
    Pending(String),
    /// A state outside the expected set; stop with an error.
    Unexpected {
        expected: Vec<String>,
        observed: String,
        payload: Value,
    },
}

/// Target status of an operation and the states legal on the way there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusExpectation {
    pub target: &'static str,
    pub legal: &'static [&'static str],
}

impl StatusExpectation {
    pub const fn new(target: &'static str, legal: &'static [&'static str]) -> Self {
        Self { target, legal }
    }

    /// Classify an observed status.
    ///
    /// # Arguments
    /// * `observed` - Status reported by the server
    /// * `payload` - Full status document, attached to unexpected outcomes
    pub fn classify(&self, observed: &str, payload: Value) -> PollStatus {
        if observed == self.target {
            PollStatus::Complete
        } else if self.legal.contains(&observed) {
            PollStatus::Pending(observed.to_string())
        } else {
            PollStatus::Unexpected {
                expected: self.expected(),
                observed: observed.to_string(),
                payload,
            }
        }
    }

    pub fn expected(&self) -> Vec<String> {
        std::iter::once(self.target)
            .chain(self.legal.iter().copied())
            .map(str::to_string)
            .collect()
    }
}

/// How to wait for one operation.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Wait for completion; when false the call returns once the operation is accepted
    pub blocking: bool,

    /// Pause between status checks
    pub interval: Duration,

    /// Client-side budget for the whole operation, requests included (`None` = unbounded)
    pub timeout: Option<Duration>,

    /// Upper bound for any single request of the operation
    pub request_timeout: Duration,

    /// Stops the wait early; the server-side operation is not affected
    pub cancel: Option<CancellationToken>,
}

impl PollOptions {
    pub fn blocking(interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            blocking: true,
            interval,
            timeout,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cancel: None,
        }
    }

    pub fn non_blocking() -> Self {
        Self {
            blocking: false,
            interval: Duration::ZERO,
            timeout: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cancel: None,
        }
    }
}

/// Drives long-running operations and publishes their lifecycle events.
#[derive(Debug, Clone, Default)]
pub struct OperationPoller {
    events: EventBus,
}

impl OperationPoller {
    pub fn new(events: EventBus) -> Self {
        Self { events }
    }

    /// Start an operation and, when blocking, wait for it to complete.
    ///
    /// The start request, every status check and the waits in between draw
    /// from one [`TimeoutBudget`].
    ///
    /// # Arguments
    /// * `operation` - Name used in logs, events and errors
    /// * `start` - Issues the operation; its output is returned on success
    /// * `status_check` - Produces one status check per call
    /// * `options` - Blocking flag, interval, budget and cancellation
    ///
    /// # Returns
    /// * `Ok(T)` - Started (non-blocking) or completed (blocking)
    /// * `Err(DataApiError::Admin(AdminError::Timeout))` - The budget ran out
    ///   during a request, or the next wait would exceed it
    /// * `Err(DataApiError::Admin(AdminError::UnexpectedState))` - A state
    ///   outside the expected set was observed
    pub async fn poll_until_complete<T, Start, StartFut, Check, Fut>(
        &self,
        operation: &str,
        start: Start,
        status_check: Check,
        options: &PollOptions,
    ) -> Result<T>
    where
        Start: FnOnce(TimeoutBudget) -> StartFut + Send,
        StartFut: Future<Output = Result<T>> + Send,
        Check: FnMut(TimeoutBudget) -> Fut + Send,
        Fut: Future<Output = Result<PollStatus>> + Send,
    {
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        info!("Starting {} (blocking: {})", operation, options.blocking);
        self.events.emit(CommandEvent::AdminCommandStarted {
            meta: EventMeta::new(request_id),
            operation: operation.to_string(),
            blocking: options.blocking,
        });

        let outcome = self
            .drive(operation, request_id, start, status_check, options)
            .await;
        let duration = started.elapsed();

        match &outcome {
            Ok(_) => {
                info!("{} finished in {:?}", operation, duration);
                self.events.emit(CommandEvent::AdminCommandSucceeded {
                    meta: EventMeta::new(request_id),
                    operation: operation.to_string(),
                    duration,
                });
            }
            Err(err) => {
                warn!("{} failed after {:?}: {}", operation, duration, err);
                self.events.emit(CommandEvent::AdminCommandFailed {
                    meta: EventMeta::new(request_id),
                    operation: operation.to_string(),
                    duration,
                    error: err.to_string(),
                });
            }
        }
        outcome
    }

    /// Run an operation that completes server-side before responding.
    pub async fn run_once<T, Start>(&self, operation: &str, start: Start) -> Result<T>
    where
        Start: Future<Output = Result<T>> + Send,
    {
        self.poll_until_complete(
            operation,
            |_| start,
            |_| async { Ok(PollStatus::Complete) },
            &PollOptions::non_blocking(),
        )
        .await
    }

    async fn drive<T, Start, StartFut, Check, Fut>(
        &self,
        operation: &str,
        request_id: Uuid,
        start: Start,
        mut status_check: Check,
        options: &PollOptions,
    ) -> Result<T>
    where
        Start: FnOnce(TimeoutBudget) -> StartFut + Send,
        StartFut: Future<Output = Result<T>> + Send,
        Check: FnMut(TimeoutBudget) -> Fut + Send,
        Fut: Future<Output = Result<PollStatus>> + Send,
    {
        let budget = TimeoutBudget::new(options.timeout, options.request_timeout);
        let value = start(budget)
            .await
            .map_err(|err| over_budget(operation, &budget, err))?;
        if !options.blocking {
            debug!("{} accepted, not waiting for completion", operation);
            return Ok(value);
        }

        loop {
            let elapsed = budget.elapsed();
            if let Some(total) = budget.total() {
                if elapsed + options.interval > total {
                    return Err(timeout(operation, elapsed, total));
                }
            }

            match &options.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(AdminError::Cancelled(operation.to_string()).into());
                        }
                        _ = tokio::time::sleep(options.interval) => {}
                    }
                }
                None => tokio::time::sleep(options.interval).await,
            }

            let status = status_check(budget)
                .await
                .map_err(|err| over_budget(operation, &budget, err))?;
            match status {
                PollStatus::Complete => return Ok(value),
                PollStatus::Pending(observed) => {
                    debug!("{} still {} after {:?}", operation, observed, budget.elapsed());
                    self.events.emit(CommandEvent::AdminCommandPolling {
                        meta: EventMeta::new(request_id),
                        operation: operation.to_string(),
                        elapsed: budget.elapsed(),
                        interval: options.interval,
                        observed,
                    });
                }
                PollStatus::Unexpected {
                    expected,
                    observed,
                    payload,
                } => {
                    return Err(AdminError::UnexpectedState {
                        operation: operation.to_string(),
                        expected,
                        observed,
                        payload,
                    }
                    .into());
                }
            }
        }
    }
}

fn timeout(operation: &str, elapsed: Duration, total: Duration) -> DataApiError {
    AdminError::Timeout {
        operation: operation.to_string(),
        elapsed_ms: elapsed.as_millis() as u64,
        budget_ms: total.as_millis() as u64,
    }
    .into()
}

/// Report a request cut short by the operation budget as an admin timeout.
fn over_budget(operation: &str, budget: &TimeoutBudget, err: DataApiError) -> DataApiError {
    match (&err, budget.total()) {
        (DataApiError::Transport(TransportError::Timeout { .. }), Some(total))
            if budget.elapsed() >= total =>
        {
            timeout(operation, budget.elapsed(), total)
        }
        _ => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEYSPACE: StatusExpectation = StatusExpectation::new("ACTIVE", &["MAINTENANCE", "PENDING"]);

    fn scripted(statuses: &'static [&'static str]) -> (Arc<AtomicUsize>, impl FnMut(TimeoutBudget) -> std::future::Ready<Result<PollStatus>> + Send) {
        let checks = Arc::new(AtomicUsize::new(0));
        let counter = checks.clone();
        let check = move |_: TimeoutBudget| {
            let i = counter.fetch_add(1, Ordering::SeqCst);
            let observed = statuses[i.min(statuses.len() - 1)];
            std::future::ready(Ok(KEYSPACE.classify(observed, json!({"status": observed}))))
        };
        (checks, check)
    }

    #[test]
    fn test_classify() {
        assert_eq!(KEYSPACE.classify("ACTIVE", json!({})), PollStatus::Complete);
        assert_eq!(
            KEYSPACE.classify("PENDING", json!({})),
            PollStatus::Pending("PENDING".to_string())
        );
        assert!(matches!(
            KEYSPACE.classify("ERROR", json!({})),
            PollStatus::Unexpected { ref observed, .. } if observed == "ERROR"
        ));
        assert_eq!(KEYSPACE.expected(), vec!["ACTIVE", "MAINTENANCE", "PENDING"]);
    }

    #[tokio::test]
    async fn test_non_blocking_returns_after_start() {
        let (checks, check) = scripted(&["MAINTENANCE"]);
        let poller = OperationPoller::default();

        let value = poller
            .poll_until_complete("createKeyspace", |_| async { Ok(7) }, check, &PollOptions::non_blocking())
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blocking_polls_until_target() {
        let (checks, check) = scripted(&["MAINTENANCE", "MAINTENANCE", "ACTIVE"]);
        let poller = OperationPoller::default();
        let mut events = poller.events.subscribe();

        poller
            .poll_until_complete(
                "createKeyspace",
                |_| async { Ok(()) },
                check,
                &PollOptions::blocking(Duration::from_millis(1), None),
            )
            .await
            .unwrap();

        assert_eq!(checks.load(Ordering::SeqCst), 3);
        let names: Vec<&str> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|event| event.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "adminCommandStarted",
                "adminCommandPolling",
                "adminCommandPolling",
                "adminCommandSucceeded"
            ]
        );
    }

    #[tokio::test]
    async fn test_unexpected_state_carries_payload() {
        let (_, check) = scripted(&["PENDING", "ERROR"]);
        let err = OperationPoller::default()
            .poll_until_complete(
                "dropKeyspace",
                |_| async { Ok(()) },
                check,
                &PollOptions::blocking(Duration::from_millis(1), None),
            )
            .await
            .unwrap_err();

        let DataApiError::Admin(AdminError::UnexpectedState { observed, payload, .. }) = err else {
            panic!("expected an unexpected-state error");
        };
        assert_eq!(observed, "ERROR");
        assert_eq!(payload, json!({"status": "ERROR"}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_checked_before_sleeping() {
        let (checks, check) = scripted(&["PENDING"]);
        let err = OperationPoller::default()
            .poll_until_complete(
                "createDatabase",
                |_| async { Ok(()) },
                check,
                &PollOptions::blocking(Duration::from_millis(20), Some(Duration::from_millis(55))),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DataApiError::Admin(AdminError::Timeout { budget_ms: 55, .. })));
        // Two 20ms waits fit in 55ms, a third does not.
        assert_eq!(checks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_budget_shorter_than_interval_fails_without_checking() {
        let (checks, check) = scripted(&["PENDING"]);
        let err = OperationPoller::default()
            .poll_until_complete(
                "createDatabase",
                |_| async { Ok(()) },
                check,
                &PollOptions::blocking(Duration::from_secs(10), Some(Duration::from_secs(1))),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DataApiError::Admin(AdminError::Timeout { .. })));
        assert_eq!(checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_waiting() {
        let (_, check) = scripted(&["PENDING"]);
        let token = CancellationToken::new();
        let options = PollOptions {
            cancel: Some(token.clone()),
            ..PollOptions::blocking(Duration::from_secs(60), None)
        };

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token.cancel();
        });
        let err = OperationPoller::default()
            .poll_until_complete("dropDatabase", |_| async { Ok(()) }, check, &options)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, DataApiError::Admin(AdminError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_start_failure_skips_polling() {
        let (checks, check) = scripted(&["ACTIVE"]);
        let err = OperationPoller::default()
            .poll_until_complete::<(), _, _, _, _>(
                "createKeyspace",
                |_| async { Err(AdminError::MissingDatabaseId("no location".into()).into()) },
                check,
                &PollOptions::blocking(Duration::from_millis(1), None),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DataApiError::Admin(AdminError::MissingDatabaseId(_))));
        assert_eq!(checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_status_check_draws_from_the_budget() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let slow_check = move |budget: TimeoutBudget| {
            let recorded = recorded.clone();
            async move {
                let timeout = budget.request_timeout()?;
                recorded.lock().unwrap().push(timeout);
                tokio::time::sleep(timeout.min(Duration::from_millis(400))).await;
                Err::<PollStatus, _>(DataApiError::from(TransportError::Timeout {
                    elapsed_ms: timeout.as_millis() as u64,
                    budget_ms: timeout.as_millis() as u64,
                }))
            }
        };

        let started = tokio::time::Instant::now();
        let err = OperationPoller::default()
            .poll_until_complete(
                "createKeyspace",
                |budget: TimeoutBudget| async move { budget.request_timeout().map(|_| ()) },
                slow_check,
                &PollOptions::blocking(Duration::from_millis(1), Some(Duration::from_millis(50))),
            )
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(150));
        assert!(matches!(err, DataApiError::Admin(AdminError::Timeout { budget_ms: 50, .. })));
        assert_eq!(*seen.lock().unwrap(), vec![Duration::from_millis(49)]);
    }
}
