use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::client::CommandClient;
use crate::error::{CumulativeOperationError, Result};
use crate::transport::{CommandTarget, DataApiResponse};

use super::operation::DispatchUnit;
use super::result::{BatchAggregate, FailedRequest};

/// Default number of requests kept in flight by an unordered batch.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default number of documents per `insertMany` request.
pub const DEFAULT_CHUNK_SIZE: usize = 20;

/// Options of a multi-request write.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    /// Stop at the first failing unit and dispatch strictly in sequence
    pub ordered: bool,

    /// Maximum requests in flight (unordered only)
    pub concurrency: usize,

    /// Documents per `insertMany` request
    pub chunk_size: usize,

    /// Budget of the whole operation
    pub max_time: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            ordered: false,
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_time: None,
        }
    }
}

impl BatchOptions {
    pub fn ordered() -> Self {
        Self {
            ordered: true,
            ..Self::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    /// Concurrency actually used: 1 when ordered, never below 1.
    pub fn effective_concurrency(&self) -> usize {
        if self.ordered {
            1
        } else {
            self.concurrency.max(1)
        }
    }

    /// Chunk size actually used, never below 1.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }
}

/// Runs dispatch units against one target and folds their responses.
pub struct BatchExecutor {
    client: CommandClient,
    target: CommandTarget,
}

impl BatchExecutor {
    pub fn new(client: CommandClient, target: CommandTarget) -> Self {
        Self { client, target }
    }

    /// Dispatch every unit and aggregate the outcome.
    ///
    /// # Arguments
    /// * `operation` - Logical operation name used in logs
    /// * `units` - Requests in original order
    /// * `options` - Ordering, concurrency and budget
    ///
    /// # Returns
    /// * `Ok(R)` - Every unit succeeded
    /// * `Err(DataApiError::Cumulative)` - Some units returned error descriptors;
    ///   the partial result covers every unit that completed
    /// * `Err(_)` - A hard failure, returned as is; in-flight units are dropped
    pub async fn execute<R: BatchAggregate>(
        &self,
        operation: &str,
        units: Vec<DispatchUnit>,
        options: &BatchOptions,
    ) -> Result<R> {
        let mut result = R::default();
        if units.is_empty() {
            debug!("{} has nothing to dispatch", operation);
            return Ok(result);
        }

        let budget = self.client.budget(options.max_time);
        let concurrency = options.effective_concurrency();
        let total = units.len();
        let mut failed = Vec::new();

        info!(
            "Running {} as {} request(s) (ordered: {}, concurrency: {})",
            operation, total, options.ordered, concurrency
        );

        if options.ordered {
            for unit in units {
                let response = self
                    .client
                    .dispatch(&self.target, &unit.command, &budget)
                    .await?;
                if absorb(&mut result, &mut failed, unit, response) {
                    break;
                }
            }
        } else {
            let client = &self.client;
            let target = &self.target;
            let budget = &budget;

            let mut responses = stream::iter(units)
                .map(move |unit| async move {
                    let outcome = client.dispatch(target, &unit.command, budget).await;
                    (unit, outcome)
                })
                .buffer_unordered(concurrency);

            while let Some((unit, outcome)) = responses.next().await {
                absorb(&mut result, &mut failed, unit, outcome?);
            }
        }

        if failed.is_empty() {
            debug!("{} completed {} request(s)", operation, total);
            return Ok(result);
        }

        failed.sort_by_key(|request: &FailedRequest| request.index);
        debug!(
            "{} finished with {} failed request(s) out of {}",
            operation,
            failed.len(),
            total
        );
        Err(CumulativeOperationError::new(result.into_partial(), failed).into())
    }
}

/// Fold one response into the result. Returns whether the unit soft-failed.
fn absorb<R: BatchAggregate>(
    result: &mut R,
    failed: &mut Vec<FailedRequest>,
    unit: DispatchUnit,
    response: DataApiResponse,
) -> bool {
    // Failed units may still report partial progress (a partly inserted chunk).
    result.absorb(&unit, &response);
    if !response.is_soft_failure() {
        return false;
    }
    failed.push(FailedRequest::new(unit.index, unit.command, response));
    true
}
