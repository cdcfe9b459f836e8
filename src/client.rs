//! Command dispatch
//!
//! [`CommandClient`] is the single path every Data API command takes: it
//! wraps the command envelope, draws a timeout from the operation's budget,
//! traces and publishes lifecycle events, and (for [`CommandClient::run`])
//! turns soft failures into [`ResponseError`]s.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ResponseError, Result};
use crate::events::{CommandEvent, EventBus, EventMeta};
use crate::timeout::TimeoutBudget;
use crate::transport::{CommandTarget, CommandTransport, DataApiResponse};

/// Build a `{ "<name>": body }` command envelope.
pub fn command(name: &str, body: Value) -> Value {
    let mut envelope = Map::with_capacity(1);
    envelope.insert(name.to_string(), body);
    Value::Object(envelope)
}

/// Name of an envelope's single command.
pub fn command_name(command: &Value) -> &str {
    command
        .as_object()
        .and_then(|obj| obj.keys().next())
        .map(String::as_str)
        .unwrap_or("<unknown>")
}

/// Shared, cheaply cloneable command dispatcher.
#[derive(Clone)]
pub struct CommandClient {
    transport: Arc<dyn CommandTransport>,
    events: EventBus,
    request_timeout: Duration,
}

impl CommandClient {
    /// # Arguments
    /// * `transport` - Transport shared by every clone of this client
    /// * `events` - Lifecycle event publisher
    /// * `request_timeout` - Default timeout of a single request
    pub fn new(
        transport: Arc<dyn CommandTransport>,
        events: EventBus,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            events,
            request_timeout,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Start a budget for one logical operation.
    pub fn budget(&self, max_time: Option<Duration>) -> TimeoutBudget {
        TimeoutBudget::new(max_time, self.request_timeout)
    }

    /// Send a command and return the envelope as received, soft errors included.
    ///
    /// Hard failures are returned as errors.
    pub async fn dispatch(
        &self,
        target: &CommandTarget,
        command: &Value,
        budget: &TimeoutBudget,
    ) -> Result<DataApiResponse> {
        let name = command_name(command).to_string();
        let request_id = Uuid::new_v4();
        let timeout = budget.request_timeout()?;
        let started = Instant::now();

        debug!("Dispatching '{}' to {} (timeout {:?})", name, target, timeout);
        self.events.emit(CommandEvent::CommandStarted {
            meta: EventMeta::new(request_id),
            command_name: name.clone(),
            target: target.to_string(),
            timeout,
        });

        let outcome = self.transport.execute(target, command, timeout).await;
        let duration = started.elapsed();

        match &outcome {
            Ok(response) if response.is_soft_failure() => {
                debug!(
                    "'{}' on {} returned {} error(s)",
                    name,
                    target,
                    response.errors.len()
                );
                self.events.emit(CommandEvent::CommandFailed {
                    meta: EventMeta::new(request_id),
                    command_name: name.clone(),
                    target: target.to_string(),
                    duration,
                    error: ResponseError::new(command.clone(), response.clone()).to_string(),
                });
            }
            Ok(_) => {
                self.events.emit(CommandEvent::CommandSucceeded {
                    meta: EventMeta::new(request_id),
                    command_name: name.clone(),
                    target: target.to_string(),
                    duration,
                });
            }
            Err(err) => {
                warn!("'{}' on {} failed: {}", name, target, err);
                self.events.emit(CommandEvent::CommandFailed {
                    meta: EventMeta::new(request_id),
                    command_name: name.clone(),
                    target: target.to_string(),
                    duration,
                    error: err.to_string(),
                });
            }
        }

        if let Ok(response) = &outcome {
            let warnings = response.warnings();
            if !warnings.is_empty() {
                for warning in &warnings {
                    warn!("'{}' warning: {}", name, warning);
                }
                self.events.emit(CommandEvent::CommandWarnings {
                    meta: EventMeta::new(request_id),
                    command_name: name,
                    warnings,
                });
            }
        }

        outcome
    }

    /// Send a command, raising soft failures as [`ResponseError`].
    pub async fn run(
        &self,
        target: &CommandTarget,
        command: Value,
        budget: &TimeoutBudget,
    ) -> Result<DataApiResponse> {
        let response = self.dispatch(target, &command, budget).await?;
        if response.is_soft_failure() {
            return Err(ResponseError::new(command, response).into());
        }
        Ok(response)
    }
}
