//! Scripted transports shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::client::{CommandClient, command_name};
use crate::error::{DataApiError, Result, TransportError};
use crate::events::EventBus;
use crate::transport::{
    CommandTarget, CommandTransport, DataApiResponse, DevOpsRequest, DevOpsResponse, DevOpsTransport,
};
use crate::Document;

type Handler = dyn Fn(&CommandTarget, &Value) -> Result<Value> + Send + Sync;
type DelayFn = dyn Fn(&Value) -> Duration + Send + Sync;

/// Command transport answering from a closure and recording every call.
pub struct MockTransport {
    handler: Box<Handler>,
    delay: Option<Box<DelayFn>>,
    calls: Mutex<Vec<(CommandTarget, Value)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&CommandTarget, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold each call open for a command-dependent time.
    pub fn with_delay<F>(mut self, delay: F) -> Self
    where
        F: Fn(&Value) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn http_error(status: u16) -> DataApiError {
        TransportError::Http {
            status,
            body: "mock failure".to_string(),
        }
        .into()
    }

    pub fn calls(&self) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|cmd| command_name(cmd).to_string())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandTransport for MockTransport {
    async fn execute(
        &self,
        target: &CommandTarget,
        command: &Value,
        _timeout: Duration,
    ) -> Result<DataApiResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((target.clone(), command.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(command)).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let value = (self.handler)(target, command)?;
        DataApiResponse::from_value(value)
    }
}

type DevOpsHandler = dyn Fn(&DevOpsRequest) -> Result<DevOpsResponse> + Send + Sync;
type LatencyFn = dyn Fn(&DevOpsRequest) -> Duration + Send + Sync;

/// DevOps transport answering from a closure and recording every request.
pub struct MockDevOps {
    handler: Box<DevOpsHandler>,
    latency: Option<Box<LatencyFn>>,
    requests: Mutex<Vec<DevOpsRequest>>,
    timeouts: Mutex<Vec<Duration>>,
}

impl MockDevOps {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&DevOpsRequest) -> Result<DevOpsResponse> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: None,
            requests: Mutex::new(Vec::new()),
            timeouts: Mutex::new(Vec::new()),
        }
    }

    /// Answer after a request-dependent time, timing out like a real client.
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&DevOpsRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Box::new(latency));
        self
    }

    pub fn requests(&self) -> Vec<DevOpsRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Timeout passed with each request, in order.
    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DevOpsTransport for MockDevOps {
    async fn request(&self, request: &DevOpsRequest, timeout: Duration) -> Result<DevOpsResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.timeouts.lock().unwrap().push(timeout);

        let latency = self.latency.as_ref().map_or(Duration::ZERO, |latency| latency(request));
        if latency > timeout {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::Timeout {
                elapsed_ms: timeout.as_millis() as u64,
                budget_ms: timeout.as_millis() as u64,
            }
            .into());
        }
        if latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(latency).await;
        }
        (self.handler)(request)
    }
}

/// A client over a shared mock so tests keep access to the recorded calls.
pub fn mock_client(transport: &Arc<MockTransport>) -> CommandClient {
    CommandClient::new(
        transport.clone(),
        EventBus::new(64),
        Duration::from_secs(5),
    )
}

pub fn collection_target() -> CommandTarget {
    CommandTarget::Collection {
        keyspace: "default_keyspace".to_string(),
        collection: "items".to_string(),
    }
}

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap_or_default()
}

/// A `find` server over `total` documents `{_id: i}` paged `page_size` at a time.
///
/// The continuation token is the decimal offset of the next page. A server-side
/// `options.limit` caps the total, and `status.sortVector` is returned on the
/// first page when requested.
pub fn paged_find_server(
    total: usize,
    page_size: usize,
) -> impl Fn(&CommandTarget, &Value) -> Result<Value> + Send + Sync + 'static {
    move |_, command| {
        let find = &command["find"];
        let offset = find["options"]["pageState"]
            .as_str()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        let limit = find["options"]["limit"]
            .as_u64()
            .map(|l| l as usize)
            .unwrap_or(usize::MAX);
        let total = total.min(limit);
        let end = (offset + page_size).min(total);

        let documents: Vec<Value> = (offset..end).map(|i| json!({"_id": i})).collect();
        let next = if end < total {
            Value::String(end.to_string())
        } else {
            Value::Null
        };

        let mut response = json!({
            "data": {"documents": documents, "nextPageState": next}
        });
        if find["options"]["includeSortVector"] == json!(true) {
            response["status"] = json!({"sortVector": [0.25, 0.5]});
        }
        Ok(response)
    }
}
