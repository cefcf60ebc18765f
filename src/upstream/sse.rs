//! Server-Sent-Events upstream
//!
//! Subscribes to `GET {endpoint}/{hub}/events?consumer_group={group}` and
//! turns the event stream into record batches. Events that are already
//! buffered when the handler becomes free are grouped into one batch.
//!
//! Automatic reconnection is disabled: when the stream ends or fails the
//! subscription stops reporting itself as running and the supervisor decides
//! what happens next.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::RequestBuilder;
use reqwest_eventsource::{retry, Event, EventSource};
use tokio::task::{AbortHandle, JoinHandle};

use crate::config::{ConnectionString, DEFAULT_CONSUMER_GROUP};

use super::{
    EventHandler, EventRecord, StartPosition, Subscription, UpstreamClient, UpstreamConnector,
    UpstreamError,
};

/// Default upper bound on records per batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

/// SSE upstream configuration
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// Endpoint and credentials
    pub connection: ConnectionString,

    /// Name of the event stream to subscribe to
    pub event_hub_name: String,

    /// Consumer group passed to the upstream
    pub consumer_group: String,

    /// Maximum records folded into one batch
    pub max_batch_size: usize,

    /// TCP connect timeout for the HTTP client
    pub connect_timeout: Duration,
}

impl SseConfig {
    pub fn new(connection: ConnectionString, event_hub_name: impl Into<String>) -> Self {
        Self {
            connection,
            event_hub_name: event_hub_name.into(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the consumer group
    pub fn consumer_group(mut self, group: impl Into<String>) -> Self {
        self.consumer_group = group.into();
        self
    }

    /// Set the maximum batch size (at least 1)
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// URL of the event stream
    pub fn events_url(&self) -> String {
        format!(
            "{}/{}/events",
            self.connection.endpoint,
            self.event_hub_name.trim_matches('/')
        )
    }
}

/// Builds [`SseClient`]s from a fixed configuration
pub struct SseConnector {
    config: SseConfig,
}

impl SseConnector {
    pub fn new(config: SseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl UpstreamConnector for SseConnector {
    type Client = SseClient;

    async fn connect(&self) -> Result<SseClient, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .build()
            .map_err(|e| UpstreamError::Connect(e.to_string()))?;

        tracing::debug!(url = %self.config.events_url(), "Upstream client created");

        Ok(SseClient {
            http,
            config: self.config.clone(),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// HTTP client for an SSE upstream
pub struct SseClient {
    http: reqwest::Client,
    config: SseConfig,
    /// Delivery tasks started by this client, aborted on close
    tasks: Mutex<Vec<AbortHandle>>,
}

impl SseClient {
    fn request(&self, position: &StartPosition) -> RequestBuilder {
        let mut request = self
            .http
            .get(self.config.events_url())
            .query(&[("consumer_group", self.config.consumer_group.as_str())]);

        if let Some(ref key) = self.config.connection.access_key {
            request = request.bearer_auth(key);
        }
        if let StartPosition::After(id) = position {
            request = request.header("Last-Event-ID", id.as_str());
        }

        request
    }
}

#[async_trait]
impl UpstreamClient for SseClient {
    type Subscription = SseSubscription;

    fn subscribe(&self, handler: Arc<dyn EventHandler>, position: StartPosition) -> SseSubscription {
        let request = self.request(&position);
        let running = Arc::new(AtomicBool::new(true));
        let max_batch_size = self.config.max_batch_size;

        let task = tokio::spawn({
            let running = Arc::clone(&running);
            async move {
                run_subscription(request, handler, max_batch_size).await;
                running.store(false, Ordering::SeqCst);
                tracing::debug!("Upstream delivery task finished");
            }
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(task.abort_handle());

        SseSubscription {
            running,
            task: Mutex::new(Some(task)),
        }
    }

    async fn close(&self) -> Result<(), UpstreamError> {
        let tasks: Vec<AbortHandle> = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        for task in tasks {
            task.abort();
        }

        Ok(())
    }
}

/// Live SSE subscription
pub struct SseSubscription {
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Subscription for SseSubscription {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), UpstreamError> {
        self.running.store(false, Ordering::SeqCst);

        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.abort();
            // Cancelled is the expected outcome
            let _ = task.await;
        }

        Ok(())
    }
}

/// One classified item from the event stream
#[derive(Debug)]
pub(crate) enum StreamItem {
    Opened,
    Record(EventRecord),
    Error(UpstreamError),
    Ended,
}

impl From<Result<Event, reqwest_eventsource::Error>> for StreamItem {
    fn from(item: Result<Event, reqwest_eventsource::Error>) -> Self {
        match item {
            Ok(Event::Open) => StreamItem::Opened,
            Ok(Event::Message(message)) => {
                let mut record = EventRecord::new(message.data);
                if !message.id.is_empty() {
                    record = record.with_id(message.id);
                }
                StreamItem::Record(record)
            }
            Err(reqwest_eventsource::Error::StreamEnded) => StreamItem::Ended,
            Err(e) => StreamItem::Error(e.into()),
        }
    }
}

async fn run_subscription(
    request: RequestBuilder,
    handler: Arc<dyn EventHandler>,
    max_batch_size: usize,
) {
    let mut source = match EventSource::new(request) {
        Ok(source) => source,
        Err(e) => {
            handler
                .process_error(UpstreamError::InvalidRequest(e.to_string()))
                .await;
            return;
        }
    };
    source.set_retry_policy(Box::new(retry::Never));

    pump(source.map(StreamItem::from), handler.as_ref(), max_batch_size).await;
}

/// Drive classified stream items into `handler` until the stream finishes
///
/// Records are flushed before any error that follows them so the handler
/// observes upstream order.
pub(crate) async fn pump<S>(items: S, handler: &dyn EventHandler, max_batch_size: usize)
where
    S: Stream<Item = StreamItem>,
{
    let chunks = items.ready_chunks(max_batch_size.max(1));
    futures::pin_mut!(chunks);

    while let Some(chunk) = chunks.next().await {
        let mut records = Vec::with_capacity(chunk.len());
        let mut ended = false;

        for item in chunk {
            match item {
                StreamItem::Opened => tracing::info!("Upstream event stream opened"),
                StreamItem::Record(record) => records.push(record),
                StreamItem::Error(error) => {
                    if !records.is_empty() {
                        handler.process_events(std::mem::take(&mut records)).await;
                    }
                    handler.process_error(error).await;
                }
                StreamItem::Ended => {
                    tracing::info!("Upstream event stream ended");
                    ended = true;
                    break;
                }
            }
        }

        if !records.is_empty() {
            handler.process_events(records).await;
        }
        if ended {
            break;
        }
    }
}
