//! Span processors: hooks between span lifecycle and exporters.
//!
//! The batch processor buffers ended spans and hands them to its exporter
//! when the batch fills or a timer fires, preserving end order within a
//! batch. Dropped spans (queue overflow) are counted and logged, never
//! blocked on.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use conductor_api::{TraceError, TraceResult};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::export::{SpanData, SpanExporter};
use crate::span::Span;

/// Default maximum queue size.
const DEFAULT_MAX_QUEUE_SIZE: usize = 2_048;
/// Default delay interval between two consecutive exports.
const DEFAULT_SCHEDULED_DELAY: Duration = Duration::from_secs(5);
/// Default maximum batch size.
const DEFAULT_MAX_EXPORT_BATCH_SIZE: usize = 512;
/// Default maximum allowed time to export data.
const DEFAULT_MAX_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// `SpanProcessor` is an interface which allows hooks for span start and
/// end method invocations.
#[async_trait]
pub trait SpanProcessor: Send + Sync + Debug {
    /// Called synchronously when a recording span starts.
    fn on_start(&self, span: &mut Span);
    /// Called synchronously from `Span::end`; must not block.
    fn on_end(&self, span: SpanData);
    /// Export whatever is buffered.
    async fn force_flush(&self) -> TraceResult<()>;
    /// Flush and release resources.
    async fn shutdown(&self) -> TraceResult<()>;
}

/// A [`SpanProcessor`] that forwards each ended span to its exporter
/// immediately. Meant for tests and tooling, not production throughput.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    sender: mpsc::UnboundedSender<Message>,
}

impl SimpleSpanProcessor {
    /// Wrap an exporter.
    pub fn new(exporter: Box<dyn SpanExporter>) -> Self {
        let (sender, mut rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Export(span) => {
                        if let Err(err) = exporter.export(vec![span]).await {
                            warn!(error = %err, "simple span processor export failed");
                        }
                    }
                    Message::Flush(ack) => {
                        let _ = ack.send(Ok(()));
                    }
                    Message::Shutdown(ack) => {
                        exporter.shutdown();
                        let _ = ack.send(Ok(()));
                        return;
                    }
                }
            }
            exporter.shutdown();
        });
        SimpleSpanProcessor { sender }
    }
}

#[derive(Debug)]
enum Message {
    Export(SpanData),
    Flush(oneshot::Sender<TraceResult<()>>),
    Shutdown(oneshot::Sender<TraceResult<()>>),
}

#[async_trait]
impl SpanProcessor for SimpleSpanProcessor {
    fn on_start(&self, _span: &mut Span) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }
        if self.sender.send(Message::Export(span)).is_err() {
            warn!("simple span processor worker is gone; span dropped");
        }
    }

    async fn force_flush(&self) -> TraceResult<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Message::Flush(ack))
            .map_err(|_| TraceError::Unavailable("span processor is shut down".into()))?;
        done.await
            .map_err(|_| TraceError::Unavailable("span processor dropped flush ack".into()))?
    }

    async fn shutdown(&self) -> TraceResult<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Message::Shutdown(ack))
            .map_err(|_| TraceError::Unavailable("span processor is shut down".into()))?;
        done.await
            .map_err(|_| TraceError::Unavailable("span processor dropped shutdown ack".into()))?
    }
}

/// Batch span processor configuration.
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Maximum queue size; spans are dropped when the queue is full.
    pub max_queue_size: usize,
    /// Delay interval between two consecutive batch exports.
    pub scheduled_delay: Duration,
    /// Maximum number of spans in a single batch.
    pub max_export_batch_size: usize,
    /// Maximum duration allowed for exporting one batch.
    pub max_export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            scheduled_delay: DEFAULT_SCHEDULED_DELAY,
            max_export_batch_size: DEFAULT_MAX_EXPORT_BATCH_SIZE,
            max_export_timeout: DEFAULT_MAX_EXPORT_TIMEOUT,
        }
    }
}

impl BatchConfig {
    /// Set the maximum queue size.
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Set the delay between scheduled exports.
    pub fn with_scheduled_delay(mut self, delay: Duration) -> Self {
        self.scheduled_delay = delay;
        self
    }

    /// Set the maximum export batch size. Values above the queue size are
    /// lowered to it.
    pub fn with_max_export_batch_size(mut self, size: usize) -> Self {
        self.max_export_batch_size = size.min(self.max_queue_size);
        self
    }

    /// Set the export deadline per batch.
    pub fn with_max_export_timeout(mut self, timeout: Duration) -> Self {
        self.max_export_timeout = timeout;
        self
    }
}

/// A [`SpanProcessor`] that buffers finished spans and exports them in
/// batches, either when the batch fills or on a timer.
#[derive(Debug)]
pub struct BatchSpanProcessor {
    sender: mpsc::Sender<BatchMessage>,
}

#[derive(Debug)]
enum BatchMessage {
    ExportSpan(SpanData),
    Flush(oneshot::Sender<TraceResult<()>>),
    Shutdown(oneshot::Sender<TraceResult<()>>),
}

impl BatchSpanProcessor {
    /// Spawn the worker task and wrap an exporter.
    pub fn new(exporter: Box<dyn SpanExporter>, config: BatchConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.max_queue_size.max(1));
        tokio::spawn(run_worker(exporter, config, receiver));
        BatchSpanProcessor { sender }
    }
}

#[async_trait]
impl SpanProcessor for BatchSpanProcessor {
    fn on_start(&self, _span: &mut Span) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }
        if let Err(err) = self.sender.try_send(BatchMessage::ExportSpan(span)) {
            warn!(error = %err, "batch span queue full; span dropped");
        }
    }

    async fn force_flush(&self) -> TraceResult<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(BatchMessage::Flush(ack))
            .await
            .map_err(|_| TraceError::Unavailable("batch span processor is shut down".into()))?;
        done.await
            .map_err(|_| TraceError::Unavailable("batch span processor dropped flush ack".into()))?
    }

    async fn shutdown(&self) -> TraceResult<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(BatchMessage::Shutdown(ack))
            .await
            .map_err(|_| TraceError::Unavailable("batch span processor is shut down".into()))?;
        done.await
            .map_err(|_| TraceError::Unavailable("batch span processor dropped shutdown ack".into()))?
    }
}

async fn run_worker(
    exporter: Box<dyn SpanExporter>,
    config: BatchConfig,
    mut receiver: mpsc::Receiver<BatchMessage>,
) {
    let mut buffer: Vec<SpanData> = Vec::with_capacity(config.max_export_batch_size);
    let mut tick = tokio::time::interval(config.scheduled_delay);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tick.tick().await;

    loop {
        tokio::select! {
            message = receiver.recv() => match message {
                Some(BatchMessage::ExportSpan(span)) => {
                    buffer.push(span);
                    if buffer.len() >= config.max_export_batch_size {
                        export_batch(exporter.as_ref(), &config, &mut buffer).await;
                    }
                }
                Some(BatchMessage::Flush(ack)) => {
                    let result = export_batch(exporter.as_ref(), &config, &mut buffer).await;
                    let _ = ack.send(result);
                }
                Some(BatchMessage::Shutdown(ack)) => {
                    let result = export_batch(exporter.as_ref(), &config, &mut buffer).await;
                    exporter.shutdown();
                    let _ = ack.send(result);
                    return;
                }
                None => {
                    export_batch(exporter.as_ref(), &config, &mut buffer).await.ok();
                    exporter.shutdown();
                    return;
                }
            },
            _ = tick.tick() => {
                export_batch(exporter.as_ref(), &config, &mut buffer).await.ok();
            }
        }
    }
}

async fn export_batch(
    exporter: &dyn SpanExporter,
    config: &BatchConfig,
    buffer: &mut Vec<SpanData>,
) -> TraceResult<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    let batch = buffer.split_off(0);
    let count = batch.len();
    let export = exporter.export(batch);
    match tokio::time::timeout(config.max_export_timeout, export).await {
        Ok(Ok(())) => {
            debug!(count, "exported span batch");
            Ok(())
        }
        Ok(Err(err)) => {
            warn!(error = %err, count, "span batch export failed");
            Err(err)
        }
        Err(_) => {
            warn!(count, "span batch export timed out");
            Err(TraceError::Deadline(config.max_export_timeout))
        }
    }
}
