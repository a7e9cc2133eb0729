//! Job-created consumer for the chunking worker
//!
//! Per delivery: `Delivered -> Processing -> Acked | Requeued | Rejected`.
//! Undecodable bodies are rejected without requeue. Each decoded event is
//! processed on its own task; the broker bounds how many deliveries are
//! outstanding through the prefetch count. [`DeliveryLoop`] owns that state
//! machine over any stream of [`IncomingDelivery`]; [`ChunkerConsumer`] feeds
//! it from an AMQP queue.

use async_trait::async_trait;
use chunkflow_common::JobCreatedEvent;
use futures::{Stream, StreamExt};
use lapin::{
    acker::Acker,
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    Channel, Connection,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};

use super::{amqp::declare_exchange, BusError};
use crate::chunker::{ChunkerError, ChunkerUseCase, ChunkingReport};
use crate::config::AmqpConfig;

/// Unacknowledged deliveries allowed per consumer channel
pub const PREFETCH_COUNT: u16 = 1;

#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process_job(&self, event: &JobCreatedEvent) -> Result<ChunkingReport, ChunkerError>;
}

#[async_trait]
impl JobProcessor for ChunkerUseCase {
    async fn process_job(&self, event: &JobCreatedEvent) -> Result<ChunkingReport, ChunkerError> {
        ChunkerUseCase::process_job(self, event).await
    }
}

/// How a delivery is settled with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Ack,
    /// Nack with requeue; the broker redelivers
    Requeue,
    /// Nack without requeue; dropped or dead-lettered
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Reject instead of requeue when a failure will recur on redelivery
    pub drop_permanent_failures: bool,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            drop_permanent_failures: false,
        }
    }
}

pub fn decode_delivery(body: &[u8]) -> Result<JobCreatedEvent, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Run the processor on one event and decide how to settle its delivery
pub async fn process_event<P: JobProcessor + ?Sized>(
    processor: &P,
    event: &JobCreatedEvent,
    policy: DeliveryPolicy,
) -> DeliveryOutcome {
    match processor.process_job(event).await {
        Ok(report) => {
            debug!(chunks = report.chunks, "Job processed");
            DeliveryOutcome::Ack
        },
        Err(e) if e.is_permanent() && policy.drop_permanent_failures => {
            error!(error = %e, "Job failed permanently, rejecting delivery");
            DeliveryOutcome::Reject
        },
        Err(e) => {
            warn!(error = %e, "Job failed, requeueing delivery");
            DeliveryOutcome::Requeue
        },
    }
}

/// Settles one delivery with the broker
#[async_trait]
pub trait DeliverySettler: Send + Sync + 'static {
    async fn settle(&self, outcome: DeliveryOutcome) -> Result<(), BusError>;
}

#[async_trait]
impl DeliverySettler for Acker {
    async fn settle(&self, outcome: DeliveryOutcome) -> Result<(), BusError> {
        match outcome {
            DeliveryOutcome::Ack => self.ack(BasicAckOptions::default()).await?,
            DeliveryOutcome::Requeue => {
                self.nack(BasicNackOptions {
                    multiple: false,
                    requeue: true,
                })
                .await?
            },
            DeliveryOutcome::Reject => {
                self.nack(BasicNackOptions {
                    multiple: false,
                    requeue: false,
                })
                .await?
            },
        }
        Ok(())
    }
}

/// A delivery pulled from the queue, detached from the AMQP client
pub struct IncomingDelivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub body: Vec<u8>,
    pub settler: Box<dyn DeliverySettler>,
}

impl From<Delivery> for IncomingDelivery {
    fn from(delivery: Delivery) -> Self {
        Self {
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            body: delivery.data,
            settler: Box::new(delivery.acker),
        }
    }
}

/// Drives deliveries through a [`JobProcessor`] until shutdown or the end of
/// the stream, then waits up to `shutdown_grace` for in-flight jobs.
pub struct DeliveryLoop<P> {
    processor: Arc<P>,
    policy: DeliveryPolicy,
    shutdown_grace: Duration,
}

impl<P: JobProcessor> DeliveryLoop<P> {
    pub fn new(processor: Arc<P>, policy: DeliveryPolicy, shutdown_grace: Duration) -> Self {
        Self {
            processor,
            policy,
            shutdown_grace,
        }
    }

    pub async fn run<S>(
        &self,
        mut deliveries: S,
        shutdown: CancellationToken,
    ) -> Result<(), BusError>
    where
        S: Stream<Item = Result<IncomingDelivery, BusError>> + Unpin,
    {
        let tasks = TaskTracker::new();
        let result = loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, no longer pulling deliveries");
                    break Ok(());
                },
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => self.dispatch(&tasks, delivery).await,
                    Some(Err(e)) => {
                        error!(error = %e, "Delivery stream failed");
                        break Err(e);
                    },
                    None => {
                        warn!("Delivery stream closed by broker");
                        break Ok(());
                    },
                },
            }
        };

        tasks.close();
        if tokio::time::timeout(self.shutdown_grace, tasks.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = tasks.len(),
                grace_ms = self.shutdown_grace.as_millis() as u64,
                "Grace period elapsed with jobs still running"
            );
        }

        result
    }

    async fn dispatch(&self, tasks: &TaskTracker, delivery: IncomingDelivery) {
        let event = match decode_delivery(&delivery.body) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Undecodable job-created event, rejecting"
                );
                if let Err(e) = delivery.settler.settle(DeliveryOutcome::Reject).await {
                    error!(error = %e, "Failed to reject delivery");
                }
                return;
            },
        };

        let processor = Arc::clone(&self.processor);
        let policy = self.policy;
        let span = tracing::info_span!(
            "job",
            job_id = %event.job_id,
            delivery_tag = delivery.delivery_tag,
            redelivered = delivery.redelivered,
        );

        tasks.spawn(
            async move {
                let outcome = process_event(processor.as_ref(), &event, policy).await;
                if let Err(e) = delivery.settler.settle(outcome).await {
                    error!(?outcome, error = %e, "Failed to settle delivery");
                }
            }
            .instrument(span),
        );
    }
}

pub struct ChunkerConsumer<P> {
    channel: Channel,
    queue: String,
    consumer_tag: String,
    deliveries: DeliveryLoop<P>,
}

impl<P: JobProcessor> ChunkerConsumer<P> {
    /// Open a channel, declare exchange and durable queue, bind them and set
    /// the prefetch bound.
    pub async fn new(
        connection: &Connection,
        config: &AmqpConfig,
        processor: Arc<P>,
        policy: DeliveryPolicy,
        shutdown_grace: Duration,
    ) -> Result<Self, BusError> {
        let channel = connection.create_channel().await?;
        declare_exchange(&channel, &config.exchange).await?;

        let mut arguments = FieldTable::default();
        if let Some(dlx) = &config.dead_letter_exchange {
            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString(dlx.as_str().into()),
            );
        }

        channel
            .queue_declare(
                &config.job_created_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                arguments,
            )
            .await?;

        channel
            .queue_bind(
                &config.job_created_queue,
                &config.exchange,
                &config.job_created_routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await?;

        info!(
            queue = %config.job_created_queue,
            routing_key = %config.job_created_routing_key,
            dead_letter_exchange = ?config.dead_letter_exchange,
            "Consumer queue ready"
        );

        Ok(Self {
            channel,
            queue: config.job_created_queue.clone(),
            consumer_tag: consumer_tag(),
            deliveries: DeliveryLoop::new(processor, policy, shutdown_grace),
        })
    }

    /// Consume until `shutdown` fires or the broker closes the stream
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), BusError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(consumer_tag = %self.consumer_tag, "Consuming job-created events");

        let deliveries =
            consumer.map(|next| next.map(IncomingDelivery::from).map_err(BusError::from));
        self.deliveries.run(deliveries, shutdown).await
    }
}

fn consumer_tag() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("chunkflow-chunker-{}-{}", host, std::process::id())
}
