//! Message bus
//!
//! Publishing goes through [`MessagePublisher`] so the use cases can run
//! against AMQP in production and [`memory::MemoryPublisher`] in tests.
//! [`retry::publish_with_retry`] layers bounded exponential backoff on top of
//! any publisher. [`consumer::ChunkerConsumer`] drives the chunking worker.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod amqp;
pub mod consumer;
pub mod memory;
pub mod retry;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish one message. Returns once the broker accepted the frame; there
    /// is no delivery confirmation beyond this call's own error.
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), BusError>;
}

/// Serialize `message` as JSON
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, BusError> {
    Ok(serde_json::to_vec(message)?)
}

/// Serialize `message` as JSON and publish it once
pub async fn publish_json<T: Serialize + Sync>(
    publisher: &dyn MessagePublisher,
    routing_key: &str,
    message: &T,
) -> Result<(), BusError> {
    let payload = encode(message)?;
    publisher.publish(routing_key, &payload).await
}
