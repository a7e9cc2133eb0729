//! AMQP 0-9-1 publisher on top of `lapin`

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tracing::{debug, info, instrument};

use super::{BusError, MessagePublisher};

/// Persistent delivery mode
const DELIVERY_MODE_PERSISTENT: u8 = 2;

pub async fn connect(url: &str) -> Result<Connection, BusError> {
    let connection = Connection::connect(url, ConnectionProperties::default()).await?;
    info!("AMQP connection established");
    Ok(connection)
}

/// Declare the durable topic exchange every message goes through
pub async fn declare_exchange(channel: &Channel, exchange: &str) -> Result<(), BusError> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    debug!(exchange, "Exchange declared");
    Ok(())
}

/// Publishes JSON messages to one topic exchange on a dedicated channel
#[derive(Clone)]
pub struct AmqpPublisher {
    channel: Channel,
    exchange: String,
}

impl AmqpPublisher {
    pub async fn new(connection: &Connection, exchange: impl Into<String>) -> Result<Self, BusError> {
        let exchange = exchange.into();
        let channel = connection.create_channel().await?;
        declare_exchange(&channel, &exchange).await?;

        Ok(Self { channel, exchange })
    }
}

#[async_trait]
impl MessagePublisher for AmqpPublisher {
    #[instrument(skip(self, payload), fields(exchange = %self.exchange, size = payload.len()))]
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), BusError> {
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT);

        // Confirms are not enabled on this channel; the returned confirmation
        // resolves immediately and is not awaited.
        let _confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await?;

        Ok(())
    }
}
