//! AMQP plumbing shared by the publisher and the consumer.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Queue};
use shared::{OrderMessage, JSON_CONTENT_TYPE};
use tracing::{debug, info};

const REPLY_SUCCESS: u16 = 200;

pub async fn open_channel(amqp_url: &str) -> Result<(Connection, Channel)> {
    let connection = Connection::connect(amqp_url, ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;
    let channel = connection
        .create_channel()
        .await
        .context("Failed to open a channel")?;
    Ok((connection, channel))
}

/// Declares the durable order queue. Safe to repeat while the properties
/// match.
pub async fn declare_queue(channel: &Channel, name: &str) -> Result<Queue> {
    let options = QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    };
    channel
        .queue_declare(name, options, FieldTable::default())
        .await
        .with_context(|| format!("Failed to declare queue {name}"))
}

pub async fn close(connection: Connection, channel: Channel) {
    if let Err(e) = channel.close(REPLY_SUCCESS, "OK").await {
        debug!(error = %e, "Channel close failed");
    }
    if let Err(e) = connection.close(REPLY_SUCCESS, "OK").await {
        debug!(error = %e, "Connection close failed");
    }
}

pub type DynPublisher = Arc<dyn Publisher>;

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &OrderMessage) -> Result<()>;
}

/// Publishes each message over its own short-lived connection.
#[derive(Debug, Clone)]
pub struct AmqpPublisher {
    amqp_url: String,
    queue: String,
}

impl AmqpPublisher {
    pub fn new(amqp_url: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            amqp_url: amqp_url.into(),
            queue: queue.into(),
        }
    }

    /// Makes sure the queue exists before anything is published or consumed.
    pub async fn declare(&self) -> Result<()> {
        let (connection, channel) = open_channel(&self.amqp_url).await?;
        let declared = declare_queue(&channel, &self.queue).await;
        close(connection, channel).await;
        let queue = declared?;
        info!(queue = %queue.name(), messages = queue.message_count(), "Queue declared");
        Ok(())
    }

    async fn publish_on(&self, channel: &Channel, message: &OrderMessage) -> Result<()> {
        let queue = declare_queue(channel, &self.queue).await?;
        let payload = message.to_payload()?;

        // default exchange, routed by queue name; no mandatory flag
        channel
            .basic_publish(
                "",
                queue.name().as_str(),
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type(JSON_CONTENT_TYPE.into()),
            )
            .await?
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(&self, message: &OrderMessage) -> Result<()> {
        let (connection, channel) = open_channel(&self.amqp_url).await?;
        let result = self.publish_on(&channel, message).await;
        close(connection, channel).await;
        result?;
        debug!(ticket_id = message.ticket_id, queue = %self.queue, "Order published");
        Ok(())
    }
}
