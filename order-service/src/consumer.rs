//! Long-lived consumer of the order queue.
//!
//! Deliveries are handled one at a time with manual acknowledgement. A body
//! that does not decode is negatively acknowledged with requeue and will come
//! back indefinitely; anything that decodes is acknowledged once the
//! processor has run, whatever the outcome.

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, Consumer};
use shared::OrderMessage;
use tracing::{error, info, warn};

use crate::processor::OrderProcessor;
use crate::queue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Requeue,
}

#[derive(Clone)]
pub struct DeliveryHandler {
    processor: OrderProcessor,
}

impl DeliveryHandler {
    pub fn new(processor: OrderProcessor) -> Self {
        Self { processor }
    }

    pub async fn handle(&self, payload: &[u8]) -> Disposition {
        let message = match OrderMessage::from_payload(payload) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    error = %e,
                    body = %String::from_utf8_lossy(payload),
                    "Error decoding message, requeueing"
                );
                return Disposition::Requeue;
            }
        };

        let outcome = self.processor.process(message).await;
        info!(ticket_id = message.ticket_id, outcome = outcome.label(), "Message processed");
        Disposition::Ack
    }
}

pub struct OrderConsumer {
    connection: Connection,
    channel: Channel,
    deliveries: Consumer,
    handler: DeliveryHandler,
}

impl OrderConsumer {
    /// Connects, declares the queue and registers the consumer. Any error
    /// here is meant to abort the process.
    pub async fn start(
        amqp_url: &str,
        queue_name: &str,
        handler: DeliveryHandler,
    ) -> Result<Self> {
        let (connection, channel) = queue::open_channel(amqp_url).await?;
        let declared = queue::declare_queue(&channel, queue_name).await?;

        let deliveries = channel
            .basic_consume(
                declared.name().as_str(),
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("Failed to register a consumer")?;

        info!(queue = %declared.name(), "Consumer registered");
        Ok(Self {
            connection,
            channel,
            deliveries,
            handler,
        })
    }

    pub async fn run(mut self) {
        while let Some(delivery) = self.deliveries.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(error = %e, "Error receiving message");
                    break;
                }
            };

            if delivery.redelivered {
                warn!(delivery_tag = delivery.delivery_tag, "Redelivered message");
            }
            info!(
                delivery_tag = delivery.delivery_tag,
                body = %String::from_utf8_lossy(&delivery.data),
                "Received a message"
            );

            let settled = match self.handler.handle(&delivery.data).await {
                Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
                Disposition::Requeue => {
                    let options = BasicNackOptions {
                        requeue: true,
                        ..BasicNackOptions::default()
                    };
                    delivery.nack(options).await
                }
            };
            if let Err(e) = settled {
                error!(
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Failed to settle message"
                );
            }
        }

        error!("Delivery stream ended, order consumer stopped");
        queue::close(self.connection, self.channel).await;
    }
}
