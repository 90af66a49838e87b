use anyhow::{Context, Result};
use futures_util::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::{task, time};
use tokio_amqp::LapinTokioExt;
use tracing::{error, info};

use crate::configuration::AmqpSettings;
use crate::ingest::{process_issue_events, process_transaction_events, EventProcessors};
use crate::model::{EventPayload, InterchangeEvent};

pub struct AmqpClient {
    channel: Channel,
    cfg: AmqpSettings,
}

impl AmqpClient {
    pub async fn new(cfg: AmqpSettings) -> Result<Self> {
        let conn = Connection::connect(&cfg.uri, ConnectionProperties::default().with_tokio())
            .await
            .context("failed to connect to RabbitMQ")?;
        info!("connected to RabbitMQ");

        let channel = conn.create_channel().await.context("failed to create a channel")?;

        channel
            .queue_declare(
                &cfg.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("failed to declare the queue")?;
        info!("queue '{}' declared", &cfg.queue_name);

        Ok(Self { channel, cfg })
    }

    /// Publishes one batch as a persistent JSON message.
    pub async fn publish_events(&self, events: &[InterchangeEvent]) -> Result<()> {
        let payload = serde_json::to_vec(events)?;
        self.channel
            .basic_publish(
                "",
                &self.cfg.queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        info!("published a batch of {} events", events.len());
        Ok(())
    }

    /// Consumes event batches until the channel closes. Each delivery is
    /// handled on its own task: acked when the pipeline stored it, requeued
    /// when the pipeline failed, dropped when the payload does not decode.
    pub async fn start_consumer(
        &self,
        db: DatabaseConnection,
        processors: Arc<EventProcessors>,
    ) -> Result<()> {
        // `DatabaseConnection` is not `Clone` when sea-orm's `mock` feature is
        // enabled (as it is in test builds), so share one handle across tasks.
        let db = Arc::new(db);
        let mut consumer = self
            .channel
            .basic_consume(
                &self.cfg.queue_name,
                "event_worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .context("failed to register the consumer")?;
        info!("consumer registered, waiting for batches");

        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => {
                    let channel = self.channel.clone();
                    let db = db.clone();
                    let processors = processors.clone();
                    task::spawn(async move {
                        let delivery_tag = delivery.delivery_tag;

                        match serde_json::from_slice::<Vec<InterchangeEvent>>(&delivery.data) {
                            Ok(batch) => {
                                if let Err(err) = handle_batch(&db, &processors, batch).await {
                                    error!("failed to process a batch: {err:?}");
                                    if let Err(err) = channel
                                        .basic_nack(
                                            delivery_tag,
                                            BasicNackOptions {
                                                requeue: true,
                                                ..Default::default()
                                            },
                                        )
                                        .await
                                    {
                                        error!("failed to nack: {err:?}");
                                    }
                                } else if let Err(err) = channel
                                    .basic_ack(delivery_tag, BasicAckOptions::default())
                                    .await
                                {
                                    error!("failed to ack: {err:?}");
                                }
                            }
                            Err(err) => {
                                error!("failed to decode a batch, dropping it: {err:?}");
                                let _ = channel
                                    .basic_nack(
                                        delivery_tag,
                                        BasicNackOptions {
                                            requeue: false,
                                            ..Default::default()
                                        },
                                    )
                                    .await;
                            }
                        }
                    });
                }
                Err(err) => {
                    error!("consumer error: {err:?}");
                    time::sleep(Duration::from_secs(5)).await;
                }
            }
        }

        Ok(())
    }
}

async fn handle_batch(
    db: &DatabaseConnection,
    processors: &EventProcessors,
    batch: Vec<InterchangeEvent>,
) -> crate::error::Result<()> {
    let (transactions, issues) = split_batch(batch);
    if !issues.is_empty() {
        process_issue_events(db, processors, issues).await?;
    }
    if !transactions.is_empty() {
        process_transaction_events(db, transactions).await?;
    }
    Ok(())
}

fn split_batch(
    batch: Vec<InterchangeEvent>,
) -> (Vec<InterchangeEvent>, Vec<InterchangeEvent>) {
    batch
        .into_iter()
        .partition(|event| matches!(event.payload, EventPayload::Transaction(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batches_split_by_payload_kind() {
        let batch: Vec<InterchangeEvent> = serde_json::from_value(json!([
            {
                "event_id": "4f9d2b8c66d44de8a1c2d7a3ce81b5aa",
                "project_id": 1,
                "organization_id": 1,
                "received": "2025-07-01T10:30:00Z",
                "payload": { "type": "error", "message": "boom" },
            },
            {
                "event_id": "7f3a1c9eb2d843f78a5b061c2f4e9d10",
                "project_id": 1,
                "organization_id": 1,
                "received": "2025-07-01T10:30:00Z",
                "payload": {
                    "type": "transaction",
                    "transaction": "GET /",
                    "timestamp": "2025-07-01T10:30:01",
                    "start_timestamp": "2025-07-01T10:30:00",
                },
            },
        ]))
        .unwrap();

        let (transactions, issues) = split_batch(batch);
        assert_eq!(transactions.len(), 1);
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0].payload, EventPayload::Error(_)));
    }
}
