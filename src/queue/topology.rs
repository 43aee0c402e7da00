//! Declares the durable queue topology: the main vote queue, a dead-letter
//! exchange, and the DLQ it routes rejected messages into (§4.4, §4.5).
//! Both the ingest publisher and the worker consumer call this at startup
//! so either one can come up first without assuming the other already
//! declared the topology.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{Channel, ExchangeKind};

use crate::config::BrokerConfig;

pub async fn declare(channel: &Channel, config: &BrokerConfig) -> Result<(), lapin::Error> {
    channel
        .exchange_declare(
            &config.dlx_exchange,
            ExchangeKind::Fanout,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_declare(
            &config.dlq_queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            &config.dlq_queue,
            &config.dlx_exchange,
            "",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let mut main_queue_args = FieldTable::default();
    main_queue_args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(LongString::from(config.dlx_exchange.clone())),
    );

    channel
        .queue_declare(
            &config.queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            main_queue_args,
        )
        .await?;

    Ok(())
}
