//! AMQP 0-9-1 (RabbitMQ) transport for the activity gateway, built on `lapin`.
pub mod amqptransport;

pub use amqptransport::{AmqpChannel, AmqpConfig, AmqpConnector};
