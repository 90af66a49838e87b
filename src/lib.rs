pub mod amqp;
pub mod configuration;
pub mod db;
pub mod entity;
pub mod error;
pub mod ingest;
pub mod migration;
pub mod model;
pub mod telemetry;
