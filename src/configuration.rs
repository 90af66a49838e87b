use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub amqp: AmqpSettings,
}

#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Clone, Debug)]
pub struct AmqpSettings {
    pub uri: String,
    pub queue_name: String,
}

/// Reads settings from the environment. Only `DATABASE_URL` is required;
/// everything else has a local-development default.
pub fn get_configuration() -> anyhow::Result<Settings> {
    let database = DatabaseSettings {
        url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
        max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
        min_connections: env_or("DATABASE_MIN_CONNECTIONS", 5)?,
    };
    let amqp = AmqpSettings {
        uri: std::env::var("AMQP_URL").unwrap_or_else(|_| "amqp://127.0.0.1:5672/%2f".to_owned()),
        queue_name: std::env::var("AMQP_QUEUE").unwrap_or_else(|_| "ingest_events".to_owned()),
    };
    Ok(Settings { database, amqp })
}

fn env_or(name: &str, default: u32) -> anyhow::Result<u32> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
