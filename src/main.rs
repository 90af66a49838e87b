use std::sync::Arc;

use dotenv::dotenv;
use tracing::info;

use faultline::amqp::AmqpClient;
use faultline::configuration::get_configuration;
use faultline::db::init_db;
use faultline::ingest::EventProcessors;
use faultline::migration::{Migrator, MigratorTrait};
use faultline::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("faultline".into(), "info,sqlx=debug".into(), std::io::stdout);
    init_subscriber(subscriber);

    info!("starting the event worker");

    dotenv().ok();
    let settings = get_configuration()?;

    let db = init_db(&settings.database).await?;
    info!("running database migrations");
    Migrator::up(&db, None).await?;
    info!("migrations are up to date");

    let amqp = AmqpClient::new(settings.amqp).await?;
    // No processors ship with the worker; sourcemap and debug-file handling
    // plug in here.
    let processors = Arc::new(EventProcessors::default());
    amqp.start_consumer(db, processors).await?;

    Ok(())
}
