use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use order_service::api;
use order_service::consumer::{DeliveryHandler, OrderConsumer};
use order_service::processor::OrderProcessor;
use order_service::queue::AmqpPublisher;
use order_service::store::{self, PgStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "order-service")]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "AMQP_URL")]
    amqp_url: String,

    #[arg(long, env = "ORDERS_QUEUE", default_value = shared::ORDERS_QUEUE)]
    queue: String,

    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Apply pending migrations and exit.
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    store::run_migrations(&args.database_url)?;
    if args.migrate_only {
        return Ok(());
    }

    let store = Arc::new(PgStore::connect(&args.database_url).await?);
    info!("Database connection established");

    let publisher = AmqpPublisher::new(&args.amqp_url, &args.queue);
    publisher.declare().await?;

    // startup failures here end the process; nothing reconnects later
    let handler = DeliveryHandler::new(OrderProcessor::new(store.clone()));
    let consumer = OrderConsumer::start(&args.amqp_url, &args.queue, handler).await?;
    let consumer_task = tokio::spawn(consumer.run());

    let app_state = api::AppState {
        store,
        publisher: Arc::new(publisher),
    };
    let app = api::create_router(app_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", args.port)).await?;

    info!(
        "Order service ready to accept HTTP requests at http://0.0.0.0:{}/orders",
        args.port
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    consumer_task.abort();
    info!("Order service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
