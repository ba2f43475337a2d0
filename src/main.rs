//! Tech PK Checkout - order placement service

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use techpk_checkout::{
    api::{self, AppState},
    cart::CartService,
    config::Config,
    events::EventBus,
    store::{memory::MemoryStore, postgres::PgStore},
    OrderLedger,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let storage = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(config.max_connections).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            PgStore::new(db).context()
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping state in memory");
            MemoryStore::new().context()
        }
    };

    let events = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => EventBus::nats(client),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, order events disabled"); EventBus::disabled() }
        },
        None => EventBus::disabled(),
    };

    let ledger = OrderLedger::new(storage.clone(), config.pricing.clone()).with_events(events);
    let state = AppState { ledger: Arc::new(ledger), carts: Arc::new(CartService::new(storage)) };
    let app = api::router(state);

    tracing::info!("🚀 Tech PK Checkout listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
