use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use localfirst_customers::{CreateCustomer, CustomerService};
use localfirst_store::SqliteStore;
use localfirst_sync::{Connectivity, SimulatedGateway, SyncConfig, SyncEngine, SyncWorker};

const DEMO_CUSTOMERS: [(&str, Option<&str>); 4] = [
    ("Acme Corp", Some("+1 555 0100")),
    ("Globex", None),
    ("Initech", Some("+1 555 0199")),
    ("Umbrella", None),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    localfirst_observability::init();

    let config = SyncConfig::from_env().context("invalid sync configuration")?;

    let store = match std::env::var("LOCALFIRST_DB_PATH") {
        Ok(path) => SqliteStore::open(&path)
            .await
            .with_context(|| format!("failed to open local store at {path}"))?,
        Err(_) => SqliteStore::open_default()
            .await
            .context("failed to open local store in the app data directory")?,
    };

    let failure_rate = match std::env::var("LOCALFIRST_GATEWAY_FAILURE_RATE") {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid LOCALFIRST_GATEWAY_FAILURE_RATE: {raw:?}"))?,
        Err(_) => 0.2,
    };

    let engine = SyncEngine::new(
        Arc::new(store.clone()),
        Arc::new(SimulatedGateway::new().with_failure_rate(failure_rate)),
        Connectivity::online(),
        config,
    );
    let worker = SyncWorker::spawn(Arc::new(engine));
    let service = CustomerService::with_worker(&worker);

    for (name, phone) in DEMO_CUSTOMERS {
        let mut input = CreateCustomer::new(name);
        if let Some(phone) = phone {
            input = input.with_phone(phone);
        }
        let customer = service.create_customer(input).await?;
        tracing::info!(customer_id = %customer.id, name = %customer.name, "demo customer created");
    }

    wait_for_drain(&service).await?;
    let summary = service.sync_summary().await?;
    tracing::info!(?summary, "first delivery round finished");

    if summary.failed > 0 {
        let reset = service.retry_sync(None).await?;
        tracing::info!(reset, "retrying failed deliveries");
        wait_for_drain(&service).await?;
    }

    let summary = service.sync_summary().await?;
    tracing::info!(?summary, stats = ?worker.stats(), "demo finished");

    worker.shutdown().await;
    store.close().await;
    Ok(())
}

/// Wait until no customer is still pending its first attempt.
async fn wait_for_drain(service: &CustomerService) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if service.sync_summary().await?.pending == 0 {
                return anyhow::Ok(());
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    })
    .await
    .context("outbox did not drain within 30s")?
}
