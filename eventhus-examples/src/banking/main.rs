//! Banking example application
//!
//! Opens three accounts on the worker-pool command bus and walks each one
//! through a deposit and a withdrawal. The async bus only acknowledges
//! acceptance, so before sending the next command for an account the demo
//! waits until the previous one shows up in the store.
//!
//! `EVENTHUS_WORKERS` sets the pool size (default 30) and `RUST_LOG` the log
//! filter (default `info`).

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use eventhus::{
    AggregateId, AsyncCommandBus, CommandBusConfig, CommandBusExt, CommandRegister, EventStore,
    Repository, Version, WorkerCount,
};
use eventhus_examples::banking::{
    event_register, wire_commands, Account, CreateAccount, Owner, PerformDeposit,
    PerformWithdrawal,
};
use eventhus_memory::{InMemoryEventBus, InMemoryEventStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_WORKERS: usize = 30;
const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let workers = match env::var("EVENTHUS_WORKERS") {
        Ok(value) => value
            .parse::<usize>()
            .context("EVENTHUS_WORKERS must be a number")?,
        Err(_) => DEFAULT_WORKERS,
    };
    let workers = WorkerCount::try_new(workers)?;

    let store = Arc::new(InMemoryEventStore::new());
    let events = InMemoryEventBus::new();
    let mut published = events.subscribe();

    let repository = Arc::new(Repository::new(
        Arc::clone(&store) as Arc<dyn EventStore>,
        Arc::new(events),
        Arc::new(event_register()?),
    ));
    let mut commands = CommandRegister::new();
    wire_commands(&mut commands, &repository)?;

    let bus = Arc::new(AsyncCommandBus::new(
        Arc::new(commands),
        CommandBusConfig::default().with_workers(workers),
    ));

    tokio::spawn(async move {
        while let Ok(event) = published.recv().await {
            info!(
                aggregate_id = %event.aggregate_id,
                event_type = %event.event_type,
                version = %event.version,
                "event published"
            );
        }
    });

    let owners = ["uasouz", "mariana", "jorge"];
    let mut accounts = Vec::with_capacity(owners.len());
    for name in owners {
        let id = AggregateId::new();
        let owner = Owner::try_new(name)?;
        accounts.push((id, tokio::spawn(run_account(Arc::clone(&bus), Arc::clone(&store), id, owner))));
    }

    let mut ids = Vec::with_capacity(accounts.len());
    for (id, task) in accounts {
        task.await??;
        ids.push(id);
    }

    bus.shutdown().await;

    for id in ids {
        let account = repository.load::<Account>(id).await?;
        info!(
            account_id = %id,
            owner = %account.state().owner().map_or("-", |owner| owner.as_ref()),
            balance = account.state().balance(),
            version = %account.version(),
            "final balance"
        );
    }

    let stats = bus.stats();
    info!(
        accepted = stats.accepted(),
        succeeded = stats.succeeded(),
        failed = stats.failed(),
        "done"
    );
    Ok(())
}

async fn run_account(
    bus: Arc<AsyncCommandBus>,
    store: Arc<InMemoryEventStore>,
    id: AggregateId,
    owner: Owner,
) -> Result<()> {
    bus.dispatch(CreateAccount::new(id, owner)).await?;
    wait_for_version(&store, id, Version::new(1)).await?;

    bus.dispatch(PerformDeposit::new(id, Version::new(1), 300)).await?;
    wait_for_version(&store, id, Version::new(2)).await?;

    bus.dispatch(PerformWithdrawal::new(id, Version::new(2), 249)).await?;
    wait_for_version(&store, id, Version::new(3)).await?;
    Ok(())
}

async fn wait_for_version(store: &InMemoryEventStore, id: AggregateId, target: Version) -> Result<()> {
    let reached = tokio::time::timeout(VISIBILITY_TIMEOUT, async {
        loop {
            match store.current_version(&id).await {
                Ok(version) if version >= target => return Ok(()),
                Ok(_) => tokio::time::sleep(POLL_INTERVAL).await,
                Err(error) => return Err(error),
            }
        }
    })
    .await;

    match reached {
        Ok(result) => Ok(result?),
        Err(_) => bail!("account {id} did not reach version {target} in time"),
    }
}
