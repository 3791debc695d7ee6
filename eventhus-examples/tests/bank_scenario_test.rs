//! Account workflows driven through the command buses.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{owner, Bank};
use eventhus::errors::EventStoreResult;
use eventhus::{
    AggregateId, AsyncCommandBus, CommandBusConfig, CommandBusExt, CommandError, CorrelationId,
    Event, EventMetadata, EventStore, SyncCommandBus, UserId, Version, WorkerCount,
};
use eventhus_examples::banking::{
    Account, ChangeOwner, CreateAccount, PerformDeposit, PerformWithdrawal,
};
use eventhus_memory::InMemoryEventStore;
use tokio::sync::Barrier;

fn sync_bank() -> (Arc<InMemoryEventStore>, Bank, SyncCommandBus) {
    let store = Arc::new(InMemoryEventStore::new());
    let bank = Bank::over(Arc::clone(&store) as Arc<dyn EventStore>);
    let bus = SyncCommandBus::new(Arc::clone(&bank.commands));
    (store, bank, bus)
}

#[tokio::test]
async fn a_stale_deposit_conflicts_and_succeeds_when_resubmitted() {
    let (_, bank, bus) = sync_bank();
    let id = AggregateId::new();

    bus.dispatch(CreateAccount::new(id, owner("A"))).await.unwrap();
    bus.dispatch(PerformDeposit::new(id, Version::new(1), 300))
        .await
        .unwrap();

    let account = bank.repository.load::<Account>(id).await.unwrap();
    assert_eq!(account.version(), Version::new(2));
    assert_eq!(account.state().balance(), 300);

    let stale = bus
        .dispatch(PerformDeposit::new(id, Version::new(1), 249))
        .await;
    assert_eq!(
        stale,
        Err(CommandError::ConcurrencyConflict {
            aggregate_id: id,
            expected: Version::new(1),
            actual: Some(Version::new(2)),
        })
    );

    bus.dispatch(PerformDeposit::new(id, Version::new(2), 249))
        .await
        .unwrap();
    let account = bank.repository.load::<Account>(id).await.unwrap();
    assert_eq!(account.version(), Version::new(3));
    assert_eq!(account.state().balance(), 549);
}

#[tokio::test]
async fn business_rules_reject_without_writing() {
    let (store, _, bus) = sync_bank();
    let id = AggregateId::new();
    bus.dispatch(CreateAccount::new(id, owner("mariana"))).await.unwrap();
    bus.dispatch(PerformDeposit::new(id, Version::new(1), 100))
        .await
        .unwrap();

    let overdraft = bus
        .dispatch(PerformWithdrawal::new(id, Version::new(2), 101))
        .await;
    let negative = bus
        .dispatch(PerformDeposit::new(id, Version::new(2), -1))
        .await;

    assert!(overdraft.unwrap_err().is_domain_rule_violation());
    assert!(negative.unwrap_err().is_domain_rule_violation());
    assert_eq!(store.current_version(&id).await.unwrap(), Version::new(2));
}

#[tokio::test]
async fn a_deposit_that_would_overflow_commits_nothing() {
    let (store, bank, bus) = sync_bank();
    let id = AggregateId::new();
    bus.dispatch(CreateAccount::new(id, owner("uasouz"))).await.unwrap();
    bus.dispatch(PerformDeposit::new(id, Version::new(1), 300))
        .await
        .unwrap();

    let overflow = bus
        .dispatch(PerformDeposit::new(id, Version::new(2), i64::MAX))
        .await;

    assert!(overflow.unwrap_err().is_domain_rule_violation());
    assert_eq!(store.current_version(&id).await.unwrap(), Version::new(2));
    let account = bank.repository.load::<Account>(id).await.unwrap();
    assert_eq!(account.state().balance(), 300);
}

#[tokio::test]
async fn accounts_are_created_once_and_must_exist() {
    let (_, _, bus) = sync_bank();
    let id = AggregateId::new();

    let orphan = bus.dispatch(PerformDeposit::new(id, Version::new(1), 10)).await;
    assert!(matches!(orphan, Err(CommandError::InvalidState(_))));

    bus.dispatch(CreateAccount::new(id, owner("jorge"))).await.unwrap();
    let twice = bus.dispatch(CreateAccount::new(id, owner("jorge"))).await;
    assert!(matches!(twice, Err(CommandError::InvalidState(_))));
}

#[tokio::test]
async fn handing_an_account_to_its_owner_commits_nothing() {
    let (store, bank, bus) = sync_bank();
    let id = AggregateId::new();
    bus.dispatch(CreateAccount::new(id, owner("uasouz"))).await.unwrap();

    bus.dispatch(ChangeOwner::new(id, Version::new(1), owner("uasouz")))
        .await
        .unwrap();
    assert_eq!(store.current_version(&id).await.unwrap(), Version::new(1));

    bus.dispatch(ChangeOwner::new(id, Version::new(1), owner("mariana")))
        .await
        .unwrap();
    let account = bank.repository.load::<Account>(id).await.unwrap();
    assert_eq!(account.state().owner(), Some(&owner("mariana")));
}

#[tokio::test]
async fn caller_metadata_is_stored_and_published_in_order() {
    let (store, bank, bus) = sync_bank();
    let id = AggregateId::new();
    let correlation = CorrelationId::new();
    let metadata = EventMetadata::new()
        .with_correlation_id(correlation)
        .with_user_id(UserId::try_new("teller-7").unwrap())
        .with_custom("branch", "centro");

    bus.dispatch_with_metadata(CreateAccount::new(id, owner("uasouz")), metadata.clone())
        .await
        .unwrap();
    bus.dispatch_with_metadata(PerformDeposit::new(id, Version::new(1), 50), metadata.clone())
        .await
        .unwrap();

    let stored = store.load(&id).await.unwrap();
    assert!(stored.iter().all(|event| event.metadata == metadata));

    let published: Vec<(String, u64)> = bank
        .events
        .published()
        .iter()
        .map(|event| (event.event_type.to_string(), event.version.into()))
        .collect();
    assert_eq!(
        published,
        vec![
            ("AccountCreated".to_string(), 1),
            ("DepositPerformed".to_string(), 2)
        ]
    );
}

/// Holds every load at a barrier while armed, so two workers read the same
/// head before either writes.
struct LockstepStore {
    inner: InMemoryEventStore,
    armed: AtomicBool,
    barrier: Barrier,
}

#[async_trait]
impl EventStore for LockstepStore {
    async fn load(&self, aggregate_id: &AggregateId) -> EventStoreResult<Vec<Event>> {
        let events = self.inner.load(aggregate_id).await?;
        if self.armed.load(Ordering::SeqCst) {
            self.barrier.wait().await;
        }
        Ok(events)
    }

    async fn save(&self, events: &[Event], expected: Version) -> EventStoreResult<()> {
        self.inner.save(events, expected).await
    }

    async fn safe_save(&self, events: &[Event], expected: Version) -> EventStoreResult<()> {
        self.inner.safe_save(events, expected).await
    }
}

#[tokio::test]
#[tracing_test::traced_test]
async fn racing_workers_leave_exactly_one_withdrawal() {
    let store = Arc::new(LockstepStore {
        inner: InMemoryEventStore::new(),
        armed: AtomicBool::new(false),
        barrier: Barrier::new(2),
    });
    let bank = Bank::over(Arc::clone(&store) as Arc<dyn EventStore>);
    let setup = SyncCommandBus::new(Arc::clone(&bank.commands));
    let id = AggregateId::new();
    setup.dispatch(CreateAccount::new(id, owner("uasouz"))).await.unwrap();
    setup
        .dispatch(PerformDeposit::new(id, Version::new(1), 300))
        .await
        .unwrap();

    store.armed.store(true, Ordering::SeqCst);
    let bus = AsyncCommandBus::new(
        Arc::clone(&bank.commands),
        CommandBusConfig::default().with_workers(WorkerCount::try_new(2).unwrap()),
    );
    bus.dispatch(PerformWithdrawal::new(id, Version::new(2), 249))
        .await
        .unwrap();
    bus.dispatch(PerformWithdrawal::new(id, Version::new(2), 249))
        .await
        .unwrap();
    bus.shutdown().await;
    store.armed.store(false, Ordering::SeqCst);

    assert_eq!(bus.stats().succeeded(), 1);
    assert_eq!(bus.stats().conflicts(), 1);
    assert!(logs_contain("command rejected"));

    let account = bank.repository.load::<Account>(id).await.unwrap();
    assert_eq!(account.version(), Version::new(3));
    assert_eq!(account.state().balance(), 51);
}
