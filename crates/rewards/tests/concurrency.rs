//! Concurrency and retry behavior: many request handlers racing on the
//! same user, pool, and event id.

use earnledger_policy::{PolicyHandle, RewardPolicy, RolePolicy};
use earnledger_rewards::{FixedClock, RetryPolicy, RewardCoordinator, RewardError};
use earnledger_storage::{
    MemoryRewardStore, RewardStore, SettleRequest, Settlement, SledRewardStore, StorageError,
};
use earnledger_types::{
    ActivityEvent, DailyUsage, IdempotencyRecord, MicroToken, PoolPeriod, RewardOutcome, Role,
    UserAddress,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// 2025-05-14 12:30:00 UTC
const NOW: u64 = 1_747_225_800;
const USER_A: [u8; 32] = [0xAA; 32];

fn policy(pool_total: MicroToken, daily_cap: MicroToken) -> RewardPolicy {
    let mut roles = BTreeMap::new();
    roles.insert(
        Role::Listener,
        RolePolicy {
            rate_per_minute: 1,
            daily_cap,
        },
    );
    RewardPolicy {
        roles,
        period_pool_total: pool_total,
        period_overrides: BTreeMap::new(),
        artist_share_bps: 0,
        listener_share_bps: 10_000,
        max_single_event_seconds: 30 * 60,
        max_event_age_seconds: 24 * 3600,
        max_event_future_seconds: 5 * 60,
    }
}

fn coordinator(
    store: Arc<dyn RewardStore>,
    pool_total: MicroToken,
    daily_cap: MicroToken,
) -> Arc<RewardCoordinator> {
    let handle = PolicyHandle::new(policy(pool_total, daily_cap)).unwrap();
    Arc::new(
        RewardCoordinator::new(handle, store).with_clock(Arc::new(FixedClock::at(NOW))),
    )
}

fn listener_event(event_id: &str, minutes: u64) -> ActivityEvent {
    ActivityEvent {
        event_id: event_id.to_string(),
        user_address: USER_A,
        role: Role::Listener,
        content_id: "track-1".to_string(),
        duration_seconds: minutes * 60,
        occurred_at: NOW,
    }
}

fn assert_ledger_consistent(store: &dyn RewardStore, daily_cap: MicroToken) {
    let pool = store.pool_period("2025-05").unwrap().unwrap();
    assert!(pool.remaining_amount <= pool.total_amount);
    let sub_sum: MicroToken = pool.sub_pools.values().sum();
    assert!(sub_sum <= pool.remaining_amount);
    if let Some(usage) = store.daily_usage(&USER_A, "2025-05-14").unwrap() {
        assert!(usage.tokens_earned <= daily_cap);
    }
    // Every spent pool unit is accounted for by credits.
    assert_eq!(
        pool.total_amount - pool.remaining_amount,
        store.total_credited().unwrap()
    );
}

fn run_same_user_stress(store: Arc<dyn RewardStore>, threads: usize) {
    // Pool and cap sized for a fraction of the submitted volume: 50
    // two-token events race for a cap of 7.
    let coordinator = coordinator(store.clone(), 1000, 7);
    std::thread::scope(|scope| {
        for i in 0..threads {
            let coordinator = Arc::clone(&coordinator);
            scope.spawn(move || {
                let event = listener_event(&format!("e{i}"), 2);
                coordinator.submit_activity_event(&event).unwrap();
            });
        }
    });
    assert_eq!(store.balance(&USER_A).unwrap(), 7);
    assert_eq!(store.total_credited().unwrap(), 7);
    assert_ledger_consistent(store.as_ref(), 7);
}

#[test]
fn test_same_user_stress_memory() {
    run_same_user_stress(Arc::new(MemoryRewardStore::new()), 50);
}

#[test]
fn test_same_user_stress_sled() {
    let dir = tempfile::tempdir().unwrap();
    run_same_user_stress(Arc::new(SledRewardStore::open(dir.path()).unwrap()), 24);
}

fn run_duplicate_event_race(store: Arc<dyn RewardStore>, threads: usize) {
    let coordinator = coordinator(store.clone(), 100, 5);
    let outcomes: Vec<RewardOutcome> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                scope.spawn(move || {
                    coordinator
                        .submit_activity_event(&listener_event("e1", 3))
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Exactly one submission won the claim; every caller saw its outcome.
    for outcome in &outcomes {
        assert_eq!(*outcome, RewardOutcome::Credited { tokens: 3 });
    }
    assert_eq!(store.balance(&USER_A).unwrap(), 3);
    let stats = coordinator.stats();
    assert_eq!(stats.events_credited, 1);
    assert_eq!(stats.events_replayed, threads as u64 - 1);
}

#[test]
fn test_duplicate_event_race_memory() {
    run_duplicate_event_race(Arc::new(MemoryRewardStore::new()), 32);
}

#[test]
fn test_duplicate_event_race_sled() {
    let dir = tempfile::tempdir().unwrap();
    run_duplicate_event_race(Arc::new(SledRewardStore::open(dir.path()).unwrap()), 16);
}

/// Store wrapper that fails the first N settlements with a transient
/// backend error.
struct FlakyStore {
    inner: MemoryRewardStore,
    failures_left: AtomicU32,
}

impl FlakyStore {
    fn failing(failures: u32) -> Self {
        Self {
            inner: MemoryRewardStore::new(),
            failures_left: AtomicU32::new(failures),
        }
    }
}

impl RewardStore for FlakyStore {
    fn settle(&self, req: &SettleRequest) -> Result<Settlement, StorageError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(StorageError::Database(sled::Error::Unsupported(
                "injected transient failure".to_string(),
            )));
        }
        self.inner.settle(req)
    }

    fn pool_period(&self, period_key: &str) -> Result<Option<PoolPeriod>, StorageError> {
        self.inner.pool_period(period_key)
    }

    fn pool_periods(&self) -> Result<Vec<PoolPeriod>, StorageError> {
        self.inner.pool_periods()
    }

    fn daily_usage(
        &self,
        user: &UserAddress,
        date: &str,
    ) -> Result<Option<DailyUsage>, StorageError> {
        self.inner.daily_usage(user, date)
    }

    fn idempotency_record(
        &self,
        event_id: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        self.inner.idempotency_record(event_id)
    }

    fn balance(&self, user: &UserAddress) -> Result<MicroToken, StorageError> {
        self.inner.balance(user)
    }

    fn total_credited(&self) -> Result<MicroToken, StorageError> {
        self.inner.total_credited()
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.inner.flush()
    }
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

#[test]
fn test_transient_failures_retried_to_success() {
    let store = Arc::new(FlakyStore::failing(2));
    let handle = PolicyHandle::new(policy(100, 5)).unwrap();
    let coordinator = RewardCoordinator::new(handle, store.clone())
        .with_clock(Arc::new(FixedClock::at(NOW)))
        .with_retry(fast_retry(5));

    let outcome = coordinator
        .submit_activity_event(&listener_event("e1", 3))
        .unwrap();
    assert_eq!(outcome, RewardOutcome::Credited { tokens: 3 });
    assert_eq!(coordinator.stats().storage_retries, 2);
    assert_eq!(store.balance(&USER_A).unwrap(), 3);
}

#[test]
fn test_retry_budget_exhaustion_surfaces_storage_error() {
    let store = Arc::new(FlakyStore::failing(10));
    let handle = PolicyHandle::new(policy(100, 5)).unwrap();
    let coordinator = RewardCoordinator::new(handle, store.clone())
        .with_clock(Arc::new(FixedClock::at(NOW)))
        .with_retry(fast_retry(3));

    let err = coordinator
        .submit_activity_event(&listener_event("e1", 3))
        .unwrap_err();
    assert!(matches!(err, RewardError::Storage(_)));
    // Nothing was committed, so a later retry of the same event succeeds.
    let outcome = coordinator
        .submit_activity_event(&listener_event("e1", 3))
        .unwrap();
    assert_eq!(outcome, RewardOutcome::Credited { tokens: 3 });
    assert_eq!(store.balance(&USER_A).unwrap(), 3);
}
