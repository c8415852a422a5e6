//! In-memory backend for tests and simulation.

use crate::{
    daily_usage_key, settle_rows, RewardStore, SettleRequest, Settlement, StorageError,
};
use earnledger_types::{
    DailyUsage, IdempotencyRecord, MicroToken, PoolPeriod, RewardOutcome, UserAddress,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Inner {
    pools: BTreeMap<String, PoolPeriod>,
    daily: BTreeMap<Vec<u8>, DailyUsage>,
    idempotency: BTreeMap<String, IdempotencyRecord>,
    balances: BTreeMap<UserAddress, MicroToken>,
    total_credited: MicroToken,
}

/// Non-durable [`RewardStore`]. One mutex serializes settlements, which
/// trivially gives the same isolation the sled backend gets from its
/// transactions.
#[derive(Debug, Default)]
pub struct MemoryRewardStore {
    inner: Mutex<Inner>,
}

impl MemoryRewardStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RewardStore for MemoryRewardStore {
    fn settle(&self, req: &SettleRequest) -> Result<Settlement, StorageError> {
        let mut inner = self.inner.lock();

        if let Some(record) = inner.idempotency.get(&req.event_id) {
            return Ok(Settlement::Replayed(record.outcome.clone()));
        }

        let mut pool = inner
            .pools
            .get(&req.period_key)
            .cloned()
            .unwrap_or_else(|| PoolPeriod::open(req.period_key.clone(), &req.budget));
        let usage_key = daily_usage_key(&req.user_address, &req.day_key);
        let mut usage = inner
            .daily
            .get(&usage_key)
            .cloned()
            .unwrap_or_else(|| DailyUsage::open(req.user_address, req.day_key.clone()));

        let outcome = settle_rows(&mut pool, &mut usage, req)?;

        let record = IdempotencyRecord {
            event_id: req.event_id.clone(),
            tokens_credited: outcome.tokens(),
            outcome: outcome.clone(),
            recorded_at: req.now,
        };
        inner.idempotency.insert(req.event_id.clone(), record);
        inner.pools.insert(req.period_key.clone(), pool);
        inner.daily.insert(usage_key, usage);

        if let RewardOutcome::Credited { tokens } = &outcome {
            let balance = inner.balances.entry(req.user_address).or_insert(0);
            *balance = balance.saturating_add(*tokens);
            inner.total_credited = inner.total_credited.saturating_add(*tokens);
        }

        Ok(Settlement::Applied(outcome))
    }

    fn pool_period(&self, period_key: &str) -> Result<Option<PoolPeriod>, StorageError> {
        Ok(self.inner.lock().pools.get(period_key).cloned())
    }

    fn pool_periods(&self) -> Result<Vec<PoolPeriod>, StorageError> {
        Ok(self.inner.lock().pools.values().cloned().collect())
    }

    fn daily_usage(
        &self,
        user: &UserAddress,
        date: &str,
    ) -> Result<Option<DailyUsage>, StorageError> {
        let key = daily_usage_key(user, date);
        Ok(self.inner.lock().daily.get(&key).cloned())
    }

    fn idempotency_record(
        &self,
        event_id: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        Ok(self.inner.lock().idempotency.get(event_id).cloned())
    }

    fn balance(&self, user: &UserAddress) -> Result<MicroToken, StorageError> {
        Ok(self.inner.lock().balances.get(user).copied().unwrap_or(0))
    }

    fn total_credited(&self) -> Result<MicroToken, StorageError> {
        Ok(self.inner.lock().total_credited)
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
