//! Sled-backed durable store.
//!
//! Each settlement runs as one sled multi-tree transaction, so the
//! idempotency insert and every ledger mutation commit together or not at
//! all — the uniqueness of `event_id` is enforced by the storage layer
//! inside the same transaction, not by a separate existence check.

use crate::{
    daily_usage_key, settle_rows, RewardStore, SettleRequest, Settlement, StorageError,
};
use earnledger_types::{
    DailyUsage, IdempotencyRecord, MicroToken, PoolPeriod, RewardOutcome, UserAddress,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::debug;

const TOTAL_CREDITED_KEY: &[u8] = b"total_credited";

/// Durable [`RewardStore`] over five sled trees.
pub struct SledRewardStore {
    db: Db,
    pool_periods: Tree,
    daily_usage: Tree,
    idempotency: Tree,
    balances: Tree,
    meta: Tree,
}

impl SledRewardStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let pool_periods = db.open_tree("pool_periods")?;
        let daily_usage = db.open_tree("daily_usage")?;
        let idempotency = db.open_tree("idempotency")?;
        let balances = db.open_tree("balances")?;
        let meta = db.open_tree("meta")?;
        Ok(Self {
            db,
            pool_periods,
            daily_usage,
            idempotency,
            balances,
            meta,
        })
    }
}

type TxResult<T> = Result<T, ConflictableTransactionError<StorageError>>;

fn tx_get<T: DeserializeOwned>(tree: &TransactionalTree, key: &[u8]) -> TxResult<Option<T>> {
    match tree.get(key)? {
        Some(raw) => serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| ConflictableTransactionError::Abort(StorageError::Serialization(e))),
        None => Ok(None),
    }
}

fn tx_put<T: Serialize>(tree: &TransactionalTree, key: &[u8], value: &T) -> TxResult<()> {
    let raw = serde_json::to_vec(value)
        .map_err(|e| ConflictableTransactionError::Abort(StorageError::Serialization(e)))?;
    tree.insert(key, raw)?;
    Ok(())
}

fn get_row<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> Result<Option<T>, StorageError> {
    tree.get(key)?
        .map(|raw| serde_json::from_slice(&raw))
        .transpose()
        .map_err(Into::into)
}

impl RewardStore for SledRewardStore {
    fn settle(&self, req: &SettleRequest) -> Result<Settlement, StorageError> {
        let result = (
            &self.pool_periods,
            &self.daily_usage,
            &self.idempotency,
            &self.balances,
            &self.meta,
        )
            .transaction(|(pools, daily, idem, balances, meta)| {
                if let Some(record) =
                    tx_get::<IdempotencyRecord>(idem, req.event_id.as_bytes())?
                {
                    return Ok(Settlement::Replayed(record.outcome));
                }

                let mut pool = tx_get::<PoolPeriod>(pools, req.period_key.as_bytes())?
                    .unwrap_or_else(|| PoolPeriod::open(req.period_key.clone(), &req.budget));
                let usage_key = daily_usage_key(&req.user_address, &req.day_key);
                let mut usage = tx_get::<DailyUsage>(daily, &usage_key)?
                    .unwrap_or_else(|| DailyUsage::open(req.user_address, req.day_key.clone()));

                let outcome = settle_rows(&mut pool, &mut usage, req).map_err(|e| {
                    ConflictableTransactionError::Abort(StorageError::Invariant(e))
                })?;

                let record = IdempotencyRecord {
                    event_id: req.event_id.clone(),
                    tokens_credited: outcome.tokens(),
                    outcome: outcome.clone(),
                    recorded_at: req.now,
                };
                tx_put(idem, req.event_id.as_bytes(), &record)?;
                tx_put(pools, req.period_key.as_bytes(), &pool)?;
                tx_put(daily, &usage_key, &usage)?;

                if let RewardOutcome::Credited { tokens } = &outcome {
                    let balance: MicroToken =
                        tx_get(balances, &req.user_address[..])?.unwrap_or(0);
                    tx_put(
                        balances,
                        &req.user_address[..],
                        &balance.saturating_add(*tokens),
                    )?;
                    let total: MicroToken = tx_get(meta, TOTAL_CREDITED_KEY)?.unwrap_or(0);
                    tx_put(meta, TOTAL_CREDITED_KEY, &total.saturating_add(*tokens))?;
                }

                Ok(Settlement::Applied(outcome))
            });

        match result {
            Ok(settlement) => {
                debug!(
                    target: "reward_store",
                    event_id = %req.event_id,
                    replay = settlement.is_replay(),
                    "settlement committed"
                );
                Ok(settlement)
            }
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(StorageError::Database(err)),
        }
    }

    fn pool_period(&self, period_key: &str) -> Result<Option<PoolPeriod>, StorageError> {
        get_row(&self.pool_periods, period_key.as_bytes())
    }

    fn pool_periods(&self) -> Result<Vec<PoolPeriod>, StorageError> {
        let mut periods: Vec<PoolPeriod> = Vec::new();
        for entry in self.pool_periods.iter() {
            let (_, raw) = entry?;
            periods.push(serde_json::from_slice(&raw)?);
        }
        periods.sort_by(|a, b| a.period_key.cmp(&b.period_key));
        Ok(periods)
    }

    fn daily_usage(
        &self,
        user: &UserAddress,
        date: &str,
    ) -> Result<Option<DailyUsage>, StorageError> {
        get_row(&self.daily_usage, &daily_usage_key(user, date))
    }

    fn idempotency_record(
        &self,
        event_id: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        get_row(&self.idempotency, event_id.as_bytes())
    }

    fn balance(&self, user: &UserAddress) -> Result<MicroToken, StorageError> {
        Ok(get_row(&self.balances, &user[..])?.unwrap_or(0))
    }

    fn total_credited(&self) -> Result<MicroToken, StorageError> {
        Ok(get_row(&self.meta, TOTAL_CREDITED_KEY)?.unwrap_or(0))
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
