//! Durable reward ledger storage.
//!
//! The store owns the correctness-critical step of the credit pipeline:
//! [`RewardStore::settle`] runs the idempotency claim, the pool and daily
//! clamps, and every row mutation as one atomic unit, so no interleaving
//! of concurrent events can over-spend the pool, exceed a daily cap, or
//! credit the same event twice.
//!
//! Two backends share the same settlement math: [`SledRewardStore`] for
//! durable multi-process-safe operation and [`MemoryRewardStore`] for
//! tests and simulation.

mod memory;
mod sled_store;

pub use memory::MemoryRewardStore;
pub use sled_store::SledRewardStore;

use earnledger_types::{
    DailyUsage, IdempotencyRecord, LedgerError, MicroToken, PeriodBudget, PoolPeriod,
    RejectReason, RewardOutcome, Role, UserAddress,
};

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("ledger invariant violated: {0}")]
    Invariant(#[from] LedgerError),
}

impl StorageError {
    /// Transient failures are safe to retry; the idempotency claim makes
    /// a retried settlement a no-op if the first attempt actually landed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Database(_))
    }
}

/// Everything the store needs to settle one validated event.
///
/// Amounts and keys are computed by the coordinator from the policy
/// snapshot; the store only clamps them against the live rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleRequest {
    pub event_id: String,
    pub user_address: UserAddress,
    pub role: Role,
    pub period_key: String,
    pub day_key: String,
    /// Event duration after the per-event cap.
    pub seconds: u64,
    pub computed_reward: MicroToken,
    pub daily_cap: MicroToken,
    /// Budget used to lazily open the pool row for a new period.
    pub budget: PeriodBudget,
    pub now: u64,
}

/// Result of one settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// First processing of this event id; the outcome was just recorded.
    Applied(RewardOutcome),
    /// The event id was already claimed; this is its recorded outcome.
    Replayed(RewardOutcome),
}

impl Settlement {
    pub fn outcome(&self) -> &RewardOutcome {
        match self {
            Settlement::Applied(outcome) | Settlement::Replayed(outcome) => outcome,
        }
    }

    pub fn into_outcome(self) -> RewardOutcome {
        match self {
            Settlement::Applied(outcome) | Settlement::Replayed(outcome) => outcome,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Settlement::Replayed(_))
    }
}

/// Durable reward store interface.
///
/// `settle` is the only mutating operation; the read side exists for
/// audit and operational queries and never participates in settlement.
pub trait RewardStore: Send + Sync {
    fn settle(&self, req: &SettleRequest) -> Result<Settlement, StorageError>;

    fn pool_period(&self, period_key: &str) -> Result<Option<PoolPeriod>, StorageError>;
    /// All retained period rows, oldest first. Periods are never deleted.
    fn pool_periods(&self) -> Result<Vec<PoolPeriod>, StorageError>;
    fn daily_usage(
        &self,
        user: &UserAddress,
        date: &str,
    ) -> Result<Option<DailyUsage>, StorageError>;
    fn idempotency_record(
        &self,
        event_id: &str,
    ) -> Result<Option<IdempotencyRecord>, StorageError>;
    fn balance(&self, user: &UserAddress) -> Result<MicroToken, StorageError>;
    /// Lifetime sum of all credited tokens across users.
    fn total_credited(&self) -> Result<MicroToken, StorageError>;

    fn flush(&self) -> Result<(), StorageError>;
}

/// Clamp the computed reward against both ceilings and, when something
/// remains, apply the debit and the usage increment to the rows.
///
/// Pool scarcity and daily-cap scarcity are independent hard ceilings;
/// the granted amount is the minimum of both, never more. Pool exhaustion
/// wins the rejection reason when both floors at zero.
pub(crate) fn settle_rows(
    pool: &mut PoolPeriod,
    usage: &mut DailyUsage,
    req: &SettleRequest,
) -> Result<RewardOutcome, LedgerError> {
    let pool_room = pool.clamp_for(req.role, req.computed_reward);
    if pool_room == 0 {
        return Ok(RewardOutcome::Rejected {
            reason: RejectReason::PoolExhausted,
        });
    }
    let daily_room = usage.headroom(req.daily_cap).min(req.computed_reward);
    if daily_room == 0 {
        return Ok(RewardOutcome::Rejected {
            reason: RejectReason::DailyCapReached,
        });
    }
    let granted = pool_room.min(daily_room);
    pool.debit(req.role, granted)?;
    usage.record(req.seconds, granted);
    Ok(RewardOutcome::Credited { tokens: granted })
}

/// Composite key for daily usage rows: fixed-width address, then date.
pub(crate) fn daily_usage_key(user: &UserAddress, date: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user.len() + 1 + date.len());
    key.extend_from_slice(user);
    key.push(b'|');
    key.extend_from_slice(date.as_bytes());
    key
}
