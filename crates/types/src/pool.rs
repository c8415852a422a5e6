//! Emission pool rows.
//!
//! A [`PoolPeriod`] is the durable budget row for one emission period
//! (one calendar month). It is created lazily on the first event of the
//! period, debited only inside the store's atomic settlement unit, and
//! never deleted so past periods remain auditable.

use crate::event::Role;
use crate::scalars::MicroToken;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by ledger row mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("pool {period_key} cannot cover debit of {amount} from the {role:?} sub-pool")]
    InsufficientPool {
        period_key: String,
        role: Role,
        amount: MicroToken,
    },
}

/// Budget for one emission period, pre-split into per-role sub-pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBudget {
    pub total: MicroToken,
    pub artist_share: MicroToken,
    pub listener_share: MicroToken,
}

impl PeriodBudget {
    pub fn share_for(&self, role: Role) -> MicroToken {
        match role {
            Role::Artist => self.artist_share,
            Role::Listener => self.listener_share,
        }
    }
}

/// Remaining emittable tokens for one period, split by role.
///
/// Invariants: `remaining_amount <= total_amount`, and the sum of the
/// sub-pool remainders never exceeds `remaining_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPeriod {
    pub period_key: String,
    pub total_amount: MicroToken,
    pub remaining_amount: MicroToken,
    pub sub_pools: BTreeMap<Role, MicroToken>,
}

impl PoolPeriod {
    /// Open a fresh pool row for a period, fully funded from the budget.
    pub fn open(period_key: impl Into<String>, budget: &PeriodBudget) -> Self {
        let mut sub_pools = BTreeMap::new();
        sub_pools.insert(Role::Artist, budget.artist_share);
        sub_pools.insert(Role::Listener, budget.listener_share);
        Self {
            period_key: period_key.into(),
            total_amount: budget.total,
            remaining_amount: budget.total,
            sub_pools,
        }
    }

    pub fn sub_pool_remaining(&self, role: Role) -> MicroToken {
        self.sub_pools.get(&role).copied().unwrap_or(0)
    }

    /// Largest amount the pool can grant for `role`, at most `want`.
    /// Clamping only ever reduces the amount.
    pub fn clamp_for(&self, role: Role, want: MicroToken) -> MicroToken {
        want.min(self.sub_pool_remaining(role))
            .min(self.remaining_amount)
    }

    /// Debit the period remainder and the matching sub-pool.
    pub fn debit(&mut self, role: Role, amount: MicroToken) -> Result<(), LedgerError> {
        let sub = self.sub_pool_remaining(role);
        let insufficient = || LedgerError::InsufficientPool {
            period_key: self.period_key.clone(),
            role,
            amount,
        };
        let new_sub = sub.checked_sub(amount).ok_or_else(insufficient)?;
        let new_remaining = self
            .remaining_amount
            .checked_sub(amount)
            .ok_or_else(insufficient)?;
        self.sub_pools.insert(role, new_sub);
        self.remaining_amount = new_remaining;
        Ok(())
    }
}
