//! Reward outcomes and the idempotency records that pin them.

use crate::scalars::MicroToken;
use serde::{Deserialize, Serialize};

/// Why an event was not credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// `duration_seconds` was zero.
    InvalidDuration,
    /// `occurred_at` is older than the accepted clock-skew window.
    StaleTimestamp,
    /// `occurred_at` is too far in the future.
    FutureTimestamp,
    /// The computed reward floors to zero micro-tokens.
    RewardTooSmall,
    /// No policy entry for this role or period.
    Unconfigured,
    /// The role's sub-pool for the current period is empty.
    PoolExhausted,
    /// The user already earned today's cap.
    DailyCapReached,
}

/// Terminal outcome of one activity event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardOutcome {
    Credited { tokens: MicroToken },
    Rejected { reason: RejectReason },
}

impl RewardOutcome {
    pub fn is_credited(&self) -> bool {
        matches!(self, RewardOutcome::Credited { .. })
    }

    /// Credited amount, zero for rejections.
    pub fn tokens(&self) -> MicroToken {
        match self {
            RewardOutcome::Credited { tokens } => *tokens,
            RewardOutcome::Rejected { .. } => 0,
        }
    }
}

/// Durable record that an `event_id` has been processed.
///
/// Written in the same atomic unit as the ledger mutations, exactly once
/// per event id. Replays read the stored outcome back instead of
/// re-processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub event_id: String,
    pub outcome: RewardOutcome,
    pub tokens_credited: MicroToken,
    pub recorded_at: u64,
}
