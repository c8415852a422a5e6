//! Reward coordinator.
//!
//! One call per activity event: validate against the policy snapshot,
//! price the event, then hand the store a settlement request it can
//! apply atomically. Duplicate deliveries of the same `event_id` come
//! back as the originally recorded outcome.

use crate::clock::{Clock, SystemClock};
use crate::errors::RewardError;
use earnledger_policy::PolicyHandle;
use earnledger_storage::{RewardStore, SettleRequest, Settlement};
use earnledger_types::{
    day_key_for, mul_div_u128, period_key_for, ActivityEvent, MicroToken, RejectReason,
    RewardOutcome,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SECONDS_PER_MINUTE: u128 = 60;

/// Bounded exponential backoff for transient storage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(500),
        }
    }
}

/// Running counters for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardStats {
    pub events_credited: u64,
    pub events_replayed: u64,
    pub events_rejected: u64,
    pub storage_retries: u64,
    pub tokens_credited: MicroToken,
}

/// Sole writer of the pool, usage, and idempotency rows.
pub struct RewardCoordinator {
    policy: PolicyHandle,
    store: Arc<dyn RewardStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    stats: Mutex<RewardStats>,
}

impl RewardCoordinator {
    pub fn new(policy: PolicyHandle, store: Arc<dyn RewardStore>) -> Self {
        Self {
            policy,
            store,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
            stats: Mutex::new(RewardStats::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    pub fn stats(&self) -> RewardStats {
        self.stats.lock().clone()
    }

    /// Process one activity event to its terminal outcome.
    ///
    /// Safe to call concurrently from any number of threads; safe to call
    /// again with the same `event_id` after a timeout or crash.
    pub fn submit_activity_event(
        &self,
        event: &ActivityEvent,
    ) -> Result<RewardOutcome, RewardError> {
        let now = self.clock.now_unix();
        let req = match self.prepare(event, now) {
            Ok(req) => req,
            Err(reason) => {
                debug!(
                    target: "rewards",
                    event_id = %event.event_id,
                    ?reason,
                    "event rejected during validation"
                );
                self.stats.lock().events_rejected += 1;
                return Ok(RewardOutcome::Rejected { reason });
            }
        };

        let settlement = self.settle_with_retry(&req)?;
        let mut stats = self.stats.lock();
        match &settlement {
            Settlement::Replayed(outcome) => {
                stats.events_replayed += 1;
                debug!(
                    target: "rewards",
                    event_id = %req.event_id,
                    ?outcome,
                    "duplicate event, returning recorded outcome"
                );
            }
            Settlement::Applied(RewardOutcome::Credited { tokens }) => {
                stats.events_credited += 1;
                stats.tokens_credited = stats.tokens_credited.saturating_add(*tokens);
                info!(
                    target: "rewards",
                    event_id = %req.event_id,
                    user = %hex::encode(req.user_address),
                    period = %req.period_key,
                    tokens,
                    "activity event credited"
                );
            }
            Settlement::Applied(RewardOutcome::Rejected { reason }) => {
                stats.events_rejected += 1;
                debug!(
                    target: "rewards",
                    event_id = %req.event_id,
                    ?reason,
                    "event rejected at settlement"
                );
            }
        }
        drop(stats);
        Ok(settlement.into_outcome())
    }

    /// Validate the event and price it against the policy snapshot.
    fn prepare(&self, event: &ActivityEvent, now: u64) -> Result<SettleRequest, RejectReason> {
        if event.duration_seconds == 0 {
            return Err(RejectReason::InvalidDuration);
        }
        let policy = self.policy.snapshot();
        if event.occurred_at > now.saturating_add(policy.max_event_future_seconds) {
            return Err(RejectReason::FutureTimestamp);
        }
        if event
            .occurred_at
            .saturating_add(policy.max_event_age_seconds)
            < now
        {
            return Err(RejectReason::StaleTimestamp);
        }
        let day_key = day_key_for(event.occurred_at).ok_or(RejectReason::FutureTimestamp)?;
        let period_key = period_key_for(now).ok_or(RejectReason::StaleTimestamp)?;

        let rate = policy
            .rate_per_minute(event.role)
            .map_err(|_| RejectReason::Unconfigured)?;
        let daily_cap = policy
            .daily_cap(event.role)
            .map_err(|_| RejectReason::Unconfigured)?;
        let budget = policy
            .period_budget(&period_key)
            .map_err(|_| RejectReason::Unconfigured)?;

        let seconds = event.duration_seconds.min(policy.max_single_event_seconds);
        let computed_reward =
            mul_div_u128(rate, seconds as u128, SECONDS_PER_MINUTE).unwrap_or(0);
        if computed_reward == 0 {
            return Err(RejectReason::RewardTooSmall);
        }

        Ok(SettleRequest {
            event_id: event.event_id.clone(),
            user_address: event.user_address,
            role: event.role,
            period_key,
            day_key,
            seconds,
            computed_reward,
            daily_cap,
            budget,
            now,
        })
    }

    fn settle_with_retry(&self, req: &SettleRequest) -> Result<Settlement, RewardError> {
        let mut delay = self.retry.base_delay;
        let mut attempt = 1;
        loop {
            match self.store.settle(req) {
                Ok(settlement) => return Ok(settlement),
                Err(err) if err.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        target: "rewards",
                        event_id = %req.event_id,
                        attempt,
                        error = %err,
                        "transient storage failure, backing off"
                    );
                    self.stats.lock().storage_retries += 1;
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(self.retry.max_delay);
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
