//! Reward policy configuration.
//!
//! Supplies the parameters the coordinator needs to price an activity
//! event: per-role minute rates and daily caps, the emission pool budget
//! per period, and the validation windows. The policy is pure data —
//! reading it never mutates anything — and [`PolicyHandle`] makes it
//! reloadable at runtime without code change.
//!
//! A role or period with no configuration is a hard error, never a silent
//! zero-rate default.

pub mod errors;

pub use errors::PolicyError;

use earnledger_types::{
    day_key_for, mul_div_u128, period_key_for, MicroToken, PeriodBudget, Role,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const BASIS_POINTS_DENOM: u16 = 10_000;
const DEFAULT_LISTENER_RATE: MicroToken = 1_000_000; // 1 token/minute
const DEFAULT_ARTIST_RATE: MicroToken = 3_000_000; // 3 tokens/minute
const DEFAULT_LISTENER_DAILY_CAP: MicroToken = 60_000_000; // 60 tokens/day
const DEFAULT_ARTIST_DAILY_CAP: MicroToken = 180_000_000;
const DEFAULT_PERIOD_POOL_TOTAL: MicroToken = 100_000_000_000;
const DEFAULT_ARTIST_SHARE_BPS: u16 = 4_000; // 40%
const DEFAULT_LISTENER_SHARE_BPS: u16 = 6_000; // 60%
const DEFAULT_MAX_SINGLE_EVENT_SECONDS: u64 = 30 * 60;
const DEFAULT_MAX_EVENT_AGE_SECONDS: u64 = 24 * 3600;
const DEFAULT_MAX_EVENT_FUTURE_SECONDS: u64 = 5 * 60;

/// Per-role pricing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    pub rate_per_minute: MicroToken,
    pub daily_cap: MicroToken,
}

/// Full reward policy. Externally supplied (JSON file) and reloadable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPolicy {
    pub roles: BTreeMap<Role, RolePolicy>,
    /// Pool budget applied to every period without an explicit override.
    pub period_pool_total: MicroToken,
    /// Per-period budget overrides, keyed by "YYYY-MM".
    #[serde(default)]
    pub period_overrides: BTreeMap<String, MicroToken>,
    pub artist_share_bps: u16,
    pub listener_share_bps: u16,
    /// Per-event duration cap, bounding the blast radius of one event.
    pub max_single_event_seconds: u64,
    pub max_event_age_seconds: u64,
    pub max_event_future_seconds: u64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            Role::Listener,
            RolePolicy {
                rate_per_minute: DEFAULT_LISTENER_RATE,
                daily_cap: DEFAULT_LISTENER_DAILY_CAP,
            },
        );
        roles.insert(
            Role::Artist,
            RolePolicy {
                rate_per_minute: DEFAULT_ARTIST_RATE,
                daily_cap: DEFAULT_ARTIST_DAILY_CAP,
            },
        );
        Self {
            roles,
            period_pool_total: DEFAULT_PERIOD_POOL_TOTAL,
            period_overrides: BTreeMap::new(),
            artist_share_bps: DEFAULT_ARTIST_SHARE_BPS,
            listener_share_bps: DEFAULT_LISTENER_SHARE_BPS,
            max_single_event_seconds: DEFAULT_MAX_SINGLE_EVENT_SECONDS,
            max_event_age_seconds: DEFAULT_MAX_EVENT_AGE_SECONDS,
            max_event_future_seconds: DEFAULT_MAX_EVENT_FUTURE_SECONDS,
        }
    }
}

impl RewardPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        let total = self
            .artist_share_bps
            .saturating_add(self.listener_share_bps);
        if total != BASIS_POINTS_DENOM {
            return Err(PolicyError::InvalidSplit {
                artist: self.artist_share_bps,
                listener: self.listener_share_bps,
            });
        }
        for (role, policy) in &self.roles {
            if policy.rate_per_minute == 0 {
                return Err(PolicyError::ZeroRate(*role));
            }
            if policy.daily_cap == 0 {
                return Err(PolicyError::ZeroCap(*role));
            }
        }
        if self.max_single_event_seconds == 0 {
            return Err(PolicyError::ZeroEventCap);
        }
        Ok(())
    }

    pub fn rate_per_minute(&self, role: Role) -> Result<MicroToken, PolicyError> {
        self.roles
            .get(&role)
            .map(|p| p.rate_per_minute)
            .ok_or(PolicyError::UnconfiguredRole(role))
    }

    pub fn daily_cap(&self, role: Role) -> Result<MicroToken, PolicyError> {
        self.roles
            .get(&role)
            .map(|p| p.daily_cap)
            .ok_or(PolicyError::UnconfiguredRole(role))
    }

    /// Emission period key ("YYYY-MM") containing `now`.
    pub fn current_period_key(&self, now: u64) -> Option<String> {
        period_key_for(now)
    }

    /// Calendar-day key for an event timestamp.
    pub fn day_key(&self, occurred_at: u64) -> Option<String> {
        day_key_for(occurred_at)
    }

    /// Budget for a period, with the listener share absorbing the split
    /// remainder so no unit is lost to rounding.
    pub fn period_budget(&self, period_key: &str) -> Result<PeriodBudget, PolicyError> {
        let total = self
            .period_overrides
            .get(period_key)
            .copied()
            .unwrap_or(self.period_pool_total);
        if total == 0 {
            return Err(PolicyError::UnconfiguredPeriod(period_key.to_string()));
        }
        let artist_share = mul_div_u128(
            total,
            self.artist_share_bps as u128,
            BASIS_POINTS_DENOM as u128,
        )
        .unwrap_or(0);
        Ok(PeriodBudget {
            total,
            artist_share,
            listener_share: total - artist_share,
        })
    }

    /// Load and validate a policy from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PolicyError> {
        let raw = std::fs::read(path)?;
        let policy: Self = serde_json::from_slice(&raw)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Write the policy to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PolicyError> {
        let raw = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

/// Shared, reloadable policy handle. Cheap to clone; reads never block
/// other reads.
#[derive(Clone)]
pub struct PolicyHandle {
    inner: Arc<RwLock<RewardPolicy>>,
}

impl PolicyHandle {
    pub fn new(policy: RewardPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(policy)),
        })
    }

    /// Swap in a new policy after validation. In-flight settlements keep
    /// the snapshot they priced against.
    pub fn reload(&self, policy: RewardPolicy) -> Result<(), PolicyError> {
        policy.validate()?;
        *self.inner.write() = policy;
        info!(target: "policy", "reward policy reloaded");
        Ok(())
    }

    pub fn snapshot(&self) -> RewardPolicy {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_validates() {
        assert!(RewardPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_split_rejected() {
        let policy = RewardPolicy {
            artist_share_bps: 5000,
            listener_share_bps: 6000,
            ..Default::default()
        };
        assert!(matches!(
            policy.validate(),
            Err(PolicyError::InvalidSplit { .. })
        ));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let mut policy = RewardPolicy::default();
        policy.roles.insert(
            Role::Listener,
            RolePolicy {
                rate_per_minute: 0,
                daily_cap: 5,
            },
        );
        assert!(matches!(
            policy.validate(),
            Err(PolicyError::ZeroRate(Role::Listener))
        ));
    }

    #[test]
    fn test_unconfigured_role_is_an_error() {
        let mut policy = RewardPolicy::default();
        policy.roles.remove(&Role::Artist);
        assert!(matches!(
            policy.rate_per_minute(Role::Artist),
            Err(PolicyError::UnconfiguredRole(Role::Artist))
        ));
        assert!(matches!(
            policy.daily_cap(Role::Artist),
            Err(PolicyError::UnconfiguredRole(Role::Artist))
        ));
    }

    #[test]
    fn test_period_budget_split() {
        let policy = RewardPolicy {
            period_pool_total: 100,
            ..Default::default()
        };
        let budget = policy.period_budget("2025-05").unwrap();
        assert_eq!(budget.total, 100);
        assert_eq!(budget.artist_share, 40);
        assert_eq!(budget.listener_share, 60);
        assert_eq!(budget.artist_share + budget.listener_share, budget.total);
    }

    #[test]
    fn test_period_budget_override() {
        let mut policy = RewardPolicy::default();
        policy.period_overrides.insert("2025-06".to_string(), 1000);
        assert_eq!(policy.period_budget("2025-06").unwrap().total, 1000);
        assert_eq!(
            policy.period_budget("2025-05").unwrap().total,
            policy.period_pool_total
        );
    }

    #[test]
    fn test_zero_budget_is_unconfigured() {
        let policy = RewardPolicy {
            period_pool_total: 0,
            ..Default::default()
        };
        assert!(matches!(
            policy.period_budget("2025-05"),
            Err(PolicyError::UnconfiguredPeriod(_))
        ));
    }

    #[test]
    fn test_handle_reload_rejects_invalid() {
        let handle = PolicyHandle::new(RewardPolicy::default()).unwrap();
        let bad = RewardPolicy {
            artist_share_bps: 1,
            listener_share_bps: 1,
            ..Default::default()
        };
        assert!(handle.reload(bad).is_err());
        // Old policy still in place.
        assert!(handle.snapshot().validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let policy = RewardPolicy::default();
        policy.save(&path).unwrap();
        let loaded = RewardPolicy::load(&path).unwrap();
        assert_eq!(loaded, policy);
    }
}
