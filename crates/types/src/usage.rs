//! Per-user daily consumption rows.

use crate::scalars::{MicroToken, UserAddress};
use serde::{Deserialize, Serialize};

/// One user's consumption for one calendar day.
///
/// `seconds_used` is monotone non-decreasing within the day; a new row is
/// opened at the UTC date boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub user_address: UserAddress,
    pub date: String,
    pub seconds_used: u64,
    pub tokens_earned: MicroToken,
}

impl DailyUsage {
    /// Open an empty usage row for the first event of the day.
    pub fn open(user_address: UserAddress, date: impl Into<String>) -> Self {
        Self {
            user_address,
            date: date.into(),
            seconds_used: 0,
            tokens_earned: 0,
        }
    }

    /// Tokens still earnable today under `daily_cap`.
    pub fn headroom(&self, daily_cap: MicroToken) -> MicroToken {
        daily_cap.saturating_sub(self.tokens_earned)
    }

    /// Record one successful credit against this day.
    pub fn record(&mut self, seconds: u64, tokens: MicroToken) {
        self.seconds_used = self.seconds_used.saturating_add(seconds);
        self.tokens_earned = self.tokens_earned.saturating_add(tokens);
    }
}
