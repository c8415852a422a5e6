use earnledger_types::Role;
use thiserror::Error;

/// Errors raised while reading or validating the reward policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("no reward policy configured for role {0:?}")]
    UnconfiguredRole(Role),

    #[error("no pool budget configured for period {0}")]
    UnconfiguredPeriod(String),

    #[error("sub-pool split misconfigured: artist ({artist}) + listener ({listener}) != 10000 bps")]
    InvalidSplit { artist: u16, listener: u16 },

    #[error("role {0:?} has a zero per-minute reward rate")]
    ZeroRate(Role),

    #[error("role {0:?} has a zero daily cap")]
    ZeroCap(Role),

    #[error("max single event duration must be positive")]
    ZeroEventCap,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
