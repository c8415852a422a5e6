//! EarnLedger Reward Coordinator
//!
//! Orchestrates the credit pipeline for activity events: validation
//! against the reward policy, reward computation, and the atomic
//! settlement against the durable store, with bounded-backoff retry for
//! transient storage failures.

pub mod clock;
pub mod coordinator;
pub mod errors;

pub use clock::{Clock, FixedClock, SystemClock};
pub use coordinator::{RetryPolicy, RewardCoordinator, RewardStats};
pub use errors::RewardError;
