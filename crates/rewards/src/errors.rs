use earnledger_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the coordinator.
///
/// Policy rejections are not errors — they come back as data in
/// `RewardOutcome::Rejected`. Only storage failures that survive the
/// bounded retry reach the caller this way.
#[derive(Debug, Error)]
pub enum RewardError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
