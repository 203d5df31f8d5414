//! Vote ledger for Tally
//!
//! This crate coordinates anonymous votes across two independently versioned
//! JSON documents held in a [`tally_storage::DocumentStore`]: an aggregate
//! document with per-item totals and a ledger document recording which
//! pseudonymous identities currently hold a vote. Every write is conditional
//! on a version token, with bounded retries when concurrent writers collide.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tally_storage::StoreError;

/// Error types for vote operations
#[derive(Error, Debug)]
pub enum VoteError {
    /// The item does not exist in the aggregate document
    #[error("item not found: {0}")]
    NotFound(String),

    /// The identity already holds a vote for this item
    #[error("already voted for item: {0}")]
    AlreadyVoted(String),

    /// The identity holds no vote for this item
    #[error("no vote to retract for item: {0}")]
    NotVoted(String),

    /// The identity has spent its vote-attempt budget for the current window
    #[error("rate limit exceeded")]
    RateLimited,

    /// Concurrent writers kept winning until the retry budget ran out
    #[error("version conflict persisted after retries: {0}")]
    Conflict(String),

    /// The document store failed or returned unusable data
    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),
}

impl VoteError {
    /// Whether the same call may succeed if simply repeated later.
    ///
    /// `NotFound`, `AlreadyVoted`, `NotVoted` and `RateLimited` describe the
    /// state of the world; repeating the call cannot change them.
    pub fn is_transient(&self) -> bool {
        matches!(self, VoteError::Conflict(_) | VoteError::StoreUnavailable(_))
    }
}

impl From<StoreError> for VoteError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(path) => VoteError::Conflict(path),
            other => VoteError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Result type for vote operations
pub type VoteResult<T> = Result<T, VoteError>;

/// Configuration for the vote ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteConfig {
    /// Store path of the aggregate document holding per-item totals
    pub aggregate_path: String,
    /// Store path of the ledger document recording who voted
    pub ledger_path: String,
    /// Salt mixed into identity derivation. Changing it unlinks every
    /// previously recorded identity.
    pub identity_salt: String,
    /// Retry policy for conflicting writes
    pub retry: RetryPolicy,
    /// Vote-attempt throttling
    pub rate_limit: RateLimitConfig,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            aggregate_path: "aggregate.json".to_string(),
            ledger_path: "ledger.json".to_string(),
            identity_salt: "tally-dev-salt".to_string(),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

pub mod clock;
pub mod coordinator;
pub mod documents;
pub mod identity;
pub mod rate_limit;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{ItemVotes, RetryPolicy, VoteCoordinator, VoteReceipt};
pub use documents::{AggregateDocument, ItemEntry, LedgerDocument};
pub use identity::IdentityDeriver;
pub use rate_limit::{RateLimitConfig, RateLimiter};
