//! Vote coordination across the aggregate and ledger documents.
//!
//! The store offers conditional writes on single documents and nothing
//! stronger, so a vote is applied as two independent version-guarded writes:
//! the ledger document first, then the aggregate. A write that loses a race
//! is re-read and retried once under the fresh token; an attempt whose
//! writes still conflict is repeated from a fresh read, with backoff, until
//! the attempt budget runs out. A write that has committed stays committed,
//! and later attempts pursue only the document still pending, so one
//! operation never applies the same count change twice.
//!
//! A crash or an exhausted budget between the two writes leaves the
//! documents disagreeing by the in-flight vote. The ledger document wins
//! for "has voted" and the aggregate for the displayed total; reads derive
//! each answer from its own document and stay truthful under the drift.

use std::sync::Arc;
use std::time::Duration;

use futures::join;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use tally_storage::{DocumentStore, JsonDocumentStore, StoreError, VersionToken};

use crate::clock::{Clock, SystemClock};
use crate::documents::{AggregateDocument, LedgerDocument};
use crate::{VoteConfig, VoteError, VoteResult};

/// Retry policy for conflicting writes.
///
/// An operation makes up to `max_attempts` full read-validate-write passes.
/// Attempt `n` is preceded by `n - 1` times the base delay. Within a pass,
/// each document write that conflicts is re-read and retried once after the
/// refresh delay; conflicts beyond that consume the next attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum read-validate-write passes per operation
    pub max_attempts: u32,
    /// Base delay between passes in milliseconds
    pub attempt_delay_ms: u64,
    /// Pause before re-reading a conflicted document in milliseconds
    pub refresh_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_delay_ms: 1_000,
            refresh_delay_ms: 150,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given 1-based attempt; the first attempt never waits
    pub fn attempt_delay(&self, attempt: u32) -> Duration {
        let steps = u64::from(attempt.saturating_sub(1));
        Duration::from_millis(self.attempt_delay_ms.saturating_mul(steps))
    }

    /// Pause before a conflicted document is re-read
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }
}

/// Outcome of a successful cast or retract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    /// The item the vote applied to
    pub item_id: String,
    /// The item's total as written by this operation
    pub vote_count: u64,
}

/// Per-item view returned by [`VoteCoordinator::list_votes`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVotes {
    /// Item identifier
    pub id: String,
    /// Displayed vote total
    pub vote_count: u64,
    /// Whether the querying identity holds a vote on this item
    pub user_voted: bool,
}

/// Outcome of a conditional write after at most one version refresh
enum WriteOutcome<T> {
    /// The document was written; carries the content as persisted
    Committed(T),
    /// Both the original and the refreshed write hit version conflicts
    Conflicted,
}

/// Coordinates votes across the aggregate and ledger documents
pub struct VoteCoordinator {
    store: Arc<dyn DocumentStore>,
    config: VoteConfig,
    clock: Arc<dyn Clock>,
}

impl VoteCoordinator {
    /// Create a coordinator using the system clock
    pub fn new(store: Arc<dyn DocumentStore>, config: VoteConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create a coordinator with an explicit time source
    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        config: VoteConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Cast a vote for an item on behalf of a derived identity.
    ///
    /// One identity holds at most one vote per item; a second cast is
    /// rejected with [`VoteError::AlreadyVoted`]. Returns the item's total
    /// as written by this operation.
    pub async fn cast_vote(&self, item_id: &str, identity: &str) -> VoteResult<VoteReceipt> {
        let cast_at = self.clock.now_ms();
        self.mutate(
            item_id,
            |ledger: &mut LedgerDocument| {
                if ledger.has_vote(item_id, identity) {
                    return Err(VoteError::AlreadyVoted(item_id.to_string()));
                }
                ledger.record_vote(item_id, identity, cast_at);
                Ok(())
            },
            |aggregate: &mut AggregateDocument| match aggregate.entry_mut(item_id) {
                Some(entry) => {
                    entry.apply_cast();
                    Ok(())
                }
                None => Err(VoteError::NotFound(item_id.to_string())),
            },
        )
        .await
    }

    /// Retract a previously cast vote.
    ///
    /// Rejected with [`VoteError::NotVoted`] when the identity holds no
    /// vote on the item. Returns the item's total as written.
    pub async fn retract_vote(&self, item_id: &str, identity: &str) -> VoteResult<VoteReceipt> {
        self.mutate(
            item_id,
            |ledger: &mut LedgerDocument| {
                if !ledger.clear_vote(item_id, identity) {
                    return Err(VoteError::NotVoted(item_id.to_string()));
                }
                Ok(())
            },
            |aggregate: &mut AggregateDocument| match aggregate.entry_mut(item_id) {
                Some(entry) => {
                    entry.apply_retract();
                    Ok(())
                }
                None => Err(VoteError::NotFound(item_id.to_string())),
            },
        )
        .await
    }

    /// List every item with its displayed total.
    ///
    /// With an identity, each row also reports whether that identity holds
    /// a vote. The two documents are read as independent snapshots.
    pub async fn list_votes(&self, identity: Option<&str>) -> VoteResult<Vec<ItemVotes>> {
        let (aggregate_read, ledger_read) = join!(
            self.store
                .get_json::<AggregateDocument>(&self.config.aggregate_path),
            self.store.get_json::<LedgerDocument>(&self.config.ledger_path),
        );

        let aggregate = match aggregate_read? {
            Some((document, _)) => document,
            None => {
                return Err(VoteError::StoreUnavailable(format!(
                    "aggregate document missing at {}",
                    self.config.aggregate_path
                )))
            }
        };
        let ledger = match ledger_read? {
            Some((document, _)) => document,
            None => LedgerDocument::default(),
        };

        Ok(aggregate
            .entries
            .iter()
            .map(|entry| ItemVotes {
                id: entry.id.clone(),
                vote_count: entry.votes,
                user_voted: identity
                    .map(|token| ledger.has_vote(&entry.id, token))
                    .unwrap_or(false),
            })
            .collect())
    }

    /// Apply a validated change to both documents with bounded retries
    async fn mutate<L, A>(
        &self,
        item_id: &str,
        mut ledger_mutation: L,
        mut aggregate_mutation: A,
    ) -> VoteResult<VoteReceipt>
    where
        L: FnMut(&mut LedgerDocument) -> VoteResult<()> + Send,
        A: FnMut(&mut AggregateDocument) -> VoteResult<()> + Send,
    {
        // An empty id can never match an entry; reject before touching the store.
        if item_id.trim().is_empty() {
            return Err(VoteError::NotFound(item_id.to_string()));
        }

        let retry = self.config.retry.clone();

        // A committed write is final for this operation. Later attempts
        // re-read and pursue only the document still pending, so the same
        // count change is never applied twice no matter how many attempts
        // the operation takes.
        let mut ledger_committed = false;
        let mut committed_aggregate: Option<AggregateDocument> = None;

        for attempt in 1..=retry.max_attempts {
            let delay = retry.attempt_delay(attempt);
            if !delay.is_zero() {
                sleep(delay).await;
            }

            // Read both documents concurrently, each with its own version token
            let (aggregate_read, ledger_read) = join!(
                self.store
                    .get_json::<AggregateDocument>(&self.config.aggregate_path),
                self.store.get_json::<LedgerDocument>(&self.config.ledger_path),
            );

            // A missing aggregate means there is nothing to vote on; a
            // missing ledger is the empty initial state.
            let (mut aggregate, aggregate_version) = match aggregate_read? {
                Some((document, version)) => (document, Some(version)),
                None => {
                    return Err(VoteError::StoreUnavailable(format!(
                        "aggregate document missing at {}",
                        self.config.aggregate_path
                    )))
                }
            };
            let (mut ledger, ledger_version) = match ledger_read? {
                Some((document, version)) => (document, Some(version)),
                None => (LedgerDocument::default(), None),
            };

            // Validate and apply on the working copies of whatever is still
            // pending. Business rejections are terminal and surface
            // immediately; the aggregate check runs first so an unknown
            // item reports NotFound ahead of any ledger-side rejection.
            if committed_aggregate.is_none() {
                aggregate_mutation(&mut aggregate)?;
            }
            if !ledger_committed {
                ledger_mutation(&mut ledger)?;
            }

            // Two independent conditional writes, ledger first. The
            // aggregate write goes ahead even when the ledger write
            // conflicted out.
            if !ledger_committed {
                match self
                    .write_with_refresh(
                        &self.config.ledger_path,
                        ledger,
                        ledger_version,
                        &mut ledger_mutation,
                    )
                    .await?
                {
                    WriteOutcome::Committed(_) => ledger_committed = true,
                    WriteOutcome::Conflicted => {}
                }
            }
            if committed_aggregate.is_none() {
                match self
                    .write_with_refresh(
                        &self.config.aggregate_path,
                        aggregate,
                        aggregate_version,
                        &mut aggregate_mutation,
                    )
                    .await?
                {
                    WriteOutcome::Committed(document) => committed_aggregate = Some(document),
                    WriteOutcome::Conflicted => {}
                }
            }

            if ledger_committed {
                if let Some(aggregate) = &committed_aggregate {
                    let vote_count = aggregate
                        .entry(item_id)
                        .map(|entry| entry.votes)
                        .unwrap_or_default();
                    debug!("updated {} to {} votes", item_id, vote_count);
                    return Ok(VoteReceipt {
                        item_id: item_id.to_string(),
                        vote_count,
                    });
                }
            }
            warn!(
                "version conflicts persisted for {} on attempt {}/{}",
                item_id, attempt, retry.max_attempts
            );
        }

        warn!(
            "giving up on {} after {} attempts",
            item_id, retry.max_attempts
        );
        Err(VoteError::Conflict(item_id.to_string()))
    }

    /// Conditionally write one document, refreshing its version once on
    /// conflict.
    ///
    /// On conflict the document is re-read, the mutation is re-validated and
    /// re-applied to the fresh copy, and the write is tried once more. A
    /// document that vanished before the refresh is rebuilt from its empty
    /// form; the mutation decides whether that state is acceptable.
    async fn write_with_refresh<T, F>(
        &self,
        path: &str,
        document: T,
        version: Option<VersionToken>,
        apply: &mut F,
    ) -> VoteResult<WriteOutcome<T>>
    where
        T: Serialize + DeserializeOwned + Default + Send + Sync,
        F: FnMut(&mut T) -> VoteResult<()> + Send,
    {
        // First write under the version observed by the caller's read
        match self.store.put_json(path, &document, version.as_ref()).await {
            Ok(()) => return Ok(WriteOutcome::Committed(document)),
            Err(StoreError::Conflict(_)) => {}
            Err(err) => return Err(err.into()),
        }

        debug!("version conflict on {}, refreshing", path);
        let delay = self.config.retry.refresh_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }

        let (mut fresh, fresh_version) = match self.store.get_json::<T>(path).await? {
            Some((document, version)) => (document, Some(version)),
            None => (T::default(), None),
        };
        apply(&mut fresh)?;

        match self.store.put_json(path, &fresh, fresh_version.as_ref()).await {
            Ok(()) => Ok(WriteOutcome::Committed(fresh)),
            Err(StoreError::Conflict(_)) => Ok(WriteOutcome::Conflicted),
            Err(err) => Err(err.into()),
        }
    }
}
