//! What callers observe when only half of a vote lands.
//!
//! The two documents are written independently, so a vote whose ledger
//! write commits can still lose the aggregate write to version conflicts.
//! These tests pin down the promised behavior afterwards: each document
//! keeps answering for itself, and no count change is ever applied twice.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use tally::ledger::{
    AggregateDocument, ItemEntry, ManualClock, RetryPolicy, VoteConfig, VoteCoordinator, VoteError,
};
use tally::storage::{
    DocumentStore, Fetched, JsonDocumentStore, MemoryDocumentStore, StoreError, StoreResult,
    VersionToken,
};

/// Memory-backed store whose writes to one path can be forced to conflict,
/// as if another writer kept winning the version race there.
struct FlakyStore {
    inner: MemoryDocumentStore,
    conflicting: Mutex<Option<(String, u32)>>,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryDocumentStore::new(),
            conflicting: Mutex::new(None),
        }
    }

    /// Conflict every write to the path until told otherwise
    fn start_conflicting(&self, path: &str) {
        *self.conflicting.lock().unwrap() = Some((path.to_string(), u32::MAX));
    }

    /// Conflict only the next `times` writes to the path, then recover
    fn conflict_next(&self, path: &str, times: u32) {
        *self.conflicting.lock().unwrap() = Some((path.to_string(), times));
    }

    fn stop_conflicting(&self) {
        *self.conflicting.lock().unwrap() = None;
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Fetched>> {
        self.inner.get(path).await
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        expected: Option<&VersionToken>,
    ) -> StoreResult<()> {
        {
            let mut conflicting = self.conflicting.lock().unwrap();
            if let Some((blocked, remaining)) = conflicting.as_mut() {
                if blocked == path && *remaining > 0 {
                    *remaining -= 1;
                    return Err(StoreError::Conflict(path.to_string()));
                }
            }
        }
        self.inner.put(path, content, expected).await
    }
}

fn test_config() -> VoteConfig {
    VoteConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            attempt_delay_ms: 0,
            refresh_delay_ms: 0,
        },
        ..VoteConfig::default()
    }
}

async fn seed_item(store: &FlakyStore, config: &VoteConfig, id: &str, votes: u64) {
    let mut entry = ItemEntry::new(id);
    entry.votes = votes;
    store
        .put_json(
            &config.aggregate_path,
            &AggregateDocument {
                entries: vec![entry],
            },
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_half_applied_cast_stays_truthful_and_bounded() {
    let config = test_config();
    let store = Arc::new(FlakyStore::new());
    seed_item(&store, &config, "a1", 3).await;

    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let coordinator = VoteCoordinator::with_clock(store.clone(), config.clone(), clock);

    // The ledger write lands on the first attempt; every aggregate write
    // conflicts until the retry budget is spent.
    store.start_conflicting(&config.aggregate_path);
    let err = coordinator.cast_vote("a1", "h1").await.unwrap_err();
    assert!(matches!(err, VoteError::Conflict(_)));
    assert!(err.is_transient());

    // Each document answers for itself: the vote is held, the displayed
    // total is one behind.
    let items = coordinator.list_votes(Some("h1")).await.unwrap();
    assert!(items[0].user_voted);
    assert_eq!(items[0].vote_count, 3);

    // A retry of the cast reports the truth the ledger already holds.
    let err = coordinator.cast_vote("a1", "h1").await.unwrap_err();
    assert!(matches!(err, VoteError::AlreadyVoted(_)));

    // Later operations keep adjusting the total by exactly one each; the
    // unit lost to the failed write is never reapplied.
    store.stop_conflicting();
    let receipt = coordinator.cast_vote("a1", "h2").await.unwrap();
    assert_eq!(receipt.vote_count, 4);

    let receipt = coordinator.retract_vote("a1", "h1").await.unwrap();
    assert_eq!(receipt.vote_count, 3);

    let items = coordinator.list_votes(Some("h2")).await.unwrap();
    assert!(items[0].user_voted);
    assert_eq!(items[0].vote_count, 3);
}

#[tokio::test]
async fn test_recovered_conflicts_leave_no_drift() {
    let config = test_config();
    let store = Arc::new(FlakyStore::new());
    seed_item(&store, &config, "a1", 0).await;

    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let coordinator = VoteCoordinator::with_clock(store.clone(), config.clone(), clock);

    // The first attempt loses both of its ledger tries and commits only
    // the aggregate; the conflicts then clear, and the next attempt
    // completes the pending ledger write instead of failing the vote.
    store.conflict_next(&config.ledger_path, 2);

    let receipt = coordinator.cast_vote("a1", "h1").await.unwrap();
    assert_eq!(receipt.vote_count, 1);

    let items = coordinator.list_votes(Some("h1")).await.unwrap();
    assert!(items[0].user_voted);
    assert_eq!(items[0].vote_count, 1);
}
