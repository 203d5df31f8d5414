//! Persisted document shapes.
//!
//! Two documents back the ledger. The aggregate document carries the ordered
//! list of votable items with their displayed totals; the ledger document
//! records which identity currently holds a vote on which item. The two are
//! versioned and written independently, so after a partial failure the
//! displayed total can briefly disagree with the ledger. The ledger document
//! is authoritative for "has voted", the aggregate for the displayed count.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One votable item in the aggregate document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemEntry {
    /// Unique item identifier
    pub id: String,
    /// Displayed vote total
    #[serde(default)]
    pub votes: u64,
    /// Fields owned by other producers, carried through rewrites untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ItemEntry {
    /// Create an entry with no votes
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            votes: 0,
            extra: serde_json::Map::new(),
        }
    }

    /// Count one newly recorded vote
    pub fn apply_cast(&mut self) {
        self.votes += 1;
    }

    /// Uncount one retracted vote. The total floors at zero even when the
    /// documents have drifted apart.
    pub fn apply_retract(&mut self) {
        self.votes = self.votes.saturating_sub(1);
    }
}

/// The aggregate document: ordered per-item vote totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateDocument {
    #[serde(default)]
    pub entries: Vec<ItemEntry>,
}

impl AggregateDocument {
    /// Find an item by id
    pub fn entry(&self, item_id: &str) -> Option<&ItemEntry> {
        self.entries.iter().find(|e| e.id == item_id)
    }

    /// Find an item by id for mutation
    pub fn entry_mut(&mut self, item_id: &str) -> Option<&mut ItemEntry> {
        self.entries.iter_mut().find(|e| e.id == item_id)
    }
}

/// The ledger document: which identities hold a vote on which items.
/// Leaf values are cast timestamps in epoch milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerDocument {
    #[serde(default)]
    pub votes: HashMap<String, HashMap<String, u64>>,
}

impl LedgerDocument {
    /// Whether the identity holds a vote on the item
    pub fn has_vote(&self, item_id: &str, identity: &str) -> bool {
        self.votes
            .get(item_id)
            .map(|item_votes| item_votes.contains_key(identity))
            .unwrap_or(false)
    }

    /// Record a vote with its cast timestamp
    pub fn record_vote(&mut self, item_id: &str, identity: &str, cast_at_ms: u64) {
        self.votes
            .entry(item_id.to_string())
            .or_insert_with(HashMap::new)
            .insert(identity.to_string(), cast_at_ms);
    }

    /// Remove a vote, reporting whether one was recorded. An item map left
    /// empty is dropped from the document.
    pub fn clear_vote(&mut self, item_id: &str, identity: &str) -> bool {
        match self.votes.get_mut(item_id) {
            Some(item_votes) => {
                let removed = item_votes.remove(identity).is_some();
                if item_votes.is_empty() {
                    self.votes.remove(item_id);
                }
                removed
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_lookup() {
        let mut aggregate = AggregateDocument::default();
        aggregate.entries.push(ItemEntry::new("a1"));
        aggregate.entries.push(ItemEntry::new("a2"));

        assert!(aggregate.entry("a1").is_some());
        assert!(aggregate.entry("a3").is_none());

        aggregate.entry_mut("a2").unwrap().apply_cast();
        assert_eq!(aggregate.entry("a2").unwrap().votes, 1);
    }

    #[test]
    fn test_apply_retract_floors_at_zero() {
        let mut entry = ItemEntry::new("a1");
        entry.apply_retract();
        assert_eq!(entry.votes, 0);

        entry.apply_cast();
        entry.apply_retract();
        entry.apply_retract();
        assert_eq!(entry.votes, 0);
    }

    #[test]
    fn test_record_and_clear_vote() {
        let mut ledger = LedgerDocument::default();
        assert!(!ledger.has_vote("a1", "h1"));

        ledger.record_vote("a1", "h1", 1_700_000_000_000);
        assert!(ledger.has_vote("a1", "h1"));
        assert!(!ledger.has_vote("a1", "h2"));

        assert!(ledger.clear_vote("a1", "h1"));
        assert!(!ledger.has_vote("a1", "h1"));
        assert!(!ledger.clear_vote("a1", "h1"));
    }

    #[test]
    fn test_empty_item_map_is_pruned() {
        let mut ledger = LedgerDocument::default();
        ledger.record_vote("a1", "h1", 1);
        ledger.record_vote("a1", "h2", 2);

        ledger.clear_vote("a1", "h1");
        assert!(ledger.votes.contains_key("a1"));

        ledger.clear_vote("a1", "h2");
        assert!(!ledger.votes.contains_key("a1"));
    }

    #[test]
    fn test_unknown_aggregate_fields_survive_roundtrip() {
        let raw = r#"{"entries":[{"id":"a1","votes":2,"title":"Proposal A","owner":"ops"}]}"#;
        let aggregate: AggregateDocument = serde_json::from_str(raw).unwrap();

        let entry = aggregate.entry("a1").unwrap();
        assert_eq!(entry.votes, 2);
        assert_eq!(entry.extra.get("title").unwrap(), "Proposal A");

        let out = serde_json::to_string(&aggregate).unwrap();
        assert!(out.contains("\"title\":\"Proposal A\""));
        assert!(out.contains("\"owner\":\"ops\""));
    }

    #[test]
    fn test_missing_votes_field_defaults_to_zero() {
        let raw = r#"{"entries":[{"id":"a1","title":"Proposal A"}]}"#;
        let aggregate: AggregateDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(aggregate.entry("a1").unwrap().votes, 0);
    }

    #[test]
    fn test_ledger_document_json_shape() {
        let mut ledger = LedgerDocument::default();
        ledger.record_vote("a1", "h1", 1_700_000_000_000);

        let out = serde_json::to_value(&ledger).unwrap();
        assert_eq!(out["votes"]["a1"]["h1"], 1_700_000_000_000u64);
    }
}
