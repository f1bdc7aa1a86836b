//! Score-ordered membership storage backing the waiting queue.

use crate::error::StoreError;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

/// Result of a conditional pop of the lowest-scored member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopOutcome {
    Popped(String),
    Empty,
    /// The set changed between the read and the removal; nothing was removed.
    Conflict,
}

/// An ordered set per key, mapping members to numeric scores.
///
/// Ranks are zero-indexed in ascending score order. Ties are broken by member,
/// the way Redis sorted sets order them.
#[async_trait]
pub trait OrderedStore: Send + Sync {
    /// Inserts a member or updates its score.
    async fn insert(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// Returns whether the member was present.
    async fn remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn rank(&self, key: &str, member: &str) -> Result<Option<u64>, StoreError>;

    async fn cardinality(&self, key: &str) -> Result<u64, StoreError>;

    /// Members ranked `start..=stop`.
    async fn range(&self, key: &str, start: u64, stop: u64) -> Result<Vec<String>, StoreError>;

    /// Reads the lowest member and removes it only if the set was not
    /// modified in between.
    async fn pop_lowest(&self, key: &str) -> Result<PopOutcome, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

fn by_score(a: &(f64, String), b: &(f64, String)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1))
}

/// In-process store for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<String, Vec<(f64, String)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_set<R>(
        &self,
        key: &str,
        f: impl FnOnce(&mut Vec<(f64, String)>) -> R,
    ) -> Result<R, StoreError> {
        let mut sets = self
            .sets
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        let set = sets.entry(key.to_string()).or_default();
        let result = f(set);
        if set.is_empty() {
            sets.remove(key);
        }
        Ok(result)
    }
}

#[async_trait]
impl OrderedStore for MemoryStore {
    async fn insert(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        self.with_set(key, |set| {
            set.retain(|(_, m)| m != member);
            let entry = (score, member.to_string());
            let at = set
                .binary_search_by(|probe| by_score(probe, &entry))
                .unwrap_or_else(|at| at);
            set.insert(at, entry);
        })
    }

    async fn remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.with_set(key, |set| {
            let before = set.len();
            set.retain(|(_, m)| m != member);
            set.len() != before
        })
    }

    async fn rank(&self, key: &str, member: &str) -> Result<Option<u64>, StoreError> {
        self.with_set(key, |set| {
            set.iter()
                .position(|(_, m)| m == member)
                .map(|rank| rank as u64)
        })
    }

    async fn cardinality(&self, key: &str) -> Result<u64, StoreError> {
        self.with_set(key, |set| set.len() as u64)
    }

    async fn range(&self, key: &str, start: u64, stop: u64) -> Result<Vec<String>, StoreError> {
        self.with_set(key, |set| {
            set.iter()
                .skip(start as usize)
                .take(stop.saturating_sub(start).saturating_add(1) as usize)
                .map(|(_, m)| m.clone())
                .collect()
        })
    }

    async fn pop_lowest(&self, key: &str) -> Result<PopOutcome, StoreError> {
        // The lock makes read-and-remove atomic, so this never conflicts.
        self.with_set(key, |set| {
            if set.is_empty() {
                PopOutcome::Empty
            } else {
                PopOutcome::Popped(set.remove(0).1)
            }
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_members_are_ranked_by_score() {
        let store = MemoryStore::new();
        store.insert("q", "late", 30.0).await.unwrap();
        store.insert("q", "early", 10.0).await.unwrap();
        store.insert("q", "middle", 20.0).await.unwrap();

        assert_eq!(store.rank("q", "early").await.unwrap(), Some(0));
        assert_eq!(store.rank("q", "late").await.unwrap(), Some(2));
        assert_eq!(
            store.range("q", 0, 1).await.unwrap(),
            vec!["early".to_string(), "middle".to_string()]
        );
    }

    #[tokio::test]
    async fn test_equal_scores_order_by_member() {
        let store = MemoryStore::new();
        store.insert("q", "b", 1.0).await.unwrap();
        store.insert("q", "a", 1.0).await.unwrap();
        assert_eq!(store.range("q", 0, 10).await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_reinsert_updates_score() {
        let store = MemoryStore::new();
        store.insert("q", "a", 1.0).await.unwrap();
        store.insert("q", "b", 2.0).await.unwrap();
        store.insert("q", "a", 3.0).await.unwrap();

        assert_eq!(store.cardinality("q").await.unwrap(), 2);
        assert_eq!(store.rank("q", "a").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_pop_lowest_and_keys_are_isolated() {
        let store = MemoryStore::new();
        store.insert("q1", "x", 5.0).await.unwrap();
        store.insert("q1", "y", 1.0).await.unwrap();
        store.insert("q2", "z", 0.0).await.unwrap();

        assert_eq!(
            store.pop_lowest("q1").await.unwrap(),
            PopOutcome::Popped("y".to_string())
        );
        assert_eq!(store.cardinality("q2").await.unwrap(), 1);
        assert_eq!(store.pop_lowest("empty").await.unwrap(), PopOutcome::Empty);
        assert!(!store.remove("q1", "missing").await.unwrap());
    }
}
