// src/strategy/consistent_hash.rs
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A virtual-node consistent-hashing ring.
///
/// Not wired into [`super::create_strategy`] — request-hash-based affinity
/// has no corresponding strategy name in configuration, matching the
/// balancer this crate descends from, which builds this ring but never
/// registers it against a strategy name either. Kept as a standalone
/// collaborator for a future request-hash strategy to build on.
pub struct ConsistentHashRing {
    replicas: usize,
    ring: RwLock<BTreeMap<u64, String>>,
}

impl ConsistentHashRing {
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas,
            ring: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn add(&self, value: &str) {
        let mut ring = self.ring.write().expect("consistent hash ring poisoned");
        for r in 0..self.replicas {
            let key = Self::hash(&format!("{}-{}", value, r));
            ring.insert(key, value.to_string());
        }
    }

    pub fn remove(&self, value: &str) {
        let mut ring = self.ring.write().expect("consistent hash ring poisoned");
        for r in 0..self.replicas {
            let key = Self::hash(&format!("{}-{}", value, r));
            ring.remove(&key);
        }
    }

    /// Returns the value owning the first ring position at or after `hash`,
    /// wrapping around to the smallest position if `hash` is past the end.
    pub fn lookup(&self, hash: u64) -> Option<String> {
        let ring = self.ring.read().expect("consistent hash ring poisoned");
        if ring.is_empty() {
            return None;
        }
        ring.range(hash..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, v)| v.clone())
    }

    pub fn hash(input: &str) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        input.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_on_empty_ring_returns_none() {
        let ring = ConsistentHashRing::new(4);
        assert_eq!(ring.lookup(42), None);
    }

    #[test]
    fn a_single_node_answers_every_lookup() {
        let ring = ConsistentHashRing::new(4);
        ring.add("backend-a");

        for h in [0, 1000, u64::MAX] {
            assert_eq!(ring.lookup(h), Some("backend-a".to_string()));
        }
    }

    #[test]
    fn removing_a_node_clears_its_replicas() {
        let ring = ConsistentHashRing::new(8);
        ring.add("backend-a");
        ring.add("backend-b");
        ring.remove("backend-a");

        for h in [0, 12345, u64::MAX] {
            assert_eq!(ring.lookup(h), Some("backend-b".to_string()));
        }
    }
}
