// src/strategy/least_connections.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::RwLock;

use rand::seq::SliceRandom;

use crate::backend::Backend;

use super::Strategy;

/// Selects the live backend with the fewest active connections, breaking
/// ties at random rather than always favoring the lowest index — picking
/// the first minimum every time would starve later backends whenever two
/// or more sit at the same count.
pub struct LeastConnectionsStrategy {
    counts: RwLock<Vec<AtomicUsize>>,
}

impl LeastConnectionsStrategy {
    pub fn new(backend_count: usize) -> Self {
        let counts = (0..backend_count).map(|_| AtomicUsize::new(0)).collect();
        Self {
            counts: RwLock::new(counts),
        }
    }
}

impl Strategy for LeastConnectionsStrategy {
    fn select(&self, backends: &[Arc<Backend>]) -> Option<usize> {
        let counts = self.counts.read().expect("least connections lock poisoned");

        let mut best: Option<usize> = None;
        let mut candidates = Vec::new();

        for (i, backend) in backends.iter().enumerate() {
            if !backend.is_alive() {
                continue;
            }
            let c = counts[i].load(Ordering::Relaxed);
            match best {
                None => {
                    best = Some(c);
                    candidates.clear();
                    candidates.push(i);
                }
                Some(b) if c < b => {
                    best = Some(c);
                    candidates.clear();
                    candidates.push(i);
                }
                Some(b) if c == b => {
                    candidates.push(i);
                }
                _ => {}
            }
        }

        candidates.choose(&mut rand::thread_rng()).copied()
    }

    fn add_backends(&self, n: usize) {
        let mut counts = self.counts.write().expect("least connections lock poisoned");
        for _ in 0..n {
            counts.push(AtomicUsize::new(0));
        }
    }

    fn remove_backends(&self, removed_indices: &[usize]) {
        let mut counts = self.counts.write().expect("least connections lock poisoned");
        let mut new_counts = Vec::with_capacity(counts.len() - removed_indices.len());
        let mut r = 0;
        for (i, c) in counts.drain(..).enumerate() {
            if r < removed_indices.len() && removed_indices[r] == i {
                r += 1;
            } else {
                new_counts.push(c);
            }
        }
        *counts = new_counts;
    }

    fn name(&self) -> &'static str {
        "least_connections"
    }

    fn on_connection_start(&self, index: usize) {
        let counts = self.counts.read().expect("least connections lock poisoned");
        if let Some(c) = counts.get(index) {
            c.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_connection_end(&self, index: usize) {
        let counts = self.counts.read().expect("least connections lock poisoned");
        if let Some(c) = counts.get(index) {
            let prev = c.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                if v == 0 {
                    None
                } else {
                    Some(v - 1)
                }
            });
            if prev.is_err() {
                tracing::warn!(index, "connection_end with no matching connection_start, clamping to 0");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendInfo;

    fn backends(n: usize) -> Vec<Arc<Backend>> {
        (0..n)
            .map(|i| Arc::new(Backend::new(&BackendInfo::new("h", 8000 + i as u16).unwrap())))
            .collect()
    }

    #[test]
    fn s3_picks_backend_with_fewest_connections() {
        let backs = backends(3);
        let lc = LeastConnectionsStrategy::new(3);

        lc.on_connection_start(0);
        lc.on_connection_start(0);
        lc.on_connection_start(1);

        assert_eq!(lc.select(&backs), Some(2));
    }

    #[test]
    fn connection_end_frees_up_the_backend_again() {
        let backs = backends(2);
        let lc = LeastConnectionsStrategy::new(2);

        lc.on_connection_start(0);
        lc.on_connection_start(0);
        assert_eq!(lc.select(&backs), Some(1));

        lc.on_connection_end(0);
        lc.on_connection_end(0);
        lc.on_connection_start(1);
        assert_eq!(lc.select(&backs), Some(0));
    }

    #[test]
    fn dead_backends_are_never_selected() {
        let backs = backends(2);
        backs[0].mark_dead();
        let lc = LeastConnectionsStrategy::new(2);

        assert_eq!(lc.select(&backs), Some(1));
    }

    #[test]
    fn unmatched_connection_end_clamps_to_zero_instead_of_wrapping() {
        let backs = backends(1);
        let lc = LeastConnectionsStrategy::new(1);

        lc.on_connection_end(0);
        lc.on_connection_end(0);

        assert_eq!(lc.select(&backs), Some(0));
    }

    #[test]
    fn add_and_remove_keep_counts_aligned() {
        let lc = LeastConnectionsStrategy::new(3);
        lc.add_backends(2);
        assert_eq!(lc.counts.read().unwrap().len(), 5);

        lc.remove_backends(&[1, 3]);
        assert_eq!(lc.counts.read().unwrap().len(), 3);
    }
}
