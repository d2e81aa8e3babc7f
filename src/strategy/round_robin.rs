// src/strategy/round_robin.rs
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::Result;

use crate::backend::Backend;
use crate::config::{cast_properties, RoundRobinProperties, StrategyConfig};

use super::Strategy;

/// Cursor state guarded by one mutex: `i`/`j` must never be observed or
/// advanced independently of `weights`/`backend_count`, or a concurrent
/// add/remove could leave the cursor pointing past the end of the list.
struct Cursor {
    backend_count: usize,
    i: usize,
    j: usize,
    weights: Vec<u32>,
}

/// Weighted round-robin: each backend is used `weights[i]` times before
/// the cursor advances, skipping dead backends as it goes.
pub struct RoundRobinStrategy {
    cursor: Mutex<Cursor>,
}

impl RoundRobinStrategy {
    pub fn new(cfg: &StrategyConfig, backend_count: usize) -> Result<Self> {
        let props: RoundRobinProperties = cast_properties(&cfg.properties)?;

        let mut weights = props.weights.unwrap_or_default();
        if weights.len() < backend_count {
            tracing::debug!("round robin weights too short, padding with 1's");
            weights.resize(backend_count, 1);
        } else if weights.len() > backend_count {
            tracing::debug!("round robin weights too long, truncating");
            weights.truncate(backend_count);
        }

        for w in &weights {
            if *w == 0 {
                anyhow::bail!("round robin weights must be >= 1");
            }
        }

        Ok(Self {
            cursor: Mutex::new(Cursor {
                backend_count,
                i: 0,
                j: 0,
                weights,
            }),
        })
    }
}

impl Strategy for RoundRobinStrategy {
    fn select(&self, backends: &[Arc<Backend>]) -> Option<usize> {
        let mut cursor = self.cursor.lock().expect("round robin cursor poisoned");

        if cursor.backend_count == 0 {
            return None;
        }

        let first_i = cursor.i;

        while !backends[cursor.i].is_alive() {
            cursor.j = 0;
            cursor.i = (cursor.i + 1) % cursor.backend_count;

            if cursor.i == first_i {
                return None;
            }
        }

        let chosen = cursor.i;

        cursor.j += 1;
        if cursor.j >= cursor.weights[cursor.i] as usize {
            cursor.i = (cursor.i + 1) % cursor.backend_count;
            cursor.j = 0;
        }

        Some(chosen)
    }

    fn add_backends(&self, n: usize) {
        let mut cursor = self.cursor.lock().expect("round robin cursor poisoned");
        cursor.backend_count += n;
        cursor.weights.resize(cursor.backend_count, 1);
    }

    fn remove_backends(&self, removed_indices: &[usize]) {
        let mut cursor = self.cursor.lock().expect("round robin cursor poisoned");

        let mut new_weights = Vec::with_capacity(cursor.weights.len() - removed_indices.len());
        let mut r = 0;
        for (i, w) in cursor.weights.iter().enumerate() {
            if r < removed_indices.len() && removed_indices[r] == i {
                r += 1;
            } else {
                new_weights.push(*w);
            }
        }

        cursor.backend_count -= removed_indices.len();
        cursor.weights = new_weights;

        // The source leaves the cursor's position undefined here; we clamp
        // it back into range rather than risk an out-of-bounds index on
        // the next select().
        if cursor.backend_count == 0 {
            cursor.i = 0;
        } else {
            cursor.i %= cursor.backend_count;
        }
        cursor.j = 0;
    }

    fn name(&self) -> &'static str {
        "round_robin"
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

    fn cfg(weights: Option<Vec<u32>>) -> StrategyConfig {
        let properties = match weights {
            Some(w) => serde_yaml::to_value(RoundRobinProperties { weights: Some(w) }).unwrap(),
            None => serde_yaml::Value::Null,
        };
        StrategyConfig {
            name: "ROUND_ROBIN".to_string(),
            properties,
        }
    }

    #[test]
    fn s1_unweighted_round_robin() {
        let backs = backends(3);
        let rr = RoundRobinStrategy::new(&cfg(None), 3).unwrap();

        let got: Vec<_> = (0..4).map(|_| rr.select(&backs).unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2, 0]);
    }

    #[test]
    fn s2_weighted_round_robin() {
        let backs = backends(2);
        let rr = RoundRobinStrategy::new(&cfg(Some(vec![3, 2])), 2).unwrap();

        let got: Vec<_> = (0..6).map(|_| rr.select(&backs).unwrap()).collect();
        assert_eq!(got, vec![0, 0, 0, 1, 1, 0]);
    }

    #[test]
    fn skips_dead_backends_and_returns_none_if_all_dead() {
        let backs = backends(3);
        backs[0].mark_dead();
        backs[1].mark_dead();
        backs[2].mark_dead();

        let rr = RoundRobinStrategy::new(&cfg(None), 3).unwrap();
        assert_eq!(rr.select(&backs), None);
    }

    #[test]
    fn add_then_select_after_add() {
        let mut backs = backends(2);
        let rr = RoundRobinStrategy::new(&cfg(None), 2).unwrap();

        backs.push(Arc::new(Backend::new(&BackendInfo::new("h", 9002).unwrap())));
        rr.add_backends(1);

        let got: Vec<_> = (0..4).map(|_| rr.select(&backs).unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2, 0]);
    }

    #[test]
    fn remove_then_select_after_remove() {
        let backs = backends(5);
        let rr = RoundRobinStrategy::new(&cfg(None), 5).unwrap();

        // Remove indices 2 and 4 (pre-removal numbering, sorted ascending).
        let remaining: Vec<_> = vec![backs[0].clone(), backs[1].clone(), backs[3].clone()];
        rr.remove_backends(&[2, 4]);

        let got: Vec<_> = (0..4).map(|_| rr.select(&remaining).unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2, 0]);
    }
}
