// tests/property_tests.rs
use std::collections::VecDeque;
use std::sync::Arc;

use aegis_balancer::backend::Backend;
use aegis_balancer::config::{BackendInfo, RoundRobinProperties, StrategyConfig};
use aegis_balancer::ring_buffer::{QueueError, RingBufferQueue};
use aegis_balancer::strategy::{LeastConnectionsStrategy, RoundRobinStrategy, Strategy};
use proptest::prelude::*;

fn backends(n: usize) -> Vec<Arc<Backend>> {
    (0..n)
        .map(|i| Arc::new(Backend::new(&BackendInfo::new("h", 9000 + i as u16).unwrap())))
        .collect()
}

fn round_robin_cfg(weights: Vec<u32>) -> StrategyConfig {
    StrategyConfig {
        name: "ROUND_ROBIN".to_string(),
        properties: serde_yaml::to_value(RoundRobinProperties {
            weights: Some(weights),
        })
        .unwrap(),
    }
}

proptest! {
    // §8 property 8: enqueue followed by matching dequeues yields FIFO
    // order; overflow and underflow fail deterministically.
    #[test]
    fn ring_buffer_fifo_matches_a_vecdeque_model(
        capacity in 1usize..8,
        ops in prop::collection::vec(prop::bool::ANY, 0..200),
    ) {
        let mut queue: RingBufferQueue<i32> = RingBufferQueue::new(capacity);
        let mut model: VecDeque<i32> = VecDeque::new();
        let mut next_value = 0i32;

        for enqueue in ops {
            if enqueue {
                let result = queue.enqueue(next_value);
                if model.len() == capacity {
                    prop_assert_eq!(result, Err(QueueError::CapacityExceeded(capacity)));
                } else {
                    prop_assert!(result.is_ok());
                    model.push_back(next_value);
                }
                next_value += 1;
            } else {
                let result = queue.dequeue();
                if model.is_empty() {
                    prop_assert_eq!(result, Err(QueueError::Underflow));
                } else {
                    prop_assert_eq!(result.unwrap(), model.pop_front().unwrap());
                }
            }
            prop_assert_eq!(queue.count(), model.len());
        }
    }

    // §8 property 4: under weighted round-robin with all backends alive,
    // in sum(weights) consecutive selections backend k is chosen exactly
    // weights[k] times.
    #[test]
    fn weighted_round_robin_selection_counts_match_weights(
        weights in prop::collection::vec(1u32..=5, 1..6),
    ) {
        let n = weights.len();
        let backs = backends(n);
        let rr = RoundRobinStrategy::new(&round_robin_cfg(weights.clone()), n).unwrap();

        let total: usize = weights.iter().map(|w| *w as usize).sum();
        let mut counts = vec![0usize; n];
        for _ in 0..total {
            let i = rr.select(&backs).expect("all backends alive, select must succeed");
            counts[i] += 1;
        }

        let expected: Vec<usize> = weights.iter().map(|w| *w as usize).collect();
        prop_assert_eq!(counts, expected);
    }

    // §8 property 1 (restricted to least-connections) + the underflow fix:
    // an arbitrary sequence of start/end calls must never wrap a count
    // into a huge value that then makes the backend permanently
    // unselectable — `on_connection_end` without a matching start must
    // clamp at zero.
    #[test]
    fn unmatched_connection_end_never_strands_a_backend(
        ops in prop::collection::vec(prop::bool::ANY, 0..100),
    ) {
        let backs = backends(1);
        let lc = LeastConnectionsStrategy::new(1);

        for start in &ops {
            if *start {
                lc.on_connection_start(0);
            } else {
                lc.on_connection_end(0);
            }
        }

        // Regardless of how many more `end`s than `start`s occurred, the
        // single backend must still be selectable immediately afterward.
        lc.on_connection_end(0);
        prop_assert_eq!(lc.select(&backs), Some(0));
    }

    // §8 property 3: no two backends simultaneously share (host, port).
    #[test]
    fn backend_identity_equality_is_host_and_port_only(
        host_a in "[a-z]{1,8}",
        port_a in 1u16..=65535,
        host_b in "[a-z]{1,8}",
        port_b in 1u16..=65535,
    ) {
        let a = Backend::new(&BackendInfo::new(host_a.clone(), port_a).unwrap());
        let b = Backend::new(&BackendInfo::new(host_b.clone(), port_b).unwrap());

        let should_match = host_a == host_b && port_a == port_b;
        prop_assert_eq!(a.identity_eq(&b), should_match);
    }
}
