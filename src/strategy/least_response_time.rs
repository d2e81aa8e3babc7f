// src/strategy/least_response_time.rs
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use crate::backend::Backend;
use crate::ring_buffer::RingBufferQueue;

use super::Strategy;

const WINDOW_SIZE: usize = 10;

/// One backend's sliding window of recent time-to-first-byte samples
/// (milliseconds), plus the running average derived from it. The window
/// and the average are updated together under one lock so a reader never
/// observes an average that doesn't match the samples backing it.
struct Window {
    samples: RingBufferQueue<i64>,
    sum: i64,
}

impl Window {
    fn new() -> Self {
        Self {
            samples: RingBufferQueue::new(WINDOW_SIZE),
            sum: 0,
        }
    }

    fn record(&mut self, sample_ms: i64) {
        if self.samples.is_full() {
            if let Ok(oldest) = self.samples.dequeue() {
                self.sum -= oldest;
            }
        }
        // Capacity was just freed (or never exhausted); this cannot fail.
        let _ = self.samples.enqueue(sample_ms);
        self.sum += sample_ms;
    }

    fn average(&self) -> f64 {
        if self.samples.count() == 0 {
            0.0
        } else {
            self.sum as f64 / self.samples.count() as f64
        }
    }
}

/// Selects the live backend with the lowest average recent TTFB. Backends
/// with no samples yet are treated as having average 0 so that every
/// backend gets tried at least once before the window has any signal.
pub struct LeastResponseTimeStrategy {
    windows: Mutex<Vec<Window>>,
}

impl LeastResponseTimeStrategy {
    pub fn new(backend_count: usize) -> Self {
        let windows = (0..backend_count).map(|_| Window::new()).collect();
        Self {
            windows: Mutex::new(windows),
        }
    }

    /// Records a TTFB sample for the given backend index.
    pub fn record_sample(&self, index: usize, sample_ms: i64) {
        let mut windows = self.windows.lock().expect("response time lock poisoned");
        if let Some(w) = windows.get_mut(index) {
            w.record(sample_ms);
        }
    }
}

impl Strategy for LeastResponseTimeStrategy {
    fn select(&self, backends: &[Arc<Backend>]) -> Option<usize> {
        let windows = self.windows.lock().expect("response time lock poisoned");

        let mut best: Option<(usize, f64)> = None;
        for (i, backend) in backends.iter().enumerate() {
            if !backend.is_alive() {
                continue;
            }
            let avg = windows[i].average();
            match best {
                None => best = Some((i, avg)),
                Some((_, b)) if avg < b => best = Some((i, avg)),
                _ => {}
            }
        }

        best.map(|(i, _)| i)
    }

    fn add_backends(&self, n: usize) {
        let mut windows = self.windows.lock().expect("response time lock poisoned");
        for _ in 0..n {
            windows.push(Window::new());
        }
    }

    fn remove_backends(&self, removed_indices: &[usize]) {
        let mut windows = self.windows.lock().expect("response time lock poisoned");
        let mut new_windows = Vec::with_capacity(windows.len() - removed_indices.len());
        let mut r = 0;
        for (i, w) in windows.drain(..).enumerate() {
            if r < removed_indices.len() && removed_indices[r] == i {
                r += 1;
            } else {
                new_windows.push(w);
            }
        }
        *windows = new_windows;
    }

    fn name(&self) -> &'static str {
        "least_response_time"
    }

    /// There is no client-tracing hook exposed by the HTTP client used for
    /// upstream calls, so the registry itself times the whole proxy call
    /// and reports the elapsed wall time here instead of through a deeper
    /// streaming-body hook.
    fn record_latency(&self, index: usize, elapsed: Duration) {
        self.record_sample(index, elapsed.as_millis() as i64);
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
    fn s4_picks_lowest_average_ttfb() {
        let backs = backends(2);
        let lrt = LeastResponseTimeStrategy::new(2);

        lrt.record_sample(0, 100);
        lrt.record_sample(1, 10);

        assert_eq!(lrt.select(&backs), Some(1));
    }

    #[test]
    fn s5_window_is_bounded_and_slides() {
        let lrt = LeastResponseTimeStrategy::new(1);
        for _ in 0..WINDOW_SIZE {
            lrt.record_sample(0, 100);
        }
        {
            let windows = lrt.windows.lock().unwrap();
            assert_eq!(windows[0].average(), 100.0);
        }

        // One more sample evicts the oldest 100ms entry in favor of 0ms.
        lrt.record_sample(0, 0);
        let windows = lrt.windows.lock().unwrap();
        assert!(windows[0].average() < 100.0);
        assert_eq!(windows[0].samples.count(), WINDOW_SIZE);
    }

    #[test]
    fn untouched_backend_defaults_to_zero_average_and_wins() {
        let backs = backends(2);
        let lrt = LeastResponseTimeStrategy::new(2);

        lrt.record_sample(0, 50);

        assert_eq!(lrt.select(&backs), Some(1));
    }

    #[test]
    fn dead_backends_are_skipped() {
        let backs = backends(2);
        backs[1].mark_dead();
        let lrt = LeastResponseTimeStrategy::new(2);

        assert_eq!(lrt.select(&backs), Some(0));
    }
}
