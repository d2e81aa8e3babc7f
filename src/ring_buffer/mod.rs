// src/ring_buffer/mod.rs
//! Fixed-capacity FIFO queue with O(1) wrap-around push/pop.
//!
//! Used by the least-response-time strategy to keep a bounded window of
//! recent TTFB samples per backend. Callers are expected to serialize their
//! own access (e.g. behind a per-backend lock) — this type has no internal
//! synchronization.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("enqueue: ring buffer at capacity ({0})")]
    CapacityExceeded(usize),

    #[error("dequeue: ring buffer is empty")]
    Underflow,
}

/// A bounded ring-buffer queue of fixed capacity `N`, set at construction.
#[derive(Debug, Clone)]
pub struct RingBufferQueue<T> {
    buf: Vec<Option<T>>,
    head: usize,
    tail: usize,
    count: usize,
}

impl<T> RingBufferQueue<T> {
    /// Creates a new queue with room for `capacity` items.
    pub fn new(capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity);
        buf.resize_with(capacity, || None);
        Self {
            buf,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.buf.len()
    }

    /// Pushes `item` to the back of the queue.
    pub fn enqueue(&mut self, item: T) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::CapacityExceeded(self.buf.len()));
        }

        self.buf[self.head] = Some(item);
        self.head = (self.head + 1) % self.buf.len();
        self.count += 1;

        Ok(())
    }

    /// Pops and returns the item at the front of the queue.
    pub fn dequeue(&mut self) -> Result<T, QueueError> {
        if self.is_empty() {
            return Err(QueueError::Underflow);
        }

        let item = self.buf[self.tail].take().expect("slot must be occupied");
        self.tail = (self.tail + 1) % self.buf.len();
        self.count -= 1;

        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let mut q = RingBufferQueue::new(3);
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        q.enqueue(3).unwrap();

        assert_eq!(q.dequeue().unwrap(), 1);
        assert_eq!(q.dequeue().unwrap(), 2);
        assert_eq!(q.dequeue().unwrap(), 3);
    }

    #[test]
    fn wraps_around_the_backing_buffer() {
        let mut q = RingBufferQueue::new(3);
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        assert_eq!(q.dequeue().unwrap(), 1);
        q.enqueue(3).unwrap();
        q.enqueue(4).unwrap();

        assert_eq!(q.dequeue().unwrap(), 2);
        assert_eq!(q.dequeue().unwrap(), 3);
        assert_eq!(q.dequeue().unwrap(), 4);
    }

    #[test]
    fn enqueue_past_capacity_fails() {
        let mut q = RingBufferQueue::new(2);
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        assert_eq!(q.enqueue(3), Err(QueueError::CapacityExceeded(2)));
    }

    #[test]
    fn dequeue_past_empty_fails() {
        let mut q: RingBufferQueue<i32> = RingBufferQueue::new(2);
        assert_eq!(q.dequeue(), Err(QueueError::Underflow));
    }

    #[test]
    fn count_tracks_occupancy_through_a_full_cycle() {
        let mut q = RingBufferQueue::new(4);
        assert_eq!(q.count(), 0);
        q.enqueue("a").unwrap();
        q.enqueue("b").unwrap();
        assert_eq!(q.count(), 2);
        q.dequeue().unwrap();
        assert_eq!(q.count(), 1);
    }
}
