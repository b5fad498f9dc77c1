//! # Single-Producer / Single-Consumer Queue
//!
//! Non-blocking, bounded queue between exactly two threads.
//!
//! ```text
//!   transport thread                      processing thread
//!  ┌────────────────┐   try_push   ┌───────┐   try_pop   ┌────────────────┐
//!  │   Producer<T>  │ ───────────► │ queue │ ──────────► │  Consumer<T>   │
//!  └────────────────┘              └───────┘             └────────────────┘
//! ```
//!
//! Built on a bounded `crossbeam-channel`. Neither half implements `Clone`,
//! so the single-producer/single-consumer shape is enforced by the type
//! system rather than by convention.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use thiserror::Error;

/// Error returned by [`Producer::try_push`]; hands the value back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError<T> {
    /// The queue is at capacity.
    #[error("queue is full")]
    Full(T),

    /// The consumer half has been dropped.
    #[error("queue consumer disconnected")]
    Disconnected(T),
}

impl<T> QueueError<T> {
    /// Recovers the value that could not be pushed.
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Disconnected(value) => value,
        }
    }
}

/// Producing half of an SPSC queue.
#[derive(Debug)]
pub struct Producer<T> {
    tx: Sender<T>,
}

/// Consuming half of an SPSC queue.
#[derive(Debug)]
pub struct Consumer<T> {
    rx: Receiver<T>,
}

/// Creates a bounded SPSC queue.
///
/// # Panics
///
/// Panics if `capacity` is zero (a rendezvous queue would block).
#[must_use]
pub fn channel<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity > 0, "Queue capacity must be greater than zero");
    let (tx, rx) = bounded(capacity);
    (Producer { tx }, Consumer { rx })
}

impl<T> Producer<T> {
    /// Pushes a value without blocking.
    pub fn try_push(&self, value: T) -> Result<(), QueueError<T>> {
        self.tx.try_send(value).map_err(|err| match err {
            TrySendError::Full(value) => QueueError::Full(value),
            TrySendError::Disconnected(value) => QueueError::Disconnected(value),
        })
    }

    /// Number of values waiting in the queue.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Returns true if the queue holds nothing.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Maximum number of values the queue holds.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }
}

impl<T> Consumer<T> {
    /// Pops a value without blocking.
    ///
    /// Returns `None` when the queue is empty or the producer is gone and
    /// everything it pushed has been drained.
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of values waiting in the queue.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if the queue holds nothing.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drains everything currently queued, without blocking.
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.try_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_push_pop_in_order() {
        let (tx, rx) = channel(4);
        for i in 0..4 {
            tx.try_push(i).unwrap();
        }
        assert_eq!(rx.len(), 4);
        let drained: Vec<i32> = rx.drain().collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert!(rx.try_pop().is_none());
    }

    #[test]
    fn test_full_returns_value() {
        let (tx, _rx) = channel(1);
        tx.try_push("a").unwrap();
        let err = tx.try_push("b").unwrap_err();
        assert!(matches!(err, QueueError::Full("b")));
        assert_eq!(err.into_inner(), "b");
    }

    #[test]
    fn test_disconnected_consumer() {
        let (tx, rx) = channel(1);
        drop(rx);
        assert!(matches!(tx.try_push(1), Err(QueueError::Disconnected(1))));
    }

    #[test]
    fn test_disconnected_producer_drains() {
        let (tx, rx) = channel::<u8>(2);
        tx.try_push(5).unwrap();
        drop(tx);
        assert_eq!(rx.try_pop(), Some(5));
        assert_eq!(rx.try_pop(), None);
    }

    #[test]
    fn test_cross_thread() {
        let (tx, rx) = channel(1024);
        let producer = thread::spawn(move || {
            for i in 0..1000u32 {
                let mut value = i;
                loop {
                    match tx.try_push(value) {
                        Ok(()) => break,
                        Err(err) => {
                            value = err.into_inner();
                            thread::yield_now();
                        }
                    }
                }
            }
        });

        let mut received = Vec::with_capacity(1000);
        while received.len() < 1000 {
            match rx.try_pop() {
                Some(value) => received.push(value),
                None => thread::yield_now(),
            }
        }
        producer.join().unwrap();
        assert!(received.windows(2).all(|w| w[0] < w[1]));
    }
}
