//! Per-stream byte backlog.

use crate::error::{DpError, Result};

/// Whether a queue currently holds any bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    /// `size == 0`.
    Empty,
    /// `size > 0`.
    NonEmpty,
}

/// Bounded accumulator of real bytes waiting to be announced.
///
/// Overflow is an error and leaves the queue untouched. Underflow never is:
/// a dequeue that would take the size below `min_size` drains the queue to
/// zero instead, which is what lets the engine account announced bytes beyond
/// the backlog as dummy traffic.
#[derive(Clone, Debug, PartialEq)]
pub struct Queue {
    size: f64,
    max_size: f64,
    min_size: f64,
}

impl Queue {
    /// Create an empty queue with the given bounds.
    pub fn new(max_size: f64, min_size: f64) -> Result<Self> {
        if !max_size.is_finite() || max_size < 0.0 {
            return Err(DpError::invalid("max_size must be finite and >= 0"));
        }
        if !min_size.is_finite() || min_size < 0.0 {
            return Err(DpError::invalid("min_size must be finite and >= 0"));
        }
        if min_size > max_size {
            return Err(DpError::invalid("min_size must not exceed max_size"));
        }
        Ok(Self {
            size: 0.0,
            max_size,
            min_size,
        })
    }

    /// Current backlog in bytes.
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Capacity in bytes.
    pub fn max_size(&self) -> f64 {
        self.max_size
    }

    /// Lower bound below which a dequeue drains the queue.
    pub fn min_size(&self) -> f64 {
        self.min_size
    }

    /// Derived emptiness view.
    pub fn status(&self) -> QueueStatus {
        if self.size == 0.0 {
            QueueStatus::Empty
        } else {
            QueueStatus::NonEmpty
        }
    }

    /// Shorthand for `status() == QueueStatus::Empty`.
    pub fn is_empty(&self) -> bool {
        self.status() == QueueStatus::Empty
    }

    /// Add `amount` bytes and return the new size.
    pub fn enqueue(&mut self, amount: f64) -> Result<f64> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(DpError::invalid("enqueue amount must be finite and >= 0"));
        }
        if self.size + amount > self.max_size {
            return Err(DpError::QueueOverflow {
                size: self.size,
                amount,
                max_size: self.max_size,
            });
        }
        self.size += amount;
        Ok(self.size)
    }

    /// Remove up to `amount` bytes and return the new size.
    ///
    /// Requests that would leave less than `min_size` bytes empty the queue.
    pub fn dequeue(&mut self, amount: f64) -> f64 {
        let amount = if amount.is_nan() { 0.0 } else { amount.max(0.0) };
        if self.size - amount < self.min_size {
            self.size = 0.0;
        } else {
            self.size -= amount;
        }
        self.size
    }

    /// Drop the whole backlog.
    pub fn flush(&mut self) {
        self.size = 0.0;
    }
}

/// Whether every queue in the slice is empty.
pub fn all_empty(queues: &[Queue]) -> bool {
    queues.iter().all(Queue::is_empty)
}
