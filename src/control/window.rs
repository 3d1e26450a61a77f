//! Fixed-capacity FIFO of recent readings.

use std::collections::VecDeque;

use crate::error::MonitorError;

#[derive(Debug, Clone)]
pub struct RollingWindow {
    readings: VecDeque<i32>,
    capacity: usize,
}

impl RollingWindow {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a reading, evicting the oldest once full.
    pub fn push(&mut self, temp: i32) {
        if self.readings.len() == self.capacity {
            self.readings.pop_front();
        }
        self.readings.push_back(temp);
    }

    pub fn average(&self) -> Result<f64, MonitorError> {
        if self.readings.is_empty() {
            return Err(MonitorError::EmptyWindow);
        }
        let sum: i64 = self.readings.iter().map(|&t| i64::from(t)).sum();
        Ok(sum as f64 / self.readings.len() as f64)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[cfg(test)]
    /// Oldest first.
    pub fn readings(&self) -> impl Iterator<Item = i32> + '_ {
        self.readings.iter().copied()
    }
}
