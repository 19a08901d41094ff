//! Append-only timestamped sequences.

use serde::{Deserialize, Serialize};

use crate::CompareError;

/// A single timestamped observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporalElement<T> {
    pub value: T,
    pub timestamp: u64,
}

/// An append-only sequence of timestamped values.
///
/// Timestamps are non-decreasing; `push` rejects regressions so range
/// queries can binary-search the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence<T> {
    elements: Vec<TemporalElement<T>>,
}

impl<T> Sequence<T> {
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
        }
    }

    /// Append a value observed at `timestamp`.
    pub fn push(&mut self, value: T, timestamp: u64) -> Result<(), CompareError> {
        if let Some(last) = self.elements.last() {
            if timestamp < last.timestamp {
                return Err(CompareError::NonMonotonicTimestamp {
                    last: last.timestamp,
                    offered: timestamp,
                });
            }
        }
        self.elements.push(TemporalElement { value, timestamp });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TemporalElement<T>> {
        self.elements.get(index)
    }

    pub fn first(&self) -> Option<&TemporalElement<T>> {
        self.elements.first()
    }

    pub fn last(&self) -> Option<&TemporalElement<T>> {
        self.elements.last()
    }

    /// The trailing `n` elements, or the whole sequence when `n` exceeds it.
    pub fn last_n(&self, n: usize) -> &[TemporalElement<T>] {
        let start = self.elements.len().saturating_sub(n);
        &self.elements[start..]
    }

    /// Elements whose timestamps fall within `[start, end]` inclusive.
    pub fn range(&self, start: u64, end: u64) -> &[TemporalElement<T>] {
        let lo = self.elements.partition_point(|e| e.timestamp < start);
        let hi = self.elements.partition_point(|e| e.timestamp <= end);
        &self.elements[lo..hi.max(lo)]
    }

    pub fn elements(&self) -> &[TemporalElement<T>] {
        &self.elements
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemporalElement<T>> {
        self.elements.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.elements.iter().map(|e| &e.value)
    }
}

impl<T> Default for Sequence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Sequence<T> {
    /// Build a sequence from bare values with consecutive synthetic timestamps.
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        let elements = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| TemporalElement {
                value,
                timestamp: i as u64,
            })
            .collect();
        Self { elements }
    }
}
