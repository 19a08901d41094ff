//! Content-keyed result caching.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::{ComparisonAlgorithm, Sequence};

/// Content-derived fingerprint of a `(seq1, seq2, algorithm)` triple.
///
/// Equal keys imply equal results: the fingerprint covers every element
/// value plus the length, and all four algorithms are deterministic in
/// exactly those inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComparisonKey {
    left: u64,
    right: u64,
    algorithm: ComparisonAlgorithm,
}

impl ComparisonKey {
    pub fn of<T: Hash>(
        seq1: &Sequence<T>,
        seq2: &Sequence<T>,
        algorithm: ComparisonAlgorithm,
    ) -> Self {
        Self {
            left: fingerprint(seq1),
            right: fingerprint(seq2),
            algorithm,
        }
    }
}

fn fingerprint<T: Hash>(seq: &Sequence<T>) -> u64 {
    let mut hasher = DefaultHasher::new();
    seq.len().hash(&mut hasher);
    for element in seq.iter() {
        element.value.hash(&mut hasher);
    }
    hasher.finish()
}

/// Observable cache behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
