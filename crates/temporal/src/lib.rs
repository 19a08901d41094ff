//! # Eventide-Temporal
//!
//! Timestamped sequence storage and pairwise similarity measures.
//!
//! ## Features
//! - Append-only sequences with monotonic timestamps
//! - Dynamic Time Warping (DTW) with alignment reconstruction
//! - Longest Common Subsequence (LCS)
//! - Edit distance (Levenshtein)
//! - Euclidean distance over scalar projections
//! - Bounded, content-keyed result cache

mod cache;
mod metric;
mod sequence;

pub use cache::{CacheStats, ComparisonKey};
pub use metric::{DiscreteMetric, ScalarMetric, ValueMetric};
pub use sequence::{Sequence, TemporalElement};

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use ndarray::Array2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by sequence construction and comparison.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("sequence is empty")]
    SequenceEmpty,

    #[error("sequence length {len} exceeds the configured maximum {max}")]
    SequenceTooLong { len: usize, max: usize },

    #[error("euclidean distance requires equal lengths: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("euclidean distance requires scalar-valued elements")]
    NonNumeric,

    #[error("timestamp {offered} precedes the last appended timestamp {last}")]
    NonMonotonicTimestamp { last: u64, offered: u64 },
}

/// Comparison algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonAlgorithm {
    /// Dynamic Time Warping
    Dtw,
    /// Longest Common Subsequence
    Lcs,
    /// Edit distance (Levenshtein)
    EditDistance,
    /// Pointwise Euclidean distance
    Euclidean,
}

/// Result of a pairwise comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub distance: f64,
    pub algorithm: ComparisonAlgorithm,
    /// Warping path (DTW) or matched index pairs (LCS).
    pub alignment: Option<Vec<(usize, usize)>>,
}

/// Ranked hit from sliding-window similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
    pub start_index: usize,
    /// Inverse exponential decay of the window distance.
    pub similarity: f64,
    pub distance: f64,
}

impl SimilarityMatch {
    fn new(start_index: usize, distance: f64) -> Self {
        Self {
            start_index,
            similarity: (-distance / 10.0).exp(),
            distance,
        }
    }
}

/// Comparator configuration.
#[derive(Debug, Clone)]
pub struct CompareConfig {
    pub cache_size: usize,
    pub max_sequence_length: usize,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            cache_size: 1000,
            max_sequence_length: 10_000,
        }
    }
}

/// Pairwise sequence comparator with a bounded, content-keyed result cache.
///
/// Reads share the comparator freely; the cache sits behind a mutex and
/// hit/miss counters are tracked per algorithm without it.
pub struct SequenceComparator<T> {
    metric: Arc<dyn ValueMetric<T>>,
    cache: Mutex<LruCache<ComparisonKey, ComparisonResult>>,
    hits: DashMap<ComparisonAlgorithm, u64>,
    misses: DashMap<ComparisonAlgorithm, u64>,
    config: CompareConfig,
}

impl<T> SequenceComparator<T>
where
    T: Clone + Eq + Hash,
{
    /// Comparator over a discrete value domain (0/1 element distance).
    pub fn new(config: CompareConfig) -> Self {
        Self::with_metric(config, Arc::new(DiscreteMetric))
    }

    /// Comparator with a caller-supplied value metric.
    pub fn with_metric(config: CompareConfig, metric: Arc<dyn ValueMetric<T>>) -> Self {
        let capacity =
            NonZeroUsize::new(config.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            metric,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: DashMap::new(),
            misses: DashMap::new(),
            config,
        }
    }

    /// Compare two sequences, consulting the result cache first.
    pub fn compare(
        &self,
        seq1: &Sequence<T>,
        seq2: &Sequence<T>,
        algorithm: ComparisonAlgorithm,
    ) -> Result<ComparisonResult, CompareError> {
        let max = self.config.max_sequence_length;
        let longest = seq1.len().max(seq2.len());
        if longest > max {
            return Err(CompareError::SequenceTooLong { len: longest, max });
        }

        let key = ComparisonKey::of(seq1, seq2, algorithm);
        if let Some(result) = self.cache.lock().get(&key).cloned() {
            *self.hits.entry(algorithm).or_insert(0) += 1;
            return Ok(result);
        }
        *self.misses.entry(algorithm).or_insert(0) += 1;

        let result = match algorithm {
            ComparisonAlgorithm::Dtw => self.dtw(seq1, seq2),
            ComparisonAlgorithm::Lcs => self.lcs(seq1, seq2),
            ComparisonAlgorithm::EditDistance => self.edit_distance(seq1, seq2),
            ComparisonAlgorithm::Euclidean => self.euclidean(seq1, seq2),
        }?;

        self.cache.lock().put(key, result.clone());
        Ok(result)
    }

    /// Dynamic Time Warping with alignment backtracking.
    fn dtw(&self, seq1: &Sequence<T>, seq2: &Sequence<T>) -> Result<ComparisonResult, CompareError> {
        let n = seq1.len();
        let m = seq2.len();

        if n == 0 && m == 0 {
            return Ok(ComparisonResult {
                distance: 0.0,
                algorithm: ComparisonAlgorithm::Dtw,
                alignment: Some(Vec::new()),
            });
        }
        if n == 0 || m == 0 {
            return Ok(ComparisonResult {
                distance: f64::INFINITY,
                algorithm: ComparisonAlgorithm::Dtw,
                alignment: None,
            });
        }

        let mut acc = Array2::<f64>::from_elem((n + 1, m + 1), f64::INFINITY);
        acc[[0, 0]] = 0.0;

        for i in 1..=n {
            for j in 1..=m {
                let cost = self
                    .metric
                    .distance(&seq1.elements()[i - 1].value, &seq2.elements()[j - 1].value);
                let best = acc[[i - 1, j - 1]].min(acc[[i - 1, j]]).min(acc[[i, j - 1]]);
                acc[[i, j]] = cost + best;
            }
        }

        // Walk the optimal warping path back from the far corner.
        let mut alignment = Vec::new();
        let (mut i, mut j) = (n, m);
        while i > 0 && j > 0 {
            alignment.push((i - 1, j - 1));
            let diagonal = acc[[i - 1, j - 1]];
            let up = acc[[i - 1, j]];
            let left = acc[[i, j - 1]];
            if diagonal <= up && diagonal <= left {
                i -= 1;
                j -= 1;
            } else if up <= left {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        alignment.reverse();

        Ok(ComparisonResult {
            distance: acc[[n, m]],
            algorithm: ComparisonAlgorithm::Dtw,
            alignment: Some(alignment),
        })
    }

    /// Longest Common Subsequence; distance is `max(|s1|, |s2|) - lcs_len`.
    fn lcs(&self, seq1: &Sequence<T>, seq2: &Sequence<T>) -> Result<ComparisonResult, CompareError> {
        if seq1.is_empty() || seq2.is_empty() {
            return Err(CompareError::SequenceEmpty);
        }
        let n = seq1.len();
        let m = seq2.len();

        let mut table = Array2::<u32>::zeros((n + 1, m + 1));
        for i in 1..=n {
            for j in 1..=m {
                table[[i, j]] = if seq1.elements()[i - 1].value == seq2.elements()[j - 1].value {
                    table[[i - 1, j - 1]] + 1
                } else {
                    table[[i - 1, j]].max(table[[i, j - 1]])
                };
            }
        }

        // Collect the matched index pairs off the table.
        let mut alignment = Vec::new();
        let (mut i, mut j) = (n, m);
        while i > 0 && j > 0 {
            if seq1.elements()[i - 1].value == seq2.elements()[j - 1].value {
                alignment.push((i - 1, j - 1));
                i -= 1;
                j -= 1;
            } else if table[[i - 1, j]] >= table[[i, j - 1]] {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        alignment.reverse();

        let lcs_len = table[[n, m]] as usize;
        Ok(ComparisonResult {
            distance: (n.max(m) - lcs_len) as f64,
            algorithm: ComparisonAlgorithm::Lcs,
            alignment: Some(alignment),
        })
    }

    /// Levenshtein distance with unit insert/delete/substitute costs.
    fn edit_distance(
        &self,
        seq1: &Sequence<T>,
        seq2: &Sequence<T>,
    ) -> Result<ComparisonResult, CompareError> {
        if seq1.is_empty() || seq2.is_empty() {
            return Err(CompareError::SequenceEmpty);
        }
        let n = seq1.len();
        let m = seq2.len();

        let mut table = Array2::<u32>::zeros((n + 1, m + 1));
        for i in 0..=n {
            table[[i, 0]] = i as u32;
        }
        for j in 0..=m {
            table[[0, j]] = j as u32;
        }

        for i in 1..=n {
            for j in 1..=m {
                let substitution =
                    if seq1.elements()[i - 1].value == seq2.elements()[j - 1].value {
                        0
                    } else {
                        1
                    };
                table[[i, j]] = (table[[i - 1, j]] + 1)
                    .min(table[[i, j - 1]] + 1)
                    .min(table[[i - 1, j - 1]] + substitution);
            }
        }

        Ok(ComparisonResult {
            distance: table[[n, m]] as f64,
            algorithm: ComparisonAlgorithm::EditDistance,
            alignment: None,
        })
    }

    /// Euclidean distance over the metric's scalar projection.
    fn euclidean(
        &self,
        seq1: &Sequence<T>,
        seq2: &Sequence<T>,
    ) -> Result<ComparisonResult, CompareError> {
        if seq1.len() != seq2.len() {
            return Err(CompareError::DimensionMismatch {
                left: seq1.len(),
                right: seq2.len(),
            });
        }

        let mut sum = 0.0;
        for (a, b) in seq1.iter().zip(seq2.iter()) {
            let (x, y) = match (self.metric.scalar(&a.value), self.metric.scalar(&b.value)) {
                (Some(x), Some(y)) => (x, y),
                _ => return Err(CompareError::NonNumeric),
            };
            let diff = x - y;
            sum += diff * diff;
        }

        Ok(ComparisonResult {
            distance: sum.sqrt(),
            algorithm: ComparisonAlgorithm::Euclidean,
            alignment: None,
        })
    }

    /// Scan `haystack` for windows similar to `needle`, ranked best first.
    ///
    /// Window distance is DTW normalized by the needle length; windows at
    /// or under `threshold` are returned.
    pub fn find_similar(
        &self,
        haystack: &[T],
        needle: &[T],
        threshold: f64,
    ) -> Result<Vec<SimilarityMatch>, CompareError> {
        if needle.is_empty() {
            return Err(CompareError::SequenceEmpty);
        }
        if haystack.len() < needle.len() {
            return Ok(Vec::new());
        }

        let needle_seq = Sequence::from_values(needle.iter().cloned());
        let mut matches = Vec::new();
        for start in 0..=(haystack.len() - needle.len()) {
            let window =
                Sequence::from_values(haystack[start..start + needle.len()].iter().cloned());
            let result = self.dtw(&window, &needle_seq)?;
            if result.distance / needle.len() as f64 <= threshold {
                matches.push(SimilarityMatch::new(start, result.distance));
            }
        }
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(matches)
    }

    /// Cache hit/miss counters and occupancy.
    pub fn cache_stats(&self) -> CacheStats {
        let (size, capacity) = {
            let cache = self.cache.lock();
            (cache.len(), cache.cap().get())
        };
        CacheStats {
            hits: self.hits.iter().map(|entry| *entry.value()).sum(),
            misses: self.misses.iter().map(|entry| *entry.value()).sum(),
            size,
            capacity,
        }
    }

    /// Drop every cached result and reset the counters.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        self.hits.clear();
        self.misses.clear();
    }
}

impl<T> Default for SequenceComparator<T>
where
    T: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new(CompareConfig::default())
    }
}
