//! # Eventide-Attractor
//!
//! Phase-space trajectory analysis and behavioural classification.
//!
//! ## Features
//! - Bounded phase-space trajectories
//! - Largest-Lyapunov-exponent estimation (Rosenstein-style)
//! - Attractor classification (point, limit cycle, strange)
//! - Stability and confidence scoring

mod lyapunov;

use std::collections::VecDeque;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Points required before `analyze` will run.
pub const MIN_POINTS_FOR_ANALYSIS: usize = 100;

/// Near-zero tolerance when deciding whether an exponent counts as zero.
const LAMBDA_TOLERANCE: f64 = 0.05;

/// Autocorrelation threshold for limit-cycle detection.
const PERIODICITY_THRESHOLD: f64 = 0.85;

/// Attractor analysis errors.
#[derive(Debug, Error)]
pub enum AttractorError {
    #[error("insufficient data: {have} of {needed} required points")]
    InsufficientData { needed: usize, have: usize },

    #[error("phase point has dimension {actual}, analyzer expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Behavioural classes a trajectory can settle into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttractorKind {
    /// Stable equilibrium
    PointAttractor,
    /// Periodic orbit
    LimitCycle,
    /// Chaotic but bounded
    StrangeAttractor,
    /// No clear attractor detected
    Unknown,
}

/// A point in phase space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePoint {
    pub coords: Vec<f64>,
    pub timestamp: u64,
}

impl PhasePoint {
    pub fn new(coords: Vec<f64>, timestamp: u64) -> Self {
        Self { coords, timestamp }
    }

    pub fn dimension(&self) -> usize {
        self.coords.len()
    }
}

/// Bounded FIFO of phase points; the oldest point falls off on overflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    points: VecDeque<PhasePoint>,
    max_length: usize,
}

impl Trajectory {
    pub fn new(max_length: usize) -> Self {
        Self {
            points: VecDeque::new(),
            max_length,
        }
    }

    pub fn push(&mut self, point: PhasePoint) {
        if self.points.len() >= self.max_length {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhasePoint> {
        self.points.iter()
    }
}

/// Classification of the observed dynamics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttractorInfo {
    pub kind: AttractorKind,
    pub dimension: usize,
    /// Largest exponent first.
    pub lyapunov_exponents: Vec<f64>,
    pub is_stable: bool,
    pub confidence: f64,
}

impl AttractorInfo {
    pub fn max_lyapunov_exponent(&self) -> Option<f64> {
        self.lyapunov_exponents
            .iter()
            .copied()
            .filter(|l| l.is_finite())
            .max_by(|a, b| a.total_cmp(b))
    }

    pub fn is_chaotic(&self) -> bool {
        self.max_lyapunov_exponent().is_some_and(|l| l > 0.0)
    }
}

/// Trajectory statistics alongside the latest classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorSummary {
    pub total_points: usize,
    pub dimension: usize,
    pub attractor: Option<AttractorInfo>,
    pub mean_velocity: f64,
    pub path_length: f64,
}

/// Analyzer configuration.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub embedding_dimension: usize,
    pub max_trajectory_length: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: 3,
            max_trajectory_length: 10_000,
        }
    }
}

/// Phase-space attractor analyzer.
///
/// `add_point` is write-exclusive; `analyze` reads a snapshot of the
/// trajectory and never mutates it.
pub struct AttractorAnalyzer {
    embedding_dimension: usize,
    trajectory: Trajectory,
}

impl AttractorAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let embedding_dimension = config.embedding_dimension.max(1);
        let max_length = config.max_trajectory_length.max(MIN_POINTS_FOR_ANALYSIS);
        Self {
            embedding_dimension,
            trajectory: Trajectory::new(max_length),
        }
    }

    pub fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    /// Append a phase point; its dimension must match the embedding.
    pub fn add_point(&mut self, point: PhasePoint) -> Result<(), AttractorError> {
        if point.dimension() != self.embedding_dimension {
            return Err(AttractorError::DimensionMismatch {
                expected: self.embedding_dimension,
                actual: point.dimension(),
            });
        }
        self.trajectory.push(point);
        Ok(())
    }

    /// Classify the current trajectory.
    pub fn analyze(&self) -> Result<AttractorInfo, AttractorError> {
        let have = self.trajectory.len();
        if have < MIN_POINTS_FOR_ANALYSIS {
            return Err(AttractorError::InsufficientData {
                needed: MIN_POINTS_FOR_ANALYSIS,
                have,
            });
        }

        let points: Vec<DVector<f64>> = self
            .trajectory
            .iter()
            .map(|p| DVector::from_column_slice(&p.coords))
            .collect();

        let estimate = lyapunov::estimate(&points, self.embedding_dimension);
        let lambda = estimate.exponents[0];

        let norms: Vec<f64> = points.iter().map(|p| p.norm()).collect();
        let finite = norms.iter().all(|n| n.is_finite());
        let mean_norm = norms.iter().sum::<f64>() / norms.len() as f64;

        // Bounded: no sustained outward drift of the norm over the window.
        let drift = lyapunov::linear_fit(&norms).slope * norms.len() as f64;
        let bounded = finite && drift <= 0.5 * (1.0 + mean_norm.abs());

        let settled = self.is_settled(&points, mean_norm);
        let periodic = self.is_periodic();

        let kind = if settled && lambda <= LAMBDA_TOLERANCE {
            AttractorKind::PointAttractor
        } else if periodic && bounded && lambda.abs() <= LAMBDA_TOLERANCE {
            AttractorKind::LimitCycle
        } else if lambda > 0.0 && bounded {
            AttractorKind::StrangeAttractor
        } else {
            AttractorKind::Unknown
        };

        let sufficiency =
            (have as f64 / MIN_POINTS_FOR_ANALYSIS as f64).min(1.0);
        let confidence = (sufficiency * estimate.fit_quality).clamp(0.0, 1.0);

        Ok(AttractorInfo {
            kind,
            dimension: self.embedding_dimension,
            lyapunov_exponents: estimate.exponents,
            is_stable: lambda <= 0.0 && bounded,
            confidence,
        })
    }

    /// The trajectory has settled when the last 20% of points sit inside
    /// a small ball around their own centroid.
    fn is_settled(&self, points: &[DVector<f64>], mean_norm: f64) -> bool {
        let tail_start = points.len() - points.len() / 5;
        let tail = &points[tail_start..];
        if tail.is_empty() {
            return false;
        }

        let mut centroid = DVector::zeros(self.embedding_dimension);
        for p in tail {
            centroid += p;
        }
        centroid /= tail.len() as f64;

        let epsilon = 0.01 * (1.0 + mean_norm.abs());
        tail.iter().all(|p| {
            let d = (p - &centroid).norm();
            d.is_finite() && d <= epsilon
        })
    }

    /// Autocorrelation probe over the first coordinate: any non-trivial
    /// lag correlating above the threshold counts as periodic.
    fn is_periodic(&self) -> bool {
        let signal: Vec<f64> = self
            .trajectory
            .iter()
            .map(|p| p.coords.first().copied().unwrap_or(0.0))
            .collect();
        let n = signal.len();
        if n < 20 {
            return false;
        }

        let mean = signal.iter().sum::<f64>() / n as f64;
        let variance = signal.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        if variance <= 1e-12 || !variance.is_finite() {
            return false;
        }

        let min_lag = (n / 50).max(4);
        for lag in min_lag..=n / 2 {
            let mut covariance = 0.0;
            for i in 0..n - lag {
                covariance += (signal[i] - mean) * (signal[i + lag] - mean);
            }
            covariance /= (n - lag) as f64;
            if covariance / variance > PERIODICITY_THRESHOLD {
                return true;
            }
        }
        false
    }

    /// Trajectory statistics plus the latest classification when there is
    /// enough data for one.
    pub fn summary(&self) -> BehaviorSummary {
        let mut path_length = 0.0;
        let mut velocity_sum = 0.0;
        let mut segments = 0usize;

        let points: Vec<&PhasePoint> = self.trajectory.iter().collect();
        for pair in points.windows(2) {
            let a = DVector::from_column_slice(&pair[0].coords);
            let b = DVector::from_column_slice(&pair[1].coords);
            let segment = (b - a).norm();
            path_length += segment;
            segments += 1;

            let dt = pair[1].timestamp.saturating_sub(pair[0].timestamp) as f64;
            if dt > 0.0 {
                velocity_sum += segment / dt;
            }
        }

        BehaviorSummary {
            total_points: self.trajectory.len(),
            dimension: self.embedding_dimension,
            attractor: self.analyze().ok(),
            mean_velocity: if segments > 0 {
                velocity_sum / segments as f64
            } else {
                0.0
            },
            path_length,
        }
    }

    pub fn trajectory_len(&self) -> usize {
        self.trajectory.len()
    }

    pub fn clear(&mut self) {
        self.trajectory.clear();
    }
}

impl Default for AttractorAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer(dimension: usize) -> AttractorAnalyzer {
        AttractorAnalyzer::new(AnalyzerConfig {
            embedding_dimension: dimension,
            max_trajectory_length: 1000,
        })
    }

    fn feed_series(analyzer: &mut AttractorAnalyzer, series: impl IntoIterator<Item = f64>) {
        for (i, v) in series.into_iter().enumerate() {
            analyzer.add_point(PhasePoint::new(vec![v], i as u64)).unwrap();
        }
    }

    #[test]
    fn trajectory_evicts_oldest_on_overflow() {
        let mut trajectory = Trajectory::new(10);
        for i in 0..15 {
            trajectory.push(PhasePoint::new(vec![i as f64], i as u64));
        }
        assert_eq!(trajectory.len(), 10);
        assert_eq!(trajectory.iter().next().unwrap().coords[0], 5.0);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut analyzer = analyzer(3);
        let err = analyzer
            .add_point(PhasePoint::new(vec![1.0, 2.0], 0))
            .unwrap_err();
        assert!(matches!(
            err,
            AttractorError::DimensionMismatch { expected: 3, actual: 2 }
        ));
    }

    #[test]
    fn analysis_needs_one_hundred_points() {
        let mut analyzer = analyzer(1);
        feed_series(&mut analyzer, (0..99).map(|n| n as f64));

        let err = analyzer.analyze().unwrap_err();
        assert!(matches!(
            err,
            AttractorError::InsufficientData { needed: 100, have: 99 }
        ));

        analyzer.add_point(PhasePoint::new(vec![99.0], 99)).unwrap();
        assert!(analyzer.analyze().is_ok());
    }

    #[test]
    fn geometric_decay_is_a_stable_point_attractor() {
        let mut analyzer = analyzer(1);
        feed_series(&mut analyzer, (0..150).map(|n| 0.5f64.powi(n)));

        let info = analyzer.analyze().unwrap();
        assert_eq!(info.kind, AttractorKind::PointAttractor);
        assert!(info.is_stable);
        assert!(info.max_lyapunov_exponent().unwrap() <= 0.0);
        assert!(!info.is_chaotic());
        assert!(info.confidence > 0.0);
    }

    #[test]
    fn circular_orbit_is_a_limit_cycle() {
        let mut analyzer = analyzer(2);
        for i in 0..200 {
            let t = i as f64 * 0.2;
            analyzer
                .add_point(PhasePoint::new(vec![t.cos(), t.sin()], i as u64))
                .unwrap();
        }

        let info = analyzer.analyze().unwrap();
        assert_eq!(info.kind, AttractorKind::LimitCycle);
    }

    #[test]
    fn logistic_map_is_a_strange_attractor() {
        let mut analyzer = analyzer(1);
        let mut x = 0.4f64;
        feed_series(
            &mut analyzer,
            (0..300).map(|_| {
                x = 4.0 * x * (1.0 - x);
                x
            }),
        );

        let info = analyzer.analyze().unwrap();
        assert_eq!(info.kind, AttractorKind::StrangeAttractor);
        assert!(info.is_chaotic());
        assert!(!info.is_stable);
    }

    #[test]
    fn nan_coordinates_do_not_panic() {
        let mut analyzer = analyzer(2);
        for i in 0..150 {
            let coords = if i == 50 {
                vec![f64::NAN, i as f64]
            } else {
                vec![(i as f64 * 0.1).sin(), i as f64 * 0.01]
            };
            analyzer.add_point(PhasePoint::new(coords, i as u64)).unwrap();
        }

        let info = analyzer.analyze().unwrap();
        assert_eq!(info.dimension, 2);
    }

    #[test]
    fn summary_reports_path_statistics() {
        let mut analyzer = analyzer(1);
        feed_series(&mut analyzer, (0..50).map(|n| n as f64));

        let summary = analyzer.summary();
        assert_eq!(summary.total_points, 50);
        assert_eq!(summary.dimension, 1);
        assert!(summary.attractor.is_none());
        assert!((summary.path_length - 49.0).abs() < 1e-9);
        assert!(summary.mean_velocity > 0.0);
    }

    #[test]
    fn clear_resets_the_trajectory() {
        let mut analyzer = analyzer(1);
        feed_series(&mut analyzer, (0..120).map(|n| n as f64));
        assert_eq!(analyzer.trajectory_len(), 120);

        analyzer.clear();
        assert_eq!(analyzer.trajectory_len(), 0);
    }
}
