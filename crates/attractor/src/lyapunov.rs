//! Rosenstein-style Lyapunov exponent estimation.
//!
//! For each reference point the nearest phase-space neighbour outside a
//! Theiler window is tracked over a handful of evolution steps; the slope
//! of the mean log divergence curve is the largest exponent. Per-axis
//! slopes over the same neighbour pairs approximate the remaining
//! spectrum.

use nalgebra::DVector;

/// Minimum temporal separation between neighbour candidates, so that a
/// pair samples two different passes through the same region.
const THEILER_WINDOW: usize = 8;

/// Floor applied to divergences before taking logs.
const MIN_SEPARATION: f64 = 1e-12;

/// Cap on reference points, keeping the neighbour search near-linear on
/// long trajectories.
const MAX_REFERENCE_POINTS: usize = 200;

pub(crate) struct LinearFit {
    pub slope: f64,
    pub r_squared: f64,
}

pub(crate) struct LyapunovEstimate {
    /// Largest exponent first, `dimension` entries.
    pub exponents: Vec<f64>,
    /// R² of the global divergence regression.
    pub fit_quality: f64,
}

pub(crate) fn estimate(points: &[DVector<f64>], dimension: usize) -> LyapunovEstimate {
    let n = points.len();
    let max_steps = (n / 10).clamp(2, 20);
    let pairs = neighbour_pairs(points, max_steps);

    if pairs.is_empty() {
        return LyapunovEstimate {
            exponents: vec![0.0; dimension],
            fit_quality: 0.0,
        };
    }

    let mut curve = Vec::with_capacity(max_steps);
    for k in 1..=max_steps {
        let mut sum = 0.0;
        for &(i, j) in &pairs {
            let d = (&points[i + k] - &points[j + k]).norm().max(MIN_SEPARATION);
            sum += d.ln();
        }
        curve.push(sum / pairs.len() as f64);
    }
    let global = linear_fit(&curve);

    let mut axis_slopes = Vec::with_capacity(dimension);
    for axis in 0..dimension {
        let mut axis_curve = Vec::with_capacity(max_steps);
        for k in 1..=max_steps {
            let mut sum = 0.0;
            for &(i, j) in &pairs {
                let d = (points[i + k][axis] - points[j + k][axis])
                    .abs()
                    .max(MIN_SEPARATION);
                sum += d.ln();
            }
            axis_curve.push(sum / pairs.len() as f64);
        }
        axis_slopes.push(linear_fit(&axis_curve).slope);
    }
    axis_slopes.sort_by(|a, b| b.total_cmp(a));

    // The global regression stands in for the largest axis slope.
    let mut exponents = Vec::with_capacity(dimension);
    exponents.push(global.slope);
    exponents.extend(axis_slopes.into_iter().skip(1));

    LyapunovEstimate {
        exponents,
        fit_quality: global.r_squared.clamp(0.0, 1.0),
    }
}

/// Nearest-neighbour pairs `(i, j)` with `|i - j|` beyond the Theiler
/// window and both endpoints evolvable for `max_steps`.
fn neighbour_pairs(points: &[DVector<f64>], max_steps: usize) -> Vec<(usize, usize)> {
    let usable = points.len().saturating_sub(max_steps);
    if usable <= THEILER_WINDOW {
        return Vec::new();
    }

    let stride = (usable / MAX_REFERENCE_POINTS).max(1);
    let mut pairs = Vec::new();
    for i in (0..usable).step_by(stride) {
        let mut best: Option<(usize, f64)> = None;
        for j in 0..usable {
            if i.abs_diff(j) <= THEILER_WINDOW {
                continue;
            }
            let d = (&points[i] - &points[j]).norm();
            if !d.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((j, d));
            }
        }
        if let Some((j, _)) = best {
            pairs.push((i, j));
        }
    }
    pairs
}

/// Least-squares line through `(1, ys[0]), (2, ys[1]), ...`.
pub(crate) fn linear_fit(ys: &[f64]) -> LinearFit {
    if ys.len() < 2 {
        return LinearFit {
            slope: 0.0,
            r_squared: 0.0,
        };
    }

    let n = ys.len() as f64;
    let x_mean = (ys.len() + 1) as f64 / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (idx, &y) in ys.iter().enumerate() {
        let dx = (idx + 1) as f64 - x_mean;
        let dy = y - y_mean;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    let slope = sxy / sxx;
    // A flat curve is a perfect fit of zero slope, not a degenerate one.
    let r_squared = if syy <= f64::EPSILON {
        1.0
    } else {
        (sxy * sxy) / (sxx * syy)
    };

    LinearFit {
        slope: if slope.is_finite() { slope } else { 0.0 },
        r_squared: if r_squared.is_finite() { r_squared } else { 0.0 },
    }
}
