//! Value-space distance capabilities.

/// Element-level distance supplied at comparator construction.
///
/// `distance` drives DTW cell costs. `scalar` is the numeric projection
/// Euclidean distance needs; it stays `None` for discrete domains.
pub trait ValueMetric<T>: Send + Sync {
    fn distance(&self, a: &T, b: &T) -> f64;

    fn scalar(&self, _value: &T) -> Option<f64> {
        None
    }
}

/// 0/1 mismatch distance for discrete symbol domains.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscreteMetric;

impl<T: PartialEq> ValueMetric<T> for DiscreteMetric {
    fn distance(&self, a: &T, b: &T) -> f64 {
        if a == b {
            0.0
        } else {
            1.0
        }
    }
}

/// Distance over a caller-supplied numeric projection: `|f(a) - f(b)|`.
pub struct ScalarMetric<F>(pub F);

impl<T, F> ValueMetric<T> for ScalarMetric<F>
where
    F: Fn(&T) -> f64 + Send + Sync,
{
    fn distance(&self, a: &T, b: &T) -> f64 {
        ((self.0)(a) - (self.0)(b)).abs()
    }

    fn scalar(&self, value: &T) -> Option<f64> {
        Some((self.0)(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_metric_is_zero_one() {
        let metric = DiscreteMetric;
        assert_eq!(metric.distance(&'a', &'a'), 0.0);
        assert_eq!(metric.distance(&'a', &'b'), 1.0);
        assert!(metric.scalar(&'a').is_none());
    }

    #[test]
    fn scalar_metric_projects() {
        let metric = ScalarMetric(|v: &i64| *v as f64);
        assert_eq!(metric.distance(&3, &7), 4.0);
        assert_eq!(metric.scalar(&5), Some(5.0));
    }
}
