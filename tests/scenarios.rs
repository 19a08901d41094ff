//! End-to-end scenarios across the five components.

use std::sync::Arc;

use eventide::{
    AnalyzerConfig, AttractorAnalyzer, AttractorKind, ComparisonAlgorithm, CompareConfig,
    Deadline, PhasePoint, Priority, RealtimeScheduler, ScalarMetric, SchedulerConfig,
    SchedulingPolicy, Sequence, SequenceComparator, TemporalFormula, TemporalState,
    TraceVerifier,
};

fn char_sequence(s: &str) -> Sequence<char> {
    Sequence::from_values(s.chars())
}

#[test]
fn edit_distance_kitten_to_sitting_is_three() {
    let comparator: SequenceComparator<char> = SequenceComparator::default();
    let result = comparator
        .compare(
            &char_sequence("kitten"),
            &char_sequence("sitting"),
            ComparisonAlgorithm::EditDistance,
        )
        .unwrap();
    assert_eq!(result.distance, 3.0);
}

#[test]
fn lcs_distance_counts_the_dropped_elements() {
    let comparator: SequenceComparator<i64> = SequenceComparator::default();
    let a = Sequence::from_values(vec![1i64, 2, 3, 4, 5]);
    let b = Sequence::from_values(vec![1i64, 3, 5]);

    let result = comparator.compare(&a, &b, ComparisonAlgorithm::Lcs).unwrap();
    assert_eq!(result.distance, 2.0);
}

#[test]
fn dtw_of_identical_numeric_sequences_is_zero() {
    let comparator = SequenceComparator::with_metric(
        CompareConfig::default(),
        Arc::new(ScalarMetric(|v: &i64| *v as f64)),
    );
    let seq = Sequence::from_values(vec![1i64, 2, 3, 4, 5]);

    let result = comparator.compare(&seq, &seq, ComparisonAlgorithm::Dtw).unwrap();
    assert_eq!(result.distance, 0.0);
}

#[test]
fn edf_drains_three_deadlines_in_order() {
    let scheduler = RealtimeScheduler::new(SchedulerConfig {
        policy: SchedulingPolicy::EarliestDeadlineFirst,
        ..SchedulerConfig::default()
    });

    scheduler
        .schedule("500us", Deadline::from_micros(500), Priority::Medium)
        .unwrap();
    scheduler
        .schedule("100us", Deadline::from_micros(100), Priority::Medium)
        .unwrap();
    scheduler
        .schedule("300us", Deadline::from_micros(300), Priority::Medium)
        .unwrap();

    let drained: Vec<&str> =
        std::iter::from_fn(|| scheduler.next_task().map(|t| t.payload)).collect();
    assert_eq!(drained, vec!["100us", "300us", "500us"]);
}

#[test]
fn globally_safe_holds_on_an_all_safe_trace() {
    let mut verifier = TraceVerifier::default();
    for i in 0..10u64 {
        verifier.add_state(TemporalState::new(i, i * 100).with_proposition("safe", true));
    }

    let verdict = verifier
        .verify(&TemporalFormula::globally(TemporalFormula::atom("safe")))
        .unwrap();
    assert!(verdict.satisfied);
    assert!(verdict.counterexample.is_none());
}

#[test]
fn globally_safe_fails_on_the_ninth_state() {
    let mut verifier = TraceVerifier::default();
    for i in 0..10u64 {
        verifier.add_state(TemporalState::new(i, i * 100).with_proposition("safe", i < 9));
    }

    let verdict = verifier
        .verify(&TemporalFormula::globally(TemporalFormula::atom("safe")))
        .unwrap();
    assert!(!verdict.satisfied);
    assert_eq!(verdict.counterexample, Some(vec![9]));
}

#[test]
fn halving_sequence_settles_into_a_point_attractor() {
    let mut analyzer = AttractorAnalyzer::new(AnalyzerConfig {
        embedding_dimension: 1,
        max_trajectory_length: 1000,
    });

    let mut v = 1.0f64;
    for i in 0..150u64 {
        analyzer.add_point(PhasePoint::new(vec![v], i)).unwrap();
        v *= 0.5;
    }

    let info = analyzer.analyze().unwrap();
    assert_eq!(info.kind, AttractorKind::PointAttractor);
    assert!(info.is_stable);
    assert!(info.max_lyapunov_exponent().unwrap() <= 0.0);
}
