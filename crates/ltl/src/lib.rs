//! # Eventide-LTL
//!
//! Linear temporal logic over bounded finite traces.
//!
//! ## Features
//! - Proposition-valued states with an interned name table
//! - Finite-trace semantics for G, F, X, U and the boolean connectives
//! - Counterexample extraction and confidence scoring
//! - Evaluation timeout

mod formula;

pub use formula::{TemporalFormula, TemporalOperator};

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Verification errors.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("cannot verify against an empty trace")]
    EmptyTrace,

    #[error("invalid formula: {0}")]
    InvalidFormula(String),

    #[error("verification exceeded {0} ms")]
    TimeoutExceeded(u64),
}

/// How aggressively verdicts are discounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strictness {
    Low,
    Medium,
    High,
}

impl Strictness {
    fn factor(self) -> f64 {
        match self {
            Strictness::Low => 0.7,
            Strictness::Medium => 0.85,
            Strictness::High => 0.95,
        }
    }
}

/// Verifier configuration.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub max_trace_length: usize,
    pub max_solving_time_ms: u64,
    pub strictness: Strictness,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_trace_length: 1000,
            max_solving_time_ms: 500,
            strictness: Strictness::Medium,
        }
    }
}

/// A state as callers build it: named propositions with boolean values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalState {
    pub id: u64,
    pub timestamp: u64,
    pub propositions: HashMap<String, bool>,
}

impl TemporalState {
    pub fn new(id: u64, timestamp: u64) -> Self {
        Self {
            id,
            timestamp,
            propositions: HashMap::new(),
        }
    }

    pub fn set_proposition(&mut self, name: impl Into<String>, value: bool) {
        self.propositions.insert(name.into(), value);
    }

    pub fn with_proposition(mut self, name: impl Into<String>, value: bool) -> Self {
        self.set_proposition(name, value);
        self
    }

    /// Unknown propositions read as false.
    pub fn get_proposition(&self, name: &str) -> bool {
        self.propositions.get(name).copied().unwrap_or(false)
    }
}

/// Verdict for one formula against the current trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub satisfied: bool,
    pub confidence: f64,
    /// State ids witnessing the failure, earliest first.
    pub counterexample: Option<Vec<u64>>,
}

/// Proposition-name interner owned by the verifier; states are stored
/// with `u32` ids rather than repeated strings.
#[derive(Debug, Default)]
struct Interner {
    ids: HashMap<String, u32>,
    names: Vec<String>,
}

impl Interner {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len() as u32;
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    fn resolve(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

#[derive(Debug, Clone)]
struct CompactState {
    id: u64,
    props: HashMap<u32, bool>,
}

/// LTL verifier over a bounded FIFO trace.
pub struct TraceVerifier {
    states: VecDeque<CompactState>,
    interner: Interner,
    config: VerifierConfig,
}

impl TraceVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            states: VecDeque::new(),
            interner: Interner::default(),
            config,
        }
    }

    /// Append a state; the oldest state falls off once the trace is full.
    pub fn add_state(&mut self, state: TemporalState) {
        let props = state
            .propositions
            .iter()
            .map(|(name, &value)| (self.interner.intern(name), value))
            .collect();

        if self.states.len() >= self.config.max_trace_length.max(1) {
            self.states.pop_front();
        }
        self.states.push_back(CompactState {
            id: state.id,
            props,
        });
    }

    pub fn trace_len(&self) -> usize {
        self.states.len()
    }

    /// Distinct proposition names seen so far.
    pub fn proposition_count(&self) -> usize {
        self.interner.len()
    }

    pub fn clear_trace(&mut self) {
        self.states.clear();
    }

    /// Evaluate `formula` at the start of the current trace.
    pub fn verify(&self, formula: &TemporalFormula) -> Result<VerificationResult, VerifyError> {
        if self.states.is_empty() {
            return Err(VerifyError::EmptyTrace);
        }

        let mut evaluation = Evaluation {
            states: &self.states,
            interner: &self.interner,
            deadline: Instant::now() + Duration::from_millis(self.config.max_solving_time_ms),
            timeout_ms: self.config.max_solving_time_ms,
            ops: 0,
        };

        let satisfied = evaluation.eval(formula, 0)?;
        let counterexample = if satisfied {
            None
        } else {
            let mut witnesses = Vec::new();
            evaluation.witness(formula, 0, &mut witnesses)?;
            witnesses.dedup();
            Some(witnesses)
        };

        Ok(VerificationResult {
            satisfied,
            confidence: self.confidence(),
            counterexample,
        })
    }

    /// Best-effort proposition assignment that would satisfy `formula`
    /// on the current trace prefix.
    pub fn synthesize_controller(
        &self,
        formula: &TemporalFormula,
    ) -> Result<Vec<(String, bool)>, VerifyError> {
        let mut assignments = Vec::new();
        collect_assignments(formula, true, &mut assignments)?;

        let mut seen = HashMap::new();
        let mut unique = Vec::new();
        for (name, value) in assignments {
            if seen.insert(name.clone(), value).is_none() {
                unique.push((name, value));
            }
        }
        Ok(unique)
    }

    /// Trace-length sufficiency (100 states count as ideal) discounted
    /// by the configured strictness.
    fn confidence(&self) -> f64 {
        let sufficiency = (self.states.len() as f64 / 100.0).min(1.0);
        (sufficiency * self.config.strictness.factor()).clamp(0.0, 1.0)
    }
}

impl Default for TraceVerifier {
    fn default() -> Self {
        Self::new(VerifierConfig::default())
    }
}

/// One verification pass: shared trace view plus the timeout budget.
struct Evaluation<'a> {
    states: &'a VecDeque<CompactState>,
    interner: &'a Interner,
    deadline: Instant,
    timeout_ms: u64,
    ops: u64,
}

impl Evaluation<'_> {
    fn len(&self) -> usize {
        self.states.len()
    }

    fn holds(&self, name: &str, position: usize) -> bool {
        let Some(id) = self.interner.resolve(name) else {
            return false;
        };
        self.states
            .get(position)
            .and_then(|state| state.props.get(&id).copied())
            .unwrap_or(false)
    }

    fn state_id(&self, position: usize) -> u64 {
        self.states.get(position).map(|s| s.id).unwrap_or_default()
    }

    fn tick(&mut self) -> Result<(), VerifyError> {
        self.ops += 1;
        // The clock is only consulted every so often; evaluation steps are
        // far cheaper than an Instant read.
        if self.ops % 1024 == 0 && Instant::now() >= self.deadline {
            return Err(VerifyError::TimeoutExceeded(self.timeout_ms));
        }
        Ok(())
    }

    fn eval(&mut self, formula: &TemporalFormula, position: usize) -> Result<bool, VerifyError> {
        self.tick()?;
        match formula {
            TemporalFormula::True => Ok(true),
            TemporalFormula::False => Ok(false),
            TemporalFormula::Atom(name) => Ok(self.holds(name, position)),

            TemporalFormula::Unary { op, formula } => match op {
                TemporalOperator::Not => Ok(!self.eval(formula, position)?),
                TemporalOperator::Next => {
                    if position + 1 < self.len() {
                        self.eval(formula, position + 1)
                    } else {
                        Ok(false)
                    }
                }
                TemporalOperator::Globally => {
                    for i in position..self.len() {
                        if !self.eval(formula, i)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                TemporalOperator::Finally => {
                    for i in position..self.len() {
                        if self.eval(formula, i)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                other => Err(VerifyError::InvalidFormula(format!(
                    "{other:?} is not a unary operator"
                ))),
            },

            TemporalFormula::Binary { op, left, right } => match op {
                TemporalOperator::And => {
                    Ok(self.eval(left, position)? && self.eval(right, position)?)
                }
                TemporalOperator::Or => {
                    Ok(self.eval(left, position)? || self.eval(right, position)?)
                }
                TemporalOperator::Implies => {
                    Ok(!self.eval(left, position)? || self.eval(right, position)?)
                }
                TemporalOperator::Until => {
                    for k in position..self.len() {
                        if self.eval(right, k)? {
                            for j in position..k {
                                if !self.eval(left, j)? {
                                    return Ok(false);
                                }
                            }
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                other => Err(VerifyError::InvalidFormula(format!(
                    "{other:?} is not a binary operator"
                ))),
            },
        }
    }

    /// Collect witnessing state ids for a formula that evaluated false at
    /// `position`.
    fn witness(
        &mut self,
        formula: &TemporalFormula,
        position: usize,
        out: &mut Vec<u64>,
    ) -> Result<(), VerifyError> {
        match formula {
            TemporalFormula::True => Ok(()),
            TemporalFormula::False | TemporalFormula::Atom(_) => {
                out.push(self.state_id(position));
                Ok(())
            }

            TemporalFormula::Unary { op, formula } => match op {
                TemporalOperator::Not => {
                    out.push(self.state_id(position));
                    Ok(())
                }
                TemporalOperator::Next => {
                    if position + 1 < self.len() {
                        self.witness(formula, position + 1, out)
                    } else {
                        out.push(self.state_id(position));
                        Ok(())
                    }
                }
                TemporalOperator::Globally => {
                    for i in position..self.len() {
                        if !self.eval(formula, i)? {
                            return self.witness(formula, i, out);
                        }
                    }
                    Ok(())
                }
                TemporalOperator::Finally => {
                    // Nothing satisfied the obligation anywhere; the trace
                    // ending is the evidence.
                    out.push(self.state_id(self.len() - 1));
                    Ok(())
                }
                other => Err(VerifyError::InvalidFormula(format!(
                    "{other:?} is not a unary operator"
                ))),
            },

            TemporalFormula::Binary { op, left, right } => match op {
                TemporalOperator::And => {
                    if !self.eval(left, position)? {
                        self.witness(left, position, out)
                    } else {
                        self.witness(right, position, out)
                    }
                }
                TemporalOperator::Or => self.witness(left, position, out),
                TemporalOperator::Implies => self.witness(right, position, out),
                TemporalOperator::Until => {
                    for i in position..self.len() {
                        if self.eval(right, i)? {
                            // Release held; the failure is a broken left leg.
                            for j in position..i {
                                if !self.eval(left, j)? {
                                    return self.witness(left, j, out);
                                }
                            }
                            return Ok(());
                        }
                        if !self.eval(left, i)? {
                            return self.witness(left, i, out);
                        }
                    }
                    out.push(self.state_id(self.len() - 1));
                    Ok(())
                }
                other => Err(VerifyError::InvalidFormula(format!(
                    "{other:?} is not a binary operator"
                ))),
            },
        }
    }
}

fn collect_assignments(
    formula: &TemporalFormula,
    polarity: bool,
    out: &mut Vec<(String, bool)>,
) -> Result<(), VerifyError> {
    match formula {
        TemporalFormula::True | TemporalFormula::False => Ok(()),
        TemporalFormula::Atom(name) => {
            out.push((name.clone(), polarity));
            Ok(())
        }
        TemporalFormula::Unary { op, formula } => match op {
            TemporalOperator::Not => collect_assignments(formula, !polarity, out),
            TemporalOperator::Globally | TemporalOperator::Finally | TemporalOperator::Next => {
                collect_assignments(formula, polarity, out)
            }
            other => Err(VerifyError::InvalidFormula(format!(
                "{other:?} is not a unary operator"
            ))),
        },
        TemporalFormula::Binary { op, left, right } => match op {
            TemporalOperator::And => {
                collect_assignments(left, polarity, out)?;
                collect_assignments(right, polarity, out)
            }
            TemporalOperator::Or => collect_assignments(left, polarity, out),
            TemporalOperator::Implies | TemporalOperator::Until => {
                collect_assignments(right, polarity, out)
            }
            other => Err(VerifyError::InvalidFormula(format!(
                "{other:?} is not a binary operator"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_of(props: &[(&str, &[bool])]) -> TraceVerifier {
        let len = props.first().map(|(_, values)| values.len()).unwrap_or(0);
        let mut verifier = TraceVerifier::default();
        for i in 0..len {
            let mut state = TemporalState::new(i as u64, i as u64 * 100);
            for (name, values) in props {
                state.set_proposition(*name, values[i]);
            }
            verifier.add_state(state);
        }
        verifier
    }

    #[test]
    fn atom_reads_the_first_state() {
        let verifier = trace_of(&[("safe", &[true, false])]);
        let result = verifier.verify(&TemporalFormula::atom("safe")).unwrap();
        assert!(result.satisfied);

        let result = verifier.verify(&TemporalFormula::atom("unknown")).unwrap();
        assert!(!result.satisfied);
    }

    #[test]
    fn globally_holds_on_an_all_true_trace() {
        let verifier = trace_of(&[("safe", &[true; 10])]);
        let formula = TemporalFormula::globally(TemporalFormula::atom("safe"));

        let result = verifier.verify(&formula).unwrap();
        assert!(result.satisfied);
        assert!(result.counterexample.is_none());
    }

    #[test]
    fn globally_reports_the_failing_state() {
        let mut values = [true; 10];
        values[9] = false;
        let verifier = trace_of(&[("safe", &values)]);
        let formula = TemporalFormula::globally(TemporalFormula::atom("safe"));

        let result = verifier.verify(&formula).unwrap();
        assert!(!result.satisfied);
        assert_eq!(result.counterexample, Some(vec![9]));
    }

    #[test]
    fn globally_true_on_trace_holds_on_prefixes() {
        // G φ on a trace implies G φ on every prefix of it.
        let mut verifier = TraceVerifier::default();
        let formula = TemporalFormula::globally(TemporalFormula::atom("safe"));
        for i in 0..8 {
            verifier.add_state(TemporalState::new(i, i * 10).with_proposition("safe", true));
            assert!(verifier.verify(&formula).unwrap().satisfied);
        }
    }

    #[test]
    fn finally_finds_a_later_goal() {
        let verifier = trace_of(&[("goal", &[false, false, true, false])]);
        let formula = TemporalFormula::finally(TemporalFormula::atom("goal"));
        assert!(verifier.verify(&formula).unwrap().satisfied);

        let verifier = trace_of(&[("goal", &[false, false])]);
        let result = verifier.verify(&formula).unwrap();
        assert!(!result.satisfied);
        assert_eq!(result.counterexample, Some(vec![1]));
    }

    #[test]
    fn next_is_false_at_the_trace_end() {
        let verifier = trace_of(&[("ready", &[false, true])]);
        let formula = TemporalFormula::next(TemporalFormula::atom("ready"));
        assert!(verifier.verify(&formula).unwrap().satisfied);

        let verifier = trace_of(&[("ready", &[true])]);
        assert!(!verifier.verify(&formula).unwrap().satisfied);
    }

    #[test]
    fn until_requires_the_left_leg_to_hold() {
        let verifier = trace_of(&[
            ("requesting", &[true, true, false, false]),
            ("granted", &[false, false, true, false]),
        ]);
        let formula = TemporalFormula::until(
            TemporalFormula::atom("requesting"),
            TemporalFormula::atom("granted"),
        );
        assert!(verifier.verify(&formula).unwrap().satisfied);

        let verifier = trace_of(&[
            ("requesting", &[true, false, false, false]),
            ("granted", &[false, false, true, false]),
        ]);
        let result = verifier.verify(&formula).unwrap();
        assert!(!result.satisfied);
        assert_eq!(result.counterexample, Some(vec![1]));
    }

    #[test]
    fn boolean_connectives_evaluate_pointwise() {
        let verifier = trace_of(&[("a", &[true]), ("b", &[false])]);

        let and = TemporalFormula::and(TemporalFormula::atom("a"), TemporalFormula::atom("b"));
        assert!(!verifier.verify(&and).unwrap().satisfied);

        let or = TemporalFormula::or(TemporalFormula::atom("a"), TemporalFormula::atom("b"));
        assert!(verifier.verify(&or).unwrap().satisfied);

        let implies =
            TemporalFormula::implies(TemporalFormula::atom("b"), TemporalFormula::atom("a"));
        assert!(verifier.verify(&implies).unwrap().satisfied);

        let not = TemporalFormula::not(TemporalFormula::atom("b"));
        assert!(verifier.verify(&not).unwrap().satisfied);
    }

    #[test]
    fn empty_trace_is_an_error() {
        let verifier = TraceVerifier::default();
        let err = verifier.verify(&TemporalFormula::True).unwrap_err();
        assert!(matches!(err, VerifyError::EmptyTrace));
    }

    #[test]
    fn malformed_operator_arity_is_rejected() {
        let verifier = trace_of(&[("a", &[true])]);
        let broken = TemporalFormula::Unary {
            op: TemporalOperator::And,
            formula: Box::new(TemporalFormula::atom("a")),
        };
        let err = verifier.verify(&broken).unwrap_err();
        assert!(matches!(err, VerifyError::InvalidFormula(_)));
    }

    #[test]
    fn trace_is_bounded_fifo() {
        let mut verifier = TraceVerifier::new(VerifierConfig {
            max_trace_length: 5,
            ..VerifierConfig::default()
        });
        for i in 0..10u64 {
            verifier.add_state(TemporalState::new(i, i).with_proposition("step", true));
        }
        assert_eq!(verifier.trace_len(), 5);
    }

    #[test]
    fn proposition_names_are_interned_once() {
        let mut verifier = TraceVerifier::default();
        for i in 0..50u64 {
            verifier.add_state(
                TemporalState::new(i, i)
                    .with_proposition("safe", true)
                    .with_proposition("ready", i % 2 == 0),
            );
        }
        assert_eq!(verifier.proposition_count(), 2);
    }

    #[test]
    fn zero_budget_times_out() {
        let mut verifier = TraceVerifier::new(VerifierConfig {
            max_solving_time_ms: 0,
            ..VerifierConfig::default()
        });
        for i in 0..100u64 {
            verifier.add_state(TemporalState::new(i, i).with_proposition("safe", i == 99));
        }

        // With the goal only in the last state, G(F safe) walks the
        // quadratic frontier, plenty of ticks to hit the expired deadline.
        let formula = TemporalFormula::globally(TemporalFormula::finally(
            TemporalFormula::atom("safe"),
        ));
        let err = verifier.verify(&formula).unwrap_err();
        assert!(matches!(err, VerifyError::TimeoutExceeded(0)));
    }

    #[test]
    fn confidence_scales_with_trace_length_and_strictness() {
        let verifier = trace_of(&[("safe", &[true; 10])]);
        let result = verifier.verify(&TemporalFormula::atom("safe")).unwrap();
        assert!((result.confidence - 0.085).abs() < 1e-9);

        let mut strict = TraceVerifier::new(VerifierConfig {
            strictness: Strictness::High,
            ..VerifierConfig::default()
        });
        for i in 0..200u64 {
            strict.add_state(TemporalState::new(i, i).with_proposition("safe", true));
        }
        let result = strict.verify(&TemporalFormula::atom("safe")).unwrap();
        assert!((result.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn controller_synthesis_extracts_assignments() {
        let verifier = trace_of(&[("a", &[true])]);
        let formula = TemporalFormula::globally(TemporalFormula::and(
            TemporalFormula::atom("safe"),
            TemporalFormula::not(TemporalFormula::atom("faulted")),
        ));

        let assignments = verifier.synthesize_controller(&formula).unwrap();
        assert_eq!(
            assignments,
            vec![("safe".to_string(), true), ("faulted".to_string(), false)]
        );
    }
}
