//! The LTL formula algebra.

use serde::{Deserialize, Serialize};

/// Temporal and propositional operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalOperator {
    /// Globally (always)
    Globally,
    /// Finally (eventually)
    Finally,
    /// Next
    Next,
    /// Until
    Until,
    /// And
    And,
    /// Or
    Or,
    /// Not
    Not,
    /// Implies
    Implies,
}

/// A temporal formula over named propositions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemporalFormula {
    True,
    False,
    /// Atomic proposition
    Atom(String),
    Unary {
        op: TemporalOperator,
        formula: Box<TemporalFormula>,
    },
    Binary {
        op: TemporalOperator,
        left: Box<TemporalFormula>,
        right: Box<TemporalFormula>,
    },
}

impl TemporalFormula {
    pub fn atom(name: impl Into<String>) -> Self {
        TemporalFormula::Atom(name.into())
    }

    /// G φ
    pub fn globally(formula: TemporalFormula) -> Self {
        TemporalFormula::Unary {
            op: TemporalOperator::Globally,
            formula: Box::new(formula),
        }
    }

    /// F φ
    pub fn finally(formula: TemporalFormula) -> Self {
        TemporalFormula::Unary {
            op: TemporalOperator::Finally,
            formula: Box::new(formula),
        }
    }

    /// X φ
    pub fn next(formula: TemporalFormula) -> Self {
        TemporalFormula::Unary {
            op: TemporalOperator::Next,
            formula: Box::new(formula),
        }
    }

    /// ¬φ
    pub fn not(formula: TemporalFormula) -> Self {
        TemporalFormula::Unary {
            op: TemporalOperator::Not,
            formula: Box::new(formula),
        }
    }

    /// φ U ψ
    pub fn until(left: TemporalFormula, right: TemporalFormula) -> Self {
        TemporalFormula::Binary {
            op: TemporalOperator::Until,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// φ ∧ ψ
    pub fn and(left: TemporalFormula, right: TemporalFormula) -> Self {
        TemporalFormula::Binary {
            op: TemporalOperator::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// φ ∨ ψ
    pub fn or(left: TemporalFormula, right: TemporalFormula) -> Self {
        TemporalFormula::Binary {
            op: TemporalOperator::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// φ → ψ
    pub fn implies(left: TemporalFormula, right: TemporalFormula) -> Self {
        TemporalFormula::Binary {
            op: TemporalOperator::Implies,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}
