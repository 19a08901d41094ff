//! # Eventide
//!
//! Real-time streaming analytics over discrete event sequences.
//!
//! Five components compose into one runtime:
//! - [`eventide_scheduler`]: deadline/priority dispatch of time-critical work
//! - [`eventide_temporal`]: sequence storage and pairwise similarity (DTW,
//!   LCS, edit distance, Euclidean) behind a bounded result cache
//! - [`eventide_attractor`]: phase-space trajectories and Lyapunov-based
//!   attractor classification
//! - [`eventide_ltl`]: linear temporal logic over bounded finite traces
//! - [`eventide_metaloop`]: multi-level meta-learning with safety-gated
//!   self-modification
//!
//! [`pipeline::StreamEngine`] wires them together behind a single
//! ingest/drain surface.

pub mod pipeline;

pub use pipeline::{Event, EngineConfig, EngineError, EngineSnapshot, StreamEngine};

pub use eventide_temporal::{
    CacheStats, CompareConfig, CompareError, ComparisonAlgorithm, ComparisonKey,
    ComparisonResult, DiscreteMetric, ScalarMetric, Sequence, SequenceComparator,
    SimilarityMatch, TemporalElement, ValueMetric,
};

pub use eventide_scheduler::{
    Deadline, Priority, RealtimeScheduler, ScheduleError, ScheduledTask, SchedulerConfig,
    SchedulerStats, SchedulingPolicy, TaskOutcome,
};

pub use eventide_attractor::{
    AnalyzerConfig, AttractorAnalyzer, AttractorError, AttractorInfo, AttractorKind,
    BehaviorSummary, PhasePoint, Trajectory, MIN_POINTS_FOR_ANALYSIS,
};

pub use eventide_ltl::{
    Strictness, TemporalFormula, TemporalOperator, TemporalState, TraceVerifier,
    VerificationResult, VerifierConfig, VerifyError,
};

pub use eventide_metaloop::{
    LoopConfig, LoopError, LoopSummary, MetaKnowledge, MetaLevel, ModificationRule, NodeId,
    SafetyConstraint, StrangeLoop,
};
