//! The composed analytics pipeline.
//!
//! Producers push [`Event`]s through the scheduler; draining routes each
//! payload to its consumer: tokens into the comparison window, metrics
//! through a delay-embedding buffer into the attractor analyzer, and
//! observations into the verifier trace. The strange loop reflects over
//! the token window on demand.

use std::collections::VecDeque;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use eventide_attractor::{
    AnalyzerConfig, AttractorAnalyzer, AttractorError, AttractorInfo, PhasePoint,
};
use eventide_ltl::{
    TemporalFormula, TemporalState, TraceVerifier, VerificationResult, VerifierConfig,
    VerifyError,
};
use eventide_metaloop::{
    LoopConfig, LoopError, LoopSummary, MetaKnowledge, MetaLevel, ModificationRule, StrangeLoop,
};
use eventide_scheduler::{
    Deadline, Priority, RealtimeScheduler, ScheduleError, SchedulerConfig, SchedulerStats,
    TaskOutcome,
};
use eventide_temporal::{
    CacheStats, CompareConfig, CompareError, ComparisonAlgorithm, ComparisonResult, Sequence,
    SequenceComparator,
};

/// Any failure surfaced by the composed pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Compare(#[from] CompareError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Attractor(#[from] AttractorError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Learning(#[from] LoopError),
}

/// One unit of streamed input.
#[derive(Debug, Clone)]
pub enum Event {
    /// A discrete symbol (token, log line, action name).
    Token(String),
    /// A scalar measurement, delay-embedded into phase space.
    Metric(f64),
    /// A snapshot of named boolean propositions.
    Observation { propositions: Vec<(String, bool)> },
}

/// Pipeline configuration, one section per component.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub compare: CompareConfig,
    pub scheduler: SchedulerConfig,
    pub analyzer: AnalyzerConfig,
    pub verifier: VerifierConfig,
    pub learning: LoopConfig,
    /// Trailing token count fed to reflection and recent-window compare.
    pub token_window: usize,
}

/// Aggregated component statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub scheduler: SchedulerStats,
    pub cache: CacheStats,
    pub learning: LoopSummary,
    pub tokens_seen: usize,
    pub trajectory_len: usize,
    pub trace_len: usize,
}

/// The five-component runtime behind one ingest/drain surface.
pub struct StreamEngine {
    scheduler: RealtimeScheduler<Event>,
    comparator: SequenceComparator<String>,
    analyzer: AttractorAnalyzer,
    verifier: TraceVerifier,
    strange_loop: StrangeLoop,
    tokens: Sequence<String>,
    embedding: VecDeque<f64>,
    clock: u64,
    next_state_id: u64,
    token_window: usize,
}

impl StreamEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            scheduler: RealtimeScheduler::new(config.scheduler),
            comparator: SequenceComparator::new(config.compare),
            analyzer: AttractorAnalyzer::new(config.analyzer),
            verifier: TraceVerifier::new(config.verifier),
            strange_loop: StrangeLoop::new(config.learning),
            tokens: Sequence::new(),
            embedding: VecDeque::new(),
            clock: 0,
            next_state_id: 0,
            token_window: if config.token_window == 0 {
                64
            } else {
                config.token_window
            },
        }
    }

    /// Admit an event under a deadline; fails closed when the queue is
    /// full. Safe to call from several producer threads at once.
    pub fn ingest(
        &self,
        event: Event,
        deadline: Deadline,
        priority: Priority,
    ) -> Result<u64, EngineError> {
        Ok(self.scheduler.schedule(event, deadline, priority)?)
    }

    /// Dequeue and route every ready event; returns how many were
    /// processed. Routing happens after the scheduler hands the payload
    /// back, so a routing failure never corrupts scheduler statistics.
    pub fn drain(&mut self) -> Result<usize, EngineError> {
        let mut processed = 0;
        while let Some(task) = self.scheduler.next_task() {
            let mut delivered = None;
            let outcome = self.scheduler.execute_task(task, |event| {
                delivered = Some(event);
            });
            if outcome == TaskOutcome::Failed {
                continue;
            }
            if let Some(event) = delivered {
                self.route(event)?;
                processed += 1;
            }
        }
        debug!(processed, "drain complete");
        Ok(processed)
    }

    fn route(&mut self, event: Event) -> Result<(), EngineError> {
        self.clock += 1;
        match event {
            Event::Token(token) => {
                self.tokens.push(token, self.clock)?;
            }
            Event::Metric(value) => {
                self.embedding.push_back(value);
                let dimension = self.analyzer.embedding_dimension();
                if self.embedding.len() > dimension {
                    self.embedding.pop_front();
                }
                if self.embedding.len() == dimension {
                    let coords: Vec<f64> = self.embedding.iter().copied().collect();
                    self.analyzer.add_point(PhasePoint::new(coords, self.clock))?;
                }
            }
            Event::Observation { propositions } => {
                let mut state = TemporalState::new(self.next_state_id, self.clock);
                self.next_state_id += 1;
                for (name, value) in propositions {
                    state.set_proposition(name, value);
                }
                self.verifier.add_state(state);
            }
        }
        Ok(())
    }

    /// Compare the two halves of the trailing `2 * window` tokens, a
    /// cheap recurring-motif probe over the live stream.
    pub fn compare_recent(
        &self,
        window: usize,
        algorithm: ComparisonAlgorithm,
    ) -> Result<ComparisonResult, EngineError> {
        let tail = self.tokens.last_n(window * 2);
        let (earlier, later) = tail.split_at(tail.len() / 2);
        let a = Sequence::from_values(earlier.iter().map(|e| e.value.clone()));
        let b = Sequence::from_values(later.iter().map(|e| e.value.clone()));
        Ok(self.comparator.compare(&a, &b, algorithm)?)
    }

    /// Classify the dynamics of the embedded metric stream.
    pub fn analyze_dynamics(&self) -> Result<AttractorInfo, EngineError> {
        Ok(self.analyzer.analyze()?)
    }

    /// Verify a formula against the observation trace.
    pub fn check(&self, formula: &TemporalFormula) -> Result<VerificationResult, EngineError> {
        Ok(self.verifier.verify(formula)?)
    }

    /// Run a strange-loop pass over the trailing token window.
    pub fn reflect(&mut self) -> Result<Vec<MetaKnowledge>, EngineError> {
        let window: Vec<String> = self
            .tokens
            .last_n(self.token_window)
            .iter()
            .map(|e| e.value.clone())
            .collect();
        Ok(self.strange_loop.learn_at_level(MetaLevel::base(), &window)?)
    }

    /// Propose a rule change; the loop's safety constraints gate it.
    pub fn propose(&mut self, rule: ModificationRule) -> Result<(), EngineError> {
        Ok(self.strange_loop.apply_modification(rule)?)
    }

    pub fn start(&self) {
        self.scheduler.start();
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            scheduler: self.scheduler.stats(),
            cache: self.comparator.cache_stats(),
            learning: self.strange_loop.get_summary(),
            tokens_seen: self.tokens.len(),
            trajectory_len: self.analyzer.trajectory_len(),
            trace_len: self.verifier.trace_len(),
        }
    }

    pub fn strange_loop_mut(&mut self) -> &mut StrangeLoop {
        &mut self.strange_loop
    }
}

impl Default for StreamEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
