//! # Eventide-Metaloop
//!
//! Multi-level pattern extraction with safety-gated self-modification.
//!
//! ## Features
//! - Frequency-based pattern extraction at ascending abstraction levels
//! - Arena-backed knowledge graph (level-k nodes reference level-k-1 ids)
//! - Modification rules gated by LTL safety constraints
//! - Behavioural analysis bridge into the attractor analyzer

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use eventide_attractor::{
    AnalyzerConfig, AttractorAnalyzer, AttractorError, AttractorInfo, PhasePoint,
    MIN_POINTS_FOR_ANALYSIS,
};
use eventide_ltl::{
    TemporalFormula, TemporalState, TraceVerifier, VerifierConfig, VerifyError,
};
use eventide_temporal::{CompareConfig, ComparisonAlgorithm, Sequence, SequenceComparator};

/// Length of the synthetic trace a candidate modification is checked on.
const SYNTHETIC_TRACE_LEN: usize = 6;

/// Meta-learning errors.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("meta-level {level} is out of range (max depth {max})")]
    InvalidLevel { level: usize, max: usize },

    #[error("safety constraint violated: {0}")]
    SafetyViolation(String),

    #[error("self-modification is disabled")]
    ModificationsDisabled,

    #[error("modification budget for this cycle exhausted ({0})")]
    ModificationBudgetExhausted(usize),

    #[error("constraint check failed: {0}")]
    ConstraintCheck(#[from] VerifyError),

    #[error("behaviour analysis failed: {0}")]
    Behavior(#[from] AttractorError),
}

/// A level in the abstraction hierarchy; base observations sit at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaLevel(pub usize);

impl MetaLevel {
    pub fn base() -> Self {
        MetaLevel(0)
    }

    pub fn next(&self) -> Self {
        MetaLevel(self.0 + 1)
    }

    pub fn level(&self) -> usize {
        self.0
    }
}

/// Index into the knowledge arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

/// One pattern in the arena. Level-k nodes reference the level-k-1
/// nodes they were abstracted from by id, never by ownership.
#[derive(Debug, Clone)]
struct PatternNode {
    level: usize,
    pattern: String,
    confidence: f64,
    support: usize,
    sources: Vec<NodeId>,
    applications: Vec<String>,
    learned_at: u64,
}

/// Public view of a knowledge node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaKnowledge {
    pub id: NodeId,
    pub level: MetaLevel,
    pub pattern: String,
    pub confidence: f64,
    pub applications: Vec<String>,
    /// Arena ids of the lower-level patterns this one abstracts.
    pub sources: Vec<NodeId>,
    pub learned_at: u64,
}

/// An LTL-checked invariant that every modification must preserve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConstraint {
    pub name: String,
    pub formula: TemporalFormula,
    pub enforced: bool,
}

impl SafetyConstraint {
    pub fn new(name: impl Into<String>, formula: TemporalFormula) -> Self {
        Self {
            name: name.into(),
            formula,
            enforced: true,
        }
    }

    /// G safe
    pub fn always_safe() -> Self {
        Self::new(
            "always_safe",
            TemporalFormula::globally(TemporalFormula::atom("safe")),
        )
    }

    /// F done
    pub fn eventually_terminates() -> Self {
        Self::new(
            "eventually_terminates",
            TemporalFormula::finally(TemporalFormula::atom("done")),
        )
    }
}

/// A proposed rule change. `effects` are the proposition assignments the
/// post-modification system would exhibit; they are what the safety
/// constraints get checked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationRule {
    pub name: String,
    pub trigger: String,
    pub effects: Vec<(String, bool)>,
}

impl ModificationRule {
    pub fn new(name: impl Into<String>, trigger: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trigger: trigger.into(),
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, proposition: impl Into<String>, value: bool) -> Self {
        self.effects.push((proposition.into(), value));
        self
    }
}

/// Aggregate counters for the loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSummary {
    pub total_levels: usize,
    pub total_knowledge: usize,
    pub learning_iterations: u64,
    pub safety_violations: usize,
    pub modifications_applied: usize,
}

/// Strange-loop configuration.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_meta_depth: usize,
    pub enable_self_modification: bool,
    pub max_modifications_per_cycle: usize,
    pub safety_check_enabled: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_meta_depth: 3,
            enable_self_modification: false,
            max_modifications_per_cycle: 5,
            safety_check_enabled: true,
        }
    }
}

/// The meta-learning loop.
pub struct StrangeLoop {
    config: LoopConfig,
    nodes: Vec<PatternNode>,
    levels: HashMap<usize, Vec<NodeId>>,
    iterations: HashMap<usize, u64>,
    previous_batches: HashMap<usize, Vec<String>>,
    /// Pattern identifiers accumulated for each level's next promotion;
    /// a level-k pattern recurring across passes is what level k+1 sees.
    promotion_feed: HashMap<usize, Vec<String>>,
    constraints: Vec<SafetyConstraint>,
    applied_rules: Vec<ModificationRule>,
    modifications_this_cycle: usize,
    modifications_applied: usize,
    safety_violations: usize,
    comparator: SequenceComparator<String>,
}

impl StrangeLoop {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            levels: HashMap::new(),
            iterations: HashMap::new(),
            previous_batches: HashMap::new(),
            promotion_feed: HashMap::new(),
            constraints: vec![
                SafetyConstraint::always_safe(),
                SafetyConstraint::eventually_terminates(),
            ],
            applied_rules: Vec::new(),
            modifications_this_cycle: 0,
            modifications_applied: 0,
            safety_violations: 0,
            comparator: SequenceComparator::new(CompareConfig::default()),
        }
    }

    /// Extract patterns from `data` at `level`, then promote the freshly
    /// extracted identifiers one level up while depth remains.
    pub fn learn_at_level(
        &mut self,
        level: MetaLevel,
        data: &[String],
    ) -> Result<Vec<MetaKnowledge>, LoopError> {
        if level.level() >= self.config.max_meta_depth {
            return Err(LoopError::InvalidLevel {
                level: level.level(),
                max: self.config.max_meta_depth,
            });
        }

        *self.iterations.entry(level.level()).or_insert(0) += 1;

        if self.batch_repeats(level.level(), data) {
            debug!(level = level.level(), "batch identical to previous, reusing knowledge");
            return Ok(self.knowledge_at_level(level));
        }
        self.previous_batches.insert(level.level(), data.to_vec());

        let extracted = self.extract_patterns(level.level(), data);
        debug!(
            level = level.level(),
            patterns = extracted.len(),
            "learning pass complete"
        );

        if !extracted.is_empty() && level.level() + 1 < self.config.max_meta_depth {
            let feed = self.promotion_feed.entry(level.level() + 1).or_default();
            feed.extend(extracted.iter().map(|k| k.pattern.clone()));
            let promoted = feed.clone();
            self.learn_at_level(level.next(), &promoted)?;
        }

        Ok(extracted)
    }

    /// LCS distance zero against the previous batch at this level means
    /// there is nothing new to extract.
    fn batch_repeats(&self, level: usize, data: &[String]) -> bool {
        let Some(previous) = self.previous_batches.get(&level) else {
            return false;
        };
        if previous.is_empty() || data.is_empty() {
            return false;
        }
        let current = Sequence::from_values(data.iter().cloned());
        let last = Sequence::from_values(previous.iter().cloned());
        self.comparator
            .compare(&current, &last, ComparisonAlgorithm::Lcs)
            .map(|result| result.distance == 0.0)
            .unwrap_or(false)
    }

    /// Frequency counting: a value occurring at least twice in the batch
    /// is a pattern; its confidence is the occurrence ratio.
    fn extract_patterns(&mut self, level: usize, data: &[String]) -> Vec<MetaKnowledge> {
        let mut extracted = Vec::new();
        let mut seen = HashSet::new();

        for value in data {
            if !seen.insert(value.clone()) {
                continue;
            }
            let support = data.iter().filter(|v| *v == value).count();
            if support < 2 {
                continue;
            }
            let confidence = (support as f64 / data.len() as f64).clamp(0.0, 1.0);
            let id = self.upsert_node(level, value, support, confidence);
            extracted.push(self.knowledge_view(id));
        }

        extracted
    }

    /// Insert a node for `pattern` at `level`, or reinforce the existing
    /// one. Nodes above the base level link to their sources one level
    /// down.
    fn upsert_node(&mut self, level: usize, pattern: &str, support: usize, confidence: f64) -> NodeId {
        let existing = self.levels.get(&level).and_then(|ids| {
            ids.iter()
                .copied()
                .find(|id| self.nodes[id.0 as usize].pattern == pattern)
        });

        if let Some(id) = existing {
            let node = &mut self.nodes[id.0 as usize];
            node.support += support;
            node.confidence = node.confidence.max(confidence);
            node.learned_at = unix_millis();
            return id;
        }

        let sources = if level == 0 {
            Vec::new()
        } else {
            self.levels
                .get(&(level - 1))
                .map(|ids| {
                    ids.iter()
                        .copied()
                        .filter(|id| self.nodes[id.0 as usize].pattern == pattern)
                        .collect()
                })
                .unwrap_or_default()
        };

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(PatternNode {
            level,
            pattern: pattern.to_string(),
            confidence,
            support,
            sources,
            applications: Vec::new(),
            learned_at: unix_millis(),
        });
        self.levels.entry(level).or_default().push(id);
        id
    }

    fn knowledge_view(&self, id: NodeId) -> MetaKnowledge {
        let node = &self.nodes[id.0 as usize];
        MetaKnowledge {
            id,
            level: MetaLevel(node.level),
            pattern: node.pattern.clone(),
            confidence: node.confidence,
            applications: node.applications.clone(),
            sources: node.sources.clone(),
            learned_at: node.learned_at,
        }
    }

    /// Apply a modification rule after checking every enforced safety
    /// constraint against the synthetic post-modification trace.
    pub fn apply_modification(&mut self, rule: ModificationRule) -> Result<(), LoopError> {
        if !self.config.enable_self_modification {
            return Err(LoopError::ModificationsDisabled);
        }
        if self.modifications_this_cycle >= self.config.max_modifications_per_cycle {
            return Err(LoopError::ModificationBudgetExhausted(
                self.config.max_modifications_per_cycle,
            ));
        }

        if self.config.safety_check_enabled {
            let verifier = self.synthetic_trace(&rule);
            let mut violated = None;
            for constraint in &self.constraints {
                if !constraint.enforced {
                    continue;
                }
                let verdict = verifier.verify(&constraint.formula)?;
                if !verdict.satisfied {
                    violated = Some(constraint.name.clone());
                    break;
                }
            }
            if let Some(name) = violated {
                self.safety_violations += 1;
                warn!(rule = %rule.name, constraint = %name, "modification rejected");
                return Err(LoopError::SafetyViolation(name));
            }
        }

        debug!(rule = %rule.name, "modification applied");
        self.applied_rules.push(rule);
        self.modifications_this_cycle += 1;
        self.modifications_applied += 1;
        Ok(())
    }

    /// Trace standing in for the post-modification system: a baseline of
    /// `safe` and `done`, overridden by the rule's declared effects.
    fn synthetic_trace(&self, rule: &ModificationRule) -> TraceVerifier {
        let mut verifier = TraceVerifier::new(VerifierConfig {
            max_trace_length: SYNTHETIC_TRACE_LEN,
            ..VerifierConfig::default()
        });
        for i in 0..SYNTHETIC_TRACE_LEN as u64 {
            let mut state = TemporalState::new(i, i);
            state.set_proposition("safe", true);
            state.set_proposition("done", true);
            for (name, value) in &rule.effects {
                state.set_proposition(name.clone(), *value);
            }
            verifier.add_state(state);
        }
        verifier
    }

    pub fn add_safety_constraint(&mut self, constraint: SafetyConstraint) {
        self.constraints.push(constraint);
    }

    /// Reset the per-cycle modification budget.
    pub fn advance_cycle(&mut self) {
        self.modifications_this_cycle = 0;
    }

    /// Lift raw metric rows into phase points, classify the dynamics, and
    /// record the classification as level-1 meta-knowledge.
    pub fn analyze_behavior(&mut self, rows: &[Vec<f64>]) -> Result<AttractorInfo, LoopError> {
        let dimension = rows.first().map(|row| row.len()).unwrap_or(0).max(1);
        let mut analyzer = AttractorAnalyzer::new(AnalyzerConfig {
            embedding_dimension: dimension,
            max_trajectory_length: rows.len().max(MIN_POINTS_FOR_ANALYSIS),
        });
        for (i, row) in rows.iter().enumerate() {
            analyzer.add_point(PhasePoint::new(row.clone(), i as u64))?;
        }

        let info = analyzer.analyze()?;
        let level = 1.min(self.config.max_meta_depth.saturating_sub(1));
        let label = format!("dynamics:{:?}", info.kind);
        self.upsert_node(level, &label, 1, info.confidence);
        debug!(%label, "behaviour recorded as meta-knowledge");
        Ok(info)
    }

    pub fn knowledge_at_level(&self, level: MetaLevel) -> Vec<MetaKnowledge> {
        self.levels
            .get(&level.level())
            .map(|ids| ids.iter().map(|&id| self.knowledge_view(id)).collect())
            .unwrap_or_default()
    }

    pub fn all_knowledge(&self) -> HashMap<MetaLevel, Vec<MetaKnowledge>> {
        self.levels
            .keys()
            .map(|&level| (MetaLevel(level), self.knowledge_at_level(MetaLevel(level))))
            .collect()
    }

    pub fn applied_rules(&self) -> &[ModificationRule] {
        &self.applied_rules
    }

    pub fn get_summary(&self) -> LoopSummary {
        LoopSummary {
            total_levels: self.levels.len(),
            total_knowledge: self.nodes.len(),
            learning_iterations: self.iterations.values().sum(),
            safety_violations: self.safety_violations,
            modifications_applied: self.modifications_applied,
        }
    }

    /// Drop all learned knowledge and counters; configuration and safety
    /// constraints survive.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.levels.clear();
        self.iterations.clear();
        self.previous_batches.clear();
        self.promotion_feed.clear();
        self.applied_rules.clear();
        self.modifications_this_cycle = 0;
        self.modifications_applied = 0;
        self.safety_violations = 0;
        self.comparator.clear_cache();
    }
}

impl Default for StrangeLoop {
    fn default() -> Self {
        Self::new(LoopConfig::default())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn permissive_loop() -> StrangeLoop {
        StrangeLoop::new(LoopConfig {
            enable_self_modification: true,
            ..LoopConfig::default()
        })
    }

    #[test]
    fn meta_levels_count_upwards() {
        let base = MetaLevel::base();
        assert_eq!(base.level(), 0);
        assert_eq!(base.next().level(), 1);
    }

    #[test]
    fn repeated_values_become_patterns() {
        let mut strange_loop = StrangeLoop::default();
        let data = batch(&["alpha", "beta", "alpha", "gamma", "alpha"]);

        let knowledge = strange_loop.learn_at_level(MetaLevel::base(), &data).unwrap();
        assert_eq!(knowledge.len(), 1);
        assert_eq!(knowledge[0].pattern, "alpha");
        assert!((knowledge[0].confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn promotion_requires_a_pattern_at_the_lower_level() {
        let mut strange_loop = StrangeLoop::default();

        // No repeats, no patterns, no promotion.
        strange_loop
            .learn_at_level(MetaLevel::base(), &batch(&["a", "b", "c"]))
            .unwrap();
        assert_eq!(strange_loop.iterations.get(&1), None);

        // Repeats promote the extracted identifiers one level up.
        strange_loop
            .learn_at_level(MetaLevel::base(), &batch(&["x", "x", "y", "y"]))
            .unwrap();
        assert_eq!(strange_loop.iterations.get(&1), Some(&1));
    }

    #[test]
    fn upper_level_nodes_link_their_sources() {
        let mut strange_loop = StrangeLoop::default();
        strange_loop
            .learn_at_level(MetaLevel::base(), &batch(&["x", "x", "x", "y"]))
            .unwrap();

        // Promotion saw ["x"], a single identifier: no level-1 pattern yet.
        strange_loop
            .learn_at_level(MetaLevel(1), &batch(&["x", "x"]))
            .unwrap();

        let upper = strange_loop.knowledge_at_level(MetaLevel(1));
        assert_eq!(upper.len(), 1);
        assert_eq!(upper[0].pattern, "x");
        assert_eq!(upper[0].sources.len(), 1);

        let lower = strange_loop.knowledge_at_level(MetaLevel::base());
        assert_eq!(lower[0].id, upper[0].sources[0]);
    }

    #[test]
    fn recurring_patterns_promote_across_passes() {
        let mut strange_loop = StrangeLoop::default();

        strange_loop
            .learn_at_level(MetaLevel::base(), &batch(&["x", "x", "a"]))
            .unwrap();
        assert!(strange_loop.knowledge_at_level(MetaLevel(1)).is_empty());

        // "x" emerging again feeds the accumulated promotion batch, which
        // now repeats it: a level-1 pattern-of-patterns forms.
        strange_loop
            .learn_at_level(MetaLevel::base(), &batch(&["x", "x", "b"]))
            .unwrap();
        let upper = strange_loop.knowledge_at_level(MetaLevel(1));
        assert_eq!(upper.len(), 1);
        assert_eq!(upper[0].pattern, "x");
        assert!(!upper[0].sources.is_empty());
    }

    #[test]
    fn learning_beyond_max_depth_is_invalid() {
        let mut strange_loop = StrangeLoop::default();
        let err = strange_loop
            .learn_at_level(MetaLevel(3), &batch(&["a"]))
            .unwrap_err();
        assert!(matches!(err, LoopError::InvalidLevel { level: 3, max: 3 }));
    }

    #[test]
    fn identical_batch_is_not_relearned() {
        let mut strange_loop = StrangeLoop::default();
        let data = batch(&["p", "p", "q"]);

        strange_loop.learn_at_level(MetaLevel::base(), &data).unwrap();
        let before = strange_loop.get_summary().total_knowledge;

        let again = strange_loop.learn_at_level(MetaLevel::base(), &data).unwrap();
        assert_eq!(strange_loop.get_summary().total_knowledge, before);
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn modification_disabled_by_default() {
        let mut strange_loop = StrangeLoop::default();
        let rule = ModificationRule::new("tighten", "latency_spike");
        let err = strange_loop.apply_modification(rule).unwrap_err();
        assert!(matches!(err, LoopError::ModificationsDisabled));
    }

    #[test]
    fn unsafe_modification_is_rejected_and_counted() {
        let mut strange_loop = permissive_loop();
        let rule = ModificationRule::new("disable_guard", "impatience").with_effect("safe", false);

        let err = strange_loop.apply_modification(rule).unwrap_err();
        assert!(matches!(err, LoopError::SafetyViolation(name) if name == "always_safe"));

        let summary = strange_loop.get_summary();
        assert_eq!(summary.safety_violations, 1);
        assert_eq!(summary.modifications_applied, 0);
        assert!(strange_loop.applied_rules().is_empty());
    }

    #[test]
    fn safe_modification_is_applied() {
        let mut strange_loop = permissive_loop();
        let rule = ModificationRule::new("widen_window", "low_hit_rate")
            .with_effect("window_widened", true);

        strange_loop.apply_modification(rule).unwrap();

        let summary = strange_loop.get_summary();
        assert_eq!(summary.modifications_applied, 1);
        assert_eq!(summary.safety_violations, 0);
        assert_eq!(strange_loop.applied_rules().len(), 1);
    }

    #[test]
    fn unenforced_constraints_do_not_gate() {
        let mut strange_loop = permissive_loop();
        strange_loop.add_safety_constraint(SafetyConstraint {
            name: "advisory".into(),
            formula: TemporalFormula::globally(TemporalFormula::atom("advisory_flag")),
            enforced: false,
        });

        let rule = ModificationRule::new("noop", "trigger");
        assert!(strange_loop.apply_modification(rule).is_ok());
    }

    #[test]
    fn per_cycle_budget_is_enforced() {
        let mut strange_loop = StrangeLoop::new(LoopConfig {
            enable_self_modification: true,
            max_modifications_per_cycle: 1,
            ..LoopConfig::default()
        });

        strange_loop
            .apply_modification(ModificationRule::new("first", "t"))
            .unwrap();
        let err = strange_loop
            .apply_modification(ModificationRule::new("second", "t"))
            .unwrap_err();
        assert!(matches!(err, LoopError::ModificationBudgetExhausted(1)));

        strange_loop.advance_cycle();
        assert!(strange_loop
            .apply_modification(ModificationRule::new("third", "t"))
            .is_ok());
    }

    #[test]
    fn behaviour_analysis_records_level_one_knowledge() {
        let mut strange_loop = StrangeLoop::default();
        let rows: Vec<Vec<f64>> = (0..150).map(|n| vec![0.5f64.powi(n)]).collect();

        let info = strange_loop.analyze_behavior(&rows).unwrap();
        assert!(info.is_stable);

        let recorded = strange_loop.knowledge_at_level(MetaLevel(1));
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].pattern.starts_with("dynamics:"));
    }

    #[test]
    fn short_behaviour_windows_are_refused() {
        let mut strange_loop = StrangeLoop::default();
        let rows: Vec<Vec<f64>> = (0..50).map(|n| vec![n as f64]).collect();
        let err = strange_loop.analyze_behavior(&rows).unwrap_err();
        assert!(matches!(
            err,
            LoopError::Behavior(AttractorError::InsufficientData { .. })
        ));
    }

    #[test]
    fn reset_clears_all_knowledge() {
        let mut strange_loop = StrangeLoop::default();
        strange_loop
            .learn_at_level(MetaLevel::base(), &batch(&["r", "r", "s", "s"]))
            .unwrap();
        assert!(strange_loop.get_summary().total_knowledge > 0);

        strange_loop.reset();
        let summary = strange_loop.get_summary();
        assert_eq!(summary.total_knowledge, 0);
        assert_eq!(summary.total_levels, 0);
        assert_eq!(summary.learning_iterations, 0);
    }
}
