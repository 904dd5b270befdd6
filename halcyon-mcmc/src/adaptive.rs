//! Adaptive meta-operator.
//!
//! Wraps two or more sub-operators and learns which of them moves a set
//! of tracked parameters most efficiently, then samples sub-operators in
//! proportion to that learned efficiency. Three phases, driven by the
//! call count: burn-in (uniform selection, nothing recorded), learning
//! (uniform selection, statistics accumulate), teaching (weighted
//! selection). The learned state round-trips through a JSON record so a
//! resumed chain keeps its training.

use log::warn;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use halcyon_core::{HalcyonError, Result};

use crate::operator::Operator;
use crate::state::{ChainState, ParamId};
use crate::stats::Welford;

/// Additive weight floor so no sub-operator's selection probability
/// reaches zero.
const FUDGE_FACTOR: f64 = 0.1;

/// Default burn-in per sub-operator.
const DEFAULT_BURNIN_PER_OP: u64 = 500;

/// Default learning window per sub-operator.
const DEFAULT_LEARNIN_PER_OP: u64 = 1000;

/// What the sampler measures movement against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracked {
    /// A real parameter of the chain state.
    Param(ParamId),
    /// All node heights of the tree, treated as one vector parameter.
    TreeHeights,
}

/// Persisted training state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveStateRecord {
    pub name: String,
    pub calls: u64,
    pub proposals: Vec<u64>,
    pub accepts: Vec<u64>,
    pub sum_sq_diff: Vec<Vec<f64>>,
    pub param_stats: Vec<Welford>,
}

/// Selects among sub-operators by learned per-parameter efficiency.
pub struct AdaptiveOperatorSampler {
    name: String,
    operators: Vec<Box<dyn Operator>>,
    tracked: Vec<Tracked>,
    burnin: u64,
    learnin: u64,
    calls: u64,
    last: usize,
    state_before: Vec<Vec<f64>>,
    /// Squared pre/post difference per (operator, tracked parameter),
    /// summed over accepted proposals.
    sum_sq_diff: Vec<Vec<f64>>,
    /// Running mean/variance of each tracked parameter's dimension mean.
    param_stats: Vec<Welford>,
    proposals: Vec<u64>,
    accepts: Vec<u64>,
}

impl AdaptiveOperatorSampler {
    pub fn new(
        name: &str,
        state: &ChainState,
        operators: Vec<Box<dyn Operator>>,
        tracked: Vec<Tracked>,
    ) -> Result<Self> {
        let k = operators.len();
        if k < 2 {
            return Err(HalcyonError::InvalidInput(format!(
                "adaptive sampler {name:?} needs at least two sub-operators, got {k}"
            )));
        }
        for t in &tracked {
            if let Tracked::Param(id) = *t {
                if state.params.get(id).is_none() {
                    return Err(HalcyonError::InvalidInput(format!(
                        "adaptive sampler {name:?} tracks unknown parameter {id}"
                    )));
                }
            }
        }
        if tracked.is_empty() {
            warn!("adaptive sampler {name}: no tracked parameters, selection stays uniform");
        }
        let n = tracked.len();
        Ok(Self {
            name: name.to_string(),
            operators,
            tracked,
            burnin: DEFAULT_BURNIN_PER_OP * k as u64,
            learnin: DEFAULT_LEARNIN_PER_OP * k as u64,
            calls: 0,
            last: 0,
            state_before: Vec::new(),
            sum_sq_diff: vec![vec![0.0; n]; k],
            param_stats: vec![Welford::default(); n],
            proposals: vec![0; k],
            accepts: vec![0; k],
        })
    }

    /// Override the phase thresholds. `learnin` is raised to `burnin`
    /// when it is smaller.
    pub fn with_phases(mut self, burnin: u64, learnin: u64) -> Self {
        self.burnin = burnin;
        self.learnin = learnin.max(burnin);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn learning(&self) -> bool {
        self.calls >= self.burnin
    }

    fn teaching(&self) -> bool {
        self.calls >= self.learnin
    }

    fn values_of(&self, state: &ChainState, tracked: Tracked) -> Vec<f64> {
        match tracked {
            Tracked::Param(id) => state.param(id).values().to_vec(),
            Tracked::TreeHeights => state.tree.heights(),
        }
    }

    fn snapshot(&self, state: &ChainState) -> Vec<Vec<f64>> {
        self.tracked
            .iter()
            .map(|&t| self.values_of(state, t))
            .collect()
    }

    /// Normalized movement score of operator `i` on tracked parameter
    /// `p`. Zero when nothing has been learned yet or the parameter has
    /// not varied.
    fn efficiency(&self, i: usize, p: usize) -> f64 {
        let accepts = self.accepts[i];
        let variance = self.param_stats[p].variance();
        if accepts == 0 || variance <= 0.0 {
            return 0.0;
        }
        self.sum_sq_diff[i][p] / (accepts as f64 * variance)
    }

    fn weights(&self) -> Vec<f64> {
        let k = self.operators.len();
        if !self.teaching() || self.tracked.is_empty() {
            return vec![1.0; k];
        }
        let mut weights = Vec::with_capacity(k);
        for i in 0..k {
            let rate = if self.proposals[i] == 0 {
                0.0
            } else {
                self.accepts[i] as f64 / self.proposals[i] as f64
            };
            let score: f64 = (0..self.tracked.len())
                .map(|p| self.efficiency(i, p))
                .sum::<f64>()
                / self.tracked.len() as f64;
            weights.push(rate * score + FUDGE_FACTOR);
        }
        weights
    }

    fn pick(&self, rng: &mut dyn RngCore) -> usize {
        let weights = self.weights();
        let total: f64 = weights.iter().sum();
        let k = weights.len();
        if total <= 0.0 || !total.is_finite() {
            return rng.gen_range(0..k);
        }
        let mut cumulative = Vec::with_capacity(k);
        let mut acc = 0.0;
        for w in &weights {
            acc += w / total;
            cumulative.push(acc);
        }
        let u: f64 = rng.gen();
        cumulative.partition_point(|&c| c <= u).min(k - 1)
    }

    /// Selection probability of sub-operator `i` under the current
    /// learned weights.
    pub fn selection_probability(&self, i: usize) -> f64 {
        let weights = self.weights();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return 1.0 / weights.len() as f64;
        }
        weights[i] / total
    }
}

impl Operator for AdaptiveOperatorSampler {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut ChainState, rng: &mut dyn RngCore) -> f64 {
        self.state_before = self.snapshot(state);
        if self.learning() {
            for (p, values) in self.state_before.iter().enumerate() {
                if !values.is_empty() {
                    let mean = values.iter().sum::<f64>() / values.len() as f64;
                    self.param_stats[p].push(mean);
                }
            }
        }

        self.last = self.pick(rng);
        if self.learning() {
            self.proposals[self.last] += 1;
        }
        self.calls += 1;

        self.operators[self.last].propose(state, rng)
    }

    fn accept(&mut self, state: &ChainState) {
        if self.learning() {
            self.accepts[self.last] += 1;
            let after = self.snapshot(state);
            for (p, (before, now)) in self.state_before.iter().zip(&after).enumerate() {
                let sq: f64 = before
                    .iter()
                    .zip(now)
                    .map(|(b, a)| (b - a) * (b - a))
                    .sum();
                self.sum_sq_diff[self.last][p] += sq;
            }
        }
        self.operators[self.last].accept(state);
    }

    fn reject(&mut self) {
        self.operators[self.last].reject();
    }

    fn optimize(&mut self, log_alpha: f64) {
        self.operators[self.last].optimize(log_alpha);
    }

    fn store_state(&self) -> Option<String> {
        let record = AdaptiveStateRecord {
            name: self.name.clone(),
            calls: self.calls,
            proposals: self.proposals.clone(),
            accepts: self.accepts.clone(),
            sum_sq_diff: self.sum_sq_diff.clone(),
            param_stats: self.param_stats.clone(),
        };
        serde_json::to_string(&record).ok()
    }

    fn restore_state(&mut self, record: &str) -> Result<()> {
        let record: AdaptiveStateRecord = serde_json::from_str(record)
            .map_err(|e| HalcyonError::Parse(format!("adaptive state record: {e}")))?;
        let k = self.operators.len();
        let n = self.tracked.len();
        if record.proposals.len() != k || record.accepts.len() != k {
            return Err(HalcyonError::InvalidInput(format!(
                "adaptive sampler {}: record covers {} operators, configured with {k}",
                self.name,
                record.proposals.len()
            )));
        }
        if record.param_stats.len() != n
            || record.sum_sq_diff.len() != k
            || record.sum_sq_diff.iter().any(|row| row.len() != n)
        {
            return Err(HalcyonError::InvalidInput(format!(
                "adaptive sampler {}: record tracks {} parameters, configured with {n}",
                self.name,
                record.param_stats.len()
            )));
        }
        self.calls = record.calls;
        self.proposals = record.proposals;
        self.accepts = record.accepts;
        self.sum_sq_diff = record.sum_sq_diff;
        self.param_stats = record.param_stats;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
