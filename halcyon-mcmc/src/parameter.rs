//! Bounded parameter vectors operated on by the sampler.
//!
//! A parameter is a named, fixed-length vector with inclusive scalar
//! bounds (possibly infinite). Parameters are owned by
//! [`crate::state::ChainState`] and addressed by index; operators hold the
//! index, never the value.

use halcyon_core::{HalcyonError, Result};

/// A named, bounded vector of reals.
#[derive(Debug, Clone)]
pub struct RealParameter {
    name: String,
    values: Vec<f64>,
    lower: f64,
    upper: f64,
}

impl RealParameter {
    /// Create a parameter. The initial values must respect the bounds.
    pub fn new(name: &str, values: Vec<f64>, lower: f64, upper: f64) -> Result<Self> {
        if values.is_empty() {
            return Err(HalcyonError::InvalidInput(format!(
                "parameter {name} has zero dimensions"
            )));
        }
        if lower > upper {
            return Err(HalcyonError::InvalidInput(format!(
                "parameter {name}: lower bound {lower} exceeds upper bound {upper}"
            )));
        }
        for (i, &v) in values.iter().enumerate() {
            if v < lower || v > upper {
                return Err(HalcyonError::InvalidInput(format!(
                    "parameter {name}[{i}] = {v} outside [{lower}, {upper}]"
                )));
            }
        }
        Ok(Self {
            name: name.to_string(),
            values,
            lower,
            upper,
        })
    }

    /// Unbounded convenience constructor.
    pub fn unbounded(name: &str, values: Vec<f64>) -> Result<Self> {
        Self::new(name, values, f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, i: usize) -> f64 {
        self.values[i]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// True when `v` lies inside the inclusive bounds.
    pub fn in_bounds(&self, v: f64) -> bool {
        v >= self.lower && v <= self.upper
    }

    /// Set one dimension. The caller has already checked bounds; this is
    /// the commit step of a proposal.
    pub fn set_value(&mut self, i: usize, v: f64) {
        self.values[i] = v;
    }

    /// Mean of the vector; used by the adaptive sampler to reduce a
    /// multi-dimensional parameter to one tracked statistic.
    pub fn mean(&self) -> f64 {
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }
}

/// A named vector of booleans (indicator bits).
#[derive(Debug, Clone)]
pub struct BoolParameter {
    name: String,
    values: Vec<bool>,
}

impl BoolParameter {
    pub fn new(name: &str, values: Vec<bool>) -> Result<Self> {
        if values.is_empty() {
            return Err(HalcyonError::InvalidInput(format!(
                "parameter {name} has zero dimensions"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            values,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, i: usize) -> bool {
        self.values[i]
    }

    pub fn set_value(&mut self, i: usize, v: bool) {
        self.values[i] = v;
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.values.iter().filter(|&&b| b).count()
    }
}
