//! Proposal kernel distributions.
//!
//! Provides the bimodal [`Bactrian`] kernel (Yang & Rodrigues 2013), a
//! mixture `p(x) = ½·N(−m, 1−m²) + ½·N(+m, 1−m²)` that avoids the tiny
//! steps a plain Gaussian wastes proposals on, and the self-tuning
//! [`Mirror`] kernel, which learns the running mean and spread of the
//! values it perturbs and then proposes reflections across that mean.
//! Operators hold a [`Kernel`] by value and draw deltas or scale factors
//! from it.

use rand::{Rng, RngCore};
use rand_distr::StandardNormal;

use halcyon_core::{HalcyonError, Result};

use crate::stats::Welford;

/// Recommended mode location for the Bactrian mixture.
pub const DEFAULT_M: f64 = 0.95;
/// Mirror kernel: proposals before the learned statistics are consulted.
pub const DEFAULT_INITIAL: u64 = 200;
/// Mirror kernel: further proposals ignored while statistics settle.
pub const DEFAULT_BURNIN: u64 = 100;

fn log_normal_density(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    -0.5 * (2.0 * core::f64::consts::PI).ln() - sd.ln() - 0.5 * z * z
}

// ── Bactrian ───────────────────────────────────────────────────────────────

/// Two-humped Gaussian mixture kernel with modes at `±m`.
#[derive(Debug, Clone, Copy)]
pub struct Bactrian {
    m: f64,
}

impl Bactrian {
    /// `m` must lie strictly inside `(0, 1)`; 0.95 is the usual choice.
    pub fn new(m: f64) -> Result<Self> {
        if !(m > 0.0 && m < 1.0) {
            return Err(HalcyonError::InvalidInput(format!(
                "Bactrian m must be in (0, 1), got {m}"
            )));
        }
        Ok(Self { m })
    }

    pub fn m(&self) -> f64 {
        self.m
    }

    /// Draw a random-walk delta scaled by `window`.
    pub fn random_delta(&self, window: f64, rng: &mut dyn RngCore) -> f64 {
        let eps: f64 = rng.sample(StandardNormal);
        let mode = if rng.gen_bool(0.5) { self.m } else { -self.m };
        window * (mode + eps * (1.0 - self.m * self.m).sqrt())
    }

    /// Draw a multiplicative scale factor; always positive.
    pub fn scaler(&self, factor: f64, rng: &mut dyn RngCore) -> f64 {
        self.random_delta(factor, rng).exp()
    }
}

impl Default for Bactrian {
    fn default() -> Self {
        Self { m: DEFAULT_M }
    }
}

// ── Mirror ─────────────────────────────────────────────────────────────────

/// Self-tuning kernel that reflects values across their running mean.
///
/// For the first `initial + burnin` calls it behaves as its inner
/// [`Bactrian`]; values seen after the first `initial` calls feed a
/// [`Welford`] accumulator. Once warm it proposes
/// `2·mean − value + window·sd·ε` and records the asymmetric-draw
/// correction `log N(value; mean, window·sd) − log N(new; mean, window·sd)`
/// for the caller to fold into its Hastings ratio.
#[derive(Debug, Clone)]
pub struct Mirror {
    bactrian: Bactrian,
    initial: u64,
    burnin: u64,
    calls: u64,
    stats: Welford,
    last_log_hr: f64,
}

impl Mirror {
    pub fn new(m: f64, initial: u64, burnin: u64) -> Result<Self> {
        Ok(Self {
            bactrian: Bactrian::new(m)?,
            initial,
            burnin,
            calls: 0,
            stats: Welford::new(),
            last_log_hr: 0.0,
        })
    }

    fn warmed_up(&self) -> bool {
        self.calls >= self.initial + self.burnin && self.stats.count() >= 2
    }

    /// Draw a delta for a walk on `value`. The caller adds the result to
    /// `value`; the HR correction for this draw is kept until the next one.
    pub fn random_delta(&mut self, value: f64, window: f64, rng: &mut dyn RngCore) -> f64 {
        self.calls += 1;
        if value.is_finite() && self.calls > self.initial {
            self.stats.push(value);
        }
        self.last_log_hr = 0.0;
        if !value.is_finite() || !self.warmed_up() {
            return self.bactrian.random_delta(window, rng);
        }
        let mean = self.stats.mean();
        let sd = self.stats.std_dev();
        if sd <= 0.0 {
            return self.bactrian.random_delta(window, rng);
        }
        let eps: f64 = rng.sample(StandardNormal);
        let proposed = 2.0 * mean - value + window * sd * eps;
        self.last_log_hr = log_normal_density(value, mean, window * sd)
            - log_normal_density(proposed, mean, window * sd);
        proposed - value
    }

    /// Draw a scale factor by mirroring in log space.
    pub fn scaler(&mut self, value: f64, factor: f64, rng: &mut dyn RngCore) -> f64 {
        let log_value = if value > 0.0 { value.ln() } else { f64::NAN };
        self.random_delta(log_value, factor, rng).exp()
    }

    pub fn log_hr_contribution(&self) -> f64 {
        self.last_log_hr
    }
}

// ── Kernel ─────────────────────────────────────────────────────────────────

/// Closed set of kernel distributions an operator can be configured with.
#[derive(Debug, Clone)]
pub enum Kernel {
    /// Flat draw on `±window`. Kept for compatibility with naive
    /// configurations; the schedule can upgrade it to a Bactrian kernel.
    Uniform,
    Bactrian(Bactrian),
    Mirror(Mirror),
}

impl Kernel {
    pub fn uniform() -> Self {
        Kernel::Uniform
    }

    pub fn bactrian(m: f64) -> Result<Self> {
        Ok(Kernel::Bactrian(Bactrian::new(m)?))
    }

    pub fn mirror(m: f64, initial: u64, burnin: u64) -> Result<Self> {
        Ok(Kernel::Mirror(Mirror::new(m, initial, burnin)?))
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self, Kernel::Uniform)
    }

    /// Replace a uniform kernel with the default Bactrian one. Returns
    /// whether a substitution happened.
    pub fn upgrade(&mut self) -> bool {
        if self.is_uniform() {
            *self = Kernel::Bactrian(Bactrian::default());
            true
        } else {
            false
        }
    }

    /// Delta for a random walk on `value`, scaled by `window`.
    pub fn random_delta(&mut self, value: f64, window: f64, rng: &mut dyn RngCore) -> f64 {
        match self {
            Kernel::Uniform => window * (2.0 * rng.gen::<f64>() - 1.0),
            Kernel::Bactrian(k) => k.random_delta(window, rng),
            Kernel::Mirror(k) => k.random_delta(value, window, rng),
        }
    }

    /// Multiplicative scale factor for `value`, spread controlled by `factor`.
    pub fn scaler(&mut self, value: f64, factor: f64, rng: &mut dyn RngCore) -> f64 {
        match self {
            Kernel::Uniform => (factor * (2.0 * rng.gen::<f64>() - 1.0)).exp(),
            Kernel::Bactrian(k) => k.scaler(factor, rng),
            Kernel::Mirror(k) => k.scaler(value, factor, rng),
        }
    }

    /// Log-HR correction accrued by the most recent draw. Zero for the
    /// uniform and Bactrian kernels; callers sum one contribution per
    /// perturbed dimension.
    pub fn log_hr_contribution_per_dimension(&self) -> f64 {
        match self {
            Kernel::Uniform | Kernel::Bactrian(_) => 0.0,
            Kernel::Mirror(k) => k.log_hr_contribution(),
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::Bactrian(Bactrian::default())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn bactrian_rejects_m_outside_unit_interval() {
        assert!(Bactrian::new(0.0).is_err());
        assert!(Bactrian::new(1.0).is_err());
        assert!(Bactrian::new(-0.5).is_err());
        assert!(Bactrian::new(0.95).is_ok());
    }

    #[test]
    fn bactrian_draws_are_bimodal() {
        let kernel = Bactrian::new(0.95).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let draws: Vec<f64> = (0..100_000)
            .map(|_| kernel.random_delta(1.0, &mut rng))
            .collect();

        let near_zero = draws.iter().filter(|d| d.abs() < 0.1).count();
        assert!(
            (near_zero as f64) < 0.01 * draws.len() as f64,
            "too much mass near zero: {near_zero}"
        );

        let positive: Vec<f64> = draws.iter().copied().filter(|d| *d > 0.0).collect();
        let negative: Vec<f64> = draws.iter().copied().filter(|d| *d < 0.0).collect();
        let pos_mode = positive.iter().sum::<f64>() / positive.len() as f64;
        let neg_mode = negative.iter().sum::<f64>() / negative.len() as f64;
        assert_relative_eq!(pos_mode, 0.95, epsilon = 0.02);
        assert_relative_eq!(neg_mode, -0.95, epsilon = 0.02);
    }

    #[test]
    fn bactrian_scaler_is_positive() {
        let kernel = Bactrian::new(0.95).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert!(kernel.scaler(0.5, &mut rng) > 0.0);
        }
    }

    #[test]
    fn mirror_behaves_as_bactrian_before_warmup() {
        let mut kernel = Mirror::new(0.95, 10, 10).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..19 {
            kernel.random_delta(5.0, 1.0, &mut rng);
            assert_eq!(kernel.log_hr_contribution(), 0.0);
        }
    }

    #[test]
    fn mirror_reflects_across_the_learned_mean() {
        let mut kernel = Mirror::new(0.95, 0, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        kernel.random_delta(4.0, 1.0, &mut rng);
        kernel.random_delta(6.0, 1.0, &mut rng);

        // The current value joins the statistics first, so the running
        // mean over {4, 6, 8} is 6 and the reflection of 8 sits at 4.
        // A tiny window makes the proposal almost exact.
        let value = 8.0;
        let delta = kernel.random_delta(value, 1e-6, &mut rng);
        let proposed = value + delta;
        assert_relative_eq!(proposed, 4.0, epsilon = 1e-3);
        assert!(kernel.log_hr_contribution().is_finite());
    }

    #[test]
    fn uniform_kernel_upgrades_to_bactrian() {
        let mut kernel = Kernel::uniform();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1000 {
            let d = kernel.random_delta(3.0, 0.5, &mut rng);
            assert!(d.abs() <= 0.5);
            assert_eq!(kernel.log_hr_contribution_per_dimension(), 0.0);
        }

        assert!(kernel.upgrade());
        assert!(matches!(kernel, Kernel::Bactrian(_)));
        // a second upgrade is a no-op
        assert!(!kernel.upgrade());
    }

    #[test]
    fn mirror_hr_matches_gaussian_density_ratio() {
        let mut kernel = Mirror::new(0.95, 0, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        kernel.random_delta(4.0, 1.0, &mut rng);
        kernel.random_delta(6.0, 1.0, &mut rng);

        let value = 7.0;
        let window = 0.5;
        let delta = kernel.random_delta(value, window, &mut rng);
        let proposed = value + delta;

        // mean 5, sd 1 after the two seeds plus the third pushed value.
        let mut stats = Welford::new();
        for x in [4.0, 6.0, 7.0] {
            stats.push(x);
        }
        let expected = log_normal_density(value, stats.mean(), window * stats.std_dev())
            - log_normal_density(proposed, stats.mean(), window * stats.std_dev());
        assert_relative_eq!(kernel.log_hr_contribution(), expected, epsilon = 1e-12);
    }
}
