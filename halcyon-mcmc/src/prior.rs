//! Prior distributions for the sample-from-prior move.
//!
//! Provides the [`Prior`] trait (log density plus inverse CDF) and the
//! [`Uniform`], [`Exponential`], [`Normal`], and [`Gamma`] priors. The
//! normal and gamma quantiles are found by bisection on erf- and
//! incomplete-gamma-based CDFs; non-convergence is an error the caller
//! recovers from locally.

use core::f64::consts::PI;

use halcyon_core::{HalcyonError, Result};

// ── Numerical helpers ──────────────────────────────────────────────────────

/// Error function via Abramowitz & Stegun 7.1.26 (max error ~1.5e-7).
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Natural log of the gamma function via the Lanczos approximation (g=7).
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 8] = [
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];

    if x < 0.5 {
        let log_pi_over_sin = (PI / (PI * x).sin()).ln();
        log_pi_over_sin - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut ag = 0.99999999999980993_f64;
        for (i, &c) in COEFFS.iter().enumerate() {
            ag += c / (x + i as f64 + 1.0);
        }
        let t = x + 7.5; // g + 0.5
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + ag.ln()
    }
}

/// Regularized lower incomplete gamma function P(a, x) = γ(a, x) / Γ(a).
///
/// Series expansion for x < a + 1, otherwise the continued fraction for
/// the upper tail via modified Lentz.
pub fn gammainc(a: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 200;
    const EPS: f64 = 1e-12;

    if x <= 0.0 {
        return 0.0;
    }
    let ln_prefix = a * x.ln() - x - ln_gamma(a);

    if x < a + 1.0 {
        let mut sum = 1.0 / a;
        let mut term = 1.0 / a;
        for n in 1..=MAX_ITER {
            term *= x / (a + n as f64);
            sum += term;
            if term.abs() < sum.abs() * EPS {
                break;
            }
        }
        sum * ln_prefix.exp()
    } else {
        const TINY: f64 = 1e-30;
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / TINY;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..=MAX_ITER {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < TINY {
                d = TINY;
            }
            c = b + an / c;
            if c.abs() < TINY {
                c = TINY;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < EPS {
                break;
            }
        }
        1.0 - h * ln_prefix.exp()
    }
}

// ── Prior trait ────────────────────────────────────────────────────────────

/// A prior distribution an operator can draw from by inverse-CDF
/// sampling.
pub trait Prior {
    /// Natural log of the density at `x`; negative infinity outside the
    /// support.
    fn log_density(&self, x: f64) -> f64;

    /// Quantile function: the `x` with `CDF(x) = p`, `p` in `(0, 1)`.
    fn inverse_cdf(&self, p: f64) -> Result<f64>;
}

// ── Uniform ────────────────────────────────────────────────────────────────

/// Uniform density on `[lower, upper]`.
#[derive(Debug, Clone, Copy)]
pub struct Uniform {
    lower: f64,
    upper: f64,
}

impl Uniform {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !(lower < upper) || !lower.is_finite() || !upper.is_finite() {
            return Err(HalcyonError::InvalidInput(format!(
                "uniform prior needs finite lower < upper, got [{lower}, {upper}]"
            )));
        }
        Ok(Self { lower, upper })
    }
}

impl Prior for Uniform {
    fn log_density(&self, x: f64) -> f64 {
        if x < self.lower || x > self.upper {
            f64::NEG_INFINITY
        } else {
            -(self.upper - self.lower).ln()
        }
    }

    fn inverse_cdf(&self, p: f64) -> Result<f64> {
        check_probability(p)?;
        Ok(self.lower + p * (self.upper - self.lower))
    }
}

// ── Exponential ────────────────────────────────────────────────────────────

/// Exponential distribution with the given mean.
#[derive(Debug, Clone, Copy)]
pub struct Exponential {
    mean: f64,
}

impl Exponential {
    pub fn new(mean: f64) -> Result<Self> {
        if !(mean > 0.0) {
            return Err(HalcyonError::InvalidInput(format!(
                "exponential prior needs a positive mean, got {mean}"
            )));
        }
        Ok(Self { mean })
    }
}

impl Prior for Exponential {
    fn log_density(&self, x: f64) -> f64 {
        if x < 0.0 {
            f64::NEG_INFINITY
        } else {
            -self.mean.ln() - x / self.mean
        }
    }

    fn inverse_cdf(&self, p: f64) -> Result<f64> {
        check_probability(p)?;
        Ok(-self.mean * (1.0 - p).ln())
    }
}

// ── Normal ─────────────────────────────────────────────────────────────────

/// Normal distribution with parameters μ and σ.
#[derive(Debug, Clone, Copy)]
pub struct Normal {
    mu: f64,
    sigma: f64,
}

impl Normal {
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        if !(sigma > 0.0) {
            return Err(HalcyonError::InvalidInput(format!(
                "normal prior needs a positive sigma, got {sigma}"
            )));
        }
        Ok(Self { mu, sigma })
    }

    fn cdf(&self, x: f64) -> f64 {
        0.5 * (1.0 + erf((x - self.mu) / (self.sigma * core::f64::consts::SQRT_2)))
    }
}

impl Prior for Normal {
    fn log_density(&self, x: f64) -> f64 {
        let z = (x - self.mu) / self.sigma;
        -0.5 * (2.0 * PI).ln() - self.sigma.ln() - 0.5 * z * z
    }

    /// Bisection on the CDF, 8σ bracket, 200 iterations.
    fn inverse_cdf(&self, p: f64) -> Result<f64> {
        check_probability(p)?;
        let mut lo = self.mu - 8.0 * self.sigma;
        let mut hi = self.mu + 8.0 * self.sigma;
        let tol = 1e-12 * self.sigma;
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if self.cdf(mid) < p {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo < tol {
                return Ok(0.5 * (lo + hi));
            }
        }
        Err(HalcyonError::Other(format!(
            "normal quantile did not converge for p={p}"
        )))
    }
}

// ── Gamma ──────────────────────────────────────────────────────────────────

/// Gamma distribution with shape α and scale θ (mean α·θ).
#[derive(Debug, Clone, Copy)]
pub struct Gamma {
    shape: f64,
    scale: f64,
}

impl Gamma {
    pub fn new(shape: f64, scale: f64) -> Result<Self> {
        if !(shape > 0.0) || !(scale > 0.0) {
            return Err(HalcyonError::InvalidInput(format!(
                "gamma prior needs positive shape and scale, got ({shape}, {scale})"
            )));
        }
        Ok(Self { shape, scale })
    }

    fn cdf(&self, x: f64) -> f64 {
        gammainc(self.shape, x / self.scale)
    }
}

impl Prior for Gamma {
    fn log_density(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        (self.shape - 1.0) * x.ln() - x / self.scale - self.shape * self.scale.ln()
            - ln_gamma(self.shape)
    }

    /// Bisection on the incomplete-gamma CDF; the upper bracket doubles
    /// from mean + 8·sd until it covers `p`.
    fn inverse_cdf(&self, p: f64) -> Result<f64> {
        check_probability(p)?;
        let mean = self.shape * self.scale;
        let sd = self.shape.sqrt() * self.scale;
        let mut hi = mean + 8.0 * sd;
        let mut expansions = 0;
        while self.cdf(hi) < p {
            hi *= 2.0;
            expansions += 1;
            if expansions > 100 {
                return Err(HalcyonError::Other(format!(
                    "gamma quantile bracket did not cover p={p}"
                )));
            }
        }
        let mut lo = 0.0;
        let tol = 1e-12 * sd;
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if self.cdf(mid) < p {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo < tol {
                return Ok(0.5 * (lo + hi));
            }
        }
        Err(HalcyonError::Other(format!(
            "gamma quantile did not converge for p={p}"
        )))
    }
}

fn check_probability(p: f64) -> Result<()> {
    if !(p > 0.0 && p < 1.0) {
        return Err(HalcyonError::InvalidInput(format!(
            "quantile probability must be in (0, 1), got {p}"
        )));
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn erf_known_values() {
        assert_relative_eq!(erf(0.0), 0.0, epsilon = 1e-7);
        assert_relative_eq!(erf(1.0), 0.8427008, epsilon = 1e-6);
        assert_relative_eq!(erf(-1.0), -0.8427008, epsilon = 1e-6);
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        for n in 1..8u64 {
            let fact: u64 = (1..n).product();
            assert_relative_eq!(ln_gamma(n as f64), (fact as f64).ln(), epsilon = 1e-9);
        }
    }

    #[test]
    fn uniform_quantile_is_linear() {
        let u = Uniform::new(-2.0, 6.0).unwrap();
        assert_relative_eq!(u.inverse_cdf(0.5).unwrap(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(u.log_density(0.0), -(8.0_f64.ln()), epsilon = 1e-12);
        assert_eq!(u.log_density(7.0), f64::NEG_INFINITY);
        assert!(u.inverse_cdf(0.0).is_err());
    }

    #[test]
    fn exponential_quantile_inverts_the_cdf() {
        let e = Exponential::new(2.0).unwrap();
        let x = e.inverse_cdf(0.75).unwrap();
        // CDF(x) = 1 - exp(-x/mean)
        assert_relative_eq!(1.0 - (-x / 2.0_f64).exp(), 0.75, epsilon = 1e-12);
        assert_eq!(e.log_density(-1.0), f64::NEG_INFINITY);
    }

    #[test]
    fn normal_quantile_by_bisection() {
        let n = Normal::new(1.0, 2.0).unwrap();
        assert_relative_eq!(n.inverse_cdf(0.5).unwrap(), 1.0, epsilon = 1e-5);
        // 0.975 quantile of N(0,1) is 1.95996
        let n01 = Normal::new(0.0, 1.0).unwrap();
        assert_relative_eq!(n01.inverse_cdf(0.975).unwrap(), 1.95996, epsilon = 1e-3);
    }

    #[test]
    fn gammainc_matches_the_exponential_cdf() {
        // P(1, x) = 1 - exp(-x)
        for x in [0.1, 0.5, 1.0, 3.0, 10.0] {
            assert_relative_eq!(gammainc(1.0, x), 1.0 - (-x).exp(), epsilon = 1e-10);
        }
        assert_eq!(gammainc(2.5, 0.0), 0.0);
    }

    #[test]
    fn gamma_quantile_inverts_the_cdf() {
        let g = Gamma::new(2.0, 3.0).unwrap();
        for p in [0.1, 0.5, 0.9] {
            let x = g.inverse_cdf(p).unwrap();
            assert_relative_eq!(gammainc(2.0, x / 3.0), p, epsilon = 1e-8);
        }
        // shape 1 collapses to an exponential with mean = scale
        let g1 = Gamma::new(1.0, 2.0).unwrap();
        let e = Exponential::new(2.0).unwrap();
        assert_relative_eq!(
            g1.inverse_cdf(0.75).unwrap(),
            e.inverse_cdf(0.75).unwrap(),
            epsilon = 1e-6
        );
        assert_relative_eq!(g1.log_density(1.5), e.log_density(1.5), epsilon = 1e-12);
    }

    #[test]
    fn invalid_parameters_fail_at_setup() {
        assert!(Uniform::new(3.0, 1.0).is_err());
        assert!(Exponential::new(0.0).is_err());
        assert!(Normal::new(0.0, -1.0).is_err());
        assert!(Gamma::new(0.0, 1.0).is_err());
        assert!(Gamma::new(2.0, -1.0).is_err());
    }
}
