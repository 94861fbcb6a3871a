//! Log-space probability arithmetic.
//!
//! Every probability the caller manipulates is a natural logarithm, with
//! [`LN_ZERO`] (negative infinity) as the distinguished encoding of zero.
//! Sums of probabilities go through the log-sum-exp trick with max
//! subtraction so that they neither underflow nor overflow, and conversion
//! back to linear space always happens relative to a normalizer via
//! [`safe_exp`] of a difference.
//!
//! The module also carries the handful of log-combinatorics helpers
//! (factorials, multinomial coefficients, binomial mass) the prior model is
//! built from.

use std::f64::consts::LN_10;

use statrs::function::gamma::ln_gamma;

/// Natural log of 4/3, used when combining two error processes
const LN_FOUR_THIRDS: f64 = 0.287_682_072_451_780_9;

/// Log probability type (natural log)
pub type LogProb = f64;

/// The log-space encoding of probability zero.
pub const LN_ZERO: LogProb = f64::NEG_INFINITY;

/// Returns true if `x` is the log-space zero sentinel.
#[inline]
#[must_use]
pub fn is_ln_zero(x: LogProb) -> bool {
    x == f64::NEG_INFINITY
}

/// Converts a Phred-scaled quality to a natural-log error probability.
///
/// Phred score Q relates to error probability P by `Q = -10 * log10(P)`,
/// so `ln(P) = -Q * ln(10) / 10`.
#[inline]
#[must_use]
pub fn phred_to_ln_prob(phred: f64) -> LogProb {
    -phred * LN_10 / 10.0
}

/// Converts a natural-log probability to the Phred scale.
#[inline]
#[must_use]
pub fn ln_prob_to_phred(ln_prob: LogProb) -> f64 {
    -10.0 * ln_prob / LN_10
}

/// Converts a linear-space probability to the Phred scale.
///
/// Probabilities at or below zero map to the largest representable Phred
/// value so that comparisons against thresholds stay well defined.
#[inline]
#[must_use]
pub fn prob_to_phred(prob: f64) -> f64 {
    if prob <= 0.0 { f64::MAX } else { -10.0 * prob.log10() }
}

/// Exponentiates a log probability, mapping the zero sentinel to 0.0.
///
/// Only use this on *normalized* quantities (`x - ln_z`); exponentiating a
/// raw joint log-score is exactly the underflow this module exists to avoid.
#[inline]
#[must_use]
pub fn safe_exp(x: LogProb) -> f64 {
    if is_ln_zero(x) { 0.0 } else { x.exp() }
}

/// Computes `ln(exp(a) + exp(b))`.
#[must_use]
pub fn ln_sum_exp_pair(ln_a: LogProb, ln_b: LogProb) -> LogProb {
    if is_ln_zero(ln_a) {
        return ln_b;
    }
    if is_ln_zero(ln_b) {
        return ln_a;
    }
    let (lo, hi) = if ln_a < ln_b { (ln_a, ln_b) } else { (ln_b, ln_a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Computes `ln(sum(exp(values)))` with the max-shift trick.
///
/// The maximum is subtracted from every term before exponentiation, so the
/// largest term contributes `exp(0) = 1` and nothing can overflow; values
/// equal to [`LN_ZERO`] contribute nothing. An empty slice, or a slice of
/// only sentinels, yields [`LN_ZERO`].
#[must_use]
pub fn ln_sum_exp(values: &[LogProb]) -> LogProb {
    let max = values.iter().copied().fold(LN_ZERO, f64::max);
    if is_ln_zero(max) {
        return LN_ZERO;
    }
    let sum: f64 = values.iter().map(|&v| if is_ln_zero(v) { 0.0 } else { (v - max).exp() }).sum();
    max + sum.ln()
}

/// Combines two error probabilities (in log space) across two trials.
///
/// For DNA with four bases, `f(X, Y) = X + Y - 4/3 * X * Y`: either process
/// may corrupt the base, and the 4/3 factor accounts for the 1/3 chance that
/// two errors land on the same wrong base. Used to fold mapping error into
/// base-call error.
///
/// When one probability dominates the other by ~400x (6 units in log space)
/// the smaller is negligible and the larger is returned directly.
#[must_use]
pub fn ln_error_prob_two_trials(ln_p1: LogProb, ln_p2: LogProb) -> LogProb {
    let (ln_p1, ln_p2) = if ln_p1 < ln_p2 { (ln_p2, ln_p1) } else { (ln_p1, ln_p2) };
    if is_ln_zero(ln_p2) || ln_p1 - ln_p2 >= 6.0 {
        return ln_p1;
    }
    // ln(X + Y) and ln(4/3 * X * Y); the difference stays positive because
    // X + Y > 4/3 * X * Y for X, Y in (0, 1].
    let ln_sum = ln_sum_exp_pair(ln_p1, ln_p2);
    let ln_cross = LN_FOUR_THIRDS + ln_p1 + ln_p2;
    ln_sum + (-((ln_cross - ln_sum).exp())).ln_1p()
}

/// `ln(n!)` via the log-gamma function.
#[inline]
#[must_use]
pub fn ln_factorial(n: u64) -> f64 {
    ln_gamma(n as f64 + 1.0)
}

/// Log multinomial coefficient `ln(n! / (k_1! * k_2! * ...))`.
///
/// The counts must sum to `n`.
#[must_use]
pub fn ln_multinomial_coeff(n: u64, counts: &[u64]) -> f64 {
    debug_assert_eq!(counts.iter().sum::<u64>(), n);
    ln_factorial(n) - counts.iter().map(|&k| ln_factorial(k)).sum::<f64>()
}

/// Log binomial coefficient `ln(C(n, k))`.
#[inline]
#[must_use]
pub fn ln_choose(n: u64, k: u64) -> f64 {
    debug_assert!(k <= n);
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

/// Log probability mass of `Binomial(n, p)` at `k`.
///
/// `p` outside (0, 1) collapses to a point mass: the result is zero
/// probability unless the outcome is forced (`k == 0` or `k == n`).
#[must_use]
pub fn ln_binomial_pmf(k: u64, n: u64, p: f64) -> LogProb {
    debug_assert!(k <= n);
    if p <= 0.0 {
        return if k == 0 { 0.0 } else { LN_ZERO };
    }
    if p >= 1.0 {
        return if k == n { 0.0 } else { LN_ZERO };
    }
    ln_choose(n, k) + k as f64 * p.ln() + (n - k) as f64 * (1.0 - p).ln()
}

/// Log rising factorial `ln(theta * (theta+1) * ... * (theta+n-1))`.
///
/// This is the normalizer of the Ewens sampling formula.
#[inline]
#[must_use]
pub fn ln_rising_factorial(theta: f64, n: u64) -> f64 {
    ln_gamma(theta + n as f64) - ln_gamma(theta)
}
