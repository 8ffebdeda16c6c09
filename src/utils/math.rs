//! Log-space probability helpers and the small test statistics used by the caller.

use itertools::Itertools;
use statrs::function::factorial::ln_factorial;
use std::f64::consts::LN_10;

/// Error probability encoded by a Phred quality.
#[inline]
pub fn phred_to_err(qual: u8) -> f64 {
    10f64.powf(-(qual as f64) / 10.0)
}

/// Converts a natural-log probability to a Phred-scaled value.
#[inline]
pub fn ln_to_phred(ln_prob: f64) -> f64 {
    -10.0 * ln_prob / LN_10
}

/// `ln(exp(a) + exp(b))` without leaving log space.
#[inline]
pub fn ln_add(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == f64::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}

pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn ln_choose(n: u64, k: u64) -> f64 {
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

/// Two-sided Fisher exact test p-value for the 2x2 table `[[a, b], [c, d]]`.
pub fn fisher_exact(table: [[u32; 2]; 2]) -> f64 {
    let [[a, b], [c, d]] = table.map(|row| row.map(u64::from));
    let row1 = a + b;
    let row2 = c + d;
    let col1 = a + c;
    let n = row1 + row2;
    if n == 0 {
        return 1.0;
    }

    let ln_denom = ln_choose(n, col1);
    let ln_hyper = |x: u64| ln_choose(row1, x) + ln_choose(row2, col1 - x) - ln_denom;

    let observed = ln_hyper(a);
    // Relative slack so that tables as extreme as the observed one are not lost to rounding
    let cutoff = observed + 1e-7;
    let lo = col1.saturating_sub(row2);
    let hi = row1.min(col1);
    let p = (lo..=hi)
        .map(ln_hyper)
        .filter(|&ln_p| ln_p <= cutoff)
        .fold(f64::NEG_INFINITY, ln_add)
        .exp();
    p.min(1.0)
}

/// Mann-Whitney U statistic of `x` against `y`, expressed as a normal z-score.
///
/// Positive values mean `x` tends to rank above `y`. Returns `None` when either
/// sample is empty.
pub fn rank_sum_z(x: &[u8], y: &[u8]) -> Option<f64> {
    if x.is_empty() || y.is_empty() {
        return None;
    }
    let n1 = x.len() as f64;
    let n2 = y.len() as f64;
    let n = n1 + n2;

    let pooled = x
        .iter()
        .map(|&v| (v, true))
        .chain(y.iter().map(|&v| (v, false)))
        .sorted_by_key(|&(v, _)| v)
        .collect_vec();

    let mut rank_sum_x = 0.0;
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < pooled.len() {
        let mut j = i;
        while j < pooled.len() && pooled[j].0 == pooled[i].0 {
            j += 1;
        }
        let ties = (j - i) as f64;
        let avg_rank = (i + j + 1) as f64 / 2.0;
        rank_sum_x += avg_rank * pooled[i..j].iter().filter(|(_, is_x)| *is_x).count() as f64;
        tie_term += ties * ties * ties - ties;
        i = j;
    }

    let u = rank_sum_x - n1 * (n1 + 1.0) / 2.0;
    let mean = n1 * n2 / 2.0;
    let var = n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if var <= 0.0 {
        return Some(0.0);
    }
    Some((u - mean) / var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn phred_conversions() {
        assert_abs_diff_eq!(phred_to_err(20), 0.01, epsilon = 1e-12);
        assert_abs_diff_eq!(ln_to_phred(0.001f64.ln()), 30.0, epsilon = 1e-9);
    }

    #[test]
    fn log_sum_exp_matches_direct_sum() {
        let probs = [0.2f64, 0.3, 0.5];
        let logs = probs.iter().map(|p| p.ln()).collect_vec();
        assert_abs_diff_eq!(log_sum_exp(&logs), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ln_add(0.2f64.ln(), 0.3f64.ln()), 0.5f64.ln(), epsilon = 1e-12);
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn log_sum_exp_survives_deep_underflow() {
        let logs = [-2000.0, -2000.0];
        assert_abs_diff_eq!(log_sum_exp(&logs), -2000.0 + 2f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn fisher_balanced_table_is_not_significant() {
        assert_abs_diff_eq!(fisher_exact([[9, 9], [1, 1]]), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn fisher_matches_known_value() {
        // Classic tea-tasting table: two-sided p = 0.4857
        assert_abs_diff_eq!(fisher_exact([[3, 1], [1, 3]]), 0.485714, epsilon = 1e-5);
        assert!(fisher_exact([[20, 0], [0, 20]]) < 1e-9);
    }

    #[test]
    fn rank_sum_sign_follows_shift() {
        let high = [30, 32, 35, 38];
        let low = [10, 12, 15, 18];
        assert!(rank_sum_z(&high, &low).unwrap() > 0.0);
        assert!(rank_sum_z(&low, &high).unwrap() < 0.0);
        assert_eq!(rank_sum_z(&[], &low), None);
        assert_abs_diff_eq!(rank_sum_z(&[30, 30], &[30, 30]).unwrap(), 0.0);
    }
}
