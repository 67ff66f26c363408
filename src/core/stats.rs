//! Pure statistics helpers used by the summary builder and live view.
//!
//! Every function takes a borrowed slice, never mutates it, and rejects an
//! empty slice with [`SessionError::InvalidInput`]. Minimum-length rules for
//! a whole session are checked by the callers.

use crate::error::SessionError;
use statrs::statistics::Statistics;

fn ensure_non_empty(xs: &[f64], what: &str) -> Result<(), SessionError> {
    if xs.is_empty() {
        return Err(SessionError::invalid_input(format!(
            "{what} of an empty sequence"
        )));
    }
    Ok(())
}

/// Arithmetic mean.
pub fn mean(xs: &[f64]) -> Result<f64, SessionError> {
    ensure_non_empty(xs, "mean")?;
    Ok(xs.iter().mean())
}

/// Population standard deviation (divides by `n`, not `n - 1`).
pub fn population_std(xs: &[f64]) -> Result<f64, SessionError> {
    ensure_non_empty(xs, "standard deviation")?;
    Ok(xs.iter().population_std_dev())
}

/// Linear-interpolation percentile over a sorted copy of `xs`.
///
/// `p` is in `[0, 100]`; the fractional rank is `p / 100 * (n - 1)`, so
/// `p = 0` yields the minimum and `p = 100` the maximum.
pub fn percentile(xs: &[f64], p: f64) -> Result<f64, SessionError> {
    ensure_non_empty(xs, "percentile")?;
    if !(0.0..=100.0).contains(&p) {
        return Err(SessionError::invalid_input(format!(
            "percentile rank {p} outside [0, 100]"
        )));
    }

    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        Ok(sorted[lo])
    } else {
        Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
    }
}

/// Ordinary least squares slope of `ys` against `xs`.
///
/// Returns 0 when every `x` is equal (degenerate design).
pub fn regression_slope(xs: &[f64], ys: &[f64]) -> Result<f64, SessionError> {
    ensure_non_empty(ys, "regression")?;
    if xs.len() != ys.len() {
        return Err(SessionError::invalid_input(format!(
            "regression over {} x values and {} y values",
            xs.len(),
            ys.len()
        )));
    }

    let x_mean = mean(xs)?;
    let y_mean = mean(ys)?;

    let (num, den) = xs
        .iter()
        .zip(ys)
        .fold((0.0, 0.0), |(num, den), (&x, &y)| {
            let dx = x - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });

    if den == 0.0 {
        Ok(0.0)
    } else {
        Ok(num / den)
    }
}

/// OLS slope of `ys` against the index positions `0..n`.
pub fn linear_regression_slope(ys: &[f64]) -> Result<f64, SessionError> {
    ensure_non_empty(ys, "regression")?;
    if ys.len() <= 1 {
        return Ok(0.0);
    }
    let xs: Vec<f64> = (0..ys.len()).map(|i| i as f64).collect();
    regression_slope(&xs, ys)
}

/// Fraction of elements with `lo <= x < hi_exclusive`.
pub fn fraction_in_range(xs: &[f64], lo: f64, hi_exclusive: f64) -> Result<f64, SessionError> {
    ensure_non_empty(xs, "fraction")?;
    let count = xs.iter().filter(|&&x| x >= lo && x < hi_exclusive).count();
    Ok(count as f64 / xs.len() as f64)
}

/// Mean squared successive difference, `sum((x[i] - x[i-1])^2) / (n - 1)`.
pub fn mean_squared_successive_difference(xs: &[f64]) -> Result<f64, SessionError> {
    ensure_non_empty(xs, "successive difference")?;
    if xs.len() < 2 {
        return Ok(0.0);
    }
    let sum: f64 = xs.windows(2).map(|pair| (pair[1] - pair[0]).powi(2)).sum();
    Ok(sum / (xs.len() - 1) as f64)
}

/// Shannon entropy of a proportion vector, normalized by `log2(k)` to `[0, 1]`.
///
/// Zero proportions contribute nothing.
pub fn normalized_entropy(proportions: &[f64]) -> Result<f64, SessionError> {
    ensure_non_empty(proportions, "entropy")?;
    if proportions.len() < 2 {
        return Ok(0.0);
    }
    let h: f64 = proportions
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.log2())
        .sum();
    Ok(h / (proportions.len() as f64).log2())
}
