//! Column-wise Spearman rank correlation.
//!
//! Ties get the average of the ranks they span.

/// 1-based ranks with ties sharing their average rank
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // positions i..=j hold ranks i+1 ..= j+1
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Pearson correlation; NaN when either side has no variance
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len();
    if n < 2 || n != y.len() {
        return f64::NAN;
    }
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mean_x, b - mean_y);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return f64::NAN;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

pub fn spearman(x: &[f64], y: &[f64]) -> f64 {
    pearson(&average_ranks(x), &average_ranks(y))
}

/// Mean Spearman correlation over the columns of two row-major
/// `[rows, cols]` matrices. Undefined columns count as 0.
pub fn mean_column_spearman(truth: &[f32], preds: &[f32], cols: usize) -> f64 {
    if cols == 0 {
        return 0.0;
    }
    let rows = truth.len() / cols;
    let column = |m: &[f32], c: usize| -> Vec<f64> {
        (0..rows).map(|r| m[r * cols + c] as f64).collect()
    };

    let total: f64 = (0..cols)
        .map(|c| {
            let rho = spearman(&column(truth, c), &column(preds, c));
            if rho.is_nan() { 0.0 } else { rho }
        })
        .sum();
    total / cols as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_ranks_average_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 20.0, 5.0]), vec![2.0, 3.5, 3.5, 1.0]);
        assert_eq!(average_ranks(&[1.0, 1.0, 1.0]), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_monotonic_rescale_is_perfect() {
        let x = [0.1, 0.4, 0.2, 0.9];
        let y: Vec<f64> = x.iter().map(|v: &f64| v.exp() * 100.0).collect();
        assert_relative_eq!(spearman(&x, &y), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reversed_order_is_minus_one() {
        assert_relative_eq!(spearman(&[1.0, 2.0, 3.0], &[0.9, 0.5, 0.1]), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_truth_column_scores_zero() {
        // 3 rows × 2 cols; column 0 truth is constant
        let truth = [1.0, 0.0, 1.0, 0.5, 1.0, 1.0];
        let preds = [0.2, 0.1, 0.7, 0.4, 0.9, 0.8];
        let rho = mean_column_spearman(&truth, &preds, 2);
        assert!(!rho.is_nan());
        // column 0 → 0, column 1 → perfect
        assert_relative_eq!(rho, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_single_row_batch_is_zero() {
        assert_eq!(mean_column_spearman(&[0.3, 0.7], &[0.1, 0.2], 2), 0.0);
    }

    proptest! {
        // A column compared with itself is perfectly correlated
        // whenever it has any spread at all.
        #[test]
        fn prop_self_correlation_is_one(col in prop::collection::vec(0.0f32..1.0, 2..40)) {
            let has_spread = col.iter().any(|&v| v != col[0]);
            let rho = mean_column_spearman(&col, &col, 1);
            if has_spread {
                prop_assert!((rho - 1.0).abs() < 1e-9);
            } else {
                prop_assert_eq!(rho, 0.0);
            }
        }

        #[test]
        fn prop_mean_stays_in_range(
            truth in prop::collection::vec(0.0f32..1.0, 30 * 4),
            preds in prop::collection::vec(0.0f32..1.0, 30 * 4),
        ) {
            let rho = mean_column_spearman(&truth, &preds, 30);
            prop_assert!(rho.is_finite());
            prop_assert!((-1.0..=1.0).contains(&rho));
        }
    }
}
