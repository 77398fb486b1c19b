//! Small numeric routines shared by the model implementations
//!
//! The models are deliberately simple parametric fits; anything heavier
//! is a drop-in replacement behind the same `ModelHandle` contract.

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; 0.0 for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Percentile via linear interpolation over a sorted copy.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] + (sorted[hi] - sorted[lo]) * frac
    }
}

/// Per-column means and standard deviations for feature scaling.
/// Columns with zero spread get a std of 1.0 so scaling is a no-op.
pub fn fit_scaler(rows: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    if rows.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let dims = rows[0].len();
    let mut means = vec![0.0; dims];
    let mut stds = vec![0.0; dims];
    for row in rows {
        for (i, v) in row.iter().enumerate() {
            means[i] += v;
        }
    }
    for m in means.iter_mut() {
        *m /= rows.len() as f64;
    }
    for row in rows {
        for (i, v) in row.iter().enumerate() {
            stds[i] += (v - means[i]) * (v - means[i]);
        }
    }
    for s in stds.iter_mut() {
        *s = (*s / rows.len() as f64).sqrt();
        if *s < 1e-12 {
            *s = 1.0;
        }
    }
    (means, stds)
}

/// Apply a fitted scaler to one row.
pub fn scale_row(row: &[f64], means: &[f64], stds: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(means.iter().zip(stds.iter()))
        .map(|(v, (m, s))| (v - m) / s)
        .collect()
}

/// Solve `A x = b` by Gaussian elimination with partial pivoting.
/// Returns `None` for a singular system.
pub fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for k in (col + 1)..n {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Some(x)
}

/// Ridge regression over scaled feature rows (no implicit bias; prepend
/// a constant column if one is wanted). Returns the weight vector.
pub fn ridge_regression(rows: &[Vec<f64>], targets: &[f64], lambda: f64) -> Option<Vec<f64>> {
    if rows.is_empty() || rows.len() != targets.len() {
        return None;
    }
    let dims = rows[0].len();
    // Normal equations: (X^T X + lambda I) w = X^T y
    let mut xtx = vec![vec![0.0; dims]; dims];
    let mut xty = vec![0.0; dims];
    for (row, y) in rows.iter().zip(targets.iter()) {
        for i in 0..dims {
            xty[i] += row[i] * y;
            for j in 0..dims {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for (i, diag) in xtx.iter_mut().enumerate() {
        diag[i] += lambda;
    }
    solve_linear(xtx, xty)
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Logistic regression fit via batch gradient descent over scaled rows.
/// Targets must be in {0.0, 1.0}.
pub fn fit_logistic(rows: &[Vec<f64>], targets: &[f64], epochs: usize, lr: f64) -> Vec<f64> {
    if rows.is_empty() {
        return Vec::new();
    }
    let dims = rows[0].len();
    let mut weights = vec![0.0; dims];
    let n = rows.len() as f64;
    for _ in 0..epochs {
        let mut grad = vec![0.0; dims];
        for (row, y) in rows.iter().zip(targets.iter()) {
            let pred = sigmoid(dot(&weights, row));
            let err = pred - y;
            for (g, v) in grad.iter_mut().zip(row.iter()) {
                *g += err * v;
            }
        }
        for (w, g) in weights.iter_mut().zip(grad.iter()) {
            *w -= lr * g / n;
        }
    }
    weights
}

pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Mean absolute error of predictions against targets.
pub fn mae(predictions: &[f64], targets: &[f64]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / predictions.len() as f64
}

/// Mean squared error of predictions against targets.
pub fn mse(predictions: &[f64], targets: &[f64]) -> f64 {
    if predictions.is_empty() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t) * (p - t))
        .sum::<f64>()
        / predictions.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((mean(&values) - 5.0).abs() < 1e-12);
        assert!((std_dev(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&values, 0.0) - 1.0).abs() < 1e-12);
        assert!((percentile(&values, 100.0) - 4.0).abs() < 1e-12);
        assert!((percentile(&values, 50.0) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_solve_linear_simple() {
        // 2x + y = 5, x - y = 1  =>  x = 2, y = 1
        let a = vec![vec![2.0, 1.0], vec![1.0, -1.0]];
        let b = vec![5.0, 1.0];
        let x = solve_linear(a, b).unwrap();
        assert!((x[0] - 2.0).abs() < 1e-9);
        assert!((x[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_solve_linear_singular() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        let b = vec![1.0, 2.0];
        assert!(solve_linear(a, b).is_none());
    }

    #[test]
    fn test_ridge_recovers_linear_relation() {
        // y = 1 + 3*a - 2*b over independent columns
        let rows: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![1.0, i as f64 / 10.0, ((i * 7) % 13) as f64 / 3.0])
            .collect();
        let targets: Vec<f64> = rows.iter().map(|r| 1.0 + 3.0 * r[1] - 2.0 * r[2]).collect();
        let w = ridge_regression(&rows, &targets, 1e-9).unwrap();
        assert!((w[0] - 1.0).abs() < 0.01);
        assert!((w[1] - 3.0).abs() < 0.01);
        assert!((w[2] + 2.0).abs() < 0.01);
    }

    #[test]
    fn test_logistic_separates() {
        // Positive class when x > 0.
        let rows: Vec<Vec<f64>> = (-20..=20).map(|i| vec![1.0, i as f64 / 5.0]).collect();
        let targets: Vec<f64> = rows.iter().map(|r| if r[1] > 0.0 { 1.0 } else { 0.0 }).collect();
        let w = fit_logistic(&rows, &targets, 2000, 0.5);
        assert!(sigmoid(dot(&w, &[1.0, 2.0])) > 0.8);
        assert!(sigmoid(dot(&w, &[1.0, -2.0])) < 0.2);
    }

    #[test]
    fn test_scaler_round_trip() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 30.0], vec![5.0, 50.0]];
        let (means, stds) = fit_scaler(&rows);
        let scaled = scale_row(&rows[1], &means, &stds);
        assert!(scaled[0].abs() < 1e-12);
        assert!(scaled[1].abs() < 1e-12);
    }
}
