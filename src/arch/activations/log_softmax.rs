use ndarray::{Array2, ArrayView2, Axis, Zip};

/// Row-wise log-softmax, shifted by each row's maximum so large logits don't overflow.
///
/// # Arguments
/// * `z` - A `(batch_size, classes)` matrix of logits.
///
/// # Returns
/// The log-probabilities, every row exponentiates to a distribution.
pub fn log_softmax(z: ArrayView2<f32>) -> Array2<f32> {
    let mut out = z.to_owned();

    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &x| m.max(x));
        let log_sum = row.fold(0., |acc, &x| acc + (x - max).exp()).ln();
        row.mapv_inplace(|x| x - max - log_sum);
    }

    out
}

/// Backpropagates through [`log_softmax`].
///
/// With `s = exp(log_probs)` the gradient with respect to the logits is
/// `d - s * sum(d)` for every row.
///
/// # Arguments
/// * `log_probs` - The output of the forward pass.
/// * `d` - The gradient with respect to `log_probs`.
pub fn log_softmax_backward(log_probs: ArrayView2<f32>, d: ArrayView2<f32>) -> Array2<f32> {
    let row_sums = d.sum_axis(Axis(1));
    let mut dz = d.to_owned();

    Zip::from(dz.rows_mut())
        .and(log_probs.rows())
        .and(&row_sums)
        .for_each(|mut dz, lp, &sum| {
            dz.zip_mut_with(&lp, |dz, &lp| *dz -= lp.exp() * sum);
        });

    dz
}
