use std::cmp::Ordering;

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::{MlErr, Result};

/// The fraction of rows whose most likely class is the row's label.
///
/// `y_pred` can hold either probabilities or log-probabilities, `exp` doesn't change the argmax.
pub fn accuracy(y_pred: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<f32> {
    if y_pred.nrows() != labels.len() {
        return Err(MlErr::shape_mismatch(
            "labels",
            [labels.len()],
            [y_pred.nrows()],
        ));
    }

    if labels.is_empty() {
        return Err(MlErr::EmptyBatches { what: "accuracy" });
    }

    let hits = y_pred
        .rows()
        .into_iter()
        .zip(labels)
        .filter(|(row, label)| argmax(*row) == **label)
        .count();

    Ok(hits as f32 / labels.len() as f32)
}

/// The index of the largest value, the first one on ties.
pub fn argmax(row: ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v.total_cmp(&best.1) == Ordering::Greater {
                (i, v)
            } else {
                best
            }
        })
        .0
}

/// The `k` most likely classes of every row, most likely first.
///
/// # Returns
/// The `(rows, k)` values and the `(rows, k)` class indices, `k` being capped to the amount of
/// classes.
pub fn top_k(probs: ArrayView2<f32>, k: usize) -> (Array2<f32>, Array2<usize>) {
    let k = k.min(probs.ncols());
    let mut values = Array2::zeros((probs.nrows(), k));
    let mut indices = Array2::zeros((probs.nrows(), k));

    for (i, row) in probs.rows().into_iter().enumerate() {
        let mut order: Vec<usize> = (0..row.len()).collect();
        order.sort_by(|&a, &b| row[b].total_cmp(&row[a]));

        for (j, &class) in order.iter().take(k).enumerate() {
            values[[i, j]] = row[class];
            indices[[i, j]] = class;
        }
    }

    (values, indices)
}
