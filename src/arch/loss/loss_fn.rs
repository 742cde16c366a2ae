use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::Result;

/// A classification loss over a batch of model outputs and integer class labels.
pub trait LossFn {
    /// The scalar loss of the batch.
    fn loss(&self, y_pred: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<f32>;

    /// The gradient of [`LossFn::loss`] with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, labels: ArrayView1<usize>)
    -> Result<Array2<f32>>;
}
