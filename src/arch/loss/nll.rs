use ndarray::{Array2, ArrayView1, ArrayView2};

use super::LossFn;
use crate::{MlErr, Result};

/// Negative log-likelihood over log-probabilities, averaged over the batch.
///
/// Paired with a log-softmax output this is the cross-entropy loss.
#[derive(Debug, Default, Clone, Copy)]
pub struct NllLoss;

impl NllLoss {
    /// Returns a new `NllLoss`.
    pub fn new() -> Self {
        Self
    }

    fn check(&self, y_pred: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<()> {
        let (rows, classes) = y_pred.dim();

        if labels.len() != rows {
            return Err(MlErr::shape_mismatch("labels", [labels.len()], [rows]));
        }

        if rows == 0 {
            return Err(MlErr::EmptyBatches { what: "loss" });
        }

        match labels.iter().find(|&&label| label >= classes) {
            Some(&label) => Err(MlErr::InvalidLabel { label, classes }),
            None => Ok(()),
        }
    }
}

impl LossFn for NllLoss {
    fn loss(&self, y_pred: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<f32> {
        self.check(y_pred, labels)?;

        let total: f32 = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| y_pred[[i, label]])
            .sum();

        Ok(-total / labels.len() as f32)
    }

    fn loss_prime(
        &self,
        y_pred: ArrayView2<f32>,
        labels: ArrayView1<usize>,
    ) -> Result<Array2<f32>> {
        self.check(y_pred, labels)?;

        let scale = -1. / labels.len() as f32;
        let mut d = Array2::zeros(y_pred.dim());
        for (i, &label) in labels.iter().enumerate() {
            d[[i, label]] = scale;
        }

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn loss_picks_the_labelled_log_probabilities() {
        let y_pred = array![[-0.5, -1.0], [-2.0, -0.25]];
        let labels = array![0, 1];

        let loss = NllLoss.loss(y_pred.view(), labels.view()).unwrap();
        assert!((loss - 0.375).abs() < 1e-6);
    }

    #[test]
    fn gradient_is_minus_one_over_batch_size_at_the_labels() {
        let y_pred = array![[-0.5, -1.0], [-2.0, -0.25]];
        let labels = array![1, 1];

        let d = NllLoss.loss_prime(y_pred.view(), labels.view()).unwrap();
        assert_eq!(d, array![[0., -0.5], [0., -0.5]]);
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let y_pred = array![[-0.5, -1.0]];
        let res = NllLoss.loss(y_pred.view(), array![2].view());

        assert!(matches!(
            res,
            Err(MlErr::InvalidLabel {
                label: 2,
                classes: 2
            })
        ));
    }

    #[test]
    fn label_count_must_match_rows() {
        let y_pred = array![[-0.5, -1.0], [-2.0, -0.25]];
        let res = NllLoss.loss_prime(y_pred.view(), array![0].view());

        assert!(matches!(res, Err(MlErr::ShapeMismatch { .. })));
    }
}
