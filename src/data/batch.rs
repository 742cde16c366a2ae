use ndarray::{ArrayView1, ArrayView2, ArrayViewD, Ix2};

use crate::{MlErr, Result};

/// A borrowed `(inputs, labels)` pair.
///
/// The inputs keep whatever shape the source yields them in, e.g. `(batch_size, 1, 28, 28)` for
/// images, and are flattened to `(batch_size, features)` before reaching the model.
#[derive(Debug, Clone)]
pub struct Batch<'a> {
    pub inputs: ArrayViewD<'a, f32>,
    pub labels: ArrayView1<'a, usize>,
}

impl<'a> Batch<'a> {
    pub fn new(inputs: ArrayViewD<'a, f32>, labels: ArrayView1<'a, usize>) -> Self {
        Self { inputs, labels }
    }

    /// The amount of examples in the batch.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Views the inputs as `(batch_size, features)`, every axis but the first one folded into
    /// the features.
    ///
    /// # Returns
    /// A shape mismatch if the inputs are not at least two dimensional or their first axis
    /// doesn't match the amount of labels.
    pub fn flatten(&self) -> Result<ArrayView2<'a, f32>> {
        let shape = self.inputs.shape();

        let Some((&rows, rest)) = shape.split_first().filter(|(_, rest)| !rest.is_empty()) else {
            return Err(MlErr::shape_mismatch(
                "batch inputs",
                shape,
                [self.len(), 0],
            ));
        };

        if rows != self.len() {
            return Err(MlErr::shape_mismatch(
                "batch inputs",
                shape,
                [self.len(), rest.iter().product()],
            ));
        }

        let features: usize = rest.iter().product();
        let inputs = self.inputs.clone();
        if inputs.ndim() == 2 {
            return inputs
                .into_dimensionality::<Ix2>()
                .map_err(|e| MlErr::InvalidData(e.to_string()));
        }

        inputs
            .into_shape_with_order((rows, features))
            .map_err(|e| MlErr::InvalidData(e.to_string()))
    }
}
