use ndarray::{ShapeError, linalg, prelude::*};

use crate::{MlErr, Result, arch::activations::Relu};

/// An affine layer `y = act(x W^T + b)` viewing its weights and biases in a flat buffer.
///
/// The weights are laid out row-major with shape `(fan_out, fan_in)` followed by the
/// `fan_out` biases, the same layout the checkpoint tensors use.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<Relu>,
    size: usize,

    // Forward metadata, only kept while gradients are tracked.
    x: Option<Array2<f32>>,
    z: Option<Array2<f32>>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The `(fan_in, fan_out)` of the layer.
    /// * `act_fn` - An optional activation applied after the affine map.
    pub fn new(dim: (usize, usize), act_fn: Option<Relu>) -> Self {
        Self {
            dim,
            act_fn,
            size: (dim.0 + 1) * dim.1,
            x: None,
            z: None,
        }
    }

    /// The `(fan_in, fan_out)` of this layer.
    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn weight_shape(&self) -> [usize; 2] {
        [self.dim.1, self.dim.0]
    }

    pub fn bias_shape(&self) -> [usize; 1] {
        [self.dim.1]
    }

    /// Applies the layer to a `(batch_size, fan_in)` input.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of the model's parameters.
    /// * `x` - The input batch.
    /// * `track` - Whether to keep what `backward` needs.
    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView2<f32>,
        track: bool,
    ) -> Result<Array2<f32>> {
        self.clear_cache();

        let (w, b) = self.view_params(params)?;
        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w.t(), 0.0, &mut z);
        z += &b;

        let a = match self.act_fn {
            Some(act_fn) => {
                let a = z.mapv(|z| act_fn.f(z));
                if track {
                    self.z = Some(z);
                }
                a
            }
            None => z,
        };

        if track {
            self.x = Some(x.to_owned());
        }

        Ok(a)
    }

    /// Backpropagates `d`, the gradient with respect to this layer's output, **adding** the
    /// weight and bias gradients into `grad`.
    ///
    /// # Returns
    /// The gradient with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        let x = self.x.as_ref().ok_or(MlErr::MissingForwardCache)?;

        if d.dim() != (x.nrows(), self.dim.1) {
            return Err(MlErr::shape_mismatch(
                "layer output gradient",
                d.shape(),
                [x.nrows(), self.dim.1],
            ));
        }

        if let Some(act_fn) = self.act_fn {
            let z = self.z.as_ref().ok_or(MlErr::MissingForwardCache)?;
            d.zip_mut_with(z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &d.t(), x, 1.0, &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w))
    }

    /// Drops the forward metadata.
    pub fn clear_cache(&mut self) {
        self.x = None;
        self.z = None;
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    pub fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("layer parameters", params.len())?;

        let (w_raw, b_raw) = params.split_at(self.size - self.dim.1);
        let w = ArrayView2::from_shape((self.dim.1, self.dim.0), w_raw).map_err(shape_err)?;
        let b = ArrayView1::from_shape(self.dim.1, b_raw).map_err(shape_err)?;
        Ok((w, b))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("layer gradient", grad.len())?;

        let (dw_raw, db_raw) = grad.split_at_mut(self.size - self.dim.1);
        let dw = ArrayViewMut2::from_shape((self.dim.1, self.dim.0), dw_raw).map_err(shape_err)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).map_err(shape_err)?;
        Ok((dw, db))
    }

    fn check_len(&self, what: &str, len: usize) -> Result<()> {
        if len != self.size {
            return Err(MlErr::shape_mismatch(what, [len], [self.size]));
        }

        Ok(())
    }
}

fn shape_err(e: ShapeError) -> MlErr {
    MlErr::InvalidData(e.to_string())
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    // w = [[1, 2], [3, 4], [5, 6]] (3 outputs, 2 inputs), b = [0.5, -20, 0]
    const PARAMS: [f32; 9] = [1., 2., 3., 4., 5., 6., 0.5, -20., 0.];

    #[test]
    fn forward_applies_affine_map_and_relu() {
        let mut dense = Dense::new((2, 3), Some(Relu));
        let y = dense.forward(&PARAMS, array![[1., 1.]].view(), false).unwrap();

        assert_eq!(y, array![[3.5, 0., 11.]]);
    }

    #[test]
    fn backward_accumulates_into_grad() {
        let mut dense = Dense::new((2, 3), None);
        let mut grad = [0.; 9];
        let x = array![[1., 2.]];

        dense.forward(&PARAMS, x.view(), true).unwrap();
        let dx = dense
            .backward(&PARAMS, &mut grad, array![[1., 0., 0.]])
            .unwrap();

        assert_eq!(dx, array![[1., 2.]]);
        assert_eq!(grad, [1., 2., 0., 0., 0., 0., 1., 0., 0.]);

        dense.forward(&PARAMS, x.view(), true).unwrap();
        dense
            .backward(&PARAMS, &mut grad, array![[1., 0., 0.]])
            .unwrap();

        assert_eq!(grad, [2., 4., 0., 0., 0., 0., 2., 0., 0.]);
    }

    #[test]
    fn backward_without_tracking_fails() {
        let mut dense = Dense::new((2, 3), Some(Relu));
        let mut grad = [0.; 9];

        dense.forward(&PARAMS, array![[1., 1.]].view(), false).unwrap();
        let res = dense.backward(&PARAMS, &mut grad, array![[1., 1., 1.]]);

        assert!(matches!(res, Err(MlErr::MissingForwardCache)));
    }

    #[test]
    fn wrong_param_slice_is_rejected() {
        let mut dense = Dense::new((2, 3), None);
        let res = dense.forward(&PARAMS[..8], array![[1., 1.]].view(), false);

        assert!(matches!(res, Err(MlErr::ShapeMismatch { .. })));
    }
}
