use crate::{MlErr, Result};

/// Defines the strategy for updating model parameters based on their accumulated gradient.
///
/// Optimizers never own the parameters, the model hands its flat parameter buffer and its
/// flat gradient buffer on every step.
pub trait Optimizer {
    /// Updates `params` in place using `grad` and the optimizer's internal state.
    ///
    /// # Arguments
    /// * `grad` - The gradient accumulated since the last reset.
    /// * `params` - The parameters to update.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `grad` and `params`.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()>;
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        (**self).update_params(grad, params)
    }
}

/// Checks that the gradient, the parameters and (optionally) the optimizer state line up.
pub(super) fn check_lens(grad: &[f32], params: &[f32], state: Option<usize>) -> Result<()> {
    if grad.len() != params.len() {
        return Err(MlErr::shape_mismatch("gradient", [grad.len()], [params.len()]));
    }

    match state {
        Some(len) if len != params.len() => Err(MlErr::shape_mismatch(
            "optimizer state",
            [len],
            [params.len()],
        )),
        _ => Ok(()),
    }
}
