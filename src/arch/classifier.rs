use std::{
    mem,
    ops::{Deref, DerefMut, Range},
};

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;

use super::{
    Architecture, ClassifierBuilder, Mode,
    activations::{Relu, log_softmax, log_softmax_backward},
    layers::{Dense, Dropout},
};
use crate::{
    MlErr, Result,
    checkpoint::{self, StateDict, TensorRecord},
    optimization::Optimizer,
};

/// A feed-forward classifier: hidden affine layers followed by ReLU and dropout, an output
/// affine layer and a row-wise log-softmax.
///
/// Parameters live in a single flat buffer owned by the model, mirrored by a gradient buffer
/// of the same length. Layers only hold views into them, in the same order as the layer stack.
pub struct Classifier {
    layers: Vec<Dense>,
    dropouts: Vec<Dropout>,
    params: Vec<f32>,
    grad: Vec<f32>,
    log_probs: Option<Array2<f32>>,
    mode: Mode,
    grad_enabled: bool,
    rng: StdRng,
}

/// Where a named parameter lives inside the flat parameter buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSlot {
    pub key: String,
    pub shape: Vec<usize>,
    pub range: Range<usize>,
}

impl Classifier {
    /// Creates a new `Classifier` with the default initialization and a dropout probability of
    /// `0.5`.
    ///
    /// # Arguments
    /// * `input_size` - The width of every input row.
    /// * `output_size` - The amount of classes.
    /// * `hidden_sizes` - The widths of the hidden layers, may be empty.
    pub fn new(input_size: usize, output_size: usize, hidden_sizes: &[usize]) -> Result<Self> {
        Self::builder(input_size, output_size)
            .hidden_sizes(hidden_sizes)
            .build()
    }

    pub fn builder(input_size: usize, output_size: usize) -> ClassifierBuilder {
        ClassifierBuilder::new(input_size, output_size)
    }

    /// Assembles a classifier around an already initialized parameter buffer.
    pub(super) fn from_parts(
        arch: &Architecture,
        drop_p: f32,
        params: Vec<f32>,
        rng: StdRng,
    ) -> Result<Self> {
        arch.validate()?;

        let dims = arch.layer_dims();
        let nhidden = dims.len() - 1;

        let layers: Vec<_> = dims
            .iter()
            .enumerate()
            .map(|(i, &dim)| Dense::new(dim, (i < nhidden).then_some(Relu)))
            .collect();

        let dropouts = (0..nhidden)
            .map(|_| Dropout::new(drop_p))
            .collect::<Result<Vec<_>>>()?;

        let size: usize = layers.iter().map(Dense::size).sum();
        if params.len() != size {
            return Err(MlErr::shape_mismatch("parameters", [params.len()], [size]));
        }

        Ok(Self {
            layers,
            dropouts,
            grad: vec![0.; size],
            params,
            log_probs: None,
            mode: Mode::Train,
            grad_enabled: true,
            rng,
        })
    }

    /// The architecture as read off the layer stack.
    pub fn architecture(&self) -> Architecture {
        Architecture {
            input_size: self.input_size(),
            output_size: self.output_size(),
            hidden_sizes: self.hidden_sizes(),
        }
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].dim().0
    }

    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].dim().1
    }

    pub fn hidden_sizes(&self) -> Vec<usize> {
        let nhidden = self.layers.len() - 1;
        self.layers[..nhidden].iter().map(|l| l.dim().1).collect()
    }

    /// The dropout probability of the hidden layers, `None` if there are none.
    pub fn drop_p(&self) -> Option<f32> {
        self.dropouts.first().map(Dropout::p)
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// The gradient accumulated since the last [`Classifier::zero_grad`].
    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn is_training(&self) -> bool {
        self.mode == Mode::Train
    }

    pub fn grad_enabled(&self) -> bool {
        self.grad_enabled
    }

    /// Disables gradient tracking until the returned guard is dropped, at which point the
    /// previous setting is restored, whichever way the scope is left.
    pub fn no_grad(&mut self) -> NoGrad<'_> {
        let prev = mem::replace(&mut self.grad_enabled, false);
        NoGrad { model: self, prev }
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `x` - A `(batch_size, input_size)` batch.
    ///
    /// # Returns
    /// The `(batch_size, output_size)` log-probabilities, or a shape mismatch if `x` doesn't
    /// have `input_size` columns.
    pub fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let input_size = self.input_size();
        if x.ncols() != input_size {
            return Err(MlErr::shape_mismatch(
                "batch inputs",
                x.shape(),
                [x.nrows(), input_size],
            ));
        }

        let track = self.grad_enabled;
        let training = self.is_training();
        let Self {
            layers,
            dropouts,
            params,
            rng,
            ..
        } = self;

        let mut rest = params.as_slice();
        let mut h: Option<Array2<f32>> = None;

        for (i, layer) in layers.iter_mut().enumerate() {
            let (p, tail) = rest.split_at(layer.size());
            rest = tail;

            let input = h.as_ref().map_or(x.view(), |h| h.view());
            let mut a = layer.forward(p, input, track)?;

            if let Some(dropout) = dropouts.get_mut(i) {
                a = if training {
                    dropout.forward(a, rng, track)
                } else {
                    dropout.bypass(a)
                };
            }

            h = Some(a);
        }

        let logits = h.ok_or(MlErr::MissingForwardCache)?;
        let log_probs = log_softmax(logits.view());
        self.log_probs = track.then(|| log_probs.clone());

        Ok(log_probs)
    }

    /// Backpropagates the gradient of the loss with respect to the last forward's output,
    /// **adding** every parameter's gradient to the gradient buffer.
    ///
    /// # Arguments
    /// * `d` - The gradient of the loss with respect to the log-probabilities.
    pub fn backward(&mut self, d: ArrayView2<f32>) -> Result<()> {
        let log_probs = self.log_probs.as_ref().ok_or(MlErr::MissingForwardCache)?;
        if d.dim() != log_probs.dim() {
            return Err(MlErr::shape_mismatch(
                "loss gradient",
                d.shape(),
                log_probs.shape(),
            ));
        }

        let mut d = log_softmax_backward(log_probs.view(), d);

        let Self {
            layers,
            dropouts,
            params,
            grad,
            ..
        } = self;

        let mut end = params.len();

        for (i, layer) in layers.iter_mut().enumerate().rev() {
            let start = end - layer.size();

            if let Some(dropout) = dropouts.get(i) {
                d = dropout.backward(d);
            }

            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }

    /// Resets the accumulated gradient, needed before every backward pass that shouldn't add
    /// onto the previous ones.
    pub fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }

    /// Lets `optimizer` update the parameters with the accumulated gradient.
    pub fn step<O: Optimizer + ?Sized>(&mut self, optimizer: &mut O) -> Result<()> {
        optimizer.update_params(&self.grad, &mut self.params)
    }

    /// Class probabilities for `x`, computed without tracking gradients.
    ///
    /// The current mode is kept, call `set_mode(Mode::Eval)` first for deterministic output.
    pub fn predict(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut model = self.no_grad();
        Ok(model.forward(x)?.mapv_into(f32::exp))
    }

    /// Names, shapes and buffer ranges of every parameter, in layer order.
    pub fn param_slots(&self) -> Vec<ParamSlot> {
        let arch = self.architecture();
        let mut slots = Vec::with_capacity(self.layers.len() * 2);
        let mut offset = 0;

        for (i, layer) in self.layers.iter().enumerate() {
            let name = arch.layer_name(i);
            let w_len = layer.size() - layer.dim().1;

            slots.push(ParamSlot {
                key: format!("{name}.weight"),
                shape: layer.weight_shape().to_vec(),
                range: offset..offset + w_len,
            });
            slots.push(ParamSlot {
                key: format!("{name}.bias"),
                shape: layer.bias_shape().to_vec(),
                range: offset + w_len..offset + layer.size(),
            });

            offset += layer.size();
        }

        slots
    }

    /// A copy of every parameter keyed by its stable name.
    pub fn state_dict(&self) -> StateDict {
        self.param_slots()
            .into_iter()
            .map(|slot| {
                let data = self.params[slot.range].to_vec();
                (slot.key, TensorRecord::new(slot.shape, data))
            })
            .collect()
    }

    /// Copies every parameter of `state` into this model.
    ///
    /// The whole dict is checked before anything is copied: it must describe as many hidden
    /// layers as the model has, every key of the model must be present with exactly the model's
    /// shape, and no other key may appear.
    pub fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let expected = self.hidden_sizes();
        let (depth, stored) = checkpoint::hidden_layers(state);
        if depth != expected.len() {
            return Err(MlErr::shape_mismatch("hidden layers", stored, expected));
        }

        let slots = self.param_slots();

        for slot in &slots {
            let record = state.get(&slot.key).ok_or_else(|| MlErr::MissingParam {
                key: slot.key.clone(),
            })?;
            record.check(&slot.key, &slot.shape)?;
        }

        if let Some(key) = state
            .keys()
            .find(|key| !slots.iter().any(|slot| &slot.key == *key))
        {
            return Err(MlErr::UnexpectedParam { key: key.clone() });
        }

        for slot in slots {
            self.params[slot.range].copy_from_slice(&state[&slot.key].data);
        }

        Ok(())
    }
}

/// A scope with gradient tracking disabled, see [`Classifier::no_grad`].
pub struct NoGrad<'m> {
    model: &'m mut Classifier,
    prev: bool,
}

impl Deref for NoGrad<'_> {
    type Target = Classifier;

    fn deref(&self) -> &Classifier {
        self.model
    }
}

impl DerefMut for NoGrad<'_> {
    fn deref_mut(&mut self) -> &mut Classifier {
        self.model
    }
}

impl Drop for NoGrad<'_> {
    fn drop(&mut self) {
        self.model.grad_enabled = self.prev;
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, array};

    use super::*;
    use crate::{
        arch::loss::{LossFn, NllLoss},
        initialization::Init,
    };

    fn seeded(hidden: &[usize]) -> Classifier {
        Classifier::builder(4, 3)
            .hidden_sizes(hidden)
            .seed(Some(11))
            .build()
            .unwrap()
    }

    #[test]
    fn output_rows_are_log_distributions() {
        let mut model = seeded(&[8, 5]);
        let x = Array2::from_shape_fn((6, 4), |(i, j)| (i * 4 + j) as f32 / 10.);

        let out = model.forward(x.view()).unwrap();

        assert_eq!(out.dim(), (6, 3));
        for row in out.rows() {
            let total: f32 = row.iter().map(|v| v.exp()).sum();
            assert!((total - 1.).abs() < 1e-5);
        }
    }

    #[test]
    fn wrong_input_width_is_a_shape_mismatch() {
        let mut model = seeded(&[8]);
        let res = model.forward(Array2::zeros((2, 5)).view());

        assert!(matches!(res, Err(MlErr::ShapeMismatch { .. })));
    }

    #[test]
    fn no_grad_restores_previous_setting() {
        let mut model = seeded(&[8]);

        {
            let mut scoped = model.no_grad();
            assert!(!scoped.grad_enabled());
            scoped.forward(Array2::zeros((1, 4)).view()).unwrap();
        }

        assert!(model.grad_enabled());
    }

    #[test]
    fn backward_after_untracked_forward_fails() {
        let mut model = seeded(&[8]);
        let x = Array2::zeros((2, 4));

        let out = model.no_grad().forward(x.view()).unwrap();
        let res = model.backward(Array2::zeros(out.dim()).view());

        assert!(matches!(res, Err(MlErr::MissingForwardCache)));
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let mut model = seeded(&[5]);
        model.set_mode(Mode::Eval);

        let x = array![[0.5, -1.0, 0.25, 2.0], [1.5, 0.3, -0.7, 0.1]];
        let labels = array![2, 0];
        let loss_fn = NllLoss;

        model.zero_grad();
        let out = model.forward(x.view()).unwrap();
        let d = loss_fn.loss_prime(out.view(), labels.view()).unwrap();
        model.backward(d.view()).unwrap();
        let analytic = model.grad().to_vec();

        let h = 1e-3;
        for i in (0..model.size()).step_by(7) {
            let original = model.params[i];

            model.params[i] = original + h;
            let up = model.forward(x.view()).unwrap();
            let up = loss_fn.loss(up.view(), labels.view()).unwrap();

            model.params[i] = original - h;
            let down = model.forward(x.view()).unwrap();
            let down = loss_fn.loss(down.view(), labels.view()).unwrap();

            model.params[i] = original;

            let numeric = (up - down) / (2. * h);
            assert!(
                (numeric - analytic[i]).abs() < 1e-2,
                "param {i}: numeric {numeric} vs analytic {}",
                analytic[i]
            );
        }
    }

    #[test]
    fn state_dict_round_trips_into_a_twin() {
        let model = seeded(&[6]);
        let mut twin = Classifier::builder(4, 3)
            .hidden_sizes(&[6])
            .init(Init::Const { value: 0. })
            .build()
            .unwrap();

        twin.load_state_dict(&model.state_dict()).unwrap();
        assert_eq!(twin.params(), model.params());
    }

    #[test]
    fn failed_load_leaves_parameters_untouched() {
        let source = seeded(&[6]);
        let mut state = source.state_dict();
        state.remove("output.bias");

        let mut target = seeded(&[6]);
        let before = target.params().to_vec();
        target.params.iter_mut().for_each(|p| *p += 1.);
        let shifted = target.params().to_vec();

        assert!(target.load_state_dict(&state).is_err());
        assert_eq!(target.params(), shifted.as_slice());
        assert_ne!(target.params(), before.as_slice());
    }
}
