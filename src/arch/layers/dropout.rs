use ndarray::Array2;
use ndarray_rand::{RandomExt, rand_distr::Uniform};
use rand::Rng;

use crate::{MlErr, Result};

/// Inverted dropout: zeroes each activation with probability `p` and rescales the survivors by
/// `1 / (1 - p)` so the expected activation is unchanged.
#[derive(Clone, Debug)]
pub struct Dropout {
    p: f32,
    uniform: Uniform<f32>,
    mask: Option<Array2<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout`.
    ///
    /// # Arguments
    /// * `p` - The probability of zeroing an activation, in `[0, 1)`.
    pub fn new(p: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(MlErr::construction(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }

        let uniform = Uniform::new(0., 1.).map_err(|e| MlErr::construction(e.to_string()))?;

        Ok(Self {
            p,
            uniform,
            mask: None,
        })
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    /// Draws a fresh mask and applies it to `x`.
    ///
    /// # Arguments
    /// * `x` - The activations.
    /// * `rng` - The source of randomness for the mask.
    /// * `track` - Whether to keep the mask for `backward`.
    pub fn forward<R: Rng>(&mut self, mut x: Array2<f32>, rng: &mut R, track: bool) -> Array2<f32> {
        let p = self.p;
        let scale = 1. / (1. - p);
        let mask = Array2::random_using(x.dim(), &self.uniform, rng)
            .mapv_into(|u| if u < p { 0. } else { scale });

        x *= &mask;
        self.mask = track.then_some(mask);
        x
    }

    /// Lets `x` through untouched, as done outside of training.
    pub fn bypass(&mut self, x: Array2<f32>) -> Array2<f32> {
        self.mask = None;
        x
    }

    /// Routes the gradient through the surviving activations only.
    pub fn backward(&self, mut d: Array2<f32>) -> Array2<f32> {
        if let Some(mask) = &self.mask {
            d *= mask;
        }

        d
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn invalid_probabilities_are_rejected() {
        assert!(Dropout::new(1.).is_err());
        assert!(Dropout::new(-0.1).is_err());
        assert!(Dropout::new(f32::NAN).is_err());
        assert!(Dropout::new(0.).is_ok());
    }

    #[test]
    fn survivors_are_rescaled() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut dropout = Dropout::new(0.5).unwrap();

        let y = dropout.forward(Array2::ones((8, 64)), &mut rng, true);

        assert!(y.iter().all(|&v| v == 0. || v == 2.));
        let zeros = y.iter().filter(|&&v| v == 0.).count();
        assert!(zeros > 128 && zeros < 384, "{zeros} zeros out of 512");
    }

    #[test]
    fn backward_uses_the_same_mask() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut dropout = Dropout::new(0.5).unwrap();

        let y = dropout.forward(Array2::ones((4, 4)), &mut rng, true);
        let d = dropout.backward(Array2::ones((4, 4)));

        assert_eq!(y, d);
    }

    #[test]
    fn bypass_is_identity() {
        let mut dropout = Dropout::new(0.5).unwrap();
        let x = Array2::from_elem((2, 3), 1.5);

        assert_eq!(dropout.bypass(x.clone()), x);
        assert_eq!(dropout.backward(x.clone()), x);
    }
}
