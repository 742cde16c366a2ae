use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

/// The hyperparameters that fully determine the shapes of a classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub input_size: usize,
    pub output_size: usize,
    pub hidden_sizes: Vec<usize>,
}

impl Architecture {
    /// Creates a new `Architecture`, it's checked when a model is built from it.
    pub fn new(input_size: usize, output_size: usize, hidden_sizes: &[usize]) -> Self {
        Self {
            input_size,
            output_size,
            hidden_sizes: hidden_sizes.to_vec(),
        }
    }

    /// Checks that every width is positive. An empty hidden list is valid, the model is then a
    /// single affine map.
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(MlErr::construction("input_size must be greater than 0"));
        }

        if self.output_size == 0 {
            return Err(MlErr::construction("output_size must be greater than 0"));
        }

        if let Some(i) = self.hidden_sizes.iter().position(|&w| w == 0) {
            return Err(MlErr::construction(format!(
                "hidden layer {i} must have a positive width"
            )));
        }

        Ok(())
    }

    /// The `(fan_in, fan_out)` of every affine layer, the output layer last.
    pub fn layer_dims(&self) -> Vec<(usize, usize)> {
        let widths: Vec<_> = std::iter::once(self.input_size)
            .chain(self.hidden_sizes.iter().copied())
            .chain(std::iter::once(self.output_size))
            .collect();

        widths.windows(2).map(|w| (w[0], w[1])).collect()
    }

    /// The amount of parameters a model with this architecture has.
    pub fn size(&self) -> usize {
        self.layer_dims().iter().map(|&(n, m)| (n + 1) * m).sum()
    }

    /// The stable name of the `i`-th affine layer, used as the prefix of its parameter keys.
    pub fn layer_name(&self, i: usize) -> String {
        if i < self.hidden_sizes.len() {
            format!("hidden_layers.{i}")
        } else {
            "output".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_dims_chain_widths() {
        let arch = Architecture::new(784, 10, &[128, 64]);

        assert_eq!(arch.layer_dims(), [(784, 128), (128, 64), (64, 10)]);
        assert_eq!(arch.size(), 785 * 128 + 129 * 64 + 65 * 10);
        assert_eq!(arch.layer_name(1), "hidden_layers.1");
        assert_eq!(arch.layer_name(2), "output");
    }

    #[test]
    fn no_hidden_layers_is_a_single_affine_map() {
        let arch = Architecture::new(4, 3, &[]);

        assert!(arch.validate().is_ok());
        assert_eq!(arch.layer_dims(), [(4, 3)]);
    }

    #[test]
    fn zero_widths_are_rejected() {
        assert!(Architecture::new(0, 3, &[]).validate().is_err());
        assert!(Architecture::new(4, 0, &[]).validate().is_err());
        assert!(Architecture::new(4, 3, &[8, 0]).validate().is_err());
    }
}
