use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{ConstParamGen, ParamGen, RandParamGen, Result};

/// The initialization strategy for the parameters of an affine layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Init {
    /// `U(-1/sqrt(fan_in), 1/sqrt(fan_in))` for weights and biases.
    #[default]
    FanInUniform,
    XavierUniform,
    LecunUniform,
    Kaiming,
    Xavier,
    Lecun,
    Uniform {
        low: f32,
        high: f32,
    },
    Normal {
        mean: f32,
        std_dev: f32,
    },
    Const {
        value: f32,
    },
}

impl Init {
    /// Resolves this strategy into a generator for a single layer.
    ///
    /// # Arguments
    /// * `rng` - The rng shared by every layer of the model.
    /// * `dim` - The `(fan_in, fan_out)` of the layer.
    /// * `limit` - The amount of parameters of the layer.
    ///
    /// # Returns
    /// A boxed generator or an error if the strategy can't be built for this layer.
    pub fn param_gen<R>(
        self,
        rng: &Rc<RefCell<R>>,
        (fan_in, fan_out): (usize, usize),
        limit: usize,
    ) -> Result<Box<dyn ParamGen>>
    where
        R: Rng + 'static,
    {
        let rng = Rc::clone(rng);

        let param_gen: Box<dyn ParamGen> = match self {
            Init::FanInUniform => Box::new(RandParamGen::fan_in_uniform(rng, limit, fan_in)?),
            Init::XavierUniform => {
                Box::new(RandParamGen::xavier_uniform(rng, limit, fan_in, fan_out)?)
            }
            Init::LecunUniform => Box::new(RandParamGen::lecun_uniform(rng, limit, fan_in)?),
            Init::Kaiming => Box::new(RandParamGen::kaiming(rng, limit, fan_in)?),
            Init::Xavier => Box::new(RandParamGen::xavier(rng, limit, fan_in, fan_out)?),
            Init::Lecun => Box::new(RandParamGen::lecun(rng, limit, fan_in)?),
            Init::Uniform { low, high } => Box::new(RandParamGen::uniform(rng, limit, low, high)?),
            Init::Normal { mean, std_dev } => {
                Box::new(RandParamGen::normal(rng, limit, mean, std_dev)?)
            }
            Init::Const { value } => Box::new(ConstParamGen::new(value, limit)),
        };

        Ok(param_gen)
    }
}
