use std::{cell::RefCell, rc::Rc};

use log::debug;
use rand::{SeedableRng, rngs::StdRng};

use super::{Architecture, Classifier};
use crate::{
    MlErr, Result,
    initialization::{ChainedParamGen, Init, ParamGen},
};

/// The dropout probability used when none is given.
pub const DEFAULT_DROP_P: f32 = 0.5;

/// Builds `Classifier`s.
#[derive(Debug, Clone)]
pub struct ClassifierBuilder {
    arch: Architecture,
    drop_p: f32,
    init: Init,
    seed: Option<u64>,
}

impl ClassifierBuilder {
    /// Creates a new `ClassifierBuilder` with no hidden layers.
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self::from_architecture(Architecture::new(input_size, output_size, &[]))
    }

    pub fn from_architecture(arch: Architecture) -> Self {
        Self {
            arch,
            drop_p: DEFAULT_DROP_P,
            init: Init::default(),
            seed: None,
        }
    }

    pub fn hidden_sizes(mut self, hidden_sizes: &[usize]) -> Self {
        self.arch.hidden_sizes = hidden_sizes.to_vec();
        self
    }

    pub fn dropout(mut self, p: f32) -> Self {
        self.drop_p = p;
        self
    }

    pub fn init(mut self, init: Init) -> Self {
        self.init = init;
        self
    }

    /// Seeds both the parameter initialization and the dropout masks, `None` draws the seed
    /// from the OS.
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the architecture and initializes every parameter, layer by layer.
    ///
    /// # Returns
    /// The new classifier or an error if the architecture, the dropout probability or the
    /// initialization strategy are invalid.
    pub fn build(self) -> Result<Classifier> {
        self.arch.validate()?;

        let mut rng = self.generate_rng();
        let init_rng = Rc::new(RefCell::new(StdRng::from_rng(&mut rng)));

        let param_gens = self
            .arch
            .layer_dims()
            .into_iter()
            .map(|dim| -> Result<Box<dyn ParamGen>> {
                let limit = (dim.0 + 1) * dim.1;
                Ok(self.init.param_gen(&init_rng, dim, limit)?)
            })
            .collect::<Result<Vec<_>>>()?;

        let size = self.arch.size();
        let params = ChainedParamGen::new(param_gens)
            .sample(size)
            .ok_or_else(|| MlErr::construction("the model has no parameters"))?;

        debug!(
            size = size;
            "built classifier {} -> {:?} -> {} with {:?} init",
            self.arch.input_size, self.arch.hidden_sizes, self.arch.output_size, self.init
        );

        Classifier::from_parts(&self.arch, self.drop_p, params, rng)
    }

    fn generate_rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
