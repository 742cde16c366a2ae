use std::num::NonZeroUsize;

use log::warn;
use rand::{SeedableRng, rngs::StdRng};

use super::{Config, DatasetConfig, ModelConfig, OptimizerConfig};
use crate::{
    MlErr, Result,
    arch::{Classifier, ClassifierBuilder, DEFAULT_DROP_P},
    data::{InMemoryDataset, Normalize, idx},
    optimization::{Adam, GradientDescent, GradientDescentWithMomentum, Optimizer},
    training::Trainer,
};

/// Everything a training run needs, resolved from a [`Config`].
pub struct Run {
    pub model: Classifier,
    pub optimizer: Box<dyn Optimizer>,
    pub trainer: Trainer,
    pub batch_size: usize,
    /// Shuffles the training set.
    pub rng: StdRng,
}

/// Validates configurations and turns them into concrete components.
#[derive(Debug, Default, Clone, Copy)]
pub struct Adapter;

impl Adapter {
    pub fn new() -> Self {
        Self
    }

    /// Validates `config` and builds the model, the optimizer and the trainer it describes.
    pub fn adapt(&self, config: &Config) -> Result<Run> {
        self.validate_model(&config.model)?;
        self.validate_training(config)?;

        let model = self.adapt_model(&config.model, config.seed)?;
        let optimizer = self.adapt_optimizer(config.optimizer, model.size());
        let trainer = self.adapt_trainer(config);

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => {
                warn!("no seed given, the run is not reproducible");
                StdRng::from_os_rng()
            }
        };

        Ok(Run {
            model,
            optimizer,
            trainer,
            batch_size: config.batch_size,
            rng,
        })
    }

    /// Reads the training and test splits, checking them against the model's input width.
    pub fn adapt_datasets(
        &self,
        dataset: &DatasetConfig,
        model: &ModelConfig,
    ) -> Result<(InMemoryDataset, InMemoryDataset)> {
        let normalize = Normalize::default();
        let train = idx::read_dataset(&dataset.train_images, &dataset.train_labels, normalize)?;
        let test = idx::read_dataset(&dataset.test_images, &dataset.test_labels, normalize)?;

        for (split, ds) in [("training", &train), ("test", &test)] {
            if ds.num_features() != model.input_size {
                return Err(MlErr::InvalidConfig(format!(
                    "the {split} images have {} features but input_size is {}",
                    ds.num_features(),
                    model.input_size
                )));
            }
        }

        Ok((train, test))
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    fn validate_model(&self, model: &ModelConfig) -> Result<()> {
        if model.input_size == 0 || model.output_size == 0 {
            return Err(MlErr::InvalidConfig(
                "input_size and output_size must be greater than 0".into(),
            ));
        }

        if let Some(i) = model.hidden_layers.iter().position(|&w| w == 0) {
            return Err(MlErr::InvalidConfig(format!(
                "hidden layer {i} must have a positive width"
            )));
        }

        match model.drop_p {
            Some(p) if !(0.0..1.0).contains(&p) => Err(MlErr::InvalidConfig(format!(
                "drop_p must be in [0, 1), got {p}"
            ))),
            _ => Ok(()),
        }
    }

    fn validate_training(&self, config: &Config) -> Result<()> {
        if config.epochs == 0 {
            return Err(MlErr::InvalidConfig("epochs must be greater than 0".into()));
        }

        if config.batch_size == 0 {
            return Err(MlErr::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        if config.log_every == Some(0) {
            return Err(MlErr::InvalidConfig(
                "log_every must be greater than 0".into(),
            ));
        }

        let lr = match config.optimizer {
            OptimizerConfig::GradientDescent { lr } => lr,
            OptimizerConfig::GradientDescentWithMomentum { lr, mu } => {
                if !(0.0..1.0).contains(&mu) {
                    return Err(MlErr::InvalidConfig(format!(
                        "mu must be in [0, 1), got {mu}"
                    )));
                }
                lr
            }
            OptimizerConfig::Adam { lr, b1, b2, eps } => {
                if !(0.0..1.0).contains(&b1) || !(0.0..1.0).contains(&b2) {
                    return Err(MlErr::InvalidConfig(format!(
                        "b1 and b2 must be in [0, 1), got {b1} and {b2}"
                    )));
                }
                if eps.is_nan() || eps <= 0. {
                    return Err(MlErr::InvalidConfig(format!(
                        "eps must be greater than 0, got {eps}"
                    )));
                }
                lr
            }
        };

        if !lr.is_finite() || lr <= 0. {
            return Err(MlErr::InvalidConfig(format!(
                "lr must be a positive number, got {lr}"
            )));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Adaptation
    // -------------------------------------------------------------------------

    fn adapt_model(&self, model: &ModelConfig, seed: Option<u64>) -> Result<Classifier> {
        let mut builder = ClassifierBuilder::new(model.input_size, model.output_size)
            .hidden_sizes(&model.hidden_layers)
            .seed(seed);

        match model.drop_p {
            Some(p) => builder = builder.dropout(p),
            None if !model.hidden_layers.is_empty() => {
                warn!("drop_p not set, using {DEFAULT_DROP_P}")
            }
            None => {}
        }

        match model.init {
            Some(init) => builder = builder.init(init),
            None => warn!("init not set, using fan_in_uniform"),
        }

        builder.build()
    }

    fn adapt_optimizer(&self, optimizer: OptimizerConfig, len: usize) -> Box<dyn Optimizer> {
        match optimizer {
            OptimizerConfig::Adam { lr, b1, b2, eps } => Box::new(Adam::new(len, lr, b1, b2, eps)),
            OptimizerConfig::GradientDescent { lr } => Box::new(GradientDescent::new(lr)),
            OptimizerConfig::GradientDescentWithMomentum { lr, mu } => {
                Box::new(GradientDescentWithMomentum::new(len, lr, mu))
            }
        }
    }

    fn adapt_trainer(&self, config: &Config) -> Trainer {
        let log_every = config.log_every.and_then(NonZeroUsize::new);
        if log_every.is_none() {
            warn!("log_every not set, the training loss is only reported per epoch");
        }

        Trainer::new(config.epochs).with_log_every(log_every)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "model": { "input_size": 4, "output_size": 3, "hidden_layers": [5], "drop_p": 0.2 },
        "optimizer": { "gradient_descent_with_momentum": { "lr": 0.1, "mu": 0.9 } },
        "epochs": 2,
        "batch_size": 8,
        "seed": 7,
        "dataset": {
            "train_images": "train-images", "train_labels": "train-labels",
            "test_images": "test-images", "test_labels": "test-labels"
        },
        "checkpoint": "checkpoint.json"
    }"#;

    fn config() -> Config {
        Config::from_json(CONFIG).unwrap()
    }

    #[test]
    fn adapts_a_valid_config() {
        let run = Adapter::new().adapt(&config()).unwrap();

        assert_eq!(run.model.hidden_sizes(), [5]);
        assert_eq!(run.model.drop_p(), Some(0.2));
        assert_eq!(run.trainer.epochs(), 2);
        assert_eq!(run.batch_size, 8);
    }

    #[test]
    fn same_seed_same_model() {
        let a = Adapter::new().adapt(&config()).unwrap();
        let b = Adapter::new().adapt(&config()).unwrap();

        assert_eq!(a.model.params(), b.model.params());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = config();
        config.batch_size = 0;

        let res = Adapter::new().adapt(&config);
        assert!(matches!(res, Err(MlErr::InvalidConfig(_))));
    }

    #[test]
    fn invalid_drop_p_is_rejected() {
        let mut config = config();
        config.model.drop_p = Some(1.5);

        assert!(Adapter::new().adapt(&config).is_err());
    }

    #[test]
    fn non_positive_learning_rate_is_rejected() {
        let mut config = config();
        config.optimizer = OptimizerConfig::GradientDescent { lr: 0. };

        assert!(Adapter::new().adapt(&config).is_err());
    }

    #[test]
    fn zero_width_hidden_layer_is_rejected() {
        let mut config = config();
        config.model.hidden_layers = vec![5, 0];

        assert!(matches!(
            Adapter::new().adapt(&config),
            Err(MlErr::InvalidConfig(_))
        ));
    }
}
