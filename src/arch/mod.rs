pub mod activations;
mod architecture;
mod builder;
mod classifier;
pub mod layers;
pub mod loss;
mod mode;

pub use architecture::Architecture;
pub use builder::{ClassifierBuilder, DEFAULT_DROP_P};
pub use classifier::{Classifier, NoGrad, ParamSlot};
pub use mode::Mode;
