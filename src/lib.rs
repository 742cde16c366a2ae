pub mod arch;
pub mod checkpoint;
pub mod configs;
pub mod data;
pub mod error;
pub mod initialization;
pub mod optimization;
pub mod training;

pub use error::{MlErr, Result};
