use std::{
    error::Error,
    fmt::{self, Display},
};

use rand_distr::{NormalError, uniform::Error as UniformError};

/// The specific result type for the different instances of `RandParamGen` generators.
pub type Result<T> = std::result::Result<T, RandErr>;

/// Error returned by the `RandParamGen` constructors whenever the requested distribution
/// can't be built, each constructor has it's own constraints given that they use different
/// distributions.
#[derive(Debug)]
pub struct RandErr(String);

impl RandErr {
    /// A fan based initializer was asked for a layer with no units on that side.
    pub(crate) fn empty_fan(side: &str) -> Self {
        Self(format!("{side} must be greater than zero for a fan based initializer"))
    }
}

impl From<NormalError> for RandErr {
    fn from(value: NormalError) -> Self {
        Self(value.to_string())
    }
}

impl From<UniformError> for RandErr {
    fn from(value: UniformError) -> Self {
        Self(value.to_string())
    }
}

impl Display for RandErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for RandErr {}
