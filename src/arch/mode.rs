/// Whether a [`Classifier`](super::Classifier) is being trained or evaluated.
///
/// Dropout is only applied in `Train` mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}
