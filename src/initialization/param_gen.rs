/// Produces the initial values of a model's flat parameter buffer, in chunks.
pub trait ParamGen {
    /// Yields up to `n` values.
    ///
    /// # Returns
    /// `None` once the generator has produced every value it was sized for.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;
}
