use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use rand::{Rng, seq::SliceRandom};

use super::Batch;
use crate::{MlErr, Result};

/// A labelled dataset held in memory, one example per row.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    inputs: Array2<f32>,
    labels: Array1<usize>,
}

impl InMemoryDataset {
    /// Creates a new `InMemoryDataset`.
    ///
    /// # Returns
    /// A shape mismatch if there's not exactly one label per row.
    pub fn new(inputs: Array2<f32>, labels: Array1<usize>) -> Result<Self> {
        if inputs.nrows() != labels.len() {
            return Err(MlErr::shape_mismatch(
                "dataset labels",
                [labels.len()],
                [inputs.nrows()],
            ));
        }

        Ok(Self { inputs, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.inputs.ncols()
    }

    pub fn inputs(&self) -> ArrayView2<'_, f32> {
        self.inputs.view()
    }

    pub fn labels(&self) -> ArrayView1<'_, usize> {
        self.labels.view()
    }

    /// Reorders the examples with a random permutation, keeping every label with its row.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        indices.shuffle(rng);

        self.inputs = self.inputs.select(Axis(0), &indices);
        self.labels = self.labels.select(Axis(0), &indices);
    }

    /// Splits the dataset in consecutive batches of `batch_size` examples, the last one
    /// possibly smaller.
    pub fn batches(&self, batch_size: usize) -> Result<Batches<'_>> {
        if batch_size == 0 {
            return Err(MlErr::InvalidData(
                "batch size must be greater than 0".into(),
            ));
        }

        Ok(Batches {
            inputs: self.inputs.view(),
            labels: self.labels.view(),
            batch_size,
            cursor: 0,
        })
    }
}

/// Iterator over the batches of an [`InMemoryDataset`], see [`InMemoryDataset::batches`].
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    inputs: ArrayView2<'a, f32>,
    labels: ArrayView1<'a, usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Batch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.labels.len();
        if self.cursor >= len {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(len);
        let range = self.cursor..end;
        self.cursor = end;

        let inputs = self.inputs.slice_move(s![range.clone(), ..]);
        let labels = self.labels.slice_move(s![range]);
        Some(Batch::new(inputs.into_dyn(), labels))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.labels.len() - self.cursor;
        let n = remaining.div_ceil(self.batch_size);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Batches<'_> {}

#[cfg(test)]
mod tests {
    use ndarray::{Array, Array1};
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn dataset(n: usize) -> InMemoryDataset {
        let inputs = Array::from_shape_fn((n, 2), |(i, j)| (i * 10 + j) as f32);
        let labels = Array1::from_iter(0..n);
        InMemoryDataset::new(inputs, labels).unwrap()
    }

    #[test]
    fn labels_must_match_rows() {
        let res = InMemoryDataset::new(Array2::zeros((3, 2)), Array1::from(vec![0, 1]));
        assert!(matches!(res, Err(MlErr::ShapeMismatch { .. })));
    }

    #[test]
    fn last_batch_may_be_smaller() {
        let ds = dataset(5);
        let batches: Vec<_> = ds.batches(2).unwrap().collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].labels.to_vec(), [0, 1]);
        assert_eq!(batches[2].labels.to_vec(), [4]);
        assert_eq!(batches[2].flatten().unwrap().row(0).to_vec(), [40., 41.]);
        assert_eq!(ds.batches(2).unwrap().len(), 3);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(dataset(3).batches(0).is_err());
    }

    #[test]
    fn shuffle_keeps_rows_and_labels_together() {
        let mut ds = dataset(20);
        let mut rng = StdRng::seed_from_u64(5);

        ds.shuffle(&mut rng);

        assert_ne!(ds.labels().to_vec(), (0..20).collect::<Vec<_>>());
        for (row, &label) in ds.inputs().rows().into_iter().zip(ds.labels()) {
            assert_eq!(row[0], (label * 10) as f32);
        }
    }
}
