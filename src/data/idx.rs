//! Reader for the IDX files MNIST and Fashion-MNIST are distributed in.
//!
//! Every file starts with a big endian magic number, `0x0000_08NN` where `NN` is the number of
//! dimensions, followed by one big endian `u32` per dimension and the raw `u8` values.

use std::{fs, path::Path};

use log::debug;
use ndarray::{Array1, Array2};

use super::{InMemoryDataset, Normalize};
use crate::{MlErr, Result};

const UBYTE: u8 = 0x08;

/// Reads an images file, scaling the pixels to `[0, 1]` and then applying `normalize`.
///
/// # Returns
/// A `(images, rows * cols)` array, one flattened image per row.
pub fn read_images(path: impl AsRef<Path>, normalize: Normalize) -> Result<Array2<f32>> {
    let bytes = fs::read(path.as_ref())?;
    parse_images(&bytes, normalize)
}

/// Reads a labels file.
pub fn read_labels(path: impl AsRef<Path>) -> Result<Array1<usize>> {
    let bytes = fs::read(path.as_ref())?;
    parse_labels(&bytes)
}

/// Reads a pair of images and labels files into a dataset.
pub fn read_dataset(
    images: impl AsRef<Path>,
    labels: impl AsRef<Path>,
    normalize: Normalize,
) -> Result<InMemoryDataset> {
    let images_path = images.as_ref();
    let inputs = read_images(images_path, normalize)?;
    let labels = read_labels(labels)?;

    debug!(
        examples = inputs.nrows(),
        features = inputs.ncols();
        "read idx dataset from {}",
        images_path.display()
    );

    InMemoryDataset::new(inputs, labels)
}

pub fn parse_images(bytes: &[u8], normalize: Normalize) -> Result<Array2<f32>> {
    let (dims, data) = parse(bytes, 3)?;
    let (n, features) = (dims[0], volume(&dims[1..])?);

    let pixels = data.iter().map(|&b| b as f32 / 255.).collect();
    let images = Array2::from_shape_vec((n, features), pixels)
        .map_err(|e| MlErr::InvalidData(e.to_string()))?;

    Ok(normalize.apply(images))
}

pub fn parse_labels(bytes: &[u8]) -> Result<Array1<usize>> {
    let (_, data) = parse(bytes, 1)?;
    Ok(data.iter().map(|&b| b as usize).collect())
}

/// Splits an IDX buffer into its dimensions and its values.
fn parse(bytes: &[u8], ndim: usize) -> Result<(Vec<usize>, &[u8])> {
    let header_len = 4 * (ndim + 1);
    if bytes.len() < header_len {
        return Err(MlErr::InvalidData(format!(
            "idx header needs {header_len} bytes, got {}",
            bytes.len()
        )));
    }

    let (header, data) = bytes.split_at(header_len);
    let mut words = header
        .chunks_exact(4)
        .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]) as usize);

    let magic = words.next().unwrap_or_default();
    let expected = ((UBYTE as usize) << 8) | ndim;
    if magic != expected {
        return Err(MlErr::InvalidData(format!(
            "bad idx magic number {magic:#010x}, expected {expected:#010x}"
        )));
    }

    let dims: Vec<usize> = words.collect();
    let len = volume(&dims)?;
    if data.len() != len {
        return Err(MlErr::InvalidData(format!(
            "idx body holds {} values, the header declares {len}",
            data.len()
        )));
    }

    Ok((dims, data))
}

/// The amount of values an array with `dims` holds.
fn volume(dims: &[usize]) -> Result<usize> {
    dims.iter()
        .try_fold(1usize, |len, &d| len.checked_mul(d))
        .ok_or_else(|| MlErr::InvalidData(format!("idx dimensions {dims:?} overflow")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(dims: &[u32], data: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0, 0, UBYTE, dims.len() as u8];
        for d in dims {
            bytes.extend(d.to_be_bytes());
        }
        bytes.extend(data);
        bytes
    }

    #[test]
    fn images_are_scaled_and_normalized() {
        let bytes = idx(&[2, 1, 2], &[0, 255, 51, 255]);

        let images = parse_images(&bytes, Normalize::default()).unwrap();

        assert_eq!(images.dim(), (2, 2));
        assert_eq!(images[[0, 0]], -1.);
        assert_eq!(images[[0, 1]], 1.);
        assert!((images[[1, 0]] + 0.6).abs() < 1e-6);
    }

    #[test]
    fn labels_are_read_as_class_indices() {
        let labels = parse_labels(&idx(&[3], &[7, 0, 9])).unwrap();
        assert_eq!(labels.to_vec(), [7, 0, 9]);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let bytes = idx(&[3], &[7, 0, 9]);
        assert!(parse_images(&bytes, Normalize::default()).is_err());
    }

    #[test]
    fn overflowing_dimensions_are_rejected() {
        let bytes = idx(&[u32::MAX, u32::MAX, u32::MAX], &[]);
        assert!(matches!(
            parse_images(&bytes, Normalize::default()),
            Err(MlErr::InvalidData(_))
        ));

        let bytes = idx(&[0, u32::MAX, u32::MAX], &[]);
        assert!(matches!(
            parse_images(&bytes, Normalize::default()),
            Err(MlErr::InvalidData(_))
        ));
    }

    #[test]
    fn truncated_body_is_rejected() {
        let bytes = idx(&[4], &[7, 0, 9]);
        assert!(matches!(parse_labels(&bytes), Err(MlErr::InvalidData(_))));
    }
}
