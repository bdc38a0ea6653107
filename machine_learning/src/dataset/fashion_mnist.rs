//! Loader for the Fashion-MNIST dataset stored as uncompressed IDX files.

use std::path::Path;

use log::info;

use super::{InMemoryDataset, idx};
use crate::{MlErr, Result};

/// The amount of classes of the dataset.
pub const NUM_CLASSES: usize = 10;

/// One of the two published splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    fn file_names(self) -> (&'static str, &'static str) {
        match self {
            Split::Train => ("train-images-idx3-ubyte", "train-labels-idx1-ubyte"),
            Split::Test => ("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte"),
        }
    }
}

/// Loads a split from `dir`, scaling pixels into `[0, 1]` and adding a trailing channel axis.
pub fn load<P: AsRef<Path>>(dir: P, split: Split) -> Result<InMemoryDataset> {
    let dir = dir.as_ref();
    let (images_name, labels_name) = split.file_names();

    let images = idx::read(dir.join(images_name))?;
    let labels = idx::read(dir.join(labels_name))?;

    let dataset = from_idx(images, labels)?;
    info!(
        "loaded {} {split:?} samples from {}",
        dataset.len(),
        dir.display()
    );

    Ok(dataset)
}

/// Builds the dataset out of already decoded image and label arrays.
pub fn from_idx(images: idx::IdxArray, labels: idx::IdxArray) -> Result<InMemoryDataset> {
    let &[n, h, w] = images.dims.as_slice() else {
        return Err(MlErr::ShapeMismatch {
            what: "image file dimensions",
            got: images.dims.clone(),
            expected: vec![0, 28, 28],
        });
    };

    if labels.dims != [n] {
        return Err(MlErr::ShapeMismatch {
            what: "label file dimensions",
            got: labels.dims,
            expected: vec![n],
        });
    }

    let pixels = images.data.iter().map(|&p| p as f32 / 255.).collect();
    let labels = labels.data.iter().map(|&l| l as u32).collect();

    InMemoryDataset::new(pixels, labels, (h, w, 1))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn loads_and_normalizes_a_split() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("t10k-images-idx3-ubyte"),
            idx::encode(&[2, 2, 2], &[0, 255, 51, 102, 255, 255, 0, 0]),
        )
        .unwrap();
        fs::write(dir.path().join("t10k-labels-idx1-ubyte"), idx::encode(&[2], &[9, 0])).unwrap();

        let dataset = load(dir.path(), Split::Test).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.sample_shape(), (2, 2, 1));
        assert_eq!(dataset.labels(), &[9, 0]);
        assert_eq!(dataset.image(0), &[0., 1., 0.2, 0.4]);
    }

    #[test]
    fn mismatched_counts_are_rejected() {
        let images = idx::parse(&idx::encode(&[2, 1, 1], &[0, 0]), "images").unwrap();
        let labels = idx::parse(&idx::encode(&[3], &[0, 0, 0]), "labels").unwrap();
        assert!(from_idx(images, labels).is_err());
    }

    #[test]
    fn missing_files_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load(dir.path(), Split::Train), Err(MlErr::Io(_))));
    }
}
