use ndarray::Array4;

use crate::{MlErr, Result};

/// A labeled image dataset fully loaded in memory.
///
/// Images are stored one after the other in `(height, width, channels)` order.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    images: Vec<f32>,
    labels: Vec<u32>,
    sample_shape: (usize, usize, usize),
}

/// An owned batch of training data.
#[derive(Debug, Clone)]
pub struct Batch {
    pub x: Array4<f32>,
    pub y: Vec<u32>,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

impl InMemoryDataset {
    /// Creates a new dataset from owned buffers.
    ///
    /// # Errors
    /// If `images` does not hold exactly one sample of `sample_shape` per label.
    pub fn new(images: Vec<f32>, labels: Vec<u32>, sample_shape: (usize, usize, usize)) -> Result<Self> {
        let (h, w, c) = sample_shape;
        let expected = labels.len() * h * w * c;

        if images.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "dataset images",
                got: images.len(),
                expected,
            });
        }

        Ok(Self {
            images,
            labels,
            sample_shape,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn sample_shape(&self) -> (usize, usize, usize) {
        self.sample_shape
    }

    #[inline]
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    fn sample_len(&self) -> usize {
        let (h, w, c) = self.sample_shape;
        h * w * c
    }

    /// Returns the pixels of the sample at `idx` (panics if out of bounds).
    #[inline]
    pub fn image(&self, idx: usize) -> &[f32] {
        let len = self.sample_len();
        &self.images[idx * len..(idx + 1) * len]
    }

    /// Copies the samples at `indices` into a new batch.
    ///
    /// # Errors
    /// If any index is out of bounds.
    pub fn gather(&self, indices: &[usize]) -> Result<Batch> {
        if let Some(&idx) = indices.iter().find(|&&idx| idx >= self.len()) {
            return Err(MlErr::SizeMismatch {
                what: "sample index",
                got: idx,
                expected: self.len(),
            });
        }

        let (h, w, c) = self.sample_shape;
        let mut images = Vec::with_capacity(indices.len() * self.sample_len());
        let mut labels = Vec::with_capacity(indices.len());

        for &idx in indices {
            images.extend_from_slice(self.image(idx));
            labels.push(self.labels[idx]);
        }

        // SAFETY: one whole sample was pushed per index.
        let x = Array4::from_shape_vec((indices.len(), h, w, c), images).unwrap();
        Ok(Batch { x, y: labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> InMemoryDataset {
        // Three 1x2x1 images.
        InMemoryDataset::new(vec![0., 1., 10., 11., 20., 21.], vec![0, 1, 2], (1, 2, 1)).unwrap()
    }

    #[test]
    fn gather_keeps_the_requested_order() {
        let batch = tiny().gather(&[2, 0]).unwrap();

        assert_eq!(batch.x.dim(), (2, 1, 2, 1));
        assert_eq!(batch.x.iter().copied().collect::<Vec<_>>(), vec![20., 21., 0., 1.]);
        assert_eq!(batch.y, vec![2, 0]);
    }

    #[test]
    fn empty_gather_is_an_empty_batch() {
        let batch = tiny().gather(&[]).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.x.dim(), (0, 1, 2, 1));
    }

    #[test]
    fn out_of_bounds_index_is_rejected() {
        assert!(tiny().gather(&[3]).is_err());
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        assert!(InMemoryDataset::new(vec![0.; 5], vec![0, 1], (1, 2, 1)).is_err());
    }
}
