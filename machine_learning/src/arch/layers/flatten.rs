use ndarray::{Array2, Array4};

use super::reshape;
use crate::Result;

/// Turns `(batch, height, width, channels)` into `(batch, height * width * channels)`.
#[derive(Clone, Debug, Default)]
pub struct Flatten {
    input_dim: (usize, usize, usize, usize),
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array2<f32>> {
        let (n, h, w, c) = x.dim();
        self.input_dim = (n, h, w, c);
        reshape(x, (n, h * w * c))
    }

    pub fn backward(&mut self, d: Array2<f32>) -> Result<Array4<f32>> {
        reshape(d, self.input_dim)
    }
}
