use ndarray::Array4;

use super::reshape;
use crate::{MlErr, Result};

/// Max pooling over NHWC inputs with a square window and a stride equal to the window.
///
/// Trailing rows and columns that do not fill a whole window are dropped.
#[derive(Clone, Debug)]
pub struct MaxPool2d {
    pool: usize,

    // Forward metadata
    input_dim: (usize, usize, usize, usize),
    argmax: Vec<usize>,
}

impl MaxPool2d {
    pub fn new(pool: usize) -> Self {
        Self {
            pool,
            input_dim: (0, 0, 0, 0),
            argmax: Vec::new(),
        }
    }

    pub fn output_hw(&self, h: usize, w: usize) -> (usize, usize) {
        (h / self.pool, w / self.pool)
    }

    pub fn forward(&mut self, x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, h, w, c) = x.dim();
        let (oh, ow) = self.output_hw(h, w);
        if oh == 0 || ow == 0 {
            return Err(MlErr::ShapeMismatch {
                what: "max_pool2d input",
                got: x.shape().to_vec(),
                expected: vec![n, self.pool, self.pool, c],
            });
        }

        let x = reshape(x, (n, h, w, c))?;
        // SAFETY: `reshape` always returns a standard layout array.
        let xs = x.as_slice().unwrap();
        let p = self.pool;

        let mut out = Vec::with_capacity(n * oh * ow * c);
        self.argmax.clear();

        for i in 0..n {
            for oy in 0..oh {
                for ox in 0..ow {
                    for ch in 0..c {
                        let mut best = ((i * h + oy * p) * w + ox * p) * c + ch;

                        for ky in 0..p {
                            for kx in 0..p {
                                let idx = ((i * h + oy * p + ky) * w + ox * p + kx) * c + ch;
                                if xs[idx] > xs[best] {
                                    best = idx;
                                }
                            }
                        }

                        out.push(xs[best]);
                        self.argmax.push(best);
                    }
                }
            }
        }

        self.input_dim = (n, h, w, c);

        // SAFETY: one value was pushed per output element.
        Ok(Array4::from_shape_vec((n, oh, ow, c), out).unwrap())
    }

    /// Routes each output delta back to the input position that won its window.
    pub fn backward(&mut self, d: Array4<f32>) -> Result<Array4<f32>> {
        if d.len() != self.argmax.len() {
            return Err(MlErr::SizeMismatch {
                what: "max_pool2d delta",
                got: d.len(),
                expected: self.argmax.len(),
            });
        }

        let (n, h, w, c) = self.input_dim;
        let mut dx = Array4::zeros(self.input_dim);
        // SAFETY: freshly allocated arrays are in standard layout.
        let dxs = dx.as_slice_mut().unwrap();

        let d = reshape(d, self.argmax.len())?;
        for (&idx, delta) in self.argmax.iter().zip(d.iter()) {
            dxs[idx] += delta;
        }

        debug_assert_eq!(dx.len(), n * h * w * c);
        Ok(dx)
    }
}
