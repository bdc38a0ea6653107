use ndarray::prelude::*;
use rand::Rng;
use rayon::prelude::*;

use super::{check_len, reshape};
use crate::{MlErr, Result, arch::activations::ActFn, initialization::glorot_uniform};

/// A 2D convolution over NHWC inputs with stride 1 and no padding.
///
/// The parameters are the `(kernel * kernel * in_channels, filters)` kernel matrix followed by
/// `filters` biases, the kernel rows are ordered by `(ky, kx, channel)`.
#[derive(Clone)]
pub struct Conv2d {
    in_channels: usize,
    filters: usize,
    kernel: usize,
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    input_dim: (usize, usize, usize, usize),
    cols: Array2<f32>,
    z: Array2<f32>,
}

impl Conv2d {
    /// Creates a new `Conv2d` layer.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of channels of the input images.
    /// * `filters` - The amount of output channels.
    /// * `kernel` - The side of the square kernel.
    /// * `act_fn` - An optional activation applied to the output.
    pub fn new(in_channels: usize, filters: usize, kernel: usize, act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            in_channels,
            filters,
            kernel,
            act_fn,
            size: (kernel * kernel * in_channels + 1) * filters,
            input_dim: (0, 0, 0, 0),
            cols: zeros.clone(),
            z: zeros,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn patch_len(&self) -> usize {
        self.kernel * self.kernel * self.in_channels
    }

    /// Returns the `(height, width)` of the output for an input of `(height, width)`.
    pub fn output_hw(&self, h: usize, w: usize) -> Option<(usize, usize)> {
        if h < self.kernel || w < self.kernel {
            return None;
        }

        Some((h - self.kernel + 1, w - self.kernel + 1))
    }

    /// Glorot uniform kernel and zeroed biases, fans as Keras computes them for convolutions.
    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        check_len("conv2d params", params, self.size)?;

        let receptive = self.kernel * self.kernel;
        let (w, b) = params.split_at_mut(self.size - self.filters);
        glorot_uniform(
            rng,
            w,
            receptive * self.in_channels,
            receptive * self.filters,
        )?;
        b.fill(0.);
        Ok(())
    }

    /// Forwards a `(batch, height, width, in_channels)` input.
    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        let (n, h, w, c) = x.dim();
        let Some((oh, ow)) = self.output_hw(h, w).filter(|_| c == self.in_channels) else {
            return Err(MlErr::ShapeMismatch {
                what: "conv2d input",
                got: x.shape().to_vec(),
                expected: vec![n, self.kernel.max(h), self.kernel.max(w), self.in_channels],
            });
        };

        let (kernel, biases) = self.view_params(params)?;
        let cols = self.im2col(&x, oh, ow);

        let mut z = cols.dot(&kernel);
        z += &biases;

        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        self.input_dim = (n, h, w, c);
        self.cols = cols;
        self.z = z;

        reshape(a, (n, oh, ow, self.filters))
    }

    /// Writes this layer's gradient into `grad` and returns the delta of its input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        let mut d = reshape(d, self.z.raw_dim())?;

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        check_len("conv2d grad", grad, self.size)?;
        let (dk_raw, db_raw) = grad.split_at_mut(self.size - self.filters);

        // SAFETY: both halves were just checked to match the layer's dimensions.
        let mut dk = ArrayViewMut2::from_shape((self.patch_len(), self.filters), dk_raw).unwrap();
        let mut db = ArrayViewMut1::from_shape(self.filters, db_raw).unwrap();

        ndarray::linalg::general_mat_mul(1.0, &self.cols.t(), &d, 0.0, &mut dk);
        db.assign(&d.sum_axis(Axis(0)));

        let (kernel, _) = self.view_params(params)?;
        let dcols = d.dot(&kernel.t());

        Ok(self.col2im(dcols))
    }

    /// Unfolds every `kernel x kernel` patch of `x` into a row.
    fn im2col(&self, x: &Array4<f32>, oh: usize, ow: usize) -> Array2<f32> {
        let (n, h, w, c) = x.dim();
        let k = self.kernel;
        let patch = self.patch_len();

        let x = x.as_standard_layout();
        // SAFETY: standard layout arrays are always contiguous.
        let xs = x.as_slice().unwrap();

        let mut cols = vec![0.; n * oh * ow * patch];
        cols.par_chunks_mut(oh * ow * patch)
            .enumerate()
            .for_each(|(i, sample)| {
                let image = &xs[i * h * w * c..(i + 1) * h * w * c];

                for oy in 0..oh {
                    for ox in 0..ow {
                        let row = &mut sample[(oy * ow + ox) * patch..(oy * ow + ox + 1) * patch];

                        for ky in 0..k {
                            let src = ((oy + ky) * w + ox) * c;
                            let dst = ky * k * c;
                            row[dst..dst + k * c].copy_from_slice(&image[src..src + k * c]);
                        }
                    }
                }
            });

        // SAFETY: `cols` was allocated with exactly this shape.
        Array2::from_shape_vec((n * oh * ow, patch), cols).unwrap()
    }

    /// Folds patch rows back into an input shaped delta, adding overlapping contributions.
    fn col2im(&self, dcols: Array2<f32>) -> Array4<f32> {
        let (n, h, w, c) = self.input_dim;
        let k = self.kernel;
        let patch = self.patch_len();
        let (oh, ow) = (h - k + 1, w - k + 1);

        let dcols = dcols.as_standard_layout();
        // SAFETY: standard layout arrays are always contiguous.
        let ds = dcols.as_slice().unwrap();

        let mut dx = vec![0.; n * h * w * c];
        dx.par_chunks_mut(h * w * c)
            .enumerate()
            .for_each(|(i, image)| {
                let sample = &ds[i * oh * ow * patch..(i + 1) * oh * ow * patch];

                for oy in 0..oh {
                    for ox in 0..ow {
                        let row = &sample[(oy * ow + ox) * patch..(oy * ow + ox + 1) * patch];

                        for ky in 0..k {
                            let dst = ((oy + ky) * w + ox) * c;
                            let src = ky * k * c;
                            image[dst..dst + k * c]
                                .iter_mut()
                                .zip(&row[src..src + k * c])
                                .for_each(|(dx, d)| *dx += d);
                        }
                    }
                }
            });

        // SAFETY: `dx` was allocated with exactly the input's shape.
        Array4::from_shape_vec((n, h, w, c), dx).unwrap()
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        check_len("conv2d params", params, self.size)?;

        let k_size = self.size - self.filters;

        // SAFETY: both halves were just checked to match the layer's dimensions.
        let kernel = ArrayView2::from_shape((self.patch_len(), self.filters), &params[..k_size]).unwrap();
        let biases = ArrayView1::from_shape(self.filters, &params[k_size..]).unwrap();
        Ok((kernel, biases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(shape: (usize, usize, usize, usize)) -> Array4<f32> {
        let len = shape.0 * shape.1 * shape.2 * shape.3;
        Array4::from_shape_vec(shape, (0..len).map(|v| v as f32).collect()).unwrap()
    }

    #[test]
    fn forward_sums_each_window() {
        // A single all-ones 2x2 filter over a 3x3 image sums every window.
        let mut conv = Conv2d::new(1, 1, 2, None);
        let params = [1., 1., 1., 1., 0.5];

        let y = conv.forward(&params, numbered((1, 3, 3, 1))).unwrap();

        assert_eq!(y.dim(), (1, 2, 2, 1));
        let expected = [0. + 1. + 3. + 4., 1. + 2. + 4. + 5., 3. + 4. + 6. + 7., 4. + 5. + 7. + 8.];
        for (got, want) in y.iter().zip(expected) {
            assert_eq!(*got, want + 0.5);
        }
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut conv = Conv2d::new(2, 3, 2, None);
        let x = numbered((2, 4, 3, 2)).mapv(|v| (v * 0.37).sin());
        let params: Vec<f32> = (0..conv.size()).map(|i| ((i as f32) * 0.13).cos() * 0.5).collect();

        // loss = sum(y), so the incoming delta is all ones.
        let y = conv.forward(&params, x.clone()).unwrap();
        let mut grad = vec![0.; conv.size()];
        conv.backward(&params, &mut grad, Array4::ones(y.dim())).unwrap();

        let eps = 1e-2;
        for i in [0, 5, 11, conv.size() - 1] {
            let mut plus = params.clone();
            plus[i] += eps;
            let mut minus = params.clone();
            minus[i] -= eps;

            let lp = conv.forward(&plus, x.clone()).unwrap().sum();
            let lm = conv.forward(&minus, x.clone()).unwrap().sum();
            let numeric = (lp - lm) / (2. * eps);

            assert!((numeric - grad[i]).abs() < 1e-2, "param {i}: {numeric} vs {}", grad[i]);
        }
    }

    #[test]
    fn input_delta_counts_window_overlaps() {
        // With an all-ones kernel and an all-ones delta, each input pixel receives one unit
        // per window covering it.
        let mut conv = Conv2d::new(1, 1, 2, None);
        let params = [1., 1., 1., 1., 0.];
        conv.forward(&params, numbered((1, 3, 3, 1))).unwrap();

        let mut grad = [0.; 5];
        let dx = conv.backward(&params, &mut grad, Array4::ones((1, 2, 2, 1))).unwrap();

        let counts = [1., 2., 1., 2., 4., 2., 1., 2., 1.];
        assert!(dx.iter().zip(counts).all(|(got, want)| *got == want));
    }

    #[test]
    fn too_small_input_is_rejected() {
        let mut conv = Conv2d::new(1, 1, 3, None);
        let params = [0.; 10];
        assert!(conv.forward(&params, Array4::zeros((1, 2, 2, 1))).is_err());
    }
}
