use ndarray::{Array2, ArrayD};
use rand::Rng;

use super::{
    Model,
    activations::ActFn,
    layers::{Layer, into_ix2},
};
use crate::{MlErr, Result, dataset::fashion_mnist::NUM_CLASSES};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// The classifier trained on 28x28 grayscale images of 10 classes.
    ///
    /// `conv(32, 3x3, relu) -> pool(2) -> conv(64, 3x3, relu) -> pool(2) -> flatten ->
    /// dense(64, relu) -> dense(10)`, the last layer outputs logits.
    pub fn fashion_cnn() -> Self {
        Self::new([
            Layer::conv2d(1, 32, 3, Some(ActFn::relu())),
            Layer::max_pool2d(2),
            Layer::conv2d(32, 64, 3, Some(ActFn::relu())),
            Layer::max_pool2d(2),
            Layer::flatten(),
            Layer::dense((5 * 5 * 64, 64), Some(ActFn::relu())),
            Layer::dense((64, NUM_CLASSES), None),
        ])
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    fn check_size(&self, what: &'static str, buf: &[f32]) -> Result<()> {
        let expected = self.size();
        if buf.len() != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got: buf.len(),
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(Layer::size).sum()
    }

    fn init_params<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f32>> {
        let mut params = vec![0.; self.size()];
        let mut rest = params.as_mut_slice();

        for layer in &self.layers {
            let (head, tail) = rest.split_at_mut(layer.size());
            layer.init(head, rng)?;
            rest = tail;
        }

        Ok(params)
    }

    fn forward(&mut self, params: &[f32], mut x: ArrayD<f32>) -> Result<Array2<f32>> {
        self.check_size("params", params)?;

        let mut rest = params;
        for layer in self.layers.iter_mut() {
            let (head, tail) = rest.split_at(layer.size());
            x = layer.forward(head, x)?;
            rest = tail;
        }

        into_ix2(x, "model output")
    }

    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()> {
        self.check_size("params", params)?;
        self.check_size("grad", grad)?;

        let mut end = params.len();
        let mut d = d.into_dyn();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array4;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn fashion_cnn_has_the_expected_parameter_count() {
        let model = Sequential::fashion_cnn();
        // 320 + 18_496 + 102_464 + 650
        assert_eq!(model.size(), 121_930);
    }

    #[test]
    fn fashion_cnn_maps_images_to_ten_logits() {
        let mut model = Sequential::fashion_cnn();
        let mut rng = StdRng::seed_from_u64(0);
        let params = model.init_params(&mut rng).unwrap();

        let x = Array4::<f32>::from_elem((3, 28, 28, 1), 0.5).into_dyn();
        let logits = model.forward(&params, x).unwrap();

        assert_eq!(logits.dim(), (3, 10));
        assert!(logits.iter().all(|z| z.is_finite()));
    }

    #[test]
    fn biases_start_at_zero() {
        let model = Sequential::new([Layer::dense((3, 2), None)]);
        let mut rng = StdRng::seed_from_u64(1);
        let params = model.init_params(&mut rng).unwrap();

        assert_eq!(&params[6..], &[0., 0.]);
    }

    #[test]
    fn forward_rejects_wrong_parameter_count() {
        let mut model = Sequential::new([Layer::dense((3, 2), None)]);
        let x = Array2::<f32>::zeros((1, 3)).into_dyn();
        assert!(model.forward(&[0.; 3], x).is_err());
    }
}
