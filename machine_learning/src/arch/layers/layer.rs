use ndarray::ArrayD;
use rand::Rng;

use super::{Conv2d, Dense, Flatten, MaxPool2d, into_ix2, into_ix4};
use crate::{Result, arch::activations::ActFn};

/// Every layer a `Sequential` can be made of.
#[derive(Clone)]
pub enum Layer {
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    Flatten(Flatten),
    Dense(Dense),
}

impl Layer {
    pub fn conv2d(in_channels: usize, filters: usize, kernel: usize, act_fn: Option<ActFn>) -> Self {
        Self::Conv2d(Conv2d::new(in_channels, filters, kernel, act_fn))
    }

    pub fn max_pool2d(pool: usize) -> Self {
        Self::MaxPool2d(MaxPool2d::new(pool))
    }

    pub fn flatten() -> Self {
        Self::Flatten(Flatten::new())
    }

    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    /// Returns the amount of parameters of the layer.
    pub fn size(&self) -> usize {
        match self {
            Self::Conv2d(l) => l.size(),
            Self::Dense(l) => l.size(),
            Self::MaxPool2d(_) | Self::Flatten(_) => 0,
        }
    }

    /// Writes the initial values of this layer's parameters into `params`.
    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        match self {
            Self::Conv2d(l) => l.init(params, rng),
            Self::Dense(l) => l.init(params, rng),
            Self::MaxPool2d(_) | Self::Flatten(_) => Ok(()),
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let y = match self {
            Self::Conv2d(l) => l.forward(params, into_ix4(x, "conv2d input")?)?.into_dyn(),
            Self::MaxPool2d(l) => l.forward(into_ix4(x, "max_pool2d input")?)?.into_dyn(),
            Self::Flatten(l) => l.forward(into_ix4(x, "flatten input")?)?.into_dyn(),
            Self::Dense(l) => l.forward(params, into_ix2(x, "dense input")?)?.into_dyn(),
        };

        Ok(y)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let dx = match self {
            Self::Conv2d(l) => l
                .backward(params, grad, into_ix4(d, "conv2d delta")?)?
                .into_dyn(),
            Self::MaxPool2d(l) => l.backward(into_ix4(d, "max_pool2d delta")?)?.into_dyn(),
            Self::Flatten(l) => l.backward(into_ix2(d, "flatten delta")?)?.into_dyn(),
            Self::Dense(l) => l
                .backward(params, grad, into_ix2(d, "dense delta")?)?
                .into_dyn(),
        };

        Ok(dx)
    }
}
