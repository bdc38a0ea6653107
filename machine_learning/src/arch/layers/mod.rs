mod conv2d;
mod dense;
mod flatten;
mod layer;
mod max_pool2d;

use ndarray::{Array, ArrayD, Dimension, IntoDimension, Ix2, Ix4};

pub use conv2d::Conv2d;
pub use dense::Dense;
pub use flatten::Flatten;
pub use layer::Layer;
pub use max_pool2d::MaxPool2d;

use crate::{MlErr, Result};

/// Reshapes an owned array, copying it into standard layout first if needed.
pub(crate) fn reshape<D, E>(x: Array<f32, D>, shape: E) -> Result<Array<f32, E::Dim>>
where
    D: Dimension,
    E: IntoDimension,
{
    let shape = shape.into_dimension();
    let got = x.shape().to_vec();
    let expected = shape.slice().to_vec();

    let x = if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    };

    x.into_shape_with_order(shape)
        .map_err(|_| MlErr::ShapeMismatch {
            what: "reshape",
            got,
            expected,
        })
}

pub(crate) fn into_ix2(x: ArrayD<f32>, what: &'static str) -> Result<Array<f32, Ix2>> {
    let got = x.shape().to_vec();
    x.into_dimensionality().map_err(|_| MlErr::ShapeMismatch {
        what,
        got,
        expected: vec![0, 0],
    })
}

pub(crate) fn into_ix4(x: ArrayD<f32>, what: &'static str) -> Result<Array<f32, Ix4>> {
    let got = x.shape().to_vec();
    x.into_dimensionality().map_err(|_| MlErr::ShapeMismatch {
        what,
        got,
        expected: vec![0, 0, 0, 0],
    })
}

/// Fails unless `slice` holds exactly `expected` values.
fn check_len(what: &'static str, slice: &[f32], expected: usize) -> Result<()> {
    if slice.len() != expected {
        return Err(MlErr::SizeMismatch {
            what,
            got: slice.len(),
            expected,
        });
    }

    Ok(())
}
