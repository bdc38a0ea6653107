use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use super::LossFn;
use crate::{MlErr, Result};

/// Cross entropy between integer labels and unnormalized logits.
#[derive(Default, Clone, Copy, Debug)]
pub struct SparseCategoricalCrossentropy;

impl SparseCategoricalCrossentropy {
    pub fn new() -> Self {
        Self
    }

    fn check(y_pred: &ArrayView2<f32>, y: &[u32]) -> Result<()> {
        if y_pred.nrows() != y.len() {
            return Err(MlErr::SizeMismatch {
                what: "labels",
                got: y.len(),
                expected: y_pred.nrows(),
            });
        }

        let classes = y_pred.ncols();
        if let Some(&label) = y.iter().find(|&&label| label as usize >= classes) {
            return Err(MlErr::SizeMismatch {
                what: "label class",
                got: label as usize,
                expected: classes,
            });
        }

        Ok(())
    }
}

fn log_sum_exp(row: ArrayView1<f32>) -> f32 {
    let max = row.fold(f32::NEG_INFINITY, |m, &z| m.max(z));
    max + row.mapv(|z| (z - max).exp()).sum().ln()
}

impl LossFn for SparseCategoricalCrossentropy {
    fn per_example(&self, y_pred: ArrayView2<f32>, y: &[u32]) -> Result<Array1<f32>> {
        Self::check(&y_pred, y)?;

        let losses = y_pred
            .axis_iter(Axis(0))
            .zip(y)
            .map(|(row, &label)| log_sum_exp(row) - row[label as usize])
            .collect();

        Ok(losses)
    }

    fn loss_prime(
        &self,
        y_pred: ArrayView2<f32>,
        y: &[u32],
        global_batch_size: usize,
    ) -> Result<Array2<f32>> {
        Self::check(&y_pred, y)?;

        let scale = 1. / global_batch_size.max(1) as f32;
        let mut d = y_pred.to_owned();

        for (mut row, &label) in d.axis_iter_mut(Axis(0)).zip(y) {
            let lse = log_sum_exp(row.view());
            row.mapv_inplace(|z| (z - lse).exp() * scale);
            row[label as usize] -= scale;
        }

        Ok(d)
    }
}
