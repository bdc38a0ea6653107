use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::Result;

/// A classification loss over integer labels.
pub trait LossFn {
    /// The loss of every example of the batch, without any reduction.
    fn per_example(&self, y_pred: ArrayView2<f32>, y: &[u32]) -> Result<Array1<f32>>;

    /// The derivative of `compute_average_loss(per_example, global_batch_size)` with respect
    /// to `y_pred`.
    fn loss_prime(
        &self,
        y_pred: ArrayView2<f32>,
        y: &[u32],
        global_batch_size: usize,
    ) -> Result<Array2<f32>>;
}

/// Sums the per example losses and divides by the batch size of the whole cluster, so that
/// summing this value over every replica yields the mean loss of the global batch.
pub fn compute_average_loss(per_example: ArrayView1<f32>, global_batch_size: usize) -> f32 {
    if global_batch_size == 0 {
        return 0.;
    }

    per_example.sum() / global_batch_size as f32
}
