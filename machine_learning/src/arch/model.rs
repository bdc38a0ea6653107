use ndarray::{Array2, ArrayD};
use rand::Rng;

use crate::{
    Result,
    arch::loss::{LossFn, compute_average_loss},
};

/// The outcome of a single `Model::backprop` call.
#[derive(Debug)]
pub struct Backprop {
    /// This replica's share of the global batch loss.
    pub loss: f32,
    /// The model's output for the batch.
    pub logits: Array2<f32>,
}

pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Samples the initial values of every parameter of the model.
    fn init_params<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<f32>>;

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - The input data.
    ///
    /// # Returns
    /// The prediction for the given input or an error if occurred.
    fn forward(&mut self, params: &[f32], x: ArrayD<f32>) -> Result<Array2<f32>>;

    /// Propagates the delta of the output back through the network writing the gradient of
    /// every parameter into `grad`.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<()>;

    /// Computes the gradient of the loss function with respect to the parameters of the model
    /// over a batch. The loss is averaged over `global_batch_size` examples, the size of the
    /// batch of the whole cluster, so gradients of every replica can simply be summed.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - A buffer for writing the computed gradient.
    /// * `loss_fn` - The loss function.
    /// * `x` - The input batch.
    /// * `y` - The labels of the batch.
    /// * `global_batch_size` - The amount of examples processed by the cluster in this step.
    fn backprop<L: LossFn>(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        loss_fn: &L,
        x: ArrayD<f32>,
        y: &[u32],
        global_batch_size: usize,
    ) -> Result<Backprop> {
        let logits = self.forward(params, x)?;
        let per_example = loss_fn.per_example(logits.view(), y)?;
        let loss = compute_average_loss(per_example.view(), global_batch_size);

        let d = loss_fn.loss_prime(logits.view(), y, global_batch_size)?;
        self.backward(params, grad, d)?;

        Ok(Backprop { loss, logits })
    }
}
