use std::mem;

use log::debug;
use machine_learning::{
    arch::{Backprop, Model, loss::SparseCategoricalCrossentropy},
    dataset::Batch,
    metrics::Accuracy,
    optimization::Optimizer,
};
use rand::{SeedableRng, rngs::StdRng};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task,
};

use crate::{
    Result, WorkerErr,
    data::DistributedDataset,
    net::Ring,
};

/// Values reduced next to the gradient every step: loss, correct predictions and examples seen.
const EXTRAS: usize = 3;

/// Logits are binarized against this value before scoring the accuracy.
pub const PREDICTION_THRESHOLD: f32 = 0.5;

/// What an epoch of training produced, identical on every replica.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochStats {
    /// The sum of the step losses, each one summed over every replica.
    pub total_loss: f32,
    pub num_batches: usize,
    /// Training accuracy accumulated since the last reset.
    pub accuracy: f64,
}

impl EpochStats {
    /// The mean step loss over the epoch.
    pub fn train_loss(&self) -> f32 {
        if self.num_batches == 0 {
            return 0.;
        }

        self.total_loss / self.num_batches as f32
    }
}

/// Trains one model replica in lockstep with every other worker of the ring.
///
/// Every step each replica computes the gradient of its own batch, the gradients are summed
/// across the ring and every replica applies the same optimizer update, so the parameters never
/// diverge.
///
/// Compute is CPU-bound and runs on Tokio's blocking pool, the buffers are moved in and out of
/// `self` to satisfy `'static` without copying.
pub struct Trainer<M, O, R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    ring: Ring<R, W>,
    model: Option<M>,
    params: Vec<f32>,
    /// The local gradient followed by the `EXTRAS`, reduced in place.
    buf: Vec<f32>,
    optimizer: O,
    loss_fn: SparseCategoricalCrossentropy,
    accuracy: Accuracy,
    global_batch_size: usize,
}

impl<M, O, R, W> Trainer<M, O, R, W>
where
    M: Model + Send + 'static,
    O: Optimizer,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates the replica: the parameters are initialized from `seed` and then synchronized
    /// with the chief's, so every worker starts from the same point.
    ///
    /// # Arguments
    /// * `ring` - This worker's handle on the ring.
    /// * `model` - The model architecture.
    /// * `optimizer` - The optimizer, sized for `model`.
    /// * `global_batch_size` - The examples processed by the whole cluster per step.
    /// * `seed` - The seed shared by every replica.
    pub async fn new(
        mut ring: Ring<R, W>,
        model: M,
        optimizer: O,
        global_batch_size: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut params = model.init_params(&mut rng)?;
        ring.broadcast_weights(&mut params).await?;

        let buf = vec![0.; params.len() + EXTRAS];
        Ok(Self {
            ring,
            model: Some(model),
            params,
            buf,
            optimizer,
            loss_fn: SparseCategoricalCrossentropy::new(),
            accuracy: Accuracy::new(),
            global_batch_size: global_batch_size.max(1),
        })
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn accuracy(&self) -> &Accuracy {
        &self.accuracy
    }

    pub fn reset_metrics(&mut self) {
        self.accuracy.reset();
    }

    pub fn ring(&self) -> &Ring<R, W> {
        &self.ring
    }

    /// Runs one synchronous step on this replica's `batch`.
    ///
    /// An empty `batch` still takes part in the reduction, contributing nothing.
    ///
    /// # Returns
    /// The sum of every replica's loss for this step.
    pub async fn train_step(&mut self, batch: Batch) -> Result<f32> {
        let mut model = self.model.take().ok_or(WorkerErr::ReplicaLost)?;
        let params = mem::take(&mut self.params);
        let mut buf = mem::take(&mut self.buf);
        let loss_fn = self.loss_fn;
        let global_batch_size = self.global_batch_size;

        let (model, params, buf, computed) = task::spawn_blocking(move || {
            let computed =
                local_gradient(&mut model, &params, &mut buf, &loss_fn, batch, global_batch_size);
            (model, params, buf, computed)
        })
        .await?;

        self.model = Some(model);
        self.params = params;
        self.buf = buf;
        computed?;

        self.ring.all_reduce_sum(&mut self.buf).await?;

        let (grad, extras) = self.buf.split_at(self.params.len());
        let (loss, correct, seen) = (extras[0], extras[1], extras[2]);
        self.accuracy.merge(correct as u64, seen as u64);
        self.optimizer.update_params(grad, &mut self.params)?;

        Ok(loss)
    }

    /// Runs every step of `epoch` over this replica's batches of `dataset`.
    pub async fn train_epoch(
        &mut self,
        dataset: &DistributedDataset,
        epoch: usize,
    ) -> Result<EpochStats> {
        let mut total_loss = 0.;
        let mut num_batches = 0;

        for batch in dataset.epoch(epoch) {
            let loss = self.train_step(batch?).await?;
            total_loss += loss;
            num_batches += 1;
            debug!(epoch = epoch, step = num_batches; "step loss {loss:.4}");
        }

        let (sent, received) = self.ring.traffic();
        debug!(epoch = epoch; "ring traffic so far: {sent} bytes sent, {received} bytes received");

        Ok(EpochStats {
            total_loss,
            num_batches,
            accuracy: self.accuracy.result(),
        })
    }
}

/// Writes the gradient of this replica's share of the loss into the head of `buf` and the
/// `EXTRAS` into its tail.
fn local_gradient<M: Model>(
    model: &mut M,
    params: &[f32],
    buf: &mut [f32],
    loss_fn: &SparseCategoricalCrossentropy,
    batch: Batch,
    global_batch_size: usize,
) -> Result<()> {
    if buf.len() != params.len() + EXTRAS {
        return Err(WorkerErr::LengthMismatch {
            what: "gradient buffer",
            got: buf.len(),
            expected: params.len() + EXTRAS,
        });
    }

    let (grad, extras) = buf.split_at_mut(params.len());
    if batch.is_empty() {
        grad.fill(0.);
        extras.fill(0.);
        return Ok(());
    }

    let Batch { x, y } = batch;
    let Backprop { loss, logits } =
        model.backprop(params, grad, loss_fn, x.into_dyn(), &y, global_batch_size)?;
    let correct = Accuracy::new().update_above(logits.view(), &y, PREDICTION_THRESHOLD);

    extras.copy_from_slice(&[loss, correct as f32, y.len() as f32]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use machine_learning::{
        arch::{Sequential, layers::Layer},
        dataset::InMemoryDataset,
        optimization::{Adam, GradientDescent},
    };

    use super::*;
    use crate::{data::ShardSpec, net::TcpRing};

    /// 2x2 images lit on the left column (class 0) or the right one (class 1).
    fn columns(len: usize) -> InMemoryDataset {
        let mut images = Vec::with_capacity(len * 4);
        let mut labels = Vec::with_capacity(len);
        for i in 0..len {
            let label = (i % 2) as u32;
            let px = if label == 0 { [1., 0., 1., 0.] } else { [0., 1., 0., 1.] };
            images.extend_from_slice(&px);
            labels.push(label);
        }

        InMemoryDataset::new(images, labels, (2, 2, 1)).unwrap()
    }

    fn linear() -> Sequential {
        Sequential::new([Layer::flatten(), Layer::dense((4, 2), None)])
    }

    #[tokio::test]
    async fn single_replica_learns_separable_data() {
        let dataset = DistributedDataset::new(columns(64), ShardSpec::new(0, 1), 8, 3);
        let model = linear();
        let adam = Adam::with_learning_rate(model.size(), 0.05);
        let mut trainer = Trainer::new(TcpRing::single(), model, adam, 8, 3).await.unwrap();

        let first = trainer.train_epoch(&dataset, 0).await.unwrap();
        trainer.reset_metrics();

        let mut last = first;
        for epoch in 1..10 {
            last = trainer.train_epoch(&dataset, epoch).await.unwrap();
            trainer.reset_metrics();
        }

        assert_eq!(first.num_batches, 8);
        assert!(last.train_loss() < first.train_loss());
        assert!(last.accuracy > 0.99, "accuracy {}", last.accuracy);
    }

    #[tokio::test]
    async fn empty_batches_leave_the_parameters_untouched() {
        let model = linear();
        let sgd = GradientDescent::new(0.1);
        let mut trainer = Trainer::new(TcpRing::single(), model, sgd, 4, 0).await.unwrap();
        let before = trainer.params().to_vec();

        let empty = columns(0).gather(&[]).unwrap();
        let loss = trainer.train_step(empty).await.unwrap();

        assert_eq!(loss, 0.);
        assert_eq!(trainer.params(), before.as_slice());
        assert_eq!(trainer.accuracy().total(), 0);
    }

    #[tokio::test]
    async fn step_loss_is_averaged_over_the_global_batch() {
        let model = linear();
        let sgd = GradientDescent::new(0.);
        // The global batch holds twice the examples this replica gets.
        let mut trainer = Trainer::new(TcpRing::single(), model, sgd, 8, 1).await.unwrap();
        let mut full = Trainer::new(TcpRing::single(), linear(), GradientDescent::new(0.), 4, 1)
            .await
            .unwrap();

        let data = columns(4);
        let half = trainer.train_step(data.gather(&[0, 1, 2, 3]).unwrap()).await.unwrap();
        let whole = full.train_step(data.gather(&[0, 1, 2, 3]).unwrap()).await.unwrap();

        assert!((half * 2. - whole).abs() < 1e-6);
        assert_eq!(trainer.accuracy().total(), 4);
    }
}
