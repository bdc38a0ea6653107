use machine_learning::dataset::{Batch, InMemoryDataset};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::ShardSpec;
use crate::Result;

/// Spreads the shuffle streams of different replicas apart.
const REPLICA_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// What a dataset function knows about the input pipeline it is building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputContext {
    pub num_input_pipelines: usize,
    pub input_pipeline_id: usize,
    pub num_replicas_in_sync: usize,
}

impl InputContext {
    /// The share of a global batch each replica processes.
    pub fn per_replica_batch_size(&self, global_batch_size: usize) -> usize {
        global_batch_size / self.num_replicas_in_sync
    }
}

/// A dataset iterated in lockstep by every replica of the cluster.
///
/// Every replica holds the full dataset, shuffles it on its own every epoch and walks it in
/// batches of the global batch size. The dataset must have the same length on every replica so
/// that all of them run the same amount of steps.
#[derive(Debug)]
pub struct DistributedDataset {
    dataset: InMemoryDataset,
    shard: ShardSpec,
    batch_size_per_replica: usize,
    seed: u64,
}

impl DistributedDataset {
    /// Creates a new `DistributedDataset`.
    ///
    /// # Arguments
    /// * `dataset` - The whole dataset, identical on every replica.
    /// * `shard` - This replica's place among the replicas in sync.
    /// * `batch_size_per_replica` - At least 1, scaled by the replicas into the batch size.
    /// * `seed` - The seed shared by every replica.
    pub fn new(
        dataset: InMemoryDataset,
        shard: ShardSpec,
        batch_size_per_replica: usize,
        seed: u64,
    ) -> Self {
        Self {
            dataset,
            shard,
            batch_size_per_replica: batch_size_per_replica.max(1),
            seed,
        }
    }

    pub fn global_batch_size(&self) -> usize {
        self.batch_size_per_replica * self.shard.num_replicas()
    }

    /// The amount of steps of every epoch, the last batch may be partial.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.global_batch_size())
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// The order in which this replica visits the samples of `epoch`.
    pub fn epoch_order(&self, epoch: usize) -> Vec<usize> {
        let stream = self
            .seed
            .wrapping_add(epoch as u64)
            .wrapping_add((self.shard.replica() as u64).wrapping_mul(REPLICA_STRIDE));

        let mut order: Vec<_> = (0..self.dataset.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(stream));
        order
    }

    /// Iterates over this replica's batches of `epoch`.
    pub fn epoch(&self, epoch: usize) -> EpochIter<'_> {
        EpochIter {
            source: self,
            order: self.epoch_order(epoch),
            step: 0,
        }
    }
}

/// This replica's batches of a single epoch.
pub struct EpochIter<'a> {
    source: &'a DistributedDataset,
    order: Vec<usize>,
    step: usize,
}

impl Iterator for EpochIter<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch_size = self.source.global_batch_size();
        let start = self.step * batch_size;
        if start >= self.order.len() {
            return None;
        }

        let end = (start + batch_size).min(self.order.len());
        self.step += 1;

        Some(self.source.dataset.gather(&self.order[start..end]).map_err(Into::into))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.source.num_batches().saturating_sub(self.step);
        (left, Some(left))
    }
}

impl ExactSizeIterator for EpochIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    /// `len` 1x1x1 images whose only pixel is their own index.
    fn numbered(len: usize) -> InMemoryDataset {
        let images = (0..len).map(|i| i as f32).collect();
        let labels = (0..len).map(|i| (i % 10) as u32).collect();
        InMemoryDataset::new(images, labels, (1, 1, 1)).unwrap()
    }

    fn sample_ids(batch: &Batch) -> Vec<usize> {
        batch.x.iter().map(|&v| v as usize).collect()
    }

    #[test]
    fn every_replica_visits_every_sample_once_per_epoch() {
        const LEN: usize = 23;
        const REPLICAS: usize = 3;

        for replica in 0..REPLICAS {
            let ds = DistributedDataset::new(numbered(LEN), ShardSpec::new(replica, REPLICAS), 4, 9);

            let mut seen = Vec::new();
            for batch in ds.epoch(0) {
                seen.extend(sample_ids(&batch.unwrap()));
            }

            seen.sort_unstable();
            assert_eq!(seen, (0..LEN).collect::<Vec<_>>());
        }
    }

    #[test]
    fn batches_hold_the_global_batch_size() {
        // 10 samples, 4 replicas of 2: batches of 8 and then the remaining 2.
        for replica in 0..4 {
            let ds = DistributedDataset::new(numbered(10), ShardSpec::new(replica, 4), 2, 0);
            let sizes: Vec<_> = ds.epoch(0).map(|batch| batch.unwrap().len()).collect();
            assert_eq!(sizes, vec![8, 2]);
        }
    }

    #[test]
    fn replicas_shuffle_on_their_own() {
        let a = DistributedDataset::new(numbered(50), ShardSpec::new(0, 2), 5, 42);
        let b = DistributedDataset::new(numbered(50), ShardSpec::new(1, 2), 5, 42);
        let again = DistributedDataset::new(numbered(50), ShardSpec::new(0, 2), 5, 42);

        assert_ne!(a.epoch_order(0), b.epoch_order(0));
        assert_ne!(a.epoch_order(0), a.epoch_order(1));
        assert_eq!(a.epoch_order(3), again.epoch_order(3));
    }

    #[test]
    fn global_batch_grows_with_the_replicas() {
        let ds = DistributedDataset::new(numbered(1000), ShardSpec::new(0, 3), 64, 0);
        assert_eq!(ds.global_batch_size(), 192);
        assert_eq!(ds.num_batches(), 6);
        assert_eq!(ds.epoch(0).len(), 6);
    }

    #[test]
    fn per_replica_batch_size_divides_the_global_one() {
        let ctx = InputContext {
            num_input_pipelines: 2,
            input_pipeline_id: 1,
            num_replicas_in_sync: 2,
        };
        assert_eq!(ctx.per_replica_batch_size(128), 64);
    }
}
