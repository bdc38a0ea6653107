use std::ops::Range;

/// Splits `total` samples among `num_replicas` and returns the slice owned by `replica`.
///
/// Properties:
/// - Ranges are contiguous, disjoint and cover `[0..total)`.
/// - Sizes differ by at most 1, the first `total % num_replicas` replicas take the extra one.
pub fn shard_range(total: usize, replica: usize, num_replicas: usize) -> Range<usize> {
    assert!(num_replicas > 0);
    assert!(replica < num_replicas);

    let base = total / num_replicas;
    let rem = total % num_replicas;

    let start = replica * base + replica.min(rem);
    let extra = usize::from(replica < rem);
    let end = start + base + extra;

    start..end
}

/// The place of a replica among the replicas in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSpec {
    replica: usize,
    num_replicas: usize,
}

impl ShardSpec {
    /// # Panics
    /// If `replica` is not smaller than `num_replicas`.
    pub fn new(replica: usize, num_replicas: usize) -> Self {
        assert!(replica < num_replicas, "replica out of range");
        Self {
            replica,
            num_replicas,
        }
    }

    pub fn replica(self) -> usize {
        self.replica
    }

    pub fn num_replicas(self) -> usize {
        self.num_replicas
    }
}
