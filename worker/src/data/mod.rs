mod distributed;
mod shard;

pub use distributed::{DistributedDataset, EpochIter, InputContext};
pub use shard::{ShardSpec, shard_range};
