use comms::specs::{ClusterSpec, FailFast};
use log::info;
use machine_learning::dataset::InMemoryDataset;
use tokio::net::TcpListener;

use crate::{
    Result,
    config::{ConnectOptions, RetryPolicy},
    data::{DistributedDataset, InputContext, ShardSpec},
    net::{self, Ring, TcpRing},
};

/// Synchronous data parallelism across the workers of a cluster: every worker holds a full
/// replica of the model and gradients are summed over all of them every step.
#[derive(Debug, Clone)]
pub struct MultiWorkerStrategy {
    cluster: ClusterSpec,
    policy: RetryPolicy,
}

impl MultiWorkerStrategy {
    /// Creates a new `MultiWorkerStrategy` out of the process environment.
    ///
    /// Reads the cluster descriptor from `CLUSTER_CONFIG` and the fail fast mode from
    /// `RPC_FAIL_FAST`.
    ///
    /// # Arguments
    /// * `options` - The retry settings honored under `RPC_FAIL_FAST=use_caller`.
    pub fn from_env(options: ConnectOptions) -> Result<Self> {
        let cluster = ClusterSpec::from_env()?;
        let fail_fast = FailFast::from_env()?;
        Ok(Self::new(cluster, fail_fast, options))
    }

    pub fn new(cluster: ClusterSpec, fail_fast: FailFast, options: ConnectOptions) -> Self {
        info!(
            "multi worker strategy: task {} of {}, fail fast {}",
            cluster.task_index(),
            cluster.num_workers(),
            fail_fast.as_str(),
        );

        Self {
            cluster,
            policy: RetryPolicy::new(fail_fast, options),
        }
    }

    pub fn num_replicas_in_sync(&self) -> usize {
        self.cluster.num_workers()
    }

    pub fn task_index(&self) -> usize {
        self.cluster.task_index()
    }

    pub fn is_chief(&self) -> bool {
        self.cluster.is_chief()
    }

    pub fn cluster(&self) -> &ClusterSpec {
        &self.cluster
    }

    pub fn shard(&self) -> ShardSpec {
        ShardSpec::new(self.task_index(), self.num_replicas_in_sync())
    }

    /// Binds this worker's own address and joins the ring.
    pub async fn connect(&self) -> Result<TcpRing> {
        if self.num_replicas_in_sync() == 1 {
            return Ok(Ring::single());
        }

        let listener = TcpListener::bind(self.cluster.own_host()).await?;
        info!("listening at {}", self.cluster.own_host());
        self.connect_with(listener).await
    }

    /// Joins the ring accepting the predecessor on an already bound `listener`.
    ///
    /// Dialing the successor and accepting the predecessor happen concurrently, so every worker
    /// can start in any order.
    pub async fn connect_with(&self, listener: TcpListener) -> Result<TcpRing> {
        let n = self.num_replicas_in_sync();
        let rank = self.task_index();
        if n == 1 {
            return Ok(Ring::single());
        }

        let (rx, tx) = tokio::try_join!(
            net::accept_predecessor(&listener, self.cluster.predecessor_index(), n),
            net::join_successor(self.cluster.successor_host(), self.policy, rank, n),
        )?;

        info!("ring of {n} workers established");
        Ok(Ring::new(rank, n, rx, tx))
    }

    /// Builds this replica's view of the training data.
    ///
    /// # Arguments
    /// * `dataset_fn` - Builds the whole dataset given the input pipeline it belongs to.
    /// * `batch_size_per_replica` - Examples per replica per step.
    /// * `seed` - The seed shared by every replica.
    pub fn distribute_datasets_from_function<F>(
        &self,
        dataset_fn: F,
        batch_size_per_replica: usize,
        seed: u64,
    ) -> Result<DistributedDataset>
    where
        F: FnOnce(&InputContext) -> machine_learning::Result<InMemoryDataset>,
    {
        let ctx = InputContext {
            num_input_pipelines: self.num_replicas_in_sync(),
            input_pipeline_id: self.task_index(),
            num_replicas_in_sync: self.num_replicas_in_sync(),
        };

        let dataset = dataset_fn(&ctx)?;
        info!(
            "distributing {} examples, global batch size {}",
            dataset.len(),
            batch_size_per_replica * ctx.num_replicas_in_sync,
        );

        Ok(DistributedDataset::new(
            dataset,
            self.shard(),
            batch_size_per_replica,
            seed,
        ))
    }
}
