use std::time::Duration;

use comms::specs::{ClusterSpec, FailFast};
use machine_learning::{
    arch::{Model, Sequential, layers::Layer},
    dataset::InMemoryDataset,
    optimization::Adam,
};
use tokio::net::TcpListener;
use worker::{ConnectOptions, EpochStats, MultiWorkerStrategy, Trainer};

const OPTIONS: ConnectOptions = ConnectOptions {
    attempts: 50,
    backoff: Duration::from_millis(20),
};

/// 2x2 images lit on the left column (class 0) or the right one (class 1), with some noise so
/// that gradients differ from sample to sample.
fn columns(len: usize) -> InMemoryDataset {
    let mut images = Vec::with_capacity(len * 4);
    let mut labels = Vec::with_capacity(len);
    for i in 0..len {
        let label = (i % 2) as u32;
        let noise = (i as f32 * 0.7).sin() * 0.1;
        let px = if label == 0 {
            [1., noise, 1. - noise, 0.]
        } else {
            [noise, 1., 0., 1. - noise]
        };
        images.extend_from_slice(&px);
        labels.push(label);
    }

    InMemoryDataset::new(images, labels, (2, 2, 1)).unwrap()
}

fn linear() -> Sequential {
    Sequential::new([Layer::flatten(), Layer::dense((4, 2), None)])
}

async fn run_replica(
    strategy: MultiWorkerStrategy,
    listener: TcpListener,
    batch_size_per_replica: usize,
    learning_rate: f32,
    epochs: usize,
) -> (Vec<f32>, Vec<EpochStats>) {
    let mut ring = strategy.connect_with(listener).await.unwrap();
    let seed = ring
        .broadcast_seed(strategy.is_chief().then_some(7))
        .await
        .unwrap();
    assert_eq!(seed, 7);

    let dataset = strategy
        .distribute_datasets_from_function(|_| Ok(columns(30)), batch_size_per_replica, seed)
        .unwrap();

    let model = linear();
    let adam = Adam::with_learning_rate(model.size(), learning_rate);
    let mut trainer = Trainer::new(ring, model, adam, dataset.global_batch_size(), seed)
        .await
        .unwrap();

    let mut stats = Vec::new();
    for epoch in 0..epochs {
        stats.push(trainer.train_epoch(&dataset, epoch).await.unwrap());
        trainer.reset_metrics();
    }

    (trainer.params().to_vec(), stats)
}

/// Starts `n` replicas on localhost and waits for all of them.
async fn run_cluster(
    n: usize,
    batch_size_per_replica: usize,
    learning_rate: f32,
    epochs: usize,
) -> Vec<(Vec<f32>, Vec<EpochStats>)> {
    let mut listeners = Vec::with_capacity(n);
    for _ in 0..n {
        listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
    }

    let hosts = listeners
        .iter()
        .map(|l| l.local_addr().unwrap().to_string())
        .collect::<Vec<_>>()
        .join(",");

    let handles: Vec<_> = listeners
        .into_iter()
        .enumerate()
        .map(|(task_index, listener)| {
            let cluster = ClusterSpec::from_hosts(&hosts, task_index).unwrap();
            let strategy = MultiWorkerStrategy::new(cluster, FailFast::UseCaller, OPTIONS);
            assert_eq!(strategy.num_replicas_in_sync(), n);

            tokio::spawn(run_replica(
                strategy,
                listener,
                batch_size_per_replica,
                learning_rate,
                epochs,
            ))
        })
        .collect();

    let mut out = Vec::with_capacity(n);
    for handle in handles {
        out.push(handle.await.unwrap());
    }
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replicas_stay_in_sync() {
    let replicas = run_cluster(3, 2, 0.01, 2).await;

    let (params, stats) = &replicas[0];
    for (other_params, other_stats) in &replicas[1..] {
        assert_eq!(other_params, params);
        assert_eq!(other_stats, stats);
    }

    // 30 examples in batches of 6.
    assert_eq!(stats[0].num_batches, 5);
    assert!((0. ..=1.).contains(&stats[0].accuracy));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn step_losses_add_up_over_the_workers() {
    // Frozen parameters: every worker sums the loss of the whole dataset once per epoch, so
    // the cluster reports three times what a single worker does with the same batch size.
    let cluster = run_cluster(3, 2, 0., 2).await;
    let single = run_cluster(1, 6, 0., 2).await;

    let (params, stats) = &cluster[0];
    let (expected_params, expected_stats) = &single[0];
    assert_eq!(params, expected_params);

    for (a, b) in stats.iter().zip(expected_stats) {
        assert_eq!(a.num_batches, b.num_batches);
        let expected = 3. * b.total_loss;
        assert!(
            (a.total_loss - expected).abs() < 1e-4 * expected.abs().max(1.),
            "{} vs {expected}",
            a.total_loss,
        );
        assert_eq!(a.accuracy, b.accuracy);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partial_last_batches_keep_replicas_in_lockstep() {
    // 30 examples in batches of 4 * 7: every worker ends the epoch on a batch of 2.
    let replicas = run_cluster(4, 7, 0.01, 1).await;

    let (params, stats) = &replicas[0];
    assert_eq!(stats[0].num_batches, 2);
    for (other_params, other_stats) in &replicas[1..] {
        assert_eq!(other_params, params);
        assert_eq!(other_stats, stats);
    }
}
