use std::{env, future::Future, io};

use comms::specs::{CLUSTER_CONFIG_ENV, ClusterSpec, FAIL_FAST_ENV, FailFast};
use log::info;
use machine_learning::{
    arch::{Model, Sequential},
    dataset::fashion_mnist::{self, Split},
    optimization::Adam,
};
use tracking::Experiment;
use worker::{MultiWorkerStrategy, Trainer};

use crate::args::Args;

pub const PROJECT_NAME: &str = "tf-distributed-multiworker-mirrored";

/// Publishes the cluster descriptor and the fail fast mode for `MultiWorkerStrategy::from_env`.
///
/// # Safety
/// No other thread may read or write the process environment meanwhile.
pub unsafe fn export_cluster(cluster: &ClusterSpec) {
    // SAFETY: upheld by the caller.
    unsafe {
        env::set_var(CLUSTER_CONFIG_ENV, cluster.to_json());
        env::set_var(FAIL_FAST_ENV, FailFast::UseCaller.as_str());
    }
}

/// Opens the run's experiment and logs its metadata, only on the chief.
pub async fn open_experiment(args: &Args) -> io::Result<Option<Experiment>> {
    if args.task_index != 0 {
        return Ok(None);
    }

    let mut experiment = Experiment::open(args.tracker, PROJECT_NAME, &args.tracking_dir).await?;
    experiment.log_other("run_id", args.run_id).await?;
    experiment
        .log_other("worker_hosts", args.worker_hosts.as_str())
        .await?;

    Ok(Some(experiment))
}

/// Trains this worker's replica, expects the cluster to be exported already.
pub async fn train(args: Args) -> io::Result<()> {
    let config = args.train_config();
    let mut experiment = open_experiment(&args).await?;

    let strategy = MultiWorkerStrategy::from_env(args.connect_options())?;
    let mut ring = strategy.connect().await?;
    let seed = ring.broadcast_seed(args.seed).await?;

    let dataset = strategy.distribute_datasets_from_function(
        |_| fashion_mnist::load(&args.data_dir, Split::Train),
        config.batch_size_per_replica,
        seed,
    )?;

    let model = Sequential::fashion_cnn();
    let optimizer = Adam::with_learning_rate(model.size(), config.learning_rate);
    let mut trainer =
        Trainer::new(ring, model, optimizer, dataset.global_batch_size(), seed).await?;

    for epoch in 0..config.epochs {
        let stats = trainer.train_epoch(&dataset, epoch).await?;

        if let Some(experiment) = experiment.as_mut() {
            experiment
                .log_metric("train_loss", f64::from(stats.train_loss()), epoch)
                .await?;
        }

        println!("Finished epoch {epoch}, accuracy is {:.6}.", stats.accuracy);
        trainer.reset_metrics();
    }

    if let Some(experiment) = experiment {
        experiment.end().await?;
    }

    Ok(())
}

/// Drives `training` to completion unless `interrupt` fires first.
///
/// # Errors
/// Whatever `training` fails with, or `ErrorKind::Interrupted` if it was cut short.
pub async fn until_interrupted<T, S>(training: T, interrupt: S) -> io::Result<()>
where
    T: Future<Output = io::Result<()>>,
    S: Future<Output = io::Result<()>>,
{
    tokio::select! {
        ret = training => {
            ret?;
            info!("training finished, disconnecting...");
            Ok(())
        }
        _ = interrupt => {
            Err(io::Error::new(io::ErrorKind::Interrupted, "received SIGINT"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, future, path::Path, sync::Mutex};

    use clap::Parser;
    use machine_learning::dataset::idx;
    use serde_json::Value;

    use super::*;

    static ENV: Mutex<()> = Mutex::new(());

    fn parse(task_index: usize, hosts: &str, data: &Path, tracking: &Path) -> Args {
        Args::try_parse_from([
            "node",
            "--run_id",
            "-3",
            "--worker_hosts",
            hosts,
            "--task_index",
            &task_index.to_string(),
            "--data-dir",
            data.to_str().unwrap(),
            "--tracking-dir",
            tracking.to_str().unwrap(),
            "--epochs",
            "2",
            "--batch-size-per-replica",
            "2",
            "--seed",
            "5",
        ])
        .unwrap()
    }

    /// Every record of every experiment file under `dir`.
    fn records(dir: &Path) -> Vec<Value> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };

        entries
            .flat_map(|entry| {
                let text = fs::read_to_string(entry.unwrap().path()).unwrap();
                text.lines()
                    .map(|line| serde_json::from_str(line).unwrap())
                    .collect::<Vec<Value>>()
            })
            .collect()
    }

    /// Writes `len` 28x28 training images to `dir`.
    fn write_train_split(dir: &Path, len: usize) {
        let pixels: Vec<u8> = (0..len * 28 * 28).map(|i| (i % 251) as u8).collect();
        let labels: Vec<u8> = (0..len).map(|i| (i % 10) as u8).collect();

        fs::write(dir.join("train-images-idx3-ubyte"), idx::encode(&[len, 28, 28], &pixels))
            .unwrap();
        fs::write(dir.join("train-labels-idx1-ubyte"), idx::encode(&[len], &labels)).unwrap();
    }

    #[tokio::test]
    async fn only_the_chief_opens_an_experiment() {
        let data = tempfile::tempdir().unwrap();
        let tracking = tempfile::tempdir().unwrap();
        let hosts = "10.0.0.1:2222,10.0.0.2:2222";

        let worker = open_experiment(&parse(1, hosts, data.path(), tracking.path()))
            .await
            .unwrap();
        assert!(worker.is_none());
        assert!(records(tracking.path()).is_empty());

        let chief = open_experiment(&parse(0, hosts, data.path(), tracking.path()))
            .await
            .unwrap()
            .unwrap();
        chief.end().await.unwrap();

        let records = records(tracking.path());
        let other = |key: &str| {
            records
                .iter()
                .find(|r| r["kind"] == "other" && r["key"] == key)
                .map(|r| r["value"].clone())
        };

        assert_eq!(records[0]["value"], PROJECT_NAME);
        assert_eq!(other("run_id"), Some(Value::from(-3)));
        assert_eq!(other("worker_hosts"), Some(Value::from(hosts)));
    }

    #[tokio::test]
    async fn a_single_worker_run_logs_the_train_loss_of_every_epoch() {
        let _guard = ENV.lock().unwrap();
        let data = tempfile::tempdir().unwrap();
        let tracking = tempfile::tempdir().unwrap();
        write_train_split(data.path(), 5);

        let args = parse(0, "127.0.0.1:0", data.path(), tracking.path());
        let cluster = ClusterSpec::from_hosts(&args.worker_hosts, args.task_index).unwrap();
        // SAFETY: every test touching the environment holds `ENV`.
        unsafe { export_cluster(&cluster) };

        train(args).await.unwrap();

        let losses: Vec<_> = records(tracking.path())
            .into_iter()
            .filter(|r| r["kind"] == "metric" && r["key"] == "train_loss")
            .collect();

        assert_eq!(losses.len(), 2);
        assert_eq!(losses[0]["epoch"], 0);
        assert_eq!(losses[1]["epoch"], 1);
        assert!(losses.iter().all(|r| r["value"].as_f64().is_some_and(f64::is_finite)));
    }

    #[tokio::test]
    async fn finished_training_wins_over_a_pending_interrupt() {
        let interrupt = future::pending::<io::Result<()>>();
        let ret = until_interrupted(future::ready(Ok::<_, io::Error>(())), interrupt).await;
        assert!(ret.is_ok());
    }

    #[tokio::test]
    async fn an_interrupt_cuts_training_short_with_an_error() {
        let training = future::pending::<io::Result<()>>();
        let interrupt = future::ready(Ok::<_, io::Error>(()));
        let err = until_interrupted(training, interrupt).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }

    #[tokio::test]
    async fn training_errors_are_returned() {
        let failing = async { Err::<(), _>(io::Error::other("ring broke")) };
        let interrupt = future::pending::<io::Result<()>>();
        let err = until_interrupted(failing, interrupt).await.unwrap_err();
        assert_eq!(err.to_string(), "ring broke");
    }
}
