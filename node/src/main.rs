mod args;
mod train;

use std::{io, process::ExitCode};

use clap::Parser;
use comms::specs::ClusterSpec;
use log::error;
use tokio::{runtime, signal};
use worker::WorkerErr;

use crate::args::Args;

/// The status shells report for a process stopped by SIGINT.
const INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
            error!("{e}");
            ExitCode::from(INTERRUPTED)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> io::Result<()> {
    let cluster =
        ClusterSpec::from_hosts(&args.worker_hosts, args.task_index).map_err(WorkerErr::from)?;

    // SAFETY: no other thread exists yet, the runtime is only built below.
    unsafe { train::export_cluster(&cluster) };

    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(train::until_interrupted(train::train(args), signal::ctrl_c()))
}
