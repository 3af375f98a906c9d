//! Running a whole cluster of workers within a single process.

use std::thread;

use strand_core::{Address, Stats, Worker, WorkerConfig};

use crate::encoding::Encoding;
use crate::error::{Error, Result};
use crate::local::{LocalComm, LocalQueues};

/// Configuration of a local cluster.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Number of workers, each running on its own thread
    pub workers: usize,
    /// Encoding forced on every message, none by default
    pub encoding: Option<Encoding>,
    pub worker: WorkerConfig,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        LaunchConfig {
            workers: 1,
            encoding: None,
            worker: WorkerConfig::default(),
        }
    }
}

/// Stops worker 0 when a worker thread ends before being told to, either
/// by panicking or by failing. Worker 0 would otherwise wait forever, and
/// the failure would never be reported.
struct ExitGuard {
    queues: LocalQueues,
    index: usize,
    clean: bool,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.clean {
            return;
        }
        error!("worker {} exited abnormally, stopping the cluster", self.index);
        if let Err(e) = self.queues.request_shutdown(Address::new(0)) {
            error!("failed to stop worker 0: {}", e);
        }
    }
}

fn worker_config(config: &LaunchConfig, index: usize) -> WorkerConfig {
    WorkerConfig {
        seed: config.worker.seed.map(|s| s.wrapping_add(index as u64)),
        ..config.worker.clone()
    }
}

/// Launches a local cluster and runs `root` on the first worker.
///
/// Worker 0 runs on the calling thread, all the others get their own
/// threads. Once `root` returns, worker 0 keeps running until it's stopped,
/// either by itself or by a shutdown request from another worker. It then
/// tells everyone else to stop and waits for them. A worker thread that
/// panics or fails stops worker 0 as well, and is reported as an error.
///
/// Returns the counters of all workers, ordered by address.
pub fn launch_local<F>(config: LaunchConfig, root: F) -> Result<Vec<Stats>>
where
    F: FnOnce(&mut Worker) -> strand_core::Result<()>,
{
    if config.workers == 0 {
        return Err(Error::InvalidConfig(
            "cluster needs at least one worker".to_string(),
        ));
    }
    let queues = LocalQueues::new(config.workers);
    let mut root_worker = Worker::new(
        Box::new(LocalComm::new(queues.clone(), 0, config.encoding)?),
        worker_config(&config, 0),
    );

    let mut handles = Vec::with_capacity(config.workers - 1);
    for index in 1..config.workers {
        let comm = LocalComm::new(queues.clone(), index, config.encoding)?;
        let worker_config = worker_config(&config, index);
        let mut guard = ExitGuard {
            queues: queues.clone(),
            index,
            clean: false,
        };
        let handle = thread::Builder::new()
            .name(format!("strand-worker-{}", index))
            .spawn(move || -> strand_core::Result<Stats> {
                let mut worker = Worker::new(Box::new(comm), worker_config);
                worker.introduce(Address::new(0))?;
                worker.run()?;
                guard.clean = true;
                Ok(*worker.stats())
            })?;
        handles.push(handle);
    }
    info!(
        "launched {} workers, encoding: {}",
        config.workers,
        config
            .encoding
            .map(|e| e.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    let result = run_root(&mut root_worker, root);
    if let Err(e) = &result {
        error!("root worker failed: {}", e);
    }
    let shutdown = root_worker.shutdown();

    let mut stats = vec![*root_worker.stats()];
    for (n, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(worker_result) => stats.push(worker_result?),
            Err(_) => return Err(Error::WorkerPanicked(n + 1)),
        }
    }
    result?;
    shutdown?;
    Ok(stats)
}

fn run_root<F>(worker: &mut Worker, root: F) -> strand_core::Result<()>
where
    F: FnOnce(&mut Worker) -> strand_core::Result<()>,
{
    for id in 1..worker.n_workers() as u32 {
        worker.introduce(Address::new(id))?;
    }
    root(worker)?;
    worker.run()
}
