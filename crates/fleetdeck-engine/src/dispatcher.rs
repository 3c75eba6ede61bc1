//! Bounded fan-out of jobs onto the runner.

use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use fleetdeck_runner::{send_text, CancellationSignal, CommandResult, CommandRunner, RunnerError};
use fleetdeck_types::{BatchId, CommandRequest, DeviceSerial};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// One step of a per-device job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Run(CommandRequest),
    /// Type text on the job's device, one character per invocation.
    TypeText(String),
    Pause(Duration),
}

/// A unit of work for one device. Steps run in order; the first failing
/// step ends the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub serial: Option<DeviceSerial>,
    pub steps: Vec<Step>,
}

impl Job {
    pub fn sequence(serial: DeviceSerial, steps: Vec<Step>) -> Self {
        Self {
            serial: Some(serial),
            steps,
        }
    }
}

impl From<CommandRequest> for Job {
    fn from(request: CommandRequest) -> Self {
        Self {
            serial: request.serial.clone(),
            steps: vec![Step::Run(request)],
        }
    }
}

/// Runs jobs concurrently on a pool of `workers` permits.
///
/// Every job captures the [`CancellationSignal`]'s current token when it is
/// submitted. [`stop_all`](Self::stop_all) cancels that token, waits for
/// every outstanding task, then installs a fresh pool.
pub struct Dispatcher {
    runner: Arc<dyn CommandRunner>,
    signal: CancellationSignal,
    workers: usize,
    permits: RwLock<Arc<Semaphore>>,
    tracker: TaskTracker,
    stopping: Mutex<()>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn CommandRunner>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            runner,
            signal: CancellationSignal::new(),
            workers,
            permits: RwLock::new(Arc::new(Semaphore::new(workers))),
            tracker: TaskTracker::new(),
            stopping: Mutex::new(()),
        }
    }

    /// Pool size for `workers_per_core` on this machine.
    pub fn workers_for(workers_per_core: usize) -> usize {
        let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        workers_per_core.max(1).saturating_mul(cores)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    /// Run every job and return one result per job, in submission order.
    pub async fn dispatch(&self, jobs: Vec<Job>) -> Vec<CommandResult> {
        self.dispatch_batch(BatchId::new(), jobs).await
    }

    /// [`dispatch`](Self::dispatch) under a caller-chosen batch id.
    pub async fn dispatch_batch(&self, batch: BatchId, jobs: Vec<Job>) -> Vec<CommandResult> {
        let token = self.signal.token();
        if token.is_cancelled() {
            debug!(batch = %batch, jobs = jobs.len(), "stop in progress, rejecting batch");
            return jobs
                .into_iter()
                .map(|job| CommandResult::cancelled(job.serial))
                .collect();
        }

        info!(batch = %batch, jobs = jobs.len(), "dispatching");
        let permits = Arc::clone(
            &self
                .permits
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let serial = job.serial.clone();
                let runner = Arc::clone(&self.runner);
                let permits = Arc::clone(&permits);
                let token = token.clone();
                let handle = self.tracker.spawn(async move {
                    let _permit = tokio::select! {
                        biased;
                        () = token.cancelled() => return CommandResult::cancelled(job.serial),
                        permit = permits.acquire_owned() => match permit {
                            Ok(p) => p,
                            Err(_) => return CommandResult::cancelled(job.serial),
                        },
                    };
                    // A stop ends the job even if the runner is slow to notice.
                    let serial = job.serial.clone();
                    tokio::select! {
                        biased;
                        () = token.cancelled() => CommandResult::cancelled(serial),
                        result = run_job(runner.as_ref(), job, &token) => result,
                    }
                });
                (serial, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (serial, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(batch = %batch, error = %e, "job task failed");
                    CommandResult::new(
                        serial,
                        Err(RunnerError::Other(anyhow::anyhow!("job task failed: {e}"))),
                    )
                }
            };
            results.push(result);
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(batch = %batch, total = results.len(), failed, "batch complete");
        results
    }

    /// Cancel everything queued or running and wait for it to drain.
    ///
    /// New dispatches are rejected until this returns.
    pub async fn stop_all(&self) {
        let _guard = self.stopping.lock().await;
        info!("stopping all operations");
        self.signal.set();
        self.tracker.close();
        self.tracker.wait().await;

        *self
            .permits
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) =
            Arc::new(Semaphore::new(self.workers));
        self.tracker.reopen();
        self.signal.clear();
        info!("all operations stopped");
    }

    /// Number of tasks not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}

async fn run_job(runner: &dyn CommandRunner, job: Job, token: &CancellationToken) -> CommandResult {
    let serial = job.serial;
    let mut stdout = Vec::new();
    for step in job.steps {
        if token.is_cancelled() {
            return CommandResult::cancelled(serial);
        }
        let outcome = match step {
            Step::Run(request) => runner.run(&request, token).await.map(|out| stdout = out),
            Step::TypeText(text) => match &serial {
                Some(s) => send_text(runner, s, &text, token).await.map(|_| ()),
                None => Err(RunnerError::Other(anyhow::anyhow!(
                    "text input needs a target device"
                ))),
            },
            Step::Pause(delay) => {
                tokio::select! {
                    () = token.cancelled() => Err(RunnerError::Cancelled),
                    () = tokio::time::sleep(delay) => Ok(()),
                }
            }
        };
        if let Err(e) = outcome {
            if !e.is_cancelled() {
                debug!(serial = ?serial, error = %e, "job failed");
            }
            return CommandResult::new(serial, Err(e));
        }
    }
    CommandResult::new(serial, Ok(stdout))
}
