//! Background worker pool.
//!
//! Long-running work (mirroring, full replays) is decoupled from the
//! request/response cycle: callers enqueue a job and return; a fixed set
//! of worker threads drains the queue. Each job body runs inside
//! `run_with_index`, which owns the index connection for exactly the span
//! of the job and releases it on every exit path.

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, unbounded};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::index::SqliteIndex;
use crate::mirror;
use crate::{Error, Result};

/// A unit of background work.
#[derive(Debug, Clone)]
pub enum Job {
    /// Push one project to its configured mirrors.
    MirrorProject { project: String },
}

/// Handle used to enqueue jobs. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    tx: Sender<Job>,
}

impl JobQueue {
    /// Enqueue a job. Returns false if the pool has shut down.
    pub fn submit(&self, job: Job) -> bool {
        self.tx.send(job).is_ok()
    }
}

/// The worker threads. Dropping the last `JobQueue` drains and stops them.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Wait for all workers to finish. Call after dropping every queue
    /// handle.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Spawn the pool configured in `config.jobs`.
pub fn spawn(config: Arc<Config>) -> (JobQueue, WorkerPool) {
    let (tx, rx) = unbounded::<Job>();
    let workers = config.jobs.workers.max(1);
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let rx: Receiver<Job> = rx.clone();
        let config = Arc::clone(&config);
        handles.push(std::thread::spawn(move || {
            info!(worker, "job worker started");
            for job in rx.iter() {
                run_job(&config, &job);
            }
            info!(worker, "job worker stopped");
        }));
    }
    (JobQueue { tx }, WorkerPool { handles })
}

fn run_job(config: &Config, job: &Job) {
    match job {
        Job::MirrorProject { project } => {
            let outcome = run_with_index(&config.storage.index_db, |index| {
                mirror::mirror_project(config, index, project).map_err(Error::from)
            });
            match outcome {
                Ok(mirror::MirrorOutcome::Completed {
                    pushed,
                    failed,
                    timed_out,
                }) => {
                    info!(%project, pushed, failed, timed_out, "mirror job finished");
                }
                Ok(mirror::MirrorOutcome::Skipped(reason)) => {
                    warn!(%project, %reason, "mirror job skipped");
                }
                Err(e) => {
                    error!(%project, error = %e, "mirror job failed");
                }
            }
        }
    }
}

/// Run a job body with a scoped index connection.
///
/// The connection is opened just for the body and released on every exit
/// path — success, error, or panic unwinding — because it is owned by this
/// frame.
pub fn run_with_index<T, F>(db_path: &Path, body: F) -> Result<T>
where
    F: FnOnce(&mut SqliteIndex) -> Result<T>,
{
    let mut index = SqliteIndex::open(db_path)?;
    body(&mut index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_drains_jobs_and_stops() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.index_db = tmp.path().join("index.sqlite");
        config.storage.git_folder = tmp.path().join("repos");
        config.mirror.keys_dir = tmp.path().join("keys");
        config.jobs.workers = 2;

        let (queue, pool) = spawn(Arc::new(config));
        // Unknown project: the job runs and is skipped, nothing panics.
        assert!(queue.submit(Job::MirrorProject {
            project: "tools".into()
        }));
        drop(queue);
        pool.join();
    }

    #[test]
    fn run_with_index_propagates_body_result() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("index.sqlite");
        let n = run_with_index(&db, |_index| Ok(41 + 1)).unwrap();
        assert_eq!(n, 42);
    }
}
