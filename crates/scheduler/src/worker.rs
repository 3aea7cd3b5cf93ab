//! Render worker pool.
//!
//! Workers share one request channel and pull jobs from it until the pool is
//! shut down or every sender has been dropped. Each worker runs on its own
//! named thread so a slow job never holds up the others.

use crate::SchedulerError;
use flume::{Receiver, RecvTimeoutError};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Upper bound on the default worker count.
const MAX_DEFAULT_WORKERS: usize = 4;

/// Callback run by a worker for every job it receives.
pub type JobHandler<J> = Arc<dyn Fn(J) + Send + Sync>;

/// Configuration for the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: available parallelism, capped at 4.
    pub num_workers: usize,

    /// Maximum time a worker waits for a job before checking for shutdown.
    /// Default: 50ms.
    pub poll_interval: Duration,

    /// Thread name prefix; workers are named `<prefix>-<n>`.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(default_workers())
    }
}

impl WorkerPoolConfig {
    /// `0` workers means "pick a default".
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: if num_workers == 0 { default_workers() } else { num_workers },
            poll_interval: Duration::from_millis(50),
            thread_name: "pageflow-render".to_string(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// A pool of threads draining one job channel.
pub struct WorkerPool {
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn the workers.
    ///
    /// If a thread fails to spawn, the workers already started are stopped
    /// and the error is returned.
    pub fn spawn<J>(
        jobs: Receiver<J>,
        handler: JobHandler<J>,
        config: &WorkerPoolConfig,
    ) -> Result<Self, SchedulerError>
    where
        J: Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut pool = Self { workers: Vec::with_capacity(config.num_workers), shutdown };

        for id in 0..config.num_workers.max(1) {
            let name = format!("{}-{}", config.thread_name, id);
            let worker = Worker::spawn(
                name,
                jobs.clone(),
                handler.clone(),
                pool.shutdown.clone(),
                config.poll_interval,
            );

            match worker {
                Ok(worker) => pool.workers.push(worker),
                Err(err) => {
                    pool.shutdown();
                    return Err(SchedulerError::Spawn(err));
                }
            }
        }

        log::debug!("started {} render workers", pool.workers.len());
        Ok(pool)
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Signal every worker to stop and wait for them.
    ///
    /// A worker in the middle of a job finishes it first. Calling this more
    /// than once is harmless.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Release);

        for worker in self.workers.drain(..) {
            worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    name: String,
    thread: JoinHandle<()>,
}

impl Worker {
    fn spawn<J>(
        name: String,
        jobs: Receiver<J>,
        handler: JobHandler<J>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> std::io::Result<Self>
    where
        J: Send + 'static,
    {
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::run(jobs, handler, shutdown, poll_interval))?;

        Ok(Self { name, thread })
    }

    fn run<J>(
        jobs: Receiver<J>,
        handler: JobHandler<J>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            match jobs.recv_timeout(poll_interval) {
                Ok(job) => handler(job),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn join(self) {
        if self.thread.join().is_err() {
            log::warn!("worker thread {} panicked", self.name);
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MAX_DEFAULT_WORKERS)
        .min(MAX_DEFAULT_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Instant;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert!(config.num_workers > 0);
        assert!(config.num_workers <= MAX_DEFAULT_WORKERS);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_zero_workers_means_default() {
        assert_eq!(WorkerPoolConfig::new(0).num_workers, default_workers());
        assert_eq!(WorkerPoolConfig::new(3).num_workers, 3);
    }

    #[test]
    fn test_worker_pool_executes_jobs() {
        let (tx, rx) = flume::unbounded::<usize>();
        let executed = Arc::new(AtomicUsize::new(0));
        let counter = executed.clone();
        let handler: JobHandler<usize> = Arc::new(move |_job| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut pool = WorkerPool::spawn(rx, handler, &WorkerPoolConfig::new(2)).unwrap();
        assert_eq!(pool.num_workers(), 2);

        for job in 0..5 {
            tx.send(job).unwrap();
        }

        assert!(wait_until(|| executed.load(Ordering::SeqCst) == 5));
        pool.shutdown();
        assert!(pool.is_shutting_down());
        assert_eq!(pool.num_workers(), 0);
    }

    #[test]
    fn test_workers_are_named() {
        let (tx, rx) = flume::unbounded::<()>();
        let names = Arc::new(Mutex::new(HashSet::new()));
        let seen = names.clone();
        let handler: JobHandler<()> = Arc::new(move |_| {
            if let Some(name) = thread::current().name() {
                seen.lock().unwrap().insert(name.to_string());
            }
            thread::sleep(Duration::from_millis(20));
        });

        let config = WorkerPoolConfig::new(1).with_thread_name("test-render");
        let _pool = WorkerPool::spawn(rx, handler, &config).unwrap();
        tx.send(()).unwrap();

        assert!(wait_until(|| names.lock().unwrap().contains("test-render-0")));
    }

    #[test]
    fn test_workers_exit_when_senders_drop() {
        let (tx, rx) = flume::unbounded::<()>();
        let handler: JobHandler<()> = Arc::new(|_| {});
        let config = WorkerPoolConfig::new(2).with_poll_interval(Duration::from_secs(60));
        let mut pool = WorkerPool::spawn(rx, handler, &config).unwrap();

        drop(tx);
        // Joins promptly because the channel disconnects, not because of the poll interval.
        let started = Instant::now();
        pool.shutdown();
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
