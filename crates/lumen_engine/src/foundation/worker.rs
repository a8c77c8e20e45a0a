//! Background worker thread
//!
//! Runs closures off the render thread and posts their results to a
//! completion channel that the render thread polls once per frame.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

/// Worker failures
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The worker thread is gone
    #[error("Worker disconnected")]
    Disconnected,

    /// The OS refused to start the thread
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

type Job<R> = Box<dyn FnOnce() -> R + Send>;

/// Single background thread with a job queue and a completion queue
pub struct Worker<R: Send + 'static> {
    name: String,
    jobs: Option<Sender<Job<R>>>,
    completed: Receiver<R>,
    thread: Option<JoinHandle<()>>,
}

impl<R: Send + 'static> Worker<R> {
    /// Start a named worker thread
    pub fn spawn(name: impl Into<String>) -> Result<Self, WorkerError> {
        let name = name.into();
        let (job_tx, job_rx) = unbounded::<Job<R>>();
        let (done_tx, done_rx) = unbounded::<R>();

        let thread_name = name.clone();
        let thread = thread::Builder::new().name(name.clone()).spawn(move || {
            log::debug!("Worker '{}' started", thread_name);
            for job in job_rx {
                if done_tx.send(job()).is_err() {
                    break;
                }
            }
            log::debug!("Worker '{}' stopped", thread_name);
        })?;

        Ok(Self {
            name,
            jobs: Some(job_tx),
            completed: done_rx,
            thread: Some(thread),
        })
    }

    /// Queue a job
    pub fn submit<F>(&self, job: F) -> Result<(), WorkerError>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        self.jobs
            .as_ref()
            .ok_or(WorkerError::Disconnected)?
            .send(Box::new(job))
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Drain every result that is ready, without blocking
    pub fn poll_completed(&self) -> Vec<R> {
        self.completed.try_iter().collect()
    }

    /// Wait for the next result
    ///
    /// Returns `Ok(None)` on timeout.
    pub fn wait_completed(&self, timeout: Duration) -> Result<Option<R>, WorkerError> {
        match self.completed.recv_timeout(timeout) {
            Ok(result) => Ok(Some(result)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting jobs, finish the queued ones and join the thread
    pub fn shutdown(&mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Worker '{}' panicked", self.name);
            }
        }
    }
}

impl<R: Send + 'static> Drop for Worker<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_complete_in_order() {
        let worker = Worker::<u32>::spawn("test-worker").unwrap();
        for i in 0..4 {
            worker.submit(move || i * i).unwrap();
        }

        let mut results = Vec::new();
        while results.len() < 4 {
            let next = worker.wait_completed(Duration::from_secs(5)).unwrap();
            results.push(next.expect("job timed out"));
        }
        assert_eq!(results, vec![0, 1, 4, 9]);
        assert!(worker.poll_completed().is_empty());
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let mut worker = Worker::<()>::spawn("stopped-worker").unwrap();
        worker.shutdown();

        assert!(matches!(worker.submit(|| ()), Err(WorkerError::Disconnected)));
    }
}
