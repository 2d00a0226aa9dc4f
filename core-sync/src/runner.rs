//! # Bounded Task Runner
//!
//! Runs independent remote operations (add/remove batches, detail fetches)
//! on a fixed pool of workers fed by a bounded queue of the same size.
//!
//! - [`TaskRunner::submit`] never fails on a full queue: it sleeps for
//!   `submit_retry_delay` and tries again, which pushes back on the producer.
//! - [`TaskRunner::drain`] closes the queue and waits for queued and
//!   in-flight work. Past the timeout the rest is aborted, every abandoned
//!   task is logged by label, and [`SyncError::Cancelled`] is returned.
//!
//! Tasks report their own outcome (usually through shared state owned by the
//! caller); the runner only schedules them.

use crate::{Result, SyncError};
use core_async::sync::mpsc::{self, error::TrySendError};
use core_async::sync::{CancellationToken, Mutex};
use core_async::task::JoinSet;
use core_async::time::{sleep, timeout, Duration};
use core_runtime::config::RunnerConfig;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct QueuedTask {
    label: String,
    task: BoxedTask,
}

/// Labels of tasks currently executing, keyed by submission number.
type InFlight = Arc<Mutex<HashMap<u64, String>>>;

pub struct TaskRunner {
    sender: Option<mpsc::Sender<QueuedTask>>,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    workers: JoinSet<()>,
    in_flight: InFlight,
    completed: Arc<AtomicU64>,
    config: RunnerConfig,
    cancel: CancellationToken,
}

impl TaskRunner {
    /// Starts `config.concurrency` workers.
    ///
    /// Must be called from within the async runtime.
    pub fn new(config: RunnerConfig, cancel: CancellationToken) -> Self {
        let size = config.concurrency.max(1);
        let (sender, receiver) = mpsc::channel::<QueuedTask>(size);
        let receiver = Arc::new(Mutex::new(receiver));
        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
        let completed = Arc::new(AtomicU64::new(0));
        let sequence = Arc::new(AtomicU64::new(0));

        let mut workers = JoinSet::new();
        for worker in 0..size {
            let receiver = Arc::clone(&receiver);
            let in_flight = Arc::clone(&in_flight);
            let completed = Arc::clone(&completed);
            let sequence = Arc::clone(&sequence);
            workers.spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(QueuedTask { label, task }) = next else {
                        break;
                    };

                    let key = sequence.fetch_add(1, Ordering::Relaxed);
                    in_flight.lock().await.insert(key, label.clone());

                    if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                        warn!(worker, task = %label, "Runner task panicked");
                    }

                    in_flight.lock().await.remove(&key);
                    completed.fetch_add(1, Ordering::Relaxed);
                }
                debug!(worker, "Runner worker stopped");
            });
        }

        Self {
            sender: Some(sender),
            receiver,
            workers,
            in_flight,
            completed,
            config,
            cancel,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Tasks waiting in the queue.
    pub fn pending(&self) -> usize {
        self.sender
            .as_ref()
            .map(|s| s.max_capacity() - s.capacity())
            .unwrap_or(0)
    }

    /// Tasks that have finished running.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Queues a task, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// - `Cancelled` if cancellation is observed before the task is queued
    /// - `RunnerClosed` if the runner is draining
    pub async fn submit<F>(&self, label: impl Into<String>, task: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(SyncError::RunnerClosed)?;
        let mut queued = QueuedTask {
            label: label.into(),
            task: Box::pin(task),
        };

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match sender.try_send(queued) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    queued = rejected;
                    sleep(self.config.submit_retry_delay).await;
                }
                Err(TrySendError::Closed(_)) => return Err(SyncError::RunnerClosed),
            }
        }
    }

    /// Stops accepting work and waits up to `limit` for everything queued.
    ///
    /// Returns the number of tasks that ran to completion.
    pub async fn drain(mut self, limit: Duration) -> Result<u64> {
        self.sender.take();

        let workers = &mut self.workers;
        let finished = timeout(limit, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Runner worker ended abnormally");
                }
            }
        })
        .await;

        if finished.is_ok() {
            return Ok(self.completed());
        }

        self.workers.shutdown().await;

        let mut abandoned: Vec<String> = self.in_flight.lock().await.drain().map(|(_, l)| l).collect();
        {
            let mut receiver = self.receiver.lock().await;
            receiver.close();
            while let Ok(queued) = receiver.try_recv() {
                abandoned.push(queued.label);
            }
        }
        for label in &abandoned {
            warn!(task = %label, timeout_secs = limit.as_secs(), "Abandoned runner task after drain timeout");
        }
        warn!(
            abandoned = abandoned.len(),
            completed = self.completed(),
            "Runner drain timed out"
        );
        Err(SyncError::Cancelled)
    }
}
