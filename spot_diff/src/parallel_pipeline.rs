// THEORY:
// Detection is stateless, so the natural unit of parallelism is one request. The
// `WorkerPool` gives callers that handle many requests (a batch job, a request
// server) a bounded set of workers to run them on.
//
// A dispatcher task deals incoming `DetectionTask`s round-robin to N worker tasks.
// Each worker hands the CPU-bound detection to tokio's blocking thread pool, so the
// async runtime threads are never stalled by pixel work, then replies on the task's
// oneshot channel. Workers hold no per-request state; nothing is shared between
// requests except the pool's channels.

use crate::pipeline::{self, DetectionConfig, DiffError, DiffResult, Result};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};

/// One queued detection request.
pub struct DetectionTask {
    pub image_bytes: Vec<u8>,
    pub config: DetectionConfig,
    pub result_sender: oneshot::Sender<Result<DiffResult>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<DetectionTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts a pool with one worker per logical CPU. Must be called inside a
    /// tokio runtime.
    pub fn new() -> Self {
        Self::with_workers(num_cpus::get())
    }

    /// Starts a pool with `worker_count` workers (at least one). Must be called
    /// inside a tokio runtime.
    pub fn with_workers(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<DetectionTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<DetectionTask>())
            .unzip();

        // Dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(task)) = worker_senders[worker_idx].send(task) {
                    let _ = task
                        .result_sender
                        .send(Err(DiffError::WorkerUnavailable("worker exited")));
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let mut workers = Vec::with_capacity(worker_count);
        for (id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let DetectionTask {
                        image_bytes,
                        config,
                        result_sender,
                    } = task;
                    let result = tokio::task::spawn_blocking(move || pipeline::detect(&image_bytes, &config))
                        .await
                        .unwrap_or_else(|e| {
                            log::error!("detection worker {id} failed: {e}");
                            Err(DiffError::WorkerUnavailable("detection task panicked"))
                        });
                    // The requester may have stopped waiting.
                    let _ = result_sender.send(result);
                }
            });
            workers.push(worker);
        }

        log::debug!("started detection pool with {worker_count} workers");
        Self {
            task_sender,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues one detection and waits for its result.
    pub async fn process(&self, image_bytes: Vec<u8>, config: DetectionConfig) -> Result<DiffResult> {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = DetectionTask {
            image_bytes,
            config,
            result_sender,
        };

        self.task_sender
            .send(task)
            .map_err(|_| DiffError::WorkerUnavailable("pool is shut down"))?;

        result_receiver
            .await
            .map_err(|_| DiffError::WorkerUnavailable("worker dropped the request"))?
    }

    /// Runs many detections concurrently. Results come back in request order.
    pub async fn process_batch(
        &self,
        requests: impl IntoIterator<Item = (Vec<u8>, DetectionConfig)>,
    ) -> Vec<Result<DiffResult>> {
        join_all(
            requests
                .into_iter()
                .map(|(bytes, config)| self.process(bytes, config)),
        )
        .await
    }

    /// Stops accepting requests and waits for queued ones to finish.
    pub async fn shutdown(self) {
        let WorkerPool {
            task_sender,
            workers,
        } = self;
        drop(task_sender);
        for worker in workers {
            let _ = worker.await;
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}
