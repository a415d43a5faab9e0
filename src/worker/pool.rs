use crate::queue::TaskQueueManager;
use crate::task::executor::TaskExecutor;
use crate::worker::{PollConfig, Worker, WorkerControl, WorkerSource, WorkerState};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

/// A pool of workers that process tasks concurrently
pub struct WorkerPool {
    worker_count: usize,
    source: WorkerSource,
    poll: PollConfig,
    handles: Vec<(usize, JoinHandle<crate::Result<()>>)>,
    controls: Vec<WorkerControl>,
}

impl WorkerPool {
    /// Create a new worker pool with the specified number of workers
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            source: WorkerSource::default(),
            poll: PollConfig::default(),
            handles: Vec::new(),
            controls: Vec::new(),
        }
    }

    /// Queue the workers consume
    pub fn with_source(mut self, source: WorkerSource) -> Self {
        self.source = source;
        self
    }

    /// Polling timings for every worker
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Start workers `0..worker_count`
    pub fn start(&mut self, queues: TaskQueueManager, executor: TaskExecutor) -> crate::Result<()> {
        if self.is_running() {
            return Err(crate::DispatchError::WorkerPool(
                "Worker pool already started".to_string(),
            ));
        }

        info!("Starting worker pool with {} workers", self.worker_count);

        for id in 0..self.worker_count {
            let worker = Worker::new(id, queues.clone(), executor.clone())
                .with_source(self.source)
                .with_poll(self.poll);
            worker.begin();
            self.controls.push(worker.control());

            let handle = tokio::spawn(async move {
                let outcome = worker.serve().await;
                if let Err(e) = &outcome {
                    error!("Worker {} exited: {}", id, e);
                }
                outcome
            });
            self.handles.push((id, handle));
        }

        Ok(())
    }

    /// Initiate graceful shutdown of the worker pool.
    ///
    /// Every worker finishes its in-flight task before exiting. Workers not
    /// joined before the timeout stay tracked, so the pool keeps reporting
    /// itself as running and refuses to start a second set.
    pub async fn shutdown(&mut self, timeout_duration: Duration) -> crate::Result<()> {
        info!("Initiating graceful shutdown...");

        for control in &self.controls {
            control.stop();
        }

        info!(
            "Waiting for {} workers to complete (timeout: {:?})...",
            self.handles.len(),
            timeout_duration
        );

        let handles = &mut self.handles;
        let shutdown_result = timeout(timeout_duration, async {
            while let Some((id, handle)) = handles.first_mut() {
                let id = *id;
                match handle.await {
                    Ok(Ok(())) => info!("Worker {} stopped gracefully", id),
                    Ok(Err(e)) => warn!("Worker {} ended with error: {}", id, e),
                    Err(e) => warn!("Worker {} panicked: {}", id, e),
                }
                handles.remove(0);
            }
        })
        .await;

        match shutdown_result {
            Ok(()) => {
                info!("All workers stopped successfully");
                self.controls.clear();
                Ok(())
            }
            Err(_) => {
                warn!(
                    "Shutdown timeout exceeded, {} workers still running",
                    self.handles.len()
                );
                Err(crate::DispatchError::WorkerPool(
                    "Shutdown timeout exceeded".to_string(),
                ))
            }
        }
    }

    /// Get the number of workers in the pool
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Check if the pool is running
    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Controls of the started workers, indexed by worker id
    pub fn controls(&self) -> &[WorkerControl] {
        &self.controls
    }

    /// Lifecycle state of every started worker
    pub fn states(&self) -> Vec<WorkerState> {
        self.controls.iter().map(WorkerControl::state).collect()
    }

    /// Number of workers whose loop is active
    pub fn active_workers(&self) -> usize {
        self.controls
            .iter()
            .filter(|control| control.state() == WorkerState::Running)
            .count()
    }
}
