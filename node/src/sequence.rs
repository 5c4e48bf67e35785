//! Strict FIFO executor for state-mutating work.
//!
//! Every job touching account state (block apply and undo, pool admission,
//! forging) runs through one [`Sequence`], one job at a time, in submission
//! order. Jobs are synchronous closures executed on the blocking pool so the
//! async runtime keeps serving reads meanwhile.

use crate::NodeError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send>;

pub struct Sequence {
    name: &'static str,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    closed: Arc<AtomicBool>,
    queued: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Sequence {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn(name: &'static str) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let closed = Arc::new(AtomicBool::new(false));
        let queued = Arc::new(AtomicUsize::new(0));

        let worker_closed = Arc::clone(&closed);
        let worker_queued = Arc::clone(&queued);
        let worker = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                worker_queued.fetch_sub(1, Ordering::AcqRel);
                if worker_closed.load(Ordering::Acquire) {
                    // Dropping the job drops its result channel.
                    continue;
                }
                if let Err(err) = tokio::task::spawn_blocking(job).await {
                    warn!(sequence = name, error = %err, "sequence job panicked");
                }
            }
            debug!(sequence = name, "sequence worker stopped");
        });

        Self {
            name,
            sender: Mutex::new(Some(sender)),
            closed,
            queued,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Jobs submitted but not yet started.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue `job` behind everything already submitted and wait for its result.
    pub async fn run<F, T>(&self, job: F) -> Result<T, NodeError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Err(NodeError::ShuttingDown);
        }
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = result_tx.send(job());
        });
        {
            let sender = self.sender.lock().map_err(|_| NodeError::LockPoisoned)?;
            let sender = sender.as_ref().ok_or(NodeError::ShuttingDown)?;
            self.queued.fetch_add(1, Ordering::AcqRel);
            if sender.send(job).is_err() {
                self.queued.fetch_sub(1, Ordering::AcqRel);
                return Err(NodeError::ShuttingDown);
            }
        }
        result_rx.await.map_err(|_| NodeError::ShuttingDown)
    }

    /// Stop accepting jobs. The running job completes; queued ones fail with
    /// [`NodeError::ShuttingDown`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    /// [`Sequence::close`], then wait for the worker to drain.
    pub async fn shutdown(&self) {
        self.close();
        let worker = self.worker.lock().ok().and_then(|mut worker| worker.take());
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                warn!(sequence = self.name, error = %err, "sequence worker failed");
            }
        }
    }
}
