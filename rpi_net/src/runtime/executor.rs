//! Notification executor.
//!
//! Listener callbacks (netcomm values, update batches, status changes) never
//! run on the cycle thread. They are queued on a bounded channel and executed
//! in submission order by one consumer thread. A full queue drops the job:
//! the cycle never blocks on a slow listener.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    name: String,
    tx: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    dropped: AtomicU64,
}

/// Cloneable handle to a single-consumer job queue.
#[derive(Clone)]
pub struct NotificationExecutor {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for NotificationExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationExecutor")
            .field("name", &self.inner.name)
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl NotificationExecutor {
    /// Spawn the consumer thread with a queue of `capacity` jobs.
    ///
    /// # Errors
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(name: &str, capacity: usize) -> io::Result<Self> {
        let (tx, rx) = bounded::<Job>(capacity.max(1));
        let thread_name = name.to_string();
        let worker = thread::Builder::new().name(name.to_string()).spawn(move || {
            for job in rx {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!(executor = %thread_name, "notification listener panicked");
                }
            }
            debug!(executor = %thread_name, "notification executor stopped");
        })?;
        let worker_id = worker.thread().id();
        Ok(Self {
            inner: Arc::new(Inner {
                name: name.to_string(),
                tx: Mutex::new(Some(tx)),
                worker: Mutex::new(Some(worker)),
                worker_id,
                dropped: AtomicU64::new(0),
            }),
        })
    }

    /// Queue a job without blocking.
    ///
    /// Returns `false` (and counts the job as dropped) when the queue is full
    /// or closed.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.inner.tx.lock();
        let Some(tx) = guard.as_ref() else {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        match tx.try_send(Box::new(job)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Block until every job submitted before this call has run.
    ///
    /// Returns immediately if the executor is closed. Must not be called from
    /// a job.
    pub fn flush(&self) {
        if thread::current().id() == self.inner.worker_id {
            return;
        }
        let (done_tx, done_rx) = bounded::<()>(1);
        let Some(tx) = self.inner.tx.lock().clone() else {
            return;
        };
        let barrier: Job = Box::new(move || {
            let _ = done_tx.send(());
        });
        if tx.send(barrier).is_ok() {
            let _ = done_rx.recv();
        }
    }

    /// Stop accepting jobs. Already queued jobs still run.
    pub fn close(&self) {
        self.inner.tx.lock().take();
    }

    /// Whether `close()` was called.
    pub fn is_closed(&self) -> bool {
        self.inner.tx.lock().is_none()
    }

    /// Number of jobs rejected so far.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.tx.get_mut().take();
        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.join();
        }
    }
}
