//! The main context: a dedicated thread that owns live world handles.
//!
//! World engines are typically not thread-safe. Everything that touches a
//! live world (create, poll, load, unload, apply rules) is submitted here
//! as a closure and executed one at a time, in submission order. Async
//! callers await the result through a oneshot channel, so the calling task
//! is suspended but never blocks a runtime thread.
//!
//! ```text
//! pool worker ──job──→ [ trialforge-main thread ] ──reply──→ pool worker
//! registry    ──job──↗                            ↘─reply──→ registry
//! ```

use std::sync::mpsc as std_mpsc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use tokio::sync::oneshot;

use crate::PoolError;

/// Name of the main context's OS thread.
pub const MAIN_THREAD_NAME: &str = "trialforge-main";

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the main context thread.
///
/// Dropping the last handle (or calling [`MainContext::shutdown`]) closes
/// the job queue; the thread finishes whatever is queued and exits.
pub struct MainContext {
    sender: Mutex<Option<std_mpsc::Sender<Job>>>,
}

impl MainContext {
    /// Spawns the main context thread.
    pub fn spawn() -> Result<Self, PoolError> {
        let (tx, rx) = std_mpsc::channel::<Job>();

        thread::Builder::new()
            .name(MAIN_THREAD_NAME.to_string())
            .spawn(move || {
                tracing::debug!("main context started");
                while let Ok(job) = rx.recv() {
                    job();
                }
                tracing::debug!("main context stopped");
            })
            .map_err(|source| PoolError::io(MAIN_THREAD_NAME, source))?;

        Ok(Self {
            sender: Mutex::new(Some(tx)),
        })
    }

    /// Runs `f` on the main context and returns its result.
    pub async fn run<T, F>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit(Box::new(move || {
            let _ = reply_tx.send(f());
        }))?;
        reply_rx.await.map_err(|_| PoolError::MainContextGone)
    }

    /// Returns `true` until [`shutdown`](Self::shutdown) is called.
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Closes the job queue. Jobs already queued still run.
    pub fn shutdown(&self) {
        if self.lock().take().is_some() {
            tracing::info!("main context shutting down");
        }
    }

    /// Returns `true` when called from the main context thread.
    pub fn is_current_thread() -> bool {
        thread::current().name() == Some(MAIN_THREAD_NAME)
    }

    fn submit(&self, job: Job) -> Result<(), PoolError> {
        let guard = self.lock();
        let sender = guard.as_ref().ok_or(PoolError::MainContextGone)?;
        sender.send(job).map_err(|_| PoolError::MainContextGone)
    }

    fn lock(&self) -> MutexGuard<'_, Option<std_mpsc::Sender<Job>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
