//! Execution contexts for thread-affine subscribers.
//!
//! The bus needs only two things from a context: who it is ([`ContextId`]),
//! and a way to hand it work ([`ExecutionContext::submit`]). Any event loop
//! can sit behind that. [`LoopContext`] is the built-in one: a dedicated
//! thread draining a job queue, like a UI main loop.
//!
//! ## Architecture
//! ```text
//! poster thread                      loop thread
//!   submit(job) ──► [unbounded queue] ──► job()
//!                                         └─► panic caught and logged
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use futures::channel::mpsc;
use tracing::{debug, warn};

use crate::error::{BusError, Result};

/// A unit of work handed to a context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Identity of a logical thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(ThreadId);

impl ContextId {
    /// The context the caller is running on.
    pub fn current() -> Self {
        Self(thread::current().id())
    }
}

/// A place subscriber bodies can be sent to run.
pub trait ExecutionContext: Send + Sync + 'static {
    /// Identity of the thread this context runs jobs on.
    fn id(&self) -> ContextId;

    /// Queues `job`. Must not run it inline.
    fn submit(&self, job: Job) -> Result<()>;

    /// Label used in logs and errors.
    fn label(&self) -> &str {
        "affine"
    }
}

/// Dedicated thread that runs submitted jobs in FIFO order.
pub struct LoopContext {
    id: ContextId,
    name: String,
    tx: mpsc::UnboundedSender<Job>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl LoopContext {
    /// Spawns the loop thread.
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (tx, rx) = mpsc::unbounded::<Job>();
        let loop_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            debug!(context = %loop_name, "execution context started");
            for job in futures::executor::block_on_stream(rx) {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    warn!(context = %loop_name, "job panicked on execution context");
                }
            }
            debug!(context = %loop_name, "execution context stopped");
        })?;

        Ok(Self {
            id: ContextId(handle.thread().id()),
            name,
            tx,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Stops accepting jobs, runs the ones already queued and joins the
    /// thread. Called from the loop thread itself, it only closes the queue.
    pub fn shutdown(&self) {
        self.tx.close_channel();
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if ContextId::current() == self.id {
                return;
            }
            if handle.join().is_err() {
                warn!(context = %self.name, "execution context thread panicked");
            }
        }
    }

    /// True once [`LoopContext::shutdown`] has been called.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl ExecutionContext for LoopContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.tx
            .unbounded_send(job)
            .map_err(|_| BusError::ContextClosed {
                context: self.name.clone(),
            })
    }

    fn label(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for LoopContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopContext")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for LoopContext {
    fn drop(&mut self) {
        self.tx.close_channel();
    }
}
