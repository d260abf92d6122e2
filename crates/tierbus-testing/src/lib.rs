//! Testing utilities for applications built on tierbus.
//!
//! - [`Recorder`] captures what subscribers saw, in order, across threads.
//! - [`ManualContext`] is an affine execution context whose queue the test
//!   drains explicitly, so thread-affine delivery can be asserted step by step.
//!
//! ```
//! use std::sync::Arc;
//! use tierbus::{impl_event, Bus, Methods, Subscriber, ThreadAffinity};
//! use tierbus_testing::{ManualContext, Recorder};
//!
//! struct Refresh;
//! impl_event!(Refresh);
//!
//! struct Screen { recorder: Recorder }
//!
//! impl Subscriber for Screen {
//!     fn subscriptions(methods: &mut Methods<Self>) {
//!         methods.on::<Refresh, _>(ThreadAffinity::Affine, |s, _| {
//!             s.recorder.record("refresh");
//!             Ok(())
//!         });
//!     }
//! }
//!
//! let ui = Arc::new(ManualContext::new("ui"));
//! let bus = Bus::builder().affine_context(ui.clone()).build();
//! let screen = Arc::new(Screen { recorder: Recorder::new() });
//! bus.register(&screen).unwrap();
//!
//! // Posted from the context's own thread: runs inline.
//! bus.post(Refresh);
//! assert_eq!(screen.recorder.entries(), ["refresh"]);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tierbus::{BusError, ContextId, ExecutionContext, Job};
use tracing::warn;

/// Thread-safe, ordered log of labels.
///
/// Cheap to clone; clones share the same log.
#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<(Mutex<Vec<String>>, Condvar)>,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `entry` and wakes any [`Recorder::wait_for`] callers.
    pub fn record(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
        self.inner.1.notify_all();
    }

    /// Everything recorded so far.
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Blocks until at least `count` entries exist or `timeout` passes.
    ///
    /// Returns whether the count was reached. Useful for fire-and-forget
    /// delivery to another thread.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut entries = self.lock();
        while entries.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            entries = self
                .inner
                .1
                .wait_timeout(entries, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.lock().iter()).finish()
    }
}

/// Affine context bound to the thread that created it, drained by hand.
///
/// Jobs submitted from other threads wait in a queue until the owning
/// thread calls [`ManualContext::run_pending`].
pub struct ManualContext {
    id: ContextId,
    name: String,
    queue: Mutex<VecDeque<Job>>,
    closed: AtomicBool,
}

impl ManualContext {
    /// A context owned by the calling thread.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ContextId::current(),
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queued jobs.
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Runs the oldest queued job, if any.
    pub fn run_one(&self) -> bool {
        // The lock is released before the job runs.
        let Some(job) = self.queue().pop_front() else {
            return false;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!(context = %self.name, "job panicked on manual context");
        }
        true
    }

    /// Runs queued jobs, including ones they enqueue, until the queue is
    /// empty. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }

    /// Runs exactly `count` jobs, waiting up to `timeout` for jobs submitted
    /// from other threads. Returns how many ran.
    pub fn run_until(&self, count: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        while ran < count && Instant::now() < deadline {
            if self.run_one() {
                ran += 1;
            } else {
                std::thread::yield_now();
            }
        }
        ran
    }

    /// Rejects further submissions and drops queued jobs.
    pub fn close(&self) {
        // Flag and clear under the queue lock so no submit lands in between.
        let mut queue = self.queue();
        self.closed.store(true, Ordering::SeqCst);
        queue.clear();
    }
}

impl ExecutionContext for ManualContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn submit(&self, job: Job) -> tierbus::Result<()> {
        let mut queue = self.queue();
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::ContextClosed {
                context: self.name.clone(),
            });
        }
        queue.push_back(job);
        Ok(())
    }

    fn label(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ManualContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualContext")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn recorder_keeps_order_across_clones() {
        let recorder = Recorder::new();
        let clone = recorder.clone();
        recorder.record("one");
        clone.record("two");
        assert_eq!(recorder.entries(), ["one", "two"]);
        assert_eq!(clone.len(), 2);
        recorder.clear();
        assert!(clone.is_empty());
    }

    #[test]
    fn wait_for_sees_entries_from_other_threads() {
        let recorder = Recorder::new();
        let remote = recorder.clone();
        let writer = thread::spawn(move || {
            for n in 0..3 {
                remote.record(format!("entry-{n}"));
            }
        });
        assert!(recorder.wait_for(3, Duration::from_secs(5)));
        writer.join().unwrap();
        assert!(!recorder.wait_for(4, Duration::from_millis(10)));
    }

    #[test]
    fn manual_context_runs_jobs_only_when_drained() {
        let context = ManualContext::new("manual");
        let recorder = Recorder::new();
        let r = recorder.clone();
        context
            .submit(Box::new(move || r.record("job")))
            .unwrap();
        assert_eq!(context.pending(), 1);
        assert!(recorder.is_empty());

        assert_eq!(context.run_pending(), 1);
        assert_eq!(recorder.entries(), ["job"]);
        assert_eq!(context.id(), ContextId::current());
    }

    #[test]
    fn closed_manual_context_rejects_jobs() {
        let context = ManualContext::new("manual");
        context.submit(Box::new(|| {})).unwrap();
        context.close();
        assert_eq!(context.pending(), 0);
        assert!(matches!(
            context.submit(Box::new(|| {})),
            Err(BusError::ContextClosed { .. })
        ));
    }

    #[test]
    fn nothing_is_queued_after_a_racing_close() {
        let context = Arc::new(ManualContext::new("manual"));
        let submitters: Vec<_> = (0..4)
            .map(|_| {
                let context = Arc::clone(&context);
                thread::spawn(move || {
                    let mut accepted = 0usize;
                    while context.submit(Box::new(|| {})).is_ok() {
                        accepted += 1;
                    }
                    accepted
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(5));
        context.close();
        for submitter in submitters {
            submitter.join().unwrap();
        }
        assert_eq!(context.pending(), 0);
        assert_eq!(context.run_pending(), 0);
    }
}
