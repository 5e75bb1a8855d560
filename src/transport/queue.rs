//! Readiness gate and ordered command queue.
//!
//! The tag library loads asynchronously and may never load at all. Every
//! interaction therefore goes through [`CommandQueue::when_ready`], which
//! buffers operations until the library reports ready and then runs them
//! strictly in push order on a single background task.
//!
//! # Event Loop
//!
//! ```text
//!   when_ready(op) ──► mpsc ──► [ waiting: poll is_ready() every interval,
//!                                 buffer ops in a backlog               ]
//!                                        │ ready
//!                                        ▼
//!                               [ flush backlog in order, then run
//!                                 each new op as it arrives          ]
//! ```
//!
//! There is no hard timeout. If the library never loads, queued operations
//! never run and their [`Completion`]s stay pending.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, trace};

use crate::error::{Error, Result};

use super::TagLibrary;

// ============================================================================
// Constants
// ============================================================================

/// Default interval between readiness polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Log a "still waiting" line every this many polls.
const WAIT_LOG_EVERY: u64 = 200;

// ============================================================================
// Types
// ============================================================================

/// An operation run against the library once it is ready.
pub type QueuedOp = Box<dyn FnOnce(&dyn TagLibrary) + Send>;

/// Internal commands for the queue loop.
enum QueueCommand {
    /// Run an operation.
    Run(QueuedOp),
    /// Stop after everything queued before this point.
    Shutdown,
}

// ============================================================================
// Completion
// ============================================================================

/// Asynchronous result of a queued operation.
///
/// Resolves once the operation ran. Resolves to [`Error::ChannelClosed`] if
/// the queue shut down first or the operation panicked. Dropping a
/// completion does not cancel the operation.
#[must_use = "a completion does nothing unless awaited; dropping it is fine"]
pub struct Completion<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Completion<T> {
    /// Creates a completion that is already resolved.
    pub fn ready(value: T) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(value);
        Self { rx }
    }

    /// Takes the value if the operation already ran.
    pub fn try_take(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.map_err(Error::from))
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

// ============================================================================
// CommandQueue
// ============================================================================

/// Ordered queue in front of a [`TagLibrary`].
///
/// Cloning is cheap; clones share the same loop.
#[derive(Clone)]
pub struct CommandQueue {
    /// Channel into the queue loop.
    command_tx: mpsc::UnboundedSender<QueueCommand>,
    /// Operations pushed but not yet run.
    pending: Arc<AtomicUsize>,
    /// Flips to `true` once the library reported ready.
    ready: watch::Receiver<bool>,
    /// Set once shutdown was requested.
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("pending", &self.pending_count())
            .field("ready", &self.is_ready())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl CommandQueue {
    /// Creates a queue and spawns its loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(library: Arc<dyn TagLibrary>, poll_interval: Duration) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let (ready_tx, ready) = watch::channel(false);

        tokio::spawn(Self::run_loop(
            library,
            command_rx,
            Arc::clone(&pending),
            ready_tx,
            poll_interval,
        ));

        Self {
            command_tx,
            pending,
            ready,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queues `op` to run once the library is ready.
    ///
    /// Never blocks and never fails; if the queue is shut down the returned
    /// completion resolves to [`Error::ChannelClosed`] and `op` is dropped.
    pub fn when_ready<T, F>(&self, op: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TagLibrary) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if self.is_closed() {
            debug!("Command queue closed, operation dropped");
            return Completion { rx };
        }

        let job: QueuedOp = Box::new(move |library| {
            let _ = tx.send(op(library));
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.command_tx.send(QueueCommand::Run(job)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            debug!("Command queue closed, operation dropped");
        }

        Completion { rx }
    }

    /// Returns the number of operations not yet run.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Returns `true` once the library has reported ready.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Returns `true` once shutdown was requested or the loop is gone.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.command_tx.is_closed()
    }

    /// Resolves once the library reported ready, without queuing anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] if the queue stopped before the
    /// library loaded.
    pub async fn ready(&self) -> Result<()> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| Error::QueueClosed)
    }

    /// Stops the loop after the operations already queued.
    ///
    /// If the library is not ready yet, the backlog is discarded. Later
    /// operations are dropped.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.command_tx.send(QueueCommand::Shutdown);
        }
    }
}

// ============================================================================
// CommandQueue - Loop
// ============================================================================

impl CommandQueue {
    /// Waits for readiness, flushes the backlog, then runs ops as they come.
    async fn run_loop(
        library: Arc<dyn TagLibrary>,
        mut command_rx: mpsc::UnboundedReceiver<QueueCommand>,
        pending: Arc<AtomicUsize>,
        ready: watch::Sender<bool>,
        poll_interval: Duration,
    ) {
        let mut backlog: VecDeque<QueuedOp> = VecDeque::new();
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls: u64 = 0;

        while !library.is_ready() {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(QueueCommand::Run(op)) => backlog.push_back(op),
                        Some(QueueCommand::Shutdown) | None => {
                            pending.fetch_sub(backlog.len(), Ordering::SeqCst);
                            debug!(
                                discarded = backlog.len(),
                                "Command queue stopped before library was ready"
                            );
                            return;
                        }
                    }
                }

                _ = ticker.tick() => {
                    polls += 1;
                    if polls % WAIT_LOG_EVERY == 0 {
                        debug!(polls, queued = backlog.len(), "Still waiting for tag library");
                    }
                }
            }
        }

        ready.send_replace(true);
        info!(queued = backlog.len(), polls, "Tag library ready");

        for op in backlog.drain(..) {
            Self::run_op(op, library.as_ref(), &pending);
        }

        while let Some(command) = command_rx.recv().await {
            match command {
                QueueCommand::Run(op) => Self::run_op(op, library.as_ref(), &pending),
                QueueCommand::Shutdown => {
                    debug!("Command queue shutdown");
                    break;
                }
            }
        }

        trace!("Command queue loop terminated");
    }

    /// Runs one op, containing any panic.
    fn run_op(op: QueuedOp, library: &dyn TagLibrary, pending: &AtomicUsize) {
        if catch_unwind(AssertUnwindSafe(move || op(library))).is_err() {
            error!("Queued tag library operation panicked");
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================
