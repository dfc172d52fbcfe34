//! The per-connection send/receive engine.
//!
//! Every connection owns two dedicated worker threads, one sender and one
//! receiver, and a pair of FIFO task queues. User calls enqueue tasks and
//! return futures; the workers dequeue, perform blocking socket I/O under a
//! bounded readiness wait, and fulfill the futures. The engine survives peer
//! disconnects, partial reads, partial writes, and timeouts, and guarantees
//! that shutdown completes every pending future with a terminal value
//! instead of stranding its caller.
//!
//! Worker lifecycle:
//!
//! ```text
//!  Running ──────────────► Stopping ─────────────► Stopped
//!   close() / Drop /        both workers exited,
//!   I/O failure:            queues drained with
//!   running = false,        terminal values
//!   both CVs notified
//! ```
//!
//! No new task is admitted once `running` is false: posting in Stopping or
//! Stopped completes the caller's future immediately with the terminal
//! value.

pub(crate) mod rx;
pub(crate) mod tx;

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use parking_lot::Condvar;
use tokio::sync::oneshot;

use crate::{
    engine::rx::RecvError,
    sync::{AtomicDuration, Synchronized},
};

/// Bound on each readiness wait; the receive deadline is rechecked at this
/// granularity.
pub(crate) const POLL_TICK: Duration = Duration::from_millis(10);

/// Deadline applied to receives posted without an explicit timeout, until
/// reconfigured via [`Connection::set_receive_timeout`](`crate::Connection::set_receive_timeout`).
pub(crate) const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// A queued request to transmit all of `data`.
///
/// Created by the posting API (which rejects empty payloads), consumed by
/// the sender worker, destroyed after the completion fires.
pub(crate) struct SendTask {
    pub(crate) completion: oneshot::Sender<u64>,
    pub(crate) data: Vec<u8>,
}

impl SendTask {
    pub(crate) fn finish(self, bytes_sent: u64) {
        // The caller may have dropped the future; that is not an error.
        let _ = self.completion.send(bytes_sent);
    }
}

/// How a receive task decides it is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiveKind {
    /// Must deliver exactly `max_bytes`, or fail with a [`RecvError`].
    Exact,
    /// Delivers whatever arrives first, any length in `0..=max_bytes`.
    UpTo,
}

/// A queued request to read from the peer's byte stream.
///
/// `max_bytes` is non-zero and `deadline` is always set: posting supplies
/// the connection's default timeout when the caller gives none.
pub(crate) struct ReceiveTask {
    pub(crate) completion: oneshot::Sender<Result<Vec<u8>, RecvError>>,
    pub(crate) max_bytes: usize,
    pub(crate) kind: ReceiveKind,
    pub(crate) deadline: Instant,
}

impl ReceiveTask {
    pub(crate) fn finish(self, result: Result<Vec<u8>, RecvError>) {
        let _ = self.completion.send(result);
    }

    /// Completes the task with its shutdown terminal value: an empty vector
    /// for up-to receives, a lost-connection error for exact receives.
    pub(crate) fn finish_terminal(self) {
        match self.kind {
            ReceiveKind::UpTo => self.finish(Ok(Vec::new())),
            ReceiveKind::Exact => self.finish(Err(RecvError::ConnectionLost)),
        }
    }
}

/// State shared between the user-facing handle and the two workers.
pub(crate) struct EngineState {
    running: AtomicBool,
    pub(crate) send_tasks: Synchronized<VecDeque<SendTask>>,
    pub(crate) receive_tasks: Synchronized<VecDeque<ReceiveTask>>,
    pub(crate) data_sent: Condvar,
    pub(crate) data_received: Condvar,
    pub(crate) receive_timeout: AtomicDuration,
}

impl EngineState {
    pub(crate) fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            send_tasks: Synchronized::new(VecDeque::new()),
            receive_tasks: Synchronized::new(VecDeque::new()),
            data_sent: Condvar::new(),
            data_received: Condvar::new(),
            receive_timeout: AtomicDuration::new(DEFAULT_RECEIVE_TIMEOUT),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Transitions the engine out of Running and wakes both workers.
    ///
    /// The flag flips inside each queue's critical section: a worker that
    /// just found its queue empty re-checks the flag under the same lock
    /// before parking on the condition variable, so the wakeup cannot be
    /// lost.
    pub(crate) fn stop_running(&self) {
        self.send_tasks
            .apply(|_| self.running.store(false, Ordering::Release));
        self.data_sent.notify_one();
        self.receive_tasks
            .apply(|_| self.running.store(false, Ordering::Release));
        self.data_received.notify_one();
    }

    /// Completes every queued task with its terminal value.
    ///
    /// Tasks are removed under the lock and completed outside it. Each task
    /// leaves its queue exactly once, so concurrent drains (both workers
    /// call this on exit, and so does `close()`) are harmless.
    pub(crate) fn drain_queues(&self) {
        let send_tasks: Vec<_> = self.send_tasks.apply(|tasks| tasks.drain(..).collect());
        for task in send_tasks {
            task.finish(0);
        }

        let receive_tasks: Vec<_> = self.receive_tasks.apply(|tasks| tasks.drain(..).collect());
        for task in receive_tasks {
            task.finish_terminal();
        }
    }

    /// The deadline for a receive posted now with an optional explicit
    /// timeout.
    pub(crate) fn receive_deadline(&self, timeout: Option<Duration>) -> Instant {
        let timeout = timeout.unwrap_or_else(|| self.receive_timeout.load(Ordering::Relaxed));
        Instant::now() + timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_running_flips_flag() {
        let state = EngineState::new();
        assert!(state.is_running());
        state.stop_running();
        assert!(!state.is_running());
        // Idempotent
        state.stop_running();
        assert!(!state.is_running());
    }

    #[test]
    fn drain_completes_tasks_with_terminal_values() {
        let state = EngineState::new();

        let (send_done, send_result) = oneshot::channel();
        state.send_tasks.apply(|tasks| {
            tasks.push_back(SendTask {
                completion: send_done,
                data: vec![1, 2, 3],
            })
        });

        let (upto_done, upto_result) = oneshot::channel();
        let (exact_done, exact_result) = oneshot::channel();
        state.receive_tasks.apply(|tasks| {
            tasks.push_back(ReceiveTask {
                completion: upto_done,
                max_bytes: 8,
                kind: ReceiveKind::UpTo,
                deadline: Instant::now() + Duration::from_secs(1),
            });
            tasks.push_back(ReceiveTask {
                completion: exact_done,
                max_bytes: 8,
                kind: ReceiveKind::Exact,
                deadline: Instant::now() + Duration::from_secs(1),
            });
        });

        state.drain_queues();

        assert_eq!(send_result.blocking_recv().unwrap(), 0);
        assert_eq!(upto_result.blocking_recv().unwrap(), Ok(Vec::new()));
        assert_eq!(
            exact_result.blocking_recv().unwrap(),
            Err(RecvError::ConnectionLost)
        );
        assert!(state.send_tasks.read(|tasks| tasks.is_empty()));
        assert!(state.receive_tasks.read(|tasks| tasks.is_empty()));
    }

    #[test]
    fn default_receive_deadline_is_about_one_second() {
        let state = EngineState::new();
        let before = Instant::now();
        let deadline = state.receive_deadline(None);
        assert!(deadline >= before + Duration::from_millis(900));
        assert!(deadline <= before + Duration::from_millis(1100));

        let explicit = state.receive_deadline(Some(Duration::from_millis(50)));
        assert!(explicit <= before + Duration::from_millis(150));
    }
}
