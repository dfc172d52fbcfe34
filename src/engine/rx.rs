use std::{
    io::{self, Read},
    net::TcpStream,
    sync::Arc,
    time::Instant,
};

use thiserror::Error;
use tracing::{debug, trace};

use super::{EngineState, ReceiveKind, ReceiveTask};

/// Error delivered through a receive future.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// The deadline elapsed before an exact receive accumulated the
    /// requested byte count.
    ///
    /// The connection remains alive: bytes that arrived before the deadline
    /// stay buffered by the OS and are delivered to the next receive.
    /// Up-to receives never time out; they resolve with whatever has
    /// accumulated, possibly nothing.
    #[error("the receive deadline elapsed before enough bytes arrived")]
    Timeout,

    /// The peer closed the connection (or the socket failed) before an
    /// exact receive was satisfied.
    ///
    /// This is a terminal state for the connection. It is also the value
    /// exact receives resolve to when they are posted after
    /// [`close()`](`crate::Connection::close`) or drained during shutdown.
    #[error("the connection was closed before the requested bytes arrived")]
    ConnectionLost,
}

/// Receiver worker loop, symmetric to the sender's.
pub(crate) fn run(state: Arc<EngineState>, socket: Arc<TcpStream>) {
    while state.is_running() {
        let task = state.receive_tasks.apply(|tasks| tasks.pop_front());
        match task {
            Some(task) => {
                if !process_receive_task(&socket, task) {
                    // Connection is dead; take the sender down too.
                    state.stop_running();
                    break;
                }
            }
            None => state.receive_tasks.wait(&state.data_received, |tasks| {
                !state.is_running() || !tasks.is_empty()
            }),
        }
    }
    state.drain_queues();
}

/// A read error that means "no data within the readiness tick", not a dead
/// socket. Unix reports `WouldBlock` for an elapsed read timeout, Windows
/// reports `TimedOut`.
fn is_not_ready(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn finish_closed(task: ReceiveTask, received: Vec<u8>) -> bool {
    match task.kind {
        ReceiveKind::Exact => task.finish(Err(RecvError::ConnectionLost)),
        ReceiveKind::UpTo => task.finish(Ok(received)),
    }
    false
}

/// Accumulates bytes for one task until a terminal condition fires.
///
/// The socket's read timeout serves as the readiness poll: each blocking
/// read returns within one tick, after which the deadline (captured once
/// at posting time) is rechecked. Returns `false` when the connection is
/// no longer usable (peer close or socket error).
///
/// Exact tasks either deliver exactly `max_bytes` or an error; up-to tasks
/// deliver the first chunk that arrives, possibly empty on timeout.
pub(crate) fn process_receive_task(socket: &TcpStream, task: ReceiveTask) -> bool {
    let mut stream = socket;
    let mut received = Vec::with_capacity(task.max_bytes);
    let mut chunk = vec![0u8; task.max_bytes];

    loop {
        if Instant::now() >= task.deadline {
            return match task.kind {
                ReceiveKind::Exact => {
                    trace!(
                        wanted = task.max_bytes,
                        got = received.len(),
                        "exact receive timed out"
                    );
                    task.finish(Err(RecvError::Timeout));
                    true
                }
                ReceiveKind::UpTo => {
                    task.finish(Ok(received));
                    true
                }
            };
        }

        match stream.read(&mut chunk[..task.max_bytes - received.len()]) {
            Err(error) if is_not_ready(&error) => continue,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Ok(0) => {
                debug!("peer closed the connection");
                return finish_closed(task, received);
            }
            Err(error) => {
                debug!(%error, "connection failed while receiving");
                return finish_closed(task, received);
            }
            Ok(n) => {
                received.extend_from_slice(&chunk[..n]);
                if task.kind == ReceiveKind::UpTo || received.len() >= task.max_bytes {
                    trace!(bytes = received.len(), "receive task complete");
                    task.finish(Ok(received));
                    return true;
                }
            }
        }
    }
}
