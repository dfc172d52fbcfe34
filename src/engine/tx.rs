use std::{
    io::{self, Write},
    net::TcpStream,
    sync::Arc,
};

use thiserror::Error;
use tracing::{debug, trace};

use super::{EngineState, SendTask};

/// Error returned when posting a send.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The payload was empty.
    ///
    /// Sending zero bytes is rejected synchronously at the posting call:
    /// an empty transmission is indistinguishable from no transmission on
    /// the receiving side.
    #[error("cannot send an empty message")]
    Empty,
}

/// Sender worker loop.
///
/// Pops queued send tasks and transmits them in FIFO order until the engine
/// stops running or the connection dies under a write. On exit, both queues
/// are drained with terminal values.
pub(crate) fn run(state: Arc<EngineState>, socket: Arc<TcpStream>) {
    while state.is_running() {
        let task = state.send_tasks.apply(|tasks| tasks.pop_front());
        match task {
            Some(task) => {
                if !process_send_task(&socket, task) {
                    // Connection is dead; take the receiver down too.
                    state.stop_running();
                    break;
                }
            }
            None => state.send_tasks.wait(&state.data_sent, |tasks| {
                !state.is_running() || !tasks.is_empty()
            }),
        }
    }
    state.drain_queues();
}

/// Transmits all bytes of one task, completing its future with the count.
///
/// Returns `false` when the socket reported an error, meaning the
/// connection is no longer usable; the future is then completed with `0`.
pub(crate) fn process_send_task(socket: &TcpStream, task: SendTask) -> bool {
    let mut stream = socket;
    let mut sent = 0;
    while sent < task.data.len() {
        match stream.write(&task.data[sent..]) {
            Ok(0) => {
                debug!("socket accepted no bytes, treating connection as dead");
                task.finish(0);
                return false;
            }
            Ok(n) => sent += n,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                debug!(%error, "connection closed while sending");
                task.finish(0);
                return false;
            }
        }
    }
    trace!(bytes = sent, "send task complete");
    task.finish(sent as u64);
    true
}

#[cfg(test)]
mod tests {
    use std::{
        io::Read,
        net::{TcpListener, TcpStream},
        thread,
    };

    use tokio::sync::oneshot;

    use super::*;

    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let local = TcpStream::connect(addr).unwrap();
        let (peer, _) = listener.accept().unwrap();
        (local, peer)
    }

    #[test]
    fn writes_all_bytes_and_reports_count() {
        let (local, mut peer) = socket_pair();

        let (completion, result) = oneshot::channel();
        let data: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();
        let task = SendTask {
            completion,
            data: data.clone(),
        };

        assert!(process_send_task(&local, task));
        assert_eq!(result.blocking_recv().unwrap(), 4096);

        let mut received = vec![0u8; data.len()];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(received, data);
    }

    #[test]
    fn worker_serves_queue_and_drains_on_stop() {
        let (local, mut peer) = socket_pair();
        let state = Arc::new(EngineState::new());
        let socket = Arc::new(local);

        let worker = {
            let state = state.clone();
            let socket = socket.clone();
            thread::spawn(move || run(state, socket))
        };

        // A task queued after the worker starts is picked up via the CV.
        let (completion, result) = oneshot::channel();
        state.send_tasks.apply(|tasks| {
            tasks.push_back(SendTask {
                completion,
                data: vec![1, 2, 3],
            })
        });
        state.data_sent.notify_one();
        assert_eq!(result.blocking_recv().unwrap(), 3);

        let mut received = [0u8; 3];
        peer.read_exact(&mut received).unwrap();
        assert_eq!(received, [1, 2, 3]);

        state.stop_running();
        worker.join().unwrap();
        assert!(!state.is_running());
    }

    #[test]
    fn queued_tasks_complete_with_zero_after_stop() {
        let (local, _peer) = socket_pair();
        let state = Arc::new(EngineState::new());
        let socket = Arc::new(local);

        state.stop_running();

        let (completion, result) = oneshot::channel();
        state.send_tasks.apply(|tasks| {
            tasks.push_back(SendTask {
                completion,
                data: vec![9; 16],
            })
        });

        // The worker exits immediately and drains the leftover task.
        run(state.clone(), socket);
        assert_eq!(result.blocking_recv().unwrap(), 0);
    }
}
