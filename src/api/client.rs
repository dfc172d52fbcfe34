use std::{
    net::{Shutdown, TcpStream},
    sync::{atomic::Ordering, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    api::future::{ReceiveFuture, SendFuture, StringFuture, ValuesFuture},
    buffers::MessageBuffer,
    codec::Wire,
    engine::{self, rx, tx, EngineState, ReceiveKind, ReceiveTask, SendTask},
    net::{self, AddressFamily, AddressInfo, SetupError},
    SendError,
};

/// A connected TCP endpoint with an asynchronous request/response API.
///
/// Each `Connection` owns two dedicated worker threads, one sender and one
/// receiver, fed by FIFO task queues. Posting a send or receive enqueues a
/// task and returns a future; the workers perform the blocking socket I/O
/// and fulfill the futures in posting order. Send and receive progress
/// independently: a send posted after a receive may complete before it.
///
/// Connections are created by [`connect()`](`crate::connect`) or handed to
/// a server's `on_connect` callback by [`listen()`](`crate::listen`).
///
/// # Shutdown
///
/// [`close()`](`Self::close`), implied by drop, stops the engine, wakes
/// both workers, completes every pending future with its terminal value
/// (`0` for sends, an empty vector for up-to receives,
/// [`RecvError::ConnectionLost`](`crate::RecvError::ConnectionLost`) for
/// exact receives), joins the workers, and closes the socket. Posting after
/// close resolves the returned future immediately with the same terminal
/// values.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use hawser::AddressFamily;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = hawser::connect(AddressFamily::Ipv4, "127.0.0.1", 8080)?;
///
/// // Fire off a request and wait for the typed reply.
/// let _ = client.send_values((0x01u8, 512u32));
/// let (status, len) = client
///     .receive_values::<(u8, u32)>(Duration::from_secs(5))
///     .wait()?;
/// println!("status {status}, {len} bytes to follow");
/// # Ok(())
/// # }
/// ```
pub struct Connection {
    state: Arc<EngineState>,
    socket: Arc<TcpStream>,
    local_address: AddressInfo,
    remote_address: AddressInfo,
    send_worker: Option<JoinHandle<()>>,
    receive_worker: Option<JoinHandle<()>>,
}

impl Connection {
    pub(crate) fn open(
        family: AddressFamily,
        host: &str,
        port: u16,
    ) -> Result<Self, SetupError> {
        Self::from_stream(net::open_client(family, host, port)?)
    }

    /// Wraps a connected stream and starts the worker threads.
    pub(crate) fn from_stream(stream: TcpStream) -> Result<Self, SetupError> {
        let local_address = stream
            .local_addr()
            .map(AddressInfo::from)
            .map_err(SetupError::Address)?;
        let remote_address = stream
            .peer_addr()
            .map(AddressInfo::from)
            .map_err(SetupError::Address)?;

        // The read timeout doubles as the readiness poll tick: the receiver
        // worker never blocks longer than this between deadline checks.
        stream
            .set_read_timeout(Some(engine::POLL_TICK))
            .map_err(SetupError::Socket)?;

        let socket = Arc::new(stream);
        let state = Arc::new(EngineState::new());

        let send_worker = thread::Builder::new()
            .name("hawser-tx".into())
            .spawn({
                let state = state.clone();
                let socket = socket.clone();
                move || tx::run(state, socket)
            })
            .map_err(SetupError::Spawn)?;

        let receive_worker = thread::Builder::new().name("hawser-rx".into()).spawn({
            let state = state.clone();
            let socket = socket.clone();
            move || rx::run(state, socket)
        });
        let receive_worker = match receive_worker {
            Ok(worker) => worker,
            Err(source) => {
                state.stop_running();
                let _ = send_worker.join();
                return Err(SetupError::Spawn(source));
            }
        };

        Ok(Self {
            state,
            socket,
            local_address,
            remote_address,
            send_worker: Some(send_worker),
            receive_worker: Some(receive_worker),
        })
    }

    /// Returns `true` while the engine is running.
    ///
    /// Turns `false` once the connection is closed: explicitly, by drop,
    /// or because a worker detected a dead socket.
    pub fn is_connected(&self) -> bool {
        self.state.is_running()
    }

    /// The local address of this endpoint.
    pub fn local_address(&self) -> &AddressInfo {
        &self.local_address
    }

    /// The peer's address.
    pub fn remote_address(&self) -> &AddressInfo {
        &self.remote_address
    }

    /// Replaces the deadline applied to receives posted without an explicit
    /// timeout.
    ///
    /// The default is 1 second. Receives already posted keep the deadline
    /// they were posted with.
    pub fn set_receive_timeout(&self, timeout: Duration) {
        self.state.receive_timeout.store(timeout, Ordering::Relaxed);
    }

    /// Posts a transmission of `data` and returns its future.
    ///
    /// Accepts anything convertible to bytes: `Vec<u8>`, byte slices,
    /// string types, or a [`MessageBuffer`]. The future resolves to the
    /// number of bytes sent: the full payload length, or `0` if the
    /// connection shut down first.
    ///
    /// # Errors
    ///
    /// [`SendError::Empty`] if `data` converts to zero bytes.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> Result<SendFuture, SendError> {
        let data = data.into();
        if data.is_empty() {
            return Err(SendError::Empty);
        }
        Ok(self.post_send(data))
    }

    /// Posts a transmission of typed values.
    ///
    /// `values` may be a single integral or a tuple of integrals; they are
    /// encoded big-endian in declaration order with no padding, exactly as
    /// [`MessageBuffer::put`] would write them. The peer decodes with
    /// [`receive_values`](`Self::receive_values`) using the same schema.
    pub fn send_values(&self, values: impl Wire) -> SendFuture {
        let mut buffer = MessageBuffer::new();
        buffer.put(values);
        self.post_send(buffer.into_vec())
    }

    /// Posts an up-to receive: resolves with whatever arrives first, any
    /// length in `0..=max_bytes`.
    ///
    /// `timeout` of `None` selects the connection's default receive
    /// timeout. Reaching the deadline is not an error for up-to receives;
    /// the future resolves with the bytes accumulated so far, possibly
    /// none.
    ///
    /// # Panics
    ///
    /// Panics if `max_bytes` is zero.
    pub fn receive(
        &self,
        max_bytes: usize,
        timeout: impl Into<Option<Duration>>,
    ) -> ReceiveFuture {
        self.post_receive(max_bytes, ReceiveKind::UpTo, timeout.into())
    }

    /// Posts an exact receive: resolves with precisely `num_bytes` bytes,
    /// or fails.
    ///
    /// The future resolves
    /// [`RecvError::Timeout`](`crate::RecvError::Timeout`) when the
    /// deadline passes first (the connection stays alive) and
    /// [`RecvError::ConnectionLost`](`crate::RecvError::ConnectionLost`)
    /// when the peer closes first. It never resolves short on success.
    ///
    /// # Panics
    ///
    /// Panics if `num_bytes` is zero.
    pub fn receive_exact(
        &self,
        num_bytes: usize,
        timeout: impl Into<Option<Duration>>,
    ) -> ReceiveFuture {
        self.post_receive(num_bytes, ReceiveKind::Exact, timeout.into())
    }

    /// Posts a typed receive for a value or tuple of values.
    ///
    /// Defers to an exact receive of [`T::WIDTH`](`Wire::WIDTH`) bytes and
    /// decodes them big-endian in declaration order.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use hawser::AddressFamily;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// # let connection = hawser::connect(AddressFamily::Ipv4, "127.0.0.1", 8080)?;
    /// let (id, flag, count) = connection.receive_values::<(u32, bool, u16)>(None).wait()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn receive_values<T: Wire>(
        &self,
        timeout: impl Into<Option<Duration>>,
    ) -> ValuesFuture<T> {
        ValuesFuture::new(self.post_receive(T::WIDTH, ReceiveKind::Exact, timeout.into()))
    }

    /// Posts an up-to receive decoded as text.
    ///
    /// Invalid UTF-8 is replaced rather than reported.
    ///
    /// # Panics
    ///
    /// Panics if `max_bytes` is zero.
    pub fn receive_string(
        &self,
        max_bytes: usize,
        timeout: impl Into<Option<Duration>>,
    ) -> StringFuture {
        StringFuture::new(self.receive(max_bytes, timeout))
    }

    /// Shuts the connection down.
    ///
    /// Stops the engine, completes every pending future with its terminal
    /// value, joins both workers, and closes the socket. Idempotent;
    /// implied by drop.
    pub fn close(&mut self) {
        self.state.stop_running();
        self.state.drain_queues();
        // Unblocks a worker parked in a blocking write to a stalled peer,
        // keeping the joins bounded.
        let _ = self.socket.shutdown(Shutdown::Both);

        if self.send_worker.is_some() {
            debug!(remote = %self.remote_address, "closing connection");
        }
        if let Some(worker) = self.send_worker.take() {
            let _ = worker.join();
        }
        if let Some(worker) = self.receive_worker.take() {
            let _ = worker.join();
        }
    }

    fn post_send(&self, data: Vec<u8>) -> SendFuture {
        let (completion, result) = oneshot::channel();
        let task = SendTask { completion, data };

        // Admission is decided under the queue lock: either the task is
        // enqueued while the engine is running, or it comes back to be
        // completed immediately with the terminal value.
        let rejected = self.state.send_tasks.apply(|tasks| {
            if self.state.is_running() {
                tasks.push_back(task);
                None
            } else {
                Some(task)
            }
        });
        match rejected {
            None => {
                self.state.data_sent.notify_one();
            }
            Some(task) => task.finish(0),
        }

        SendFuture { result }
    }

    fn post_receive(
        &self,
        max_bytes: usize,
        kind: ReceiveKind,
        timeout: Option<Duration>,
    ) -> ReceiveFuture {
        assert!(max_bytes > 0, "receiving zero bytes makes no sense");

        let (completion, result) = oneshot::channel();
        let task = ReceiveTask {
            completion,
            max_bytes,
            kind,
            deadline: self.state.receive_deadline(timeout),
        };

        let rejected = self.state.receive_tasks.apply(|tasks| {
            if self.state.is_running() {
                tasks.push_back(task);
                None
            } else {
                Some(task)
            }
        });
        match rejected {
            None => {
                self.state.data_received.notify_one();
            }
            Some(task) => task.finish_terminal(),
        }

        ReceiveFuture { result }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
