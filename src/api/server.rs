use std::{
    io,
    net::TcpListener,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    api::client::Connection,
    net::{self, AddressFamily, AddressInfo, SetupError},
};

/// How long the accept thread sleeps when no connection is pending.
const ACCEPT_TICK: Duration = Duration::from_millis(100);

/// A listening TCP endpoint that hands accepted connections to a callback.
///
/// The server owns one accept thread. Each accepted socket gets the default
/// options (`TCP_NODELAY`, address reuse), is wrapped into a [`Connection`]
/// with its own worker pair, and is passed to the `on_connect` callback
/// synchronously on the accept thread. The callback either moves the
/// connection to another owner or lets it drop; dropping closes it.
///
/// A panic in the callback is caught and logged; the accept loop keeps
/// running.
///
/// # Examples
///
/// ```no_run
/// use hawser::AddressFamily;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Echo one message per connection.
/// let server = hawser::listen(AddressFamily::Ipv4, 8080, |connection| {
///     if let Ok(request) = connection.receive(1024, None).wait() {
///         if !request.is_empty() {
///             let _ = connection.send(request).map(|sent| sent.wait());
///         }
///     }
/// })?;
///
/// println!("listening on {}", server.local_address());
/// # Ok(())
/// # }
/// ```
pub struct Server {
    local_address: AddressInfo,
    stop_requested: Arc<AtomicBool>,
    accept_worker: Option<JoinHandle<()>>,
}

impl Server {
    pub(crate) fn bind<F>(
        family: AddressFamily,
        port: u16,
        on_connect: F,
    ) -> Result<Self, SetupError>
    where
        F: FnMut(Connection) + Send + 'static,
    {
        let listener = net::open_listener(family, port)?;
        let local_address = listener
            .local_addr()
            .map(AddressInfo::from)
            .map_err(SetupError::Address)?;

        let stop_requested = Arc::new(AtomicBool::new(false));
        let accept_worker = thread::Builder::new()
            .name("hawser-accept".into())
            .spawn({
                let stop_requested = stop_requested.clone();
                move || accept_loop(listener, stop_requested, on_connect)
            })
            .map_err(SetupError::Spawn)?;

        info!(address = %local_address, "server listening");
        Ok(Self {
            local_address,
            stop_requested,
            accept_worker: Some(accept_worker),
        })
    }

    /// The address the server is listening on.
    ///
    /// Useful with port `0`, where the OS picks an ephemeral port.
    pub fn local_address(&self) -> &AddressInfo {
        &self.local_address
    }

    /// Stops accepting and joins the accept thread. Idempotent; implied by
    /// drop.
    ///
    /// Connections already handed to the callback are unaffected.
    pub fn stop(&mut self) {
        self.stop_requested.store(true, Ordering::Release);
        if let Some(worker) = self.accept_worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop<F>(listener: TcpListener, stop_requested: Arc<AtomicBool>, mut on_connect: F)
where
    F: FnMut(Connection) + Send + 'static,
{
    while !stop_requested.load(Ordering::Acquire) {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_TICK);
                continue;
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                warn!(%error, "failed to accept incoming connection");
                thread::sleep(ACCEPT_TICK);
                continue;
            }
        };

        if let Err(error) = net::configure_accepted(&stream) {
            warn!(%error, "failed to configure accepted socket");
            continue;
        }
        let connection = match Connection::from_stream(stream) {
            Ok(connection) => connection,
            Err(error) => {
                warn!(%error, "failed to start workers for accepted connection");
                continue;
            }
        };
        debug!(%peer, "accepted connection");

        // The callback runs user code; a panic must not unwind into the
        // accept loop.
        if panic::catch_unwind(AssertUnwindSafe(|| on_connect(connection))).is_err() {
            warn!("connection callback panicked");
        }
    }
}
