pub(crate) mod client;
pub(crate) mod future;
pub(crate) mod server;

pub use client::Connection;
pub use future::{ReceiveFuture, SendFuture, StringFuture, ValuesFuture};
pub use server::Server;

use crate::net::{AddressFamily, SetupError};

/// Connects to `host:port` and returns the connection handle.
///
/// The host is resolved and every candidate address matching `family` is
/// tried in order until one accepts
/// ([`AddressFamily::Unspecified`](`crate::AddressFamily::Unspecified`)
/// admits all candidates). The connected socket gets the default options
/// (`TCP_NODELAY`, address reuse) and its two worker threads are started
/// before this function returns.
///
/// # Errors
///
/// [`SetupError`] when resolution, socket creation, connecting, or worker
/// startup fails. Setup failures are reported immediately; nothing is
/// retried.
///
/// # Examples
///
/// ```no_run
/// use hawser::AddressFamily;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let connection = hawser::connect(AddressFamily::Unspecified, "localhost", 8080)?;
/// println!("connected to {}", connection.remote_address());
/// # Ok(())
/// # }
/// ```
pub fn connect(
    family: AddressFamily,
    host: &str,
    port: u16,
) -> Result<Connection, SetupError> {
    Connection::open(family, host, port)
}

/// Starts a server on `port`, handing accepted connections to `on_connect`.
///
/// Binds the wildcard address of the requested family (port `0` lets the
/// OS pick; read it back via
/// [`Server::local_address`](`crate::Server::local_address`)) and spawns
/// the accept thread. `on_connect` runs synchronously on that thread for
/// every accepted connection; move the [`Connection`] elsewhere for
/// long-lived sessions, or use it in place for short exchanges.
///
/// # Errors
///
/// [`SetupError`] when binding, listening, or spawning the accept thread
/// fails.
pub fn listen<F>(family: AddressFamily, port: u16, on_connect: F) -> Result<Server, SetupError>
where
    F: FnMut(Connection) + Send + 'static,
{
    Server::bind(family, port, on_connect)
}
