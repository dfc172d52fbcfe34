//! Hawser: asynchronous request/response TCP sockets over plain blocking OS
//! sockets, with typed big-endian framing.
//!
//! Hawser gives every connection a small, predictable engine instead of an
//! async runtime: two dedicated worker threads (one sender, one receiver)
//! consume FIFO queues of caller-posted tasks and perform the blocking
//! socket I/O. Posting a send or receive returns a future immediately; the
//! future resolves when the worker finishes the operation. The engine
//! survives peer disconnects, partial reads, partial writes, and timeouts,
//! and its shutdown protocol guarantees that no caller is ever left blocked
//! on an abandoned future.
//!
//! # Overview
//!
//! ```text
//!  USER CODE                                                  .....
//!  send(bytes) ──► future      receive(n) ──► future              :
//!       │                           │                             :
//! ~~~~~~┼~~~~~~~~~~~~~~~~~~~~~~~~~~~┼~~~~~~~~~~~~~~~~~~~~~~~~~~~  :
//!  CONNECTION ENGINE                │             hawser code     :
//!       ▼                           ▼                             :
//!  ┌───────────┐              ┌────────────┐                      :
//!  │ send queue│              │ recv queue │   FIFO task queues   :
//!  └─────┬─────┘              └─────┬──────┘                      :
//!        │ condvar                  │ condvar                     :
//!        ▼                          ▼                             :
//!  ┌───────────┐              ┌────────────┐                      :
//!  │ tx worker │              │ rx worker  │   2 threads per conn :
//!  └─────┬─────┘              └─────┬──────┘                      :
//!        │ blocking write           │ bounded-wait read           :
//!        ▼                          ▼                             :
//!  ══════╪══════════ one OS socket ═╪═══════════════════════════  :
//!                                                             .....
//! ```
//!
//! Completed tasks fulfill their futures in posting order per queue; send
//! and receive progress independently of each other. Bytes delivered to a
//! receive are a contiguous prefix of the peer's byte stream, starting
//! where the previous receive left off. No reordering, no duplication.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use hawser::AddressFamily;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // A server that answers every message with its length.
//! let server = hawser::listen(AddressFamily::Ipv4, 0, |connection| {
//!     if let Ok(request) = connection.receive(1024, Duration::from_secs(1)).wait() {
//!         let _ = connection.send_values(request.len() as u64).wait();
//!     }
//! })?;
//! let port = server.local_address().port;
//!
//! // A client posting a request and awaiting the typed reply.
//! let client = hawser::connect(AddressFamily::Ipv4, "127.0.0.1", port)?;
//! let sent = client.send("twelve bytes")?.wait();
//! assert_eq!(sent, 12);
//! let length = client.receive_values::<u64>(None).wait()?;
//! assert_eq!(length, 12);
//! # Ok(())
//! # }
//! ```
//!
//! The futures work under any async runtime too: `.await` them instead of
//! calling [`wait()`](`SendFuture::wait`):
//!
//! ```no_run
//! # use hawser::AddressFamily;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = hawser::connect(AddressFamily::Ipv4, "127.0.0.1", 8080)?;
//! let sent = client.send(vec![1u8, 2, 3])?.await;
//! let reply = client.receive(64, None).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Receives: exact and up-to
//!
//! Two receive flavors cover the two common framing situations:
//!
//! - [`receive_exact`](`Connection::receive_exact`) resolves with precisely
//!   the requested byte count, or fails: [`RecvError::Timeout`] when the
//!   deadline passes (the connection stays alive), or
//!   [`RecvError::ConnectionLost`] when the peer goes away. It never
//!   resolves short on success.
//! - [`receive`](`Connection::receive`) (up-to) resolves with whatever
//!   arrives first, any length from zero up to the limit. Deadlines and
//!   even peer shutdown are not errors; the future just resolves with the
//!   bytes accumulated so far.
//!
//! Every receive carries a deadline, captured once at posting time. Pass an
//! explicit timeout, or `None` for the connection's default (1 s, adjustable
//! via [`set_receive_timeout`](`Connection::set_receive_timeout`)).
//!
//! # Typed framing
//!
//! [`MessageBuffer`] frames fixed-width integral values over the byte
//! stream in network byte order, and
//! [`send_values`](`Connection::send_values`) /
//! [`receive_values`](`Connection::receive_values`) put the same schema
//! directly on a connection:
//!
//! ```no_run
//! # use hawser::AddressFamily;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let connection = hawser::connect(AddressFamily::Ipv4, "127.0.0.1", 8080)?;
//! // Sender side: three values, encoded big-endian, no padding.
//! let _ = connection.send_values((124_234i32, true, 13i16));
//!
//! // Receiver side: the same type list yields the same values.
//! let (code, flag, delta) = connection.receive_values::<(i32, bool, i16)>(None).wait()?;
//! # Ok(())
//! # }
//! ```
//!
//! The codec carries no self-description: both peers must agree on the
//! value schema out of band.
//!
//! # Shutdown
//!
//! [`Connection::close`] (implied by drop) transitions the engine through
//! Running → Stopping → Stopped: no new tasks are admitted, both workers
//! are woken and joined, every pending future resolves with its terminal
//! value (`0` for sends, an empty vector for up-to receives,
//! [`RecvError::ConnectionLost`] for exact receives) and the socket is
//! closed. The same terminal values apply to tasks posted after close, so
//! racing a post against a close never strands the caller.

mod api;
mod buffers;
mod codec;
mod engine;
mod net;
mod sync;

pub use api::*;
pub use buffers::{FramingError, MessageBuffer};
pub use codec::{from_network, to_network, Integral, Wire};
pub use engine::{rx::RecvError, tx::SendError};
pub use net::{AddressFamily, AddressInfo, SetupError};
pub use sync::{Condvar, Synchronized};
