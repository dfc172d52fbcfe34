//! Futures returned by the posting API.
//!
//! Each posting call hands a completion channel to the engine and wraps the
//! receiving half in one of the types below. The futures are
//! runtime-agnostic: they can be `.await`ed from any executor, or resolved
//! synchronously with `wait()` from a plain thread (for example inside a
//! server's `on_connect` callback, which runs on the accept thread).
//!
//! Dropping a future does **not** cancel the operation: the task is
//! already queued and the engine will still perform the I/O.

use std::{
    future::Future,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::{buffers::MessageBuffer, codec::Wire, engine::rx::RecvError};

/// A pending transmission; resolves to the number of bytes sent.
///
/// Resolves to the full payload length on success and to `0` when the
/// engine shut down before the payload went out (the send terminal value).
#[must_use = "futures do nothing unless you `.await` or `wait()` them"]
#[derive(Debug)]
pub struct SendFuture {
    pub(crate) result: oneshot::Receiver<u64>,
}

impl SendFuture {
    /// Blocks the current thread until the transmission completes.
    ///
    /// Must not be called from within an async runtime; use `.await` there.
    pub fn wait(self) -> u64 {
        self.result.blocking_recv().unwrap_or(0)
    }
}

impl Future for SendFuture {
    type Output = u64;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().result)
            .poll(cx)
            .map(|result| result.unwrap_or(0))
    }
}

/// A pending receive; resolves to the received bytes.
///
/// Up-to receives resolve `Ok` with any length in `0..=max_bytes`; exact
/// receives resolve `Ok` with precisely the requested length or `Err` with
/// a [`RecvError`].
#[must_use = "futures do nothing unless you `.await` or `wait()` them"]
pub struct ReceiveFuture {
    pub(crate) result: oneshot::Receiver<Result<Vec<u8>, RecvError>>,
}

impl ReceiveFuture {
    /// Blocks the current thread until the receive completes.
    ///
    /// Must not be called from within an async runtime; use `.await` there.
    pub fn wait(self) -> Result<Vec<u8>, RecvError> {
        self.result
            .blocking_recv()
            .unwrap_or(Err(RecvError::ConnectionLost))
    }
}

impl Future for ReceiveFuture {
    type Output = Result<Vec<u8>, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().result)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(RecvError::ConnectionLost)))
    }
}

fn decode<T: Wire>(bytes: Vec<u8>) -> Result<T, RecvError> {
    // The underlying exact receive delivered T::WIDTH bytes; a short buffer
    // can only mean the connection went away mid-request.
    MessageBuffer::from(bytes)
        .try_extract::<T>()
        .ok_or(RecvError::ConnectionLost)
}

/// A pending typed receive; resolves to a decoded value or tuple.
///
/// Backed by an exact receive of [`T::WIDTH`](`Wire::WIDTH`) bytes, decoded
/// big-endian in declaration order on completion.
#[must_use = "futures do nothing unless you `.await` or `wait()` them"]
pub struct ValuesFuture<T> {
    inner: ReceiveFuture,
    _schema: PhantomData<fn() -> T>,
}

impl<T: Wire> ValuesFuture<T> {
    pub(crate) fn new(inner: ReceiveFuture) -> Self {
        Self {
            inner,
            _schema: PhantomData,
        }
    }

    /// Blocks the current thread until the values arrive.
    ///
    /// Must not be called from within an async runtime; use `.await` there.
    pub fn wait(self) -> Result<T, RecvError> {
        self.inner.wait().and_then(decode)
    }
}

impl<T: Wire> Future for ValuesFuture<T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().inner)
            .poll(cx)
            .map(|result| result.and_then(decode))
    }
}

/// A pending up-to receive decoded as text; resolves to a `String`.
///
/// Invalid UTF-8 sequences are replaced, never reported as errors.
#[must_use = "futures do nothing unless you `.await` or `wait()` them"]
pub struct StringFuture {
    inner: ReceiveFuture,
}

impl StringFuture {
    pub(crate) fn new(inner: ReceiveFuture) -> Self {
        Self { inner }
    }

    /// Blocks the current thread until the receive completes.
    ///
    /// Must not be called from within an async runtime; use `.await` there.
    pub fn wait(self) -> Result<String, RecvError> {
        self.inner.wait().map(into_text)
    }
}

fn into_text(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

impl Future for StringFuture {
    type Output = Result<String, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().inner)
            .poll(cx)
            .map(|result| result.map(into_text))
    }
}
