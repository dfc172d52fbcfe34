use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

const fn duration_to_nanos(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    assert!(nanos <= u64::MAX as u128, "duration too large to store atomically");
    nanos as u64
}

/// A [`Duration`] that can be read and replaced atomically.
///
/// Stores the duration as whole nanoseconds in a single `AtomicU64`, which
/// caps the representable range at about 584 years, plenty for a socket
/// timeout.
pub(crate) struct AtomicDuration(AtomicU64);

impl AtomicDuration {
    pub(crate) fn new(duration: Duration) -> Self {
        Self(AtomicU64::new(duration_to_nanos(duration)))
    }

    pub(crate) fn store(&self, duration: Duration, order: Ordering) {
        self.0.store(duration_to_nanos(duration), order);
    }

    pub(crate) fn load(&self, order: Ordering) -> Duration {
        Duration::from_nanos(self.0.load(order))
    }
}
