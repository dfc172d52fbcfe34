pub(crate) mod synchronized;
pub(crate) mod time;

pub use parking_lot::Condvar;
pub use synchronized::Synchronized;
pub(crate) use time::AtomicDuration;
