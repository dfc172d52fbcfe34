use parking_lot::{Condvar, Mutex};

/// A mutex-guarded owner of a value, with scoped and condition-gated access.
///
/// `Synchronized<T>` never hands out its guard: all access happens through
/// closures that run while the lock is held, so the lock is released on
/// every exit path, early returns and panics included. The engine uses one
/// cell per task queue, paired with a [`Condvar`] that its worker thread
/// waits on.
///
/// The lock is **not** re-entrant: calling [`apply`](`Self::apply`) from
/// within a closure already running on the same cell deadlocks.
///
/// # Examples
///
/// ```
/// use hawser::Synchronized;
///
/// let cell = Synchronized::new(vec![1, 2, 3]);
///
/// let sum: i32 = cell.read(|v| v.iter().sum());
/// assert_eq!(sum, 6);
///
/// cell.apply(|v| v.push(4));
/// assert_eq!(cell.read(|v| v.len()), 4);
/// ```
pub struct Synchronized<T> {
    data: Mutex<T>,
}

impl<T> Synchronized<T> {
    /// Creates a new cell owning `data`.
    pub const fn new(data: T) -> Self {
        Self { data: Mutex::new(data) }
    }

    /// Runs `f` with exclusive access to the value, returning its result.
    pub fn apply<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.data.lock();
        f(&mut guard)
    }

    /// Runs `f` with shared access to the value, returning its result.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.data.lock();
        f(&guard)
    }

    /// Blocks on `condvar` until `ready(&value)` holds.
    ///
    /// The predicate is evaluated under the lock; spurious wakeups are
    /// handled internally. A notification is only observed reliably if the
    /// state change that made `ready` true happened inside a critical
    /// section on this cell.
    pub fn wait(&self, condvar: &Condvar, mut ready: impl FnMut(&T) -> bool) {
        let mut guard = self.data.lock();
        condvar.wait_while(&mut guard, |data| !ready(data));
    }

    /// Blocks on `condvar` until `ready(&value)` holds, then runs `f` while
    /// still holding the lock.
    pub fn wait_and_apply<R>(
        &self,
        condvar: &Condvar,
        mut ready: impl FnMut(&T) -> bool,
        f: impl FnOnce(&mut T) -> R,
    ) -> R {
        let mut guard = self.data.lock();
        condvar.wait_while(&mut guard, |data| !ready(data));
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;

    #[test]
    fn test_apply_and_read() {
        let cell = Synchronized::new(41);

        let result = cell.apply(|value| {
            *value += 1;
            *value
        });
        assert_eq!(result, 42);
        assert_eq!(cell.read(|value| *value), 42);
    }

    #[test]
    fn test_concurrent_increments() {
        const THREADS: usize = 8;
        const INCREMENTS: usize = 1_000;

        let cell = Arc::new(Synchronized::new(0usize));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cell = cell.clone();
                thread::spawn(move || {
                    for _ in 0..INCREMENTS {
                        cell.apply(|value| *value += 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cell.read(|value| *value), THREADS * INCREMENTS);
    }

    #[test]
    fn test_wait_observes_change() {
        let cell = Arc::new(Synchronized::new(false));
        let condvar = Arc::new(Condvar::new());

        let waiter = {
            let cell = cell.clone();
            let condvar = condvar.clone();
            thread::spawn(move || {
                cell.wait(&condvar, |flagged| *flagged);
            })
        };

        thread::sleep(Duration::from_millis(20));
        cell.apply(|flagged| *flagged = true);
        condvar.notify_one();

        waiter.join().unwrap();
        assert!(cell.read(|flagged| *flagged));
    }

    #[test]
    fn test_wait_and_apply_runs_under_lock() {
        let cell = Arc::new(Synchronized::new(Vec::<u8>::new()));
        let condvar = Arc::new(Condvar::new());

        let consumer = {
            let cell = cell.clone();
            let condvar = condvar.clone();
            thread::spawn(move || {
                cell.wait_and_apply(
                    &condvar,
                    |items| !items.is_empty(),
                    |items| items.pop(),
                )
            })
        };

        thread::sleep(Duration::from_millis(20));
        cell.apply(|items| items.push(7));
        condvar.notify_one();

        assert_eq!(consumer.join().unwrap(), Some(7));
        assert!(cell.read(|items| items.is_empty()));
    }

    #[test]
    fn test_wait_returns_immediately_when_ready() {
        let cell = Synchronized::new(5);
        let condvar = Condvar::new();

        // Predicate already holds, no notification needed.
        cell.wait(&condvar, |value| *value == 5);
    }
}
