//! A fair counting semaphore with blocking acquisition.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct State {
    available: usize,
    next_ticket: u64,
    now_serving: u64,
}

struct Inner {
    state: Mutex<State>,
    released: Condvar,
    capacity: usize,
}

/// Counting semaphore that grants permits in arrival order.
///
/// Every caller of [`FairSemaphore::acquire`] draws a ticket and is served
/// strictly in ticket order, so a steady stream of new callers cannot starve
/// one that has been waiting longer.
#[derive(Clone)]
pub struct FairSemaphore {
    inner: Arc<Inner>,
}

/// RAII permit. Returned to the semaphore on drop, including during unwinding.
#[must_use = "the permit is released as soon as it is dropped"]
pub struct Permit {
    inner: Arc<Inner>,
}

impl FairSemaphore {
    /// Creates a semaphore with `permits` permits.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    available: permits,
                    next_ticket: 0,
                    now_serving: 0,
                }),
                released: Condvar::new(),
                capacity: permits,
            }),
        }
    }

    /// Total number of permits.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Permits not currently held.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.state.lock().available
    }

    /// Blocks until a permit is free and it is this caller's turn.
    pub fn acquire(&self) -> Permit {
        let mut state = self.inner.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while state.now_serving != ticket || state.available == 0 {
            self.inner.released.wait(&mut state);
        }

        state.available -= 1;
        state.now_serving += 1;
        drop(state);
        // The next ticket holder may be able to proceed too.
        self.inner.released.notify_all();

        Permit {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Takes a permit only if one is free and nobody is queued ahead.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut state = self.inner.state.lock();
        if state.available == 0 || state.now_serving != state.next_ticket {
            return None;
        }
        state.available -= 1;
        state.next_ticket += 1;
        state.now_serving += 1;
        Some(Permit {
            inner: Arc::clone(&self.inner),
        })
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.inner.state.lock().available += 1;
        self.inner.released.notify_all();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn permits_are_counted() {
        let sem = FairSemaphore::new(2);
        let a = sem.acquire();
        let _b = sem.acquire();
        assert_eq!(sem.available(), 0);
        assert!(sem.try_acquire().is_none());
        drop(a);
        assert_eq!(sem.available(), 1);
        assert!(sem.try_acquire().is_some());
        assert_eq!(sem.available(), 1);
    }

    #[test]
    fn acquire_blocks_until_release() {
        let sem = FairSemaphore::new(1);
        let held = sem.acquire();
        let acquired = Arc::new(AtomicUsize::new(0));

        let waiter = {
            let sem = sem.clone();
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _p = sem.acquire();
                acquired.store(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);
        drop(held);
        waiter.join().unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert_eq!(sem.available(), 1);
    }

    #[test]
    fn waiters_are_served_in_arrival_order() {
        let sem = FairSemaphore::new(1);
        let held = sem.acquire();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut waiters = Vec::new();
        for i in 0..4 {
            let sem = sem.clone();
            let order = Arc::clone(&order);
            waiters.push(thread::spawn(move || {
                let _p = sem.acquire();
                order.lock().push(i);
            }));
            // Let each waiter draw its ticket before the next is spawned.
            thread::sleep(Duration::from_millis(20));
        }

        drop(held);
        for w in waiters {
            w.join().unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }
}
