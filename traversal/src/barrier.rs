//! Counting barrier for fan-out tasks.
//!
//! A [`Ticket`] is taken before a task is spawned and released when the task
//! ends, including by panic. A parent always takes its children's tickets
//! before dropping its own, so the count reaches zero only once the whole
//! tree of tasks is done.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Default)]
struct Count {
    in_flight: AtomicUsize,
    drained: Notify,
}

#[derive(Clone, Default)]
pub(crate) struct Barrier {
    count: Arc<Count>,
}

#[must_use = "the barrier opens as soon as the ticket is dropped"]
pub(crate) struct Ticket {
    count: Arc<Count>,
}

impl Barrier {
    pub fn acquire(&self) -> Ticket {
        self.count.in_flight.fetch_add(1, Ordering::AcqRel);
        Ticket {
            count: Arc::clone(&self.count),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.count.in_flight.load(Ordering::Acquire)
    }

    /// Resolve once no tickets are outstanding.
    pub async fn wait(&self) {
        loop {
            let mut drained = pin!(self.count.drained.notified());
            drained.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            drained.await;
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.count.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.count.drained.notify_waiters();
        }
    }
}
