use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::timer::TimerType;

#[derive(Debug)]
struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Slots {
    next_generation: u64,
    armed: HashMap<TimerType, Slot>,
}

/// The timers a single transaction has armed, at most one per [`TimerType`].
///
/// Each timer is a tokio task that sleeps and then runs its callback. Arming a timer
/// that is already armed replaces it. A firing timer must call [`release`](Self::release)
/// before acting, so that a later [`cancel_all`](Self::cancel_all) from its own
/// callback does not abort it.
#[derive(Debug, Default)]
pub struct TimerSlots {
    inner: Mutex<Slots>,
}

impl TimerSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `timer` to run `callback(generation)` after `after`.
    pub fn arm<F, Fut>(&self, timer: TimerType, after: Duration, callback: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.inner.lock();
        slots.next_generation += 1;
        let generation = slots.next_generation;
        let fire = callback(generation);
        // Spawned under the lock so the task cannot release itself before it is stored.
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            fire.await;
        });
        trace!(%timer, ?after, generation, "timer armed");
        if let Some(previous) = slots.armed.insert(timer, Slot { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Claims a fired timer. Returns `false` if it was cancelled or re-armed meanwhile.
    pub fn release(&self, timer: TimerType, generation: u64) -> bool {
        let mut slots = self.inner.lock();
        match slots.armed.get(&timer) {
            Some(slot) if slot.generation == generation => {
                slots.armed.remove(&timer);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self, timer: TimerType) {
        if let Some(slot) = self.inner.lock().armed.remove(&timer) {
            trace!(%timer, "timer cancelled");
            slot.handle.abort();
        }
    }

    pub fn cancel_all(&self) {
        let mut slots = self.inner.lock();
        for (_, slot) in slots.armed.drain() {
            slot.handle.abort();
        }
    }

    pub fn is_armed(&self, timer: TimerType) -> bool {
        self.inner.lock().armed.contains_key(&timer)
    }
}

impl Drop for TimerSlots {
    fn drop(&mut self) {
        for (_, slot) in self.inner.get_mut().armed.drain() {
            slot.handle.abort();
        }
    }
}
