//! Timer thread implementing [`Scheduler`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::core::source::{Scheduler, TimerId, TimerTask};
use crate::logging::LOG_TARGET;

#[derive(Default)]
struct TimerState {
    next_id: u64,
    tasks: BTreeMap<(Instant, u64), TimerTask>,
    // Deadlines past the end of `Instant`'s range. Never due; only cancelled.
    parked: HashMap<u64, TimerTask>,
    shutdown: bool,
}

#[derive(Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    cvar: Condvar,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run(&self) {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return;
            }

            let next = state.tasks.keys().next().copied();
            let Some((deadline, id)) = next else {
                state = self
                    .cvar
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                continue;
            };

            let now = Instant::now();
            if deadline > now {
                state = self
                    .cvar
                    .wait_timeout(state, deadline - now)
                    .map(|(state, _)| state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner().0);
                continue;
            }

            let Some(task) = state.tasks.remove(&(deadline, id)) else {
                continue;
            };
            drop(state);

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
            if result.is_err() {
                tracing::error!(target: LOG_TARGET, timer = id, "timer task panicked");
            }

            state = self.lock();
        }
    }
}

/// Runs scheduled tasks on a dedicated thread.
///
/// Pending tasks are discarded when the scheduler is dropped. A delay too
/// large to represent as a deadline never fires but can still be cancelled.
pub struct ThreadScheduler {
    shared: Arc<TimerShared>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        let shared = Arc::new(TimerShared::default());
        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("resize-queue-timer".to_string())
            .spawn(move || worker.run())
            .map_err(|err| {
                tracing::error!(target: LOG_TARGET, "failed to spawn timer thread: {err}");
            })
            .ok();

        Self { shared, thread }
    }

    pub fn pending(&self) -> usize {
        let state = self.shared.lock();
        state.tasks.len() + state.parked.len()
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId {
        let mut state = self.shared.lock();
        state.next_id += 1;
        let id = state.next_id;
        match Instant::now().checked_add(delay) {
            Some(deadline) => {
                state.tasks.insert((deadline, id), task);
                self.shared.cvar.notify_one();
            }
            None => {
                tracing::debug!(target: LOG_TARGET, timer = id, "delay out of range, task parked");
                state.parked.insert(id, task);
            }
        }
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) -> bool {
        // The task is dropped after the lock is released: its captures may
        // call back into this scheduler when dropped.
        let removed = {
            let mut state = self.shared.lock();
            let key = state.tasks.keys().find(|(_, task_id)| *task_id == id.0).copied();
            match key {
                Some(key) => state.tasks.remove(&key),
                None => state.parked.remove(&id.0),
            }
        };
        if removed.is_some() {
            self.shared.cvar.notify_one();
        }
        removed.is_some()
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        let discarded = {
            let mut state = self.shared.lock();
            state.shutdown = true;
            (
                std::mem::take(&mut state.tasks),
                std::mem::take(&mut state.parked),
            )
        };
        self.shared.cvar.notify_all();
        drop(discarded);
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ThreadScheduler;
    use crate::core::source::{Scheduler, TimerId};
    use std::sync::{mpsc, Arc};
    use std::time::{Duration, Instant};

    #[test]
    fn runs_tasks_after_delay_in_order() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();

        for (name, ms) in [("second", 40u64), ("first", 10)] {
            let tx = tx.clone();
            scheduler.schedule(
                Duration::from_millis(ms),
                Box::new(move || {
                    let _ = tx.send(name);
                }),
            );
        }

        let first = rx.recv_timeout(Duration::from_secs(2)).expect("first task");
        let second = rx.recv_timeout(Duration::from_secs(2)).expect("second task");
        assert_eq!((first, second), ("first", "second"));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn cancel_prevents_run() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = mpsc::channel::<()>();
        let id = scheduler.schedule(
            Duration::from_millis(30),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert_eq!(scheduler.pending(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn out_of_range_delay_is_parked_not_run() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = mpsc::channel::<()>();
        let id = scheduler.schedule(
            Duration::from_secs(u64::MAX),
            Box::new(move || {
                let _ = tx.send(());
            }),
        );

        assert_eq!(scheduler.pending(), 1);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        assert!(scheduler.cancel(id));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancel_drops_task_outside_the_lock() {
        struct CancelOnDrop {
            scheduler: Arc<ThreadScheduler>,
            other: TimerId,
        }

        impl Drop for CancelOnDrop {
            fn drop(&mut self) {
                self.scheduler.cancel(self.other);
            }
        }

        let scheduler = Arc::new(ThreadScheduler::new());
        let other = scheduler.schedule(Duration::from_secs(60), Box::new(|| {}));
        let guard = CancelOnDrop {
            scheduler: Arc::clone(&scheduler),
            other,
        };
        let id = scheduler.schedule(
            Duration::from_secs(60),
            Box::new(move || {
                let _ = &guard;
            }),
        );

        assert!(scheduler.cancel(id));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn panicking_task_does_not_stop_the_timer() {
        let scheduler = ThreadScheduler::new();
        let (tx, rx) = mpsc::channel();
        scheduler.schedule(Duration::ZERO, Box::new(|| panic!("task failure")));
        scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || {
                let _ = tx.send(7);
            }),
        );

        assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(7));
    }

    #[test]
    fn drop_discards_pending_tasks() {
        let (tx, rx) = mpsc::channel::<()>();
        {
            let scheduler = ThreadScheduler::new();
            scheduler.schedule(
                Duration::from_secs(60),
                Box::new(move || {
                    let _ = tx.send(());
                }),
            );
        }
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
