//! Deterministic host: resize events and timers driven by the caller.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::core::source::{
    ResizeListener, ResizeSource, Scheduler, SubscribeOptions, SubscriptionId, TimerId, TimerTask,
};
use crate::platform::registry::ListenerRegistry;

/// Resize source whose events are raised with [`ManualResizeSource::fire`].
#[derive(Default)]
pub struct ManualResizeSource {
    registry: ListenerRegistry,
}

impl ManualResizeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one resize event on the calling thread. Returns the number of
    /// listeners that ran.
    pub fn fire(&self) -> usize {
        self.registry.dispatch()
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.registry.contains(id)
    }
}

impl ResizeSource for ManualResizeSource {
    fn subscribe(&self, listener: ResizeListener, options: SubscribeOptions) -> SubscriptionId {
        self.registry.subscribe(listener, options)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_id: u64,
    tasks: BTreeMap<(Duration, u64), TimerTask>,
}

/// Scheduler on a virtual clock advanced with [`ManualScheduler::advance`].
///
/// Deadlines and the clock saturate at `Duration::MAX`.
#[derive(Default)]
pub struct ManualScheduler {
    clock: Mutex<ManualClock>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn pending(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Move the clock forward, running due tasks in deadline order. Tasks
    /// scheduled by a running task also run if they fall due within `by`.
    /// Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().now.saturating_add(by);
        let mut ran = 0;

        loop {
            let task = {
                let mut clock = self.lock();
                let due = clock
                    .tasks
                    .keys()
                    .next()
                    .copied()
                    .filter(|(deadline, _)| *deadline <= target);
                match due {
                    Some(key) => {
                        clock.now = key.0;
                        clock.tasks.remove(&key)
                    }
                    None => {
                        clock.now = target;
                        None
                    }
                }
            };

            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }

        ran
    }

    fn lock(&self) -> MutexGuard<'_, ManualClock> {
        self.clock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId {
        let mut clock = self.lock();
        clock.next_id += 1;
        let id = clock.next_id;
        let deadline = clock.now.saturating_add(delay);
        clock.tasks.insert((deadline, id), task);
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) -> bool {
        // Dropped after the lock is released, like the other host tables.
        let removed = {
            let mut clock = self.lock();
            let key = clock.tasks.keys().find(|(_, task_id)| *task_id == id.0).copied();
            key.and_then(|key| clock.tasks.remove(&key))
        };
        removed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{ManualResizeSource, ManualScheduler};
    use crate::core::source::{ResizeSource, Scheduler, SubscribeOptions, TimerId};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn tasks_run_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for (name, ms) in [("late", 30), ("early", 10), ("middle", 20)] {
            let log = Arc::clone(&log);
            scheduler.schedule(
                Duration::from_millis(ms),
                Box::new(move || log.lock().unwrap().push(name)),
            );
        }

        assert_eq!(scheduler.advance(Duration::from_millis(15)), 1);
        assert_eq!(scheduler.now(), Duration::from_millis(15));
        assert_eq!(scheduler.advance(Duration::from_millis(100)), 2);
        assert_eq!(*log.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn cancelled_task_never_runs() {
        let scheduler = ManualScheduler::new();
        let ran = Arc::new(Mutex::new(false));
        let id = scheduler.schedule(Duration::from_millis(5), {
            let ran = Arc::clone(&ran);
            Box::new(move || *ran.lock().unwrap() = true)
        });

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert_eq!(scheduler.advance(Duration::from_millis(10)), 0);
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    fn huge_delay_saturates_instead_of_overflowing() {
        let scheduler = ManualScheduler::new();
        scheduler.advance(Duration::from_millis(5));
        let id = scheduler.schedule(Duration::MAX, Box::new(|| {}));

        assert_eq!(scheduler.advance(Duration::from_secs(u64::MAX / 2)), 0);
        assert_eq!(scheduler.pending(), 1);
        assert!(scheduler.cancel(id));
    }

    #[test]
    fn cancel_drops_task_outside_the_lock() {
        struct CancelOnDrop {
            scheduler: Arc<ManualScheduler>,
            other: TimerId,
        }

        impl Drop for CancelOnDrop {
            fn drop(&mut self) {
                self.scheduler.cancel(self.other);
            }
        }

        let scheduler = Arc::new(ManualScheduler::new());
        let other = scheduler.schedule(Duration::from_millis(10), Box::new(|| {}));
        let guard = CancelOnDrop {
            scheduler: Arc::clone(&scheduler),
            other,
        };
        let id = scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                let _ = &guard;
            }),
        );

        assert!(scheduler.cancel(id));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn zero_delay_waits_for_advance() {
        let scheduler = ManualScheduler::new();
        let ran = Arc::new(Mutex::new(0));
        scheduler.schedule(Duration::ZERO, {
            let ran = Arc::clone(&ran);
            Box::new(move || *ran.lock().unwrap() += 1)
        });

        assert_eq!(*ran.lock().unwrap(), 0);
        assert_eq!(scheduler.pending(), 1);
        scheduler.advance(Duration::ZERO);
        assert_eq!(*ran.lock().unwrap(), 1);
    }

    #[test]
    fn fire_reports_delivered_listeners() {
        let source = ManualResizeSource::new();
        assert_eq!(source.fire(), 0);

        let id = source.subscribe(Box::new(|| {}), SubscribeOptions::default());
        source.subscribe(Box::new(|| {}), SubscribeOptions { once: true });
        assert_eq!(source.listener_count(), 2);
        assert_eq!(source.fire(), 2);
        assert_eq!(source.listener_count(), 1);
        assert!(source.is_subscribed(id));
    }
}
