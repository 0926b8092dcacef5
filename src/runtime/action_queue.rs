//! Ordered action list bound to resize events.
//!
//! An [`ActionQueue`] subscribes to a [`ResizeSource`] and runs every
//! registered [`Action`] in list order each time the source delivers an
//! event. After a run, a positive `queue_delay` schedules a fresh
//! subscription on the [`Scheduler`].
//!
//! Invariants:
//! - at most one listener registered by a queue is live; arming always
//!   unsubscribes the previous one first.
//! - at most one re-arm timer is pending; scheduling a new one cancels the
//!   previous one.
//! - no internal lock is held while actions run or while the source and
//!   scheduler are called, so actions may mutate the queue.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crate::config::{EnvConfig, QueueConfig};
use crate::core::action::{action_names_to_string, Action};
use crate::core::error::QueueError;
use crate::core::source::{ResizeSource, Scheduler, SubscribeOptions, SubscriptionId, TimerId};
use crate::logging::{DiagnosticSink, TracingSink, LOG_TARGET};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// A listener is registered and the next resize event runs the actions.
    Armed,
    /// No live listener; waiting for an explicit or scheduled re-arm.
    Dormant,
}

// `id` is `None` between registering the handle and the host returning it.
#[derive(Debug, Clone, Copy)]
struct Registration<T> {
    generation: u64,
    id: Option<T>,
}

#[derive(Default)]
struct QueueInner {
    actions: Vec<Action>,
    once: bool,
    queue_delay: Duration,
    subscription: Option<Registration<SubscriptionId>>,
    pending_rearm: Option<Registration<TimerId>>,
    next_generation: u64,
    disposed: bool,
}

impl QueueInner {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn check_index(&self, index: usize) -> Result<(), QueueError> {
        if index < self.actions.len() {
            Ok(())
        } else {
            Err(QueueError::Index {
                index,
                len: self.actions.len(),
            })
        }
    }

    fn position(&self, action: &Action) -> Option<usize> {
        self.actions.iter().position(|stored| stored.same_as(action))
    }
}

struct QueueShared {
    inner: Mutex<QueueInner>,
    source: Arc<dyn ResizeSource>,
    scheduler: Arc<dyn Scheduler>,
    sink: Arc<dyn DiagnosticSink>,
}

impl QueueShared {
    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn report(&self, line: &str) {
        self.sink.error(line);
    }

    fn arm(self: &Arc<Self>) {
        let (stale, once, generation) = {
            let mut inner = self.lock();
            if inner.disposed {
                tracing::debug!(target: LOG_TARGET, "ignoring arm on disposed queue");
                return;
            }
            let generation = inner.next_generation();
            let stale = inner
                .subscription
                .replace(Registration {
                    generation,
                    id: None,
                })
                .and_then(|registration| registration.id);
            (stale, inner.once, generation)
        };

        if let Some(stale) = stale {
            self.source.unsubscribe(stale);
        }

        let weak = Arc::downgrade(self);
        let id = self.source.subscribe(
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    if once {
                        shared.mark_delivered(generation);
                    }
                    shared.run_all();
                }
            }),
            SubscribeOptions { once },
        );

        let superseded = {
            let mut inner = self.lock();
            match inner.subscription.as_mut() {
                Some(current) if current.generation == generation => {
                    current.id = Some(id);
                    false
                }
                _ => true,
            }
        };

        if superseded {
            // Either a newer arm won the race, the queue was disposed, or a
            // once listener already fired. Unsubscribing is a no-op for the
            // last case.
            self.source.unsubscribe(id);
        } else {
            tracing::debug!(
                target: LOG_TARGET,
                subscription = id.0,
                once,
                "armed resize subscription"
            );
        }
    }

    fn mark_delivered(&self, generation: u64) {
        let mut inner = self.lock();
        if inner
            .subscription
            .is_some_and(|current| current.generation == generation)
        {
            inner.subscription = None;
        }
    }

    fn run_all(self: &Arc<Self>) {
        let snapshot = self.lock().actions.clone();

        for action in &snapshot {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| action.call()));
            if result.is_err() {
                self.report(&format!("Action {} panicked while handling resize.", action.name()));
            }
        }

        let delay = self.lock().queue_delay;
        if !delay.is_zero() {
            self.schedule_rearm(delay);
        }
    }

    fn schedule_rearm(self: &Arc<Self>, delay: Duration) {
        let (previous, generation) = {
            let mut inner = self.lock();
            if inner.disposed {
                return;
            }
            let generation = inner.next_generation();
            let previous = inner
                .pending_rearm
                .replace(Registration {
                    generation,
                    id: None,
                })
                .and_then(|registration| registration.id);
            (previous, generation)
        };

        if let Some(previous) = previous {
            self.scheduler.cancel(previous);
        }

        let weak = Arc::downgrade(self);
        let id = self.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_rearm_timer(generation);
                }
            }),
        );

        let superseded = {
            let mut inner = self.lock();
            match inner.pending_rearm.as_mut() {
                Some(current) if current.generation == generation => {
                    current.id = Some(id);
                    false
                }
                _ => true,
            }
        };

        if superseded {
            self.scheduler.cancel(id);
        } else {
            tracing::debug!(
                target: LOG_TARGET,
                timer = id.0,
                delay_ms = delay.as_millis() as u64,
                "scheduled resize re-arm"
            );
        }
    }

    fn on_rearm_timer(self: &Arc<Self>, generation: u64) {
        {
            let mut inner = self.lock();
            let current = inner
                .pending_rearm
                .is_some_and(|pending| pending.generation == generation);
            if !current {
                return;
            }
            inner.pending_rearm = None;
        }
        self.arm();
    }

    fn cancel_rearm(&self) -> bool {
        let pending = self.lock().pending_rearm.take();
        match pending {
            Some(registration) => {
                if let Some(id) = registration.id {
                    self.scheduler.cancel(id);
                }
                true
            }
            None => false,
        }
    }

    fn teardown(&self) {
        let (subscription, pending) = {
            let mut inner = self.lock();
            inner.disposed = true;
            (
                inner.subscription.take().and_then(|r| r.id),
                inner.pending_rearm.take().and_then(|r| r.id),
            )
        };
        if let Some(id) = subscription {
            self.source.unsubscribe(id);
        }
        if let Some(id) = pending {
            self.scheduler.cancel(id);
        }
    }
}

impl Drop for QueueShared {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Ordered list of actions run on every resize event.
///
/// Cloning yields another handle to the same queue. The subscription and any
/// pending re-arm are released by [`ActionQueue::dispose`] or when the last
/// handle is dropped.
#[derive(Clone)]
pub struct ActionQueue {
    shared: Arc<QueueShared>,
}

impl ActionQueue {
    /// Create a queue and arm its first subscription.
    pub fn new(
        config: QueueConfig,
        source: Arc<dyn ResizeSource>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self::with_sink(config, source, scheduler, Arc::new(TracingSink))
    }

    pub fn with_sink(
        config: QueueConfig,
        source: Arc<dyn ResizeSource>,
        scheduler: Arc<dyn Scheduler>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let shared = Arc::new(QueueShared {
            inner: Mutex::new(QueueInner {
                once: config.once,
                queue_delay: config.queue_delay,
                ..QueueInner::default()
            }),
            source,
            scheduler,
            sink,
        });
        shared.arm();
        Self { shared }
    }

    /// Create a queue configured from `RESIZE_QUEUE_*` environment variables.
    pub fn from_env(source: Arc<dyn ResizeSource>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::new(EnvConfig::from_env().queue_config(), source, scheduler)
    }

    pub fn once(&self) -> bool {
        self.shared.lock().once
    }

    pub fn queue_delay(&self) -> Duration {
        self.shared.lock().queue_delay
    }

    pub fn state(&self) -> QueueState {
        if self.shared.lock().subscription.is_some() {
            QueueState::Armed
        } else {
            QueueState::Dormant
        }
    }

    pub fn has_pending_rearm(&self) -> bool {
        self.shared.lock().pending_rearm.is_some()
    }

    /// Register a fresh listener, replacing the current one if any.
    pub fn arm_subscription(&self) {
        self.shared.arm();
    }

    /// Run every action once, in order, then schedule a re-arm if
    /// `queue_delay` is positive.
    ///
    /// Actions run over a snapshot taken before the first call; changes they
    /// make to the list apply from the next run. A panicking action is
    /// reported and the remaining actions still run.
    pub fn run_all(&self) {
        self.shared.run_all();
    }

    /// A positive delay arms a subscription now and is used for later
    /// re-arms. Zero disables re-arming and cancels a pending re-arm.
    pub fn reset_queue_delay(&self, queue_delay: Duration) {
        self.shared.lock().queue_delay = queue_delay;
        self.shared.cancel_rearm();
        if !queue_delay.is_zero() {
            self.shared.arm();
        }
    }

    /// Cancel a scheduled re-arm. Returns `false` if none was pending.
    pub fn cancel_pending_rearm(&self) -> bool {
        self.shared.cancel_rearm()
    }

    /// Unsubscribe and cancel any pending re-arm. The queue stays usable as a
    /// list but never arms again.
    pub fn dispose(&self) {
        self.shared.teardown();
        tracing::debug!(target: LOG_TARGET, "action queue disposed");
    }

    /// Borrow the live list. `f` must not call back into this queue.
    pub fn with_actions<R>(&self, f: impl FnOnce(&[Action]) -> R) -> R {
        f(&self.shared.lock().actions)
    }

    /// Shallow copy of the list: a new `Vec` sharing the same actions.
    pub fn snapshot(&self) -> Vec<Action> {
        self.shared.lock().actions.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().actions.is_empty()
    }

    pub fn at(&self, index: usize) -> Result<Action, QueueError> {
        let result = {
            let inner = self.shared.lock();
            inner
                .check_index(index)
                .map(|()| inner.actions[index].clone())
        };
        result.map_err(|err| self.index_error(err))
    }

    /// Smallest index holding `action` (by identity).
    pub fn index_of(&self, action: &Action) -> Result<usize, QueueError> {
        let position = self.shared.lock().position(action);
        position.ok_or_else(|| {
            self.shared
                .report(&format!("No index found for {}.", action.name()));
            QueueError::NotFound {
                name: action.name().to_string(),
            }
        })
    }

    pub fn append(&self, action: Action) {
        self.shared.lock().actions.push(action);
    }

    pub fn prepend(&self, action: Action) {
        self.shared.lock().actions.insert(0, action);
    }

    /// Overwrite the action at `index`, returning the previous one.
    pub fn replace_at(&self, index: usize, action: Action) -> Result<Action, QueueError> {
        let result = {
            let mut inner = self.shared.lock();
            inner
                .check_index(index)
                .map(|()| std::mem::replace(&mut inner.actions[index], action))
        };
        result.map_err(|err| self.index_error(err))
    }

    /// Overwrite the first occurrence of `action`, returning it.
    pub fn replace(&self, action: &Action, new_action: Action) -> Result<Action, QueueError> {
        let index = self.index_of(action).inspect_err(|_| {
            self.shared.report(&format!(
                "Unable to replace {} with {}. No index found for {}.",
                action.name(),
                new_action.name(),
                action.name()
            ));
        })?;
        self.replace_at(index, new_action)
    }

    /// Exchange two actions in place. Out-of-range indices leave the list
    /// untouched.
    pub fn swap_at(&self, a: usize, b: usize) -> Result<(), QueueError> {
        let len = {
            let mut inner = self.shared.lock();
            let len = inner.actions.len();
            if a < len && b < len {
                inner.actions.swap(a, b);
                return Ok(());
            }
            len
        };

        let line = match (a < len, b < len) {
            (false, false) => {
                format!("Attempting to swap with undefined indices: [{a}] and [{b}].")
            }
            (false, true) => format!("Attempting to swap [{b}] with an undefined index [{a}]."),
            _ => format!("Attempting to swap [{a}] with an undefined index [{b}]."),
        };
        self.shared.report(&line);
        let index = if a >= len { a } else { b };
        Err(QueueError::Index { index, len })
    }

    /// Swap the first occurrences of two actions.
    pub fn swap(&self, a: &Action, b: &Action) -> Result<(), QueueError> {
        let index_a = self.index_of(a);
        let index_b = self.index_of(b);
        self.swap_at(index_a?, index_b?)
    }

    /// Remove and return the action at `index`, shifting later ones left.
    pub fn remove_at(&self, index: usize) -> Result<Action, QueueError> {
        let result = {
            let mut inner = self.shared.lock();
            inner
                .check_index(index)
                .map(|()| inner.actions.remove(index))
        };
        result.map_err(|err| self.index_error(err))
    }

    /// Remove the first occurrence of `action`.
    pub fn remove(&self, action: &Action) -> Result<Action, QueueError> {
        let index = self.index_of(action)?;
        self.remove_at(index)
    }

    /// Empty the list. The subscription is left as is.
    pub fn clear(&self) {
        self.shared.lock().actions.clear();
    }

    pub fn dump_actions(&self) {
        let snapshot = self.snapshot();
        self.shared.sink.info(&format!("{snapshot:?}"));
    }

    /// One `index: value` line per action; `names_only` prints just names.
    pub fn dump_indexed_values(&self, names_only: bool) {
        for (index, action) in self.snapshot().iter().enumerate() {
            let line = if names_only {
                format!("{index}: {}", action.name())
            } else {
                format!("{index}: {action}")
            };
            self.shared.sink.info(&line);
        }
    }

    pub fn dump_action_names(&self) {
        let names = action_names_to_string(&self.snapshot());
        self.shared.sink.info(&names);
    }

    fn index_error(&self, err: QueueError) -> QueueError {
        if let QueueError::Index { index, len } = &err {
            self.shared.report(&format!(
                "Index [{index}] is out of range for {len} action(s)."
            ));
        }
        err
    }
}

impl fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("ActionQueue")
            .field("actions", &inner.actions)
            .field("once", &inner.once)
            .field("queue_delay", &inner.queue_delay)
            .field("armed", &inner.subscription.is_some())
            .field("pending_rearm", &inner.pending_rearm.is_some())
            .finish()
    }
}

/// Weak handle that does not keep the queue alive.
#[derive(Clone)]
pub struct WeakActionQueue {
    shared: Weak<QueueShared>,
}

impl WeakActionQueue {
    pub fn upgrade(&self) -> Option<ActionQueue> {
        self.shared.upgrade().map(|shared| ActionQueue { shared })
    }
}

impl ActionQueue {
    /// Handle for use inside actions, which would otherwise keep the queue
    /// alive through their own list.
    pub fn downgrade(&self) -> WeakActionQueue {
        WeakActionQueue {
            shared: Arc::downgrade(&self.shared),
        }
    }
}
