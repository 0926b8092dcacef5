//! Host seams: the resize event source and deferred execution.

use std::time::Duration;

/// Listener invoked on each delivered resize event.
pub type ResizeListener = Box<dyn FnMut() + Send + 'static>;

/// One-shot task run by a [`Scheduler`].
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Drop the listener after its first delivery.
    pub once: bool,
}

/// Source of viewport resize events.
///
/// Implementations must not hold internal locks while a listener runs: a
/// listener is allowed to call `subscribe`/`unsubscribe` on the same source.
/// Unsubscribing a listener from inside its own delivery is allowed and
/// prevents any further delivery to it.
pub trait ResizeSource: Send + Sync {
    fn subscribe(&self, listener: ResizeListener, options: SubscribeOptions) -> SubscriptionId;

    /// Returns `false` if the id is unknown or already gone (e.g. a delivered
    /// `once` listener).
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Deferred one-shot execution.
///
/// `schedule` never runs the task synchronously.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId;

    /// Returns `false` if the task already ran or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
}
