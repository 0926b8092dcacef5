//! Queue runtime: the action list and its subscription policy.

pub mod action_queue;

pub use action_queue::{ActionQueue, QueueState, WeakActionQueue};
