//! Ordered action queue bound to terminal resize events.
//!
//! An [`ActionQueue`] keeps a list of zero-argument [`Action`]s and runs them,
//! in order, whenever its [`ResizeSource`] delivers a resize event. The
//! subscription can fire once or persist, and a positive queue delay re-arms
//! it after each run.
//!
//! # Public API Overview
//! - Build queues over a host with [`ActionQueue::new`]; the process terminal
//!   is [`SignalResizeSource::global`] plus a [`ThreadScheduler`].
//! - Drive queues deterministically with [`ManualResizeSource`] and
//!   [`ManualScheduler`].
//! - Route dumps and reported failures through a [`DiagnosticSink`].

pub mod config;
pub mod logging;

pub mod core;
pub mod platform;
pub mod runtime;

/// Queue configuration.
pub use crate::config::{EnvConfig, QueueConfig};

/// Actions and errors.
pub use crate::core::action::{action_names_to_string, Action};
pub use crate::core::error::QueueError;

/// Host seams.
pub use crate::core::source::{
    ResizeListener, ResizeSource, Scheduler, SubscribeOptions, SubscriptionId, TimerId, TimerTask,
};

/// Diagnostics.
pub use crate::logging::{init_tracing, DiagnosticSink, MemorySink, TracingSink};

/// Host implementations.
pub use crate::platform::{
    terminal_size, ManualResizeSource, ManualScheduler, SignalResizeSource, ThreadScheduler,
};

/// The queue itself.
pub use crate::runtime::{ActionQueue, QueueState, WeakActionQueue};
