//! Host integrations for resize events and timers.

pub mod manual;
pub(crate) mod registry;
pub mod signal_source;
pub mod timer;

pub use manual::{ManualResizeSource, ManualScheduler};
pub use signal_source::{terminal_size, SignalResizeSource};
pub use timer::ThreadScheduler;
