//! SIGWINCH-backed resize source.

use std::sync::Arc;
#[cfg(unix)]
use std::thread::{self, JoinHandle};

use once_cell::sync::Lazy;

use crate::core::source::{ResizeListener, ResizeSource, SubscribeOptions, SubscriptionId};
use crate::platform::registry::ListenerRegistry;

#[cfg(unix)]
use crate::logging::LOG_TARGET;
#[cfg(unix)]
use signal_hook::iterator::Signals;

static GLOBAL_SOURCE: Lazy<Arc<SignalResizeSource>> =
    Lazy::new(|| Arc::new(SignalResizeSource::new()));

/// Delivers terminal resize (`SIGWINCH`) events to subscribed listeners.
///
/// Listeners run on a dedicated dispatch thread, one event at a time. Bursts
/// of signals arriving while listeners run may be coalesced into one
/// delivery. If the signal handler cannot be installed the source stays
/// inert: subscriptions are accepted but never delivered.
pub struct SignalResizeSource {
    registry: Arc<ListenerRegistry>,
    #[cfg(unix)]
    signal_handle: Option<signal_hook::iterator::Handle>,
    #[cfg(unix)]
    dispatch_thread: Option<JoinHandle<()>>,
}

impl SignalResizeSource {
    #[cfg(unix)]
    pub fn new() -> Self {
        let registry = Arc::new(ListenerRegistry::default());

        let mut signals = match Signals::new([libc::SIGWINCH]) {
            Ok(signals) => signals,
            Err(err) => {
                tracing::error!(target: LOG_TARGET, "failed to register SIGWINCH: {err}");
                return Self {
                    registry,
                    signal_handle: None,
                    dispatch_thread: None,
                };
            }
        };
        let handle = signals.handle();
        let dispatch_registry = Arc::clone(&registry);

        let thread = thread::Builder::new()
            .name("resize-queue-sigwinch".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        dispatch_registry.dispatch()
                    }));
                    match result {
                        Ok(delivered) => tracing::trace!(
                            target: LOG_TARGET,
                            delivered,
                            "resize event dispatched"
                        ),
                        Err(_) => tracing::error!(target: LOG_TARGET, "resize dispatch panicked"),
                    }
                }
            });

        match thread {
            Ok(thread) => Self {
                registry,
                signal_handle: Some(handle),
                dispatch_thread: Some(thread),
            },
            Err(err) => {
                handle.close();
                tracing::error!(target: LOG_TARGET, "failed to spawn resize thread: {err}");
                Self {
                    registry,
                    signal_handle: None,
                    dispatch_thread: None,
                }
            }
        }
    }

    #[cfg(not(unix))]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ListenerRegistry::default()),
        }
    }

    /// Process-wide shared source.
    pub fn global() -> Arc<SignalResizeSource> {
        Arc::clone(&GLOBAL_SOURCE)
    }

    pub fn is_active(&self) -> bool {
        #[cfg(unix)]
        {
            self.signal_handle.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// Raise `SIGWINCH` in this process. Used to force a first layout pass.
    #[cfg(unix)]
    pub fn raise(&self) {
        unsafe {
            libc::raise(libc::SIGWINCH);
        }
    }
}

impl Default for SignalResizeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ResizeSource for SignalResizeSource {
    fn subscribe(&self, listener: ResizeListener, options: SubscribeOptions) -> SubscriptionId {
        self.registry.subscribe(listener, options)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }
}

#[cfg(unix)]
impl Drop for SignalResizeSource {
    fn drop(&mut self) {
        if let Some(handle) = self.signal_handle.take() {
            handle.close();
        }
        if let Some(thread) = self.dispatch_thread.take() {
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

/// Current terminal size as `(columns, rows)`, if stdout is a terminal.
#[cfg(unix)]
pub fn terminal_size() -> Option<(u16, u16)> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let result = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut size) };
    if result == 0 && size.ws_col > 0 && size.ws_row > 0 {
        Some((size.ws_col, size.ws_row))
    } else {
        None
    }
}

#[cfg(not(unix))]
pub fn terminal_size() -> Option<(u16, u16)> {
    None
}
