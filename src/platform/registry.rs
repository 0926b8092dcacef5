//! Listener bookkeeping shared by the resize sources.

use std::sync::{Mutex, MutexGuard};

use crate::core::source::{ResizeListener, SubscribeOptions, SubscriptionId};
use crate::logging::LOG_TARGET;

struct ListenerEntry {
    id: SubscriptionId,
    once: bool,
    // `None` while the listener is being delivered.
    listener: Option<ResizeListener>,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: Vec<ListenerEntry>,
}

/// Ordered listener table with lock-free delivery.
///
/// Listeners run with the table unlocked, so they may subscribe or
/// unsubscribe (themselves included) while being delivered.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    state: Mutex<RegistryState>,
}

impl ListenerRegistry {
    pub(crate) fn subscribe(
        &self,
        listener: ResizeListener,
        options: SubscribeOptions,
    ) -> SubscriptionId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        state.entries.push(ListenerEntry {
            id,
            once: options.once,
            listener: Some(listener),
        });
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        // Dropped after the lock is released: a listener's captures may
        // call back into this registry when dropped.
        let removed = {
            let mut state = self.lock();
            let index = state.entries.iter().position(|entry| entry.id == id);
            index.map(|index| state.entries.remove(index))
        };
        removed.is_some()
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.lock().entries.iter().any(|entry| entry.id == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Deliver one event to every listener registered before the call.
    /// Returns how many listeners ran. A panicking listener is logged and
    /// stays subscribed.
    pub(crate) fn dispatch(&self) -> usize {
        let ids: Vec<SubscriptionId> = self.lock().entries.iter().map(|entry| entry.id).collect();
        let mut delivered = 0;

        for id in ids {
            let (mut listener, once) = {
                let mut state = self.lock();
                let Some(index) = state.entries.iter().position(|entry| entry.id == id) else {
                    continue;
                };
                let once = state.entries[index].once;
                let listener = if once {
                    state.entries.remove(index).listener
                } else {
                    state.entries[index].listener.take()
                };
                match listener {
                    Some(listener) => (listener, once),
                    // Re-entrant dispatch: already running further up the stack.
                    None => continue,
                }
            };

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener()));
            if result.is_err() {
                tracing::error!(
                    target: LOG_TARGET,
                    subscription = id.0,
                    "resize listener panicked"
                );
            }
            delivered += 1;

            if !once {
                let mut state = self.lock();
                if let Some(entry) = state.entries.iter_mut().find(|entry| entry.id == id) {
                    entry.listener = Some(listener);
                }
            }
        }

        delivered
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
