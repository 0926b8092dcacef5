//! Queue configuration and environment overrides.

use std::env;
use std::time::Duration;

/// Subscription policy for an [`ActionQueue`](crate::ActionQueue).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueConfig {
    /// Run the actions at most once per armed subscription.
    pub once: bool,
    /// Delay before re-subscribing after a run. Zero disables re-arming.
    pub queue_delay: Duration,
}

impl QueueConfig {
    pub fn new(once: bool, queue_delay: Duration) -> Self {
        Self { once, queue_delay }
    }

    pub fn once() -> Self {
        Self {
            once: true,
            ..Self::default()
        }
    }

    pub fn with_queue_delay(mut self, queue_delay: Duration) -> Self {
        self.queue_delay = queue_delay;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub once: bool,
    pub queue_delay: Duration,
    pub debug: bool,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            once: env_flag("RESIZE_QUEUE_ONCE"),
            queue_delay: env_millis("RESIZE_QUEUE_DELAY_MS"),
            debug: env_flag("RESIZE_QUEUE_DEBUG"),
            log_filter: env_string_opt("RESIZE_QUEUE_LOG"),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::new(self.once, self.queue_delay)
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_millis(key: &str) -> Duration {
    let Some(value) = env_string_opt(key) else {
        return Duration::ZERO;
    };
    match value.trim().parse::<u64>() {
        Ok(ms) => Duration::from_millis(ms),
        Err(err) => {
            tracing::warn!(target: crate::logging::LOG_TARGET, "ignoring {key}={value:?}: {err}");
            Duration::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{EnvConfig, QueueConfig};
    use std::env;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }

    fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }

    #[test]
    fn env_defaults_match_queue_defaults() {
        let _lock = env_lock();
        let _g1 = set_env_guard("RESIZE_QUEUE_ONCE", None);
        let _g2 = set_env_guard("RESIZE_QUEUE_DELAY_MS", None);
        let _g3 = set_env_guard("RESIZE_QUEUE_DEBUG", None);
        let _g4 = set_env_guard("RESIZE_QUEUE_LOG", None);

        let config = EnvConfig::from_env();
        assert!(!config.once);
        assert_eq!(config.queue_delay, Duration::ZERO);
        assert!(!config.debug);
        assert!(config.log_filter.is_none());
        assert_eq!(config.queue_config(), QueueConfig::default());
    }

    #[test]
    fn env_values_are_parsed() {
        let _lock = env_lock();
        let _g1 = set_env_guard("RESIZE_QUEUE_ONCE", Some("1"));
        let _g2 = set_env_guard("RESIZE_QUEUE_DELAY_MS", Some(" 250 "));
        let _g3 = set_env_guard("RESIZE_QUEUE_DEBUG", Some("1"));
        let _g4 = set_env_guard("RESIZE_QUEUE_LOG", Some("resize_queue=trace"));

        let config = EnvConfig::from_env();
        assert!(config.once);
        assert_eq!(config.queue_delay, Duration::from_millis(250));
        assert!(config.debug);
        assert_eq!(config.log_filter.as_deref(), Some("resize_queue=trace"));
        assert_eq!(
            config.queue_config(),
            QueueConfig::new(true, Duration::from_millis(250))
        );
    }

    #[test]
    fn invalid_delay_falls_back_to_zero() {
        let _lock = env_lock();
        let _g1 = set_env_guard("RESIZE_QUEUE_DELAY_MS", Some("-5"));
        assert_eq!(EnvConfig::from_env().queue_delay, Duration::ZERO);
    }

    #[test]
    fn flags_other_than_one_are_off() {
        let _lock = env_lock();
        let _g1 = set_env_guard("RESIZE_QUEUE_ONCE", Some("true"));
        assert!(!EnvConfig::from_env().once);
    }

    #[test]
    fn builder_helpers() {
        let config = QueueConfig::once().with_queue_delay(Duration::from_millis(10));
        assert!(config.once);
        assert_eq!(config.queue_delay, Duration::from_millis(10));
    }
}
