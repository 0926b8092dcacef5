//! Prints the terminal size on every resize until Ctrl+C.
//!
//! `RESIZE_QUEUE_ONCE=1` and `RESIZE_QUEUE_DELAY_MS=<ms>` select the
//! subscription policy; `RESIZE_QUEUE_DEBUG=1` shows arm/re-arm events.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};

use resize_queue::{
    init_tracing, terminal_size, Action, ActionQueue, EnvConfig, SignalResizeSource,
    ThreadScheduler,
};

fn main() {
    let config = EnvConfig::from_env();
    init_tracing(&config);

    let source = SignalResizeSource::global();
    if !source.is_active() {
        eprintln!("resize events are not available on this platform");
        return;
    }

    let queue = ActionQueue::new(
        config.queue_config(),
        source,
        Arc::new(ThreadScheduler::new()),
    );

    let count = Arc::new(AtomicUsize::new(0));
    queue.append(Action::new("count", {
        let count = Arc::clone(&count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }));
    queue.append(Action::new("print_size", {
        let count = Arc::clone(&count);
        move || match terminal_size() {
            Some((columns, rows)) => {
                println!("resize #{}: {columns}x{rows}", count.load(Ordering::SeqCst))
            }
            None => println!("resize #{}: size unknown", count.load(Ordering::SeqCst)),
        }
    }));
    queue.dump_action_names();

    println!(
        "watching resizes (once={}, delay={:?}); press Ctrl+C to exit",
        queue.once(),
        queue.queue_delay()
    );

    let (tx, rx) = mpsc::channel::<()>();
    let mut signals = match signal_hook::iterator::Signals::new([signal_hook::consts::SIGINT]) {
        Ok(signals) => signals,
        Err(err) => {
            eprintln!("failed to install Ctrl+C handler: {err}");
            return;
        }
    };
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            let _ = tx.send(());
        }
    });
    let _ = rx.recv();

    queue.dispose();
    println!("saw {} resize event(s)", count.load(Ordering::SeqCst));
}
