use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

/// Watch-based shutdown coordinator.
///
/// Long-running loops (the idle reaper, the HTTP server) take a
/// [`ShutdownListener`] from `subscribe()` and `select!` on
/// [`ShutdownListener::wait`] alongside their work. A listener created after
/// the signal fired resolves immediately, so late subscribers never hang.
///
/// ```ignore
/// let mut stop = signal.subscribe();
/// loop {
///     tokio::select! {
///         _ = stop.wait() => break,
///         _ = ticker.tick() => sweep(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A listener for the next (or an already fired) trigger.
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trigger shutdown for all subscribers. Repeated calls are no-ops.
    pub fn trigger(&self) {
        let fired = self.tx.send_if_modified(|state| {
            if *state {
                false
            } else {
                *state = true;
                true
            }
        });
        if fired {
            info!("shutdown signal triggered");
        } else {
            debug!("shutdown trigger ignored, already shutting down");
        }
    }

    /// Number of listeners currently subscribed.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to each loop that must stop on shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once shutdown has been triggered.
    pub async fn wait(&mut self) {
        // A closed channel means the signal owner is gone; treat it as shutdown.
        let _ = self.rx.wait_for(|fired| *fired).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn trigger_flips_state_once() {
        let signal = ShutdownSignal::default();
        let listener = signal.subscribe();
        assert!(!signal.is_shutting_down());
        assert!(!listener.is_triggered());

        signal.trigger();
        signal.trigger();
        assert!(signal.is_shutting_down());
        assert!(listener.is_triggered());
    }

    #[test]
    fn clones_share_state() {
        let signal = ShutdownSignal::new();
        let other = signal.clone();
        other.trigger();
        assert!(signal.is_shutting_down());
    }

    #[test]
    fn dropped_listeners_are_not_counted() {
        let signal = ShutdownSignal::new();
        let first = signal.subscribe();
        let second = first.clone();
        assert_eq!(signal.subscriber_count(), 2);
        drop(first);
        drop(second);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn wait_returns_after_trigger_from_another_task() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();

        let remote = signal.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            remote.trigger();
        });

        tokio::time::timeout(Duration::from_secs(1), listener.wait())
            .await
            .expect("listener never woke");
        task.await.expect("trigger task panicked");
    }

    #[tokio::test]
    async fn subscribing_after_trigger_does_not_block() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        let mut late = signal.subscribe();
        assert!(
            tokio::time::timeout(Duration::from_millis(100), late.wait())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn wait_pends_until_triggered() {
        let signal = ShutdownSignal::new();
        let mut listener = signal.subscribe();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), listener.wait())
                .await
                .is_err()
        );
    }
}
