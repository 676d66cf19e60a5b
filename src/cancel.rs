//! Cooperative cancellation for long-running audio operations.
//!
//! A [`CancellationSource`] is held by whoever decides when an operation ends;
//! the operation only ever sees the [`CancellationSignal`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Owner side of a cancellation token.
#[derive(Debug, Clone)]
pub struct CancellationSource {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A signal observing this source.
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Fire the signal once `after` has elapsed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn cancel_after(&self, after: Duration) {
        let source = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            debug!("Cancelling after {:?}", after);
            source.cancel();
        });
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation token.
///
/// Once every [`CancellationSource`] is dropped without cancelling, the
/// signal counts as fired: nothing is left that could end the operation.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    /// A signal that fires after `after`, with no handle to fire it earlier.
    pub fn timeout(after: Duration) -> Self {
        let source = CancellationSource::new();
        let signal = source.signal();
        source.cancel_after(after);
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the signal has fired.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An error means every source is gone.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_wakes_waiter() {
        let source = CancellationSource::new();
        let signal = source.signal();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.cancelled().await }
        });
        source.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_cancelled());
        assert!(source.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after() {
        let source = CancellationSource::new();
        let signal = source.signal();
        source.cancel_after(Duration::from_millis(500));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!signal.is_cancelled());

        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_source_releases_signal() {
        let source = CancellationSource::new();
        let signal = source.signal();
        drop(source);

        assert!(signal.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("dropped source should release the signal");
    }
}
