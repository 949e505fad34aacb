//! Background alert dispatch.
//!
//! Non-blocking alert intake with a background worker that performs the
//! network call, so a slow notifier never holds up event processing.

use super::Notifier;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const TARGET_DISPATCH: &str = "dispatch";

/// Delivery counters reported when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: u64,
    pub failed: u64,
}

/// Cloneable handle feeding the delivery worker.
///
/// The worker exits once every handle has been dropped and the queue is empty.
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<String>,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, capacity: usize) -> (Self, JoinHandle<DispatchStats>) {
        let (tx, mut rx) = mpsc::channel::<String>(capacity.max(1));

        let handle = tokio::spawn(async move {
            info!(
                target: TARGET_DISPATCH,
                notifier = notifier.name(),
                capacity,
                "Alert dispatch worker started"
            );

            let mut stats = DispatchStats::default();
            while let Some(text) = rx.recv().await {
                match notifier.send(&text).await {
                    Ok(()) => stats.sent += 1,
                    Err(err) => {
                        stats.failed += 1;
                        warn!(
                            target: TARGET_DISPATCH,
                            notifier = notifier.name(),
                            error = %err,
                            "Alert delivery failed"
                        );
                    }
                }
            }

            info!(
                target: TARGET_DISPATCH,
                sent = stats.sent,
                failed = stats.failed,
                "Alert dispatch worker shutting down"
            );
            stats
        });

        (Self { tx }, handle)
    }

    /// Queue an alert. Returns false when it was dropped (queue full or
    /// worker gone); the alert is not retried.
    pub fn dispatch(&self, text: String) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(target: TARGET_DISPATCH, "Alert queue full, dropping alert");
                false
            }
            Err(TrySendError::Closed(_)) => {
                error!(
                    target: TARGET_DISPATCH,
                    "Alert dispatch worker is gone, dropping alert"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(&self, text: &str) -> Result<(), MonitorError> {
            self.sent.lock().unwrap().push(text.to_string());
            if self.fail {
                Err(MonitorError::Config("down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_order() {
        let notifier = Arc::new(Recording::default());
        let (dispatcher, handle) = AlertDispatcher::new(notifier.clone(), 8);

        assert!(dispatcher.dispatch("first".to_string()));
        assert!(dispatcher.dispatch("second".to_string()));
        drop(dispatcher);

        let stats = handle.await.unwrap();
        assert_eq!(stats, DispatchStats { sent: 2, failed: 0 });
        assert_eq!(*notifier.sent.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_dispatch_counts_failures_without_retry() {
        let notifier = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let (dispatcher, handle) = AlertDispatcher::new(notifier.clone(), 8);

        dispatcher.dispatch("alert".to_string());
        drop(dispatcher);

        let stats = handle.await.unwrap();
        assert_eq!(stats, DispatchStats { sent: 0, failed: 1 });
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_drops_alert() {
        let notifier = Arc::new(Recording::default());
        let (dispatcher, handle) = AlertDispatcher::new(notifier.clone(), 1);

        // The worker cannot run until this task yields, so the second send
        // finds the single slot taken.
        assert!(dispatcher.dispatch("kept".to_string()));
        assert!(!dispatcher.dispatch("dropped".to_string()));
        drop(dispatcher);

        let stats = handle.await.unwrap();
        assert_eq!(stats.sent, 1);
        assert_eq!(*notifier.sent.lock().unwrap(), vec!["kept"]);
    }

    struct Panicking;

    #[async_trait]
    impl Notifier for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn send(&self, _text: &str) -> Result<(), MonitorError> {
            panic!("notifier bug");
        }
    }

    #[tokio::test]
    async fn test_dead_worker_drops_alert() {
        let (dispatcher, handle) = AlertDispatcher::new(Arc::new(Panicking), 8);

        assert!(dispatcher.dispatch("first".to_string()));
        assert!(handle.await.unwrap_err().is_panic());
        assert!(!dispatcher.dispatch("second".to_string()));
    }
}
