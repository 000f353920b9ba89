//! Online/offline state
//!
//! The monitor holds the current connectivity flag and broadcasts an event on
//! every edge. Whoever owns the platform's connectivity signal feeds it through
//! [`ConnectivityMonitor::set_online`]; where no such signal exists,
//! [`ConnectivityMonitor::spawn_probe`] derives it from the backend health check.

use crate::client::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

pub struct ConnectivityMonitor {
    online: AtomicBool,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            online: AtomicBool::new(initially_online),
            events,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Record the current signal. Returns the event emitted, if the state changed.
    pub fn set_online(&self, online: bool) -> Option<ConnectivityEvent> {
        if self.online.swap(online, Ordering::AcqRel) == online {
            return None;
        }

        let event = if online {
            info!("Connectivity restored");
            ConnectivityEvent::Online
        } else {
            warn!("Connectivity lost - mutations will be queued");
            ConnectivityEvent::Offline
        };

        // No subscribers is fine
        let _ = self.events.send(event);
        Some(event)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    /// Poll the backend health check every `every` and feed the result into
    /// the monitor. The task ends once the monitor is dropped.
    pub fn spawn_probe(
        self: &Arc<Self>,
        transport: Arc<dyn Transport>,
        every: Duration,
    ) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let reachable = transport.ping().await;

                let Some(monitor) = monitor.upgrade() else {
                    debug!("Connectivity probe stopping");
                    break;
                };
                monitor.set_online(reachable);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::ApiRequest;
    use crate::error::{OfflineError, OfflineResult};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::AtomicUsize;

    /// Health check that fails for the first `down_for` pings.
    struct Flapping {
        pings: AtomicUsize,
        down_for: usize,
    }

    #[async_trait]
    impl Transport for Flapping {
        async fn send(&self, _request: &ApiRequest) -> OfflineResult<Value> {
            Err(OfflineError::Offline)
        }

        async fn ping(&self) -> bool {
            self.pings.fetch_add(1, Ordering::SeqCst) >= self.down_for
        }
    }

    #[test]
    fn test_edges_only() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        assert_eq!(monitor.set_online(true), None);
        assert_eq!(monitor.set_online(false), Some(ConnectivityEvent::Offline));
        assert_eq!(monitor.set_online(false), None);
        assert_eq!(monitor.set_online(true), Some(ConnectivityEvent::Online));
        assert!(monitor.is_online());

        assert_eq!(rx.try_recv().unwrap(), ConnectivityEvent::Offline);
        assert_eq!(rx.try_recv().unwrap(), ConnectivityEvent::Online);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_probe_drives_connectivity() {
        let monitor = Arc::new(ConnectivityMonitor::new(true));
        let mut rx = monitor.subscribe();
        let transport = Arc::new(Flapping {
            pings: AtomicUsize::new(0),
            down_for: 2,
        });

        let probe = monitor.spawn_probe(transport.clone(), Duration::from_millis(10));

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert_eq!(first.unwrap().unwrap(), ConnectivityEvent::Offline);
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert_eq!(second.unwrap().unwrap(), ConnectivityEvent::Online);
        assert!(monitor.is_online());
        assert!(transport.pings.load(Ordering::SeqCst) >= 3);

        // The task stops once the monitor is gone
        drop(monitor);
        tokio::time::timeout(Duration::from_secs(2), probe)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_initial_state() {
        assert!(!ConnectivityMonitor::new(false).is_online());
        assert!(ConnectivityMonitor::new(true).is_online());
    }
}
