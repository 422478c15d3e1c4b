//! Per-object notification routing.
//!
//! The substrate raises property changes on arbitrary threads, possibly
//! concurrently even for different properties of one device. Each router owns
//! one worker task per object: the native callback only performs a
//! non-blocking enqueue, and the worker translates and dispatches events in
//! the order they were raised. Distinct objects get distinct workers, so
//! cross-device notifications proceed concurrently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ControlError, Result};
use crate::substrate::{ObjectId, PropertyStore, RawPropertyEvent, Selector};

/// Consumer of raw events on the worker context. Implementations may re-read
/// properties (through a blocking worker) and dispatch typed events; they are
/// invoked strictly in raise order for their object.
#[async_trait]
pub trait RawEventHandler: Send + Sync + 'static {
    async fn handle(&self, event: RawPropertyEvent);
}

enum WorkerMsg {
    Event(RawPropertyEvent),
    Flush(oneshot::Sender<()>),
    Quit,
}

/// Listener bookkeeping and dispatch worker for one object.
///
/// `register` is idempotent: at most one native listener is ever installed
/// per `(object, selector)` pair. `shutdown` tears the native listeners down,
/// drains the queue, and joins the worker; once it returns, no further event
/// for this object will be delivered. Construction requires an ambient tokio
/// runtime.
pub struct NotificationRouter {
    store: Arc<dyn PropertyStore>,
    object: ObjectId,
    installed: Mutex<HashSet<Selector>>,
    tx: Mutex<Option<mpsc::UnboundedSender<WorkerMsg>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationRouter {
    pub fn new(
        store: Arc<dyn PropertyStore>,
        object: ObjectId,
        handler: Arc<dyn RawEventHandler>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    WorkerMsg::Event(event) => handler.handle(event).await,
                    WorkerMsg::Flush(ack) => {
                        let _ = ack.send(());
                    }
                    WorkerMsg::Quit => break,
                }
            }
        });

        Self {
            store,
            object,
            installed: Mutex::new(HashSet::new()),
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Installs native listeners for `selectors`, skipping pairs that already
    /// have one. Selectors that fail to install are logged and skipped; the
    /// device may legitimately lack them.
    pub fn register(&self, selectors: &[Selector]) -> Result<()> {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or(ControlError::InvalidObjectReference(self.object))?;

        let mut installed = self.installed.lock().unwrap_or_else(|p| p.into_inner());
        for selector in selectors {
            if installed.contains(selector) {
                continue;
            }
            let tx = sender.clone();
            let listener = Arc::new(move |event: RawPropertyEvent| {
                // Never block the delivering thread; translation happens on
                // the worker.
                let _ = tx.send(WorkerMsg::Event(event));
            });
            match self.store.add_listener(self.object, *selector, listener) {
                Ok(()) => {
                    installed.insert(*selector);
                }
                Err(err) => {
                    warn!(object = self.object, %err, "listener install failed");
                }
            }
        }
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        !self
            .installed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_empty()
    }

    /// Removes every installed native listener and drains events already
    /// queued. After this returns no callback is in flight, but the worker
    /// stays available for a later `register`.
    pub async fn unregister(&self) {
        let selectors: Vec<Selector> = {
            let mut installed = self.installed.lock().unwrap_or_else(|p| p.into_inner());
            installed.drain().collect()
        };
        for selector in selectors {
            if let Err(err) = self.store.remove_listener(self.object, selector) {
                debug!(object = self.object, %err, "listener removal failed");
            }
        }
        self.drain().await;
    }

    /// `unregister` plus worker teardown. Terminal.
    pub async fn shutdown(&self) {
        self.unregister().await;
        let sender = self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(sender) = sender {
            let _ = sender.send(WorkerMsg::Quit);
        }
        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }

    async fn drain(&self) {
        let sender = self.tx.lock().unwrap_or_else(|p| p.into_inner()).clone();
        if let Some(sender) = sender {
            let (ack_tx, ack_rx) = oneshot::channel();
            if sender.send(WorkerMsg::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::{selectors, SimulatedDevice, SimulatedStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    #[async_trait]
    impl RawEventHandler for Counter {
        async fn handle(&self, _event: RawPropertyEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn register_is_idempotent_and_unregister_clears_listeners() {
        let store = Arc::new(SimulatedStore::new());
        let handle = store.install(SimulatedDevice::new("uid:r", "Router Test"));

        let router = NotificationRouter::new(store.clone(), handle, Arc::new(Counter(AtomicUsize::new(0))));
        assert!(!router.is_registered());
        router.register(&[selectors::NOMINAL_SAMPLE_RATE, selectors::MUTE]).unwrap();
        router.register(&[selectors::NOMINAL_SAMPLE_RATE, selectors::MUTE]).unwrap();
        assert!(router.is_registered());
        assert_eq!(store.active_listener_count(), 2);

        router.unregister().await;
        assert!(!router.is_registered());
        assert_eq!(store.active_listener_count(), 0);

        router.shutdown().await;
    }

    #[tokio::test]
    async fn events_stop_after_shutdown() {
        let store = Arc::new(SimulatedStore::new());
        let handle = store.install(SimulatedDevice::new("uid:r2", "Router Test"));
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        let router = NotificationRouter::new(store.clone(), handle, counter.clone());
        router.register(&[selectors::DEVICE_IS_RUNNING]).unwrap();

        store.set_running(handle, true);
        router.unregister().await;
        let seen = counter.0.load(Ordering::SeqCst);
        assert_eq!(seen, 1);

        store.set_running(handle, false);
        router.shutdown().await;
        assert_eq!(counter.0.load(Ordering::SeqCst), seen);
    }
}
