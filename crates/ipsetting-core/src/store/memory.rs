// # Memory Store
//
// In-memory implementation of the store capability.
//
// ## Purpose
//
// Provides deterministic key/value state and watch events without a
// hypervisor, for tests and for embedding the feature in environments where
// the real control-plane channel is absent.
//
// ## Watch semantics
//
// A write under a watched prefix enqueues a watch event carrying the
// written path, mirroring the real store's "node or descendant changed"
// behavior. `fire()` injects an event directly without changing any value,
// which is how tests simulate host-side change notifications.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};

use async_trait::async_trait;

use crate::Error;
use crate::traits::store::{WatchEvent, XenStore};

struct WatchEntry {
    token: String,
    tx: mpsc::UnboundedSender<WatchEvent>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<WatchEvent>>>,
}

/// In-memory store implementation
///
/// Key/value state lives in a `HashMap` behind an async `RwLock`; each
/// registered watch owns an unbounded event channel.
///
/// # Example
///
/// ```rust,no_run
/// use ipsetting_core::store::MemoryXenStore;
/// use ipsetting_core::traits::XenStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryXenStore::new();
///     store.watch("xenserver/device/vif", "token").await?;
///
///     // A write under the watched prefix fires the watch
///     store
///         .write("xenserver/device/vif/0/static-ip-setting/enabled", "1")
///         .await?;
///     let event = store.wait_event("xenserver/device/vif").await;
///     assert!(event.is_some());
///     Ok(())
/// }
/// ```
#[derive(Default)]
pub struct MemoryXenStore {
    data: RwLock<HashMap<String, String>>,
    watches: RwLock<HashMap<String, WatchEntry>>,
}

impl MemoryXenStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a watch event for `path` without changing any value
    ///
    /// The event is delivered to every watch whose path covers `path`.
    pub async fn fire(&self, path: &str) {
        let watches = self.watches.read().await;
        for (watched, entry) in watches.iter() {
            if covers(watched, path) {
                let _ = entry.tx.send(WatchEvent {
                    path: path.to_string(),
                    token: entry.token.clone(),
                });
            }
        }
    }

    /// Number of keys currently stored
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Check whether the store holds no keys
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

/// True when a watch on `watched` covers a change at `path`
fn covers(watched: &str, path: &str) -> bool {
    path == watched
        || (path.len() > watched.len()
            && path.starts_with(watched)
            && path.as_bytes()[watched.len()] == b'/')
}

#[async_trait]
impl XenStore for MemoryXenStore {
    async fn read(&self, key: &str) -> Result<String, Error> {
        let data = self.data.read().await;
        data.get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(key.to_string()))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), Error> {
        {
            let mut data = self.data.write().await;
            data.insert(key.to_string(), value.to_string());
        }
        self.fire(key).await;
        Ok(())
    }

    async fn directory(&self, path: &str) -> Result<String, Error> {
        let prefix = format!("{path}/");
        let data = self.data.read().await;
        let children: BTreeSet<&str> = data
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(|rest| rest.split('/').next().unwrap_or(rest))
            .collect();
        Ok(children.into_iter().collect::<Vec<_>>().join("\0"))
    }

    async fn watch(&self, path: &str, token: &str) -> Result<(), Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watches = self.watches.write().await;
        watches.insert(
            path.to_string(),
            WatchEntry {
                token: token.to_string(),
                tx,
                rx: Arc::new(Mutex::new(rx)),
            },
        );
        Ok(())
    }

    async fn wait_event(&self, path: &str) -> Option<WatchEvent> {
        let rx = {
            let watches = self.watches.read().await;
            watches.get(path)?.rx.clone()
        };
        let mut rx = rx.lock().await;
        rx.recv().await
    }
}
