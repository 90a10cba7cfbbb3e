// # Xenbus Store
//
// Store capability implementation speaking the xenbus wire protocol over
// the xenstored unix socket.
//
// ## Architecture
//
// One connection per store. Requests are serialized through a writer half;
// a background reader task dispatches replies to their callers by request
// id and routes unsolicited watch events to per-watch channels by token.
//
// ## Watch semantics
//
// xenstored delivers an initial event for a freshly registered watch, so a
// watch loop built on this store performs its first scan without waiting
// for a host-side change.
//
// ## Platform Support
//
// Talks to xenstored through its unix socket. The kernel transport
// (/dev/xen/xenbus) needs a blocking read/write bridge and is not wired up
// here.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use ipsetting_core::traits::{WatchEvent, XenStore};
use ipsetting_core::{Error, Result};

mod wire;

use wire::Header;

/// Default location of the xenstored unix socket
pub const DEFAULT_SOCKET_PATH: &str = "/run/xenstored/socket";

/// State shared with the reader task
struct Shared {
    /// In-flight requests by request id
    pending: StdMutex<HashMap<u32, oneshot::Sender<(u32, Vec<u8>)>>>,
    /// Watch event senders by token
    watch_txs: StdMutex<HashMap<String, mpsc::UnboundedSender<WatchEvent>>>,
}

/// Store client over a xenbus connection
pub struct XenbusStore {
    shared: Arc<Shared>,
    writer: Mutex<OwnedWriteHalf>,
    next_req_id: AtomicU32,
    /// Watch event receivers by watched path
    watch_rxs: StdMutex<HashMap<String, Arc<Mutex<mpsc::UnboundedReceiver<WatchEvent>>>>>,
    reader: JoinHandle<()>,
}

impl XenbusStore {
    /// Connect to xenstored at `path`
    pub async fn connect(path: &str) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| Error::store(format!("connect to {path} failed: {e}")))?;
        Ok(Self::from_stream(stream))
    }

    /// Build a store over an already connected stream
    ///
    /// Public so embedders and tests can drive the client over a socket
    /// pair instead of a live xenstored.
    pub fn from_stream(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(Shared {
            pending: StdMutex::new(HashMap::new()),
            watch_txs: StdMutex::new(HashMap::new()),
        });
        let reader = tokio::spawn(read_loop(read_half, shared.clone()));
        Self {
            shared,
            writer: Mutex::new(write_half),
            next_req_id: AtomicU32::new(1),
            watch_rxs: StdMutex::new(HashMap::new()),
            reader,
        }
    }

    /// Send one request and wait for its reply
    ///
    /// `key_ctx` names the key or path the request is about, for error
    /// context.
    async fn request(&self, op: u32, key_ctx: &str, payload: Vec<u8>) -> Result<Vec<u8>> {
        if payload.len() as u32 > wire::MAX_PAYLOAD {
            return Err(Error::invalid_input(format!(
                "payload for {key_ctx} exceeds {} bytes",
                wire::MAX_PAYLOAD
            )));
        }

        let req_id = self.next_req_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().unwrap().insert(req_id, tx);

        let header = Header {
            op,
            req_id,
            tx_id: 0,
            len: payload.len() as u32,
        };

        let send: std::io::Result<()> = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(&header.encode()).await {
                Ok(()) => writer.write_all(&payload).await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = send {
            self.shared.pending.lock().unwrap().remove(&req_id);
            return Err(Error::store(format!("send for {key_ctx} failed: {e}")));
        }

        let (reply_op, body) = rx
            .await
            .map_err(|_| Error::store(format!("connection closed awaiting {key_ctx}")))?;

        if reply_op == wire::XS_ERROR {
            let errno = wire::parse_error(&body);
            if errno == "ENOENT" {
                return Err(Error::not_found(key_ctx.to_string()));
            }
            return Err(Error::store(format!("{key_ctx}: xenstored said {errno}")));
        }
        Ok(body)
    }
}

impl Drop for XenbusStore {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reader task: dispatch replies by request id, route watch events by token
async fn read_loop(mut read_half: OwnedReadHalf, shared: Arc<Shared>) {
    loop {
        let mut header_bytes = [0u8; wire::HEADER_LEN];
        if read_half.read_exact(&mut header_bytes).await.is_err() {
            break;
        }
        let header = Header::decode(&header_bytes);
        if header.len > wire::MAX_PAYLOAD {
            warn!(len = header.len, "oversized message, closing connection");
            break;
        }
        let mut payload = vec![0u8; header.len as usize];
        if read_half.read_exact(&mut payload).await.is_err() {
            break;
        }

        if header.op == wire::XS_WATCH_EVENT {
            let args = wire::split_args(&payload);
            if args.len() < 2 {
                debug!("malformed watch event dropped");
                continue;
            }
            let event = WatchEvent {
                path: args[0].clone(),
                token: args[1].clone(),
            };
            let delivered = shared
                .watch_txs
                .lock()
                .unwrap()
                .get(&event.token)
                .map(|tx| tx.send(event.clone()).is_ok())
                .unwrap_or(false);
            if !delivered {
                debug!(token = %event.token, "watch event for unknown token dropped");
            }
        } else if let Some(tx) = shared.pending.lock().unwrap().remove(&header.req_id) {
            let _ = tx.send((header.op, payload));
        } else {
            debug!(req_id = header.req_id, "unmatched reply dropped");
        }
    }

    // Connection lost: wake every in-flight request with a closed channel
    shared.pending.lock().unwrap().clear();
}

#[async_trait]
impl XenStore for XenbusStore {
    async fn read(&self, key: &str) -> Result<String> {
        let body = self
            .request(wire::XS_READ, key, wire::join_args(&[key]))
            .await?;
        Ok(String::from_utf8_lossy(&body)
            .trim_end_matches('\0')
            .to_string())
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        self.request(wire::XS_WRITE, key, wire::write_payload(key, value))
            .await?;
        Ok(())
    }

    async fn directory(&self, path: &str) -> Result<String> {
        // The reply is already NUL-joined (one terminator per child), which
        // is the raw listing shape the trait promises.
        let body = self
            .request(wire::XS_DIRECTORY, path, wire::join_args(&[path]))
            .await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn watch(&self, path: &str, token: &str) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared
            .watch_txs
            .lock()
            .unwrap()
            .insert(token.to_string(), tx);
        self.watch_rxs
            .lock()
            .unwrap()
            .insert(path.to_string(), Arc::new(Mutex::new(rx)));

        if let Err(e) = self
            .request(wire::XS_WATCH, path, wire::join_args(&[path, token]))
            .await
        {
            self.shared.watch_txs.lock().unwrap().remove(token);
            self.watch_rxs.lock().unwrap().remove(path);
            return Err(Error::watch(format!("watch on {path} refused: {e}")));
        }
        Ok(())
    }

    async fn wait_event(&self, path: &str) -> Option<WatchEvent> {
        let rx = {
            let watch_rxs = self.watch_rxs.lock().unwrap();
            match watch_rxs.get(path) {
                Some(rx) => rx.clone(),
                None => {
                    warn!(path, "wait_event without a registered watch");
                    return None;
                }
            }
        };
        let mut rx = rx.lock().await;
        rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Read one message off the fake server side
    async fn server_recv(stream: &mut UnixStream) -> (Header, Vec<u8>) {
        let mut header_bytes = [0u8; wire::HEADER_LEN];
        stream.read_exact(&mut header_bytes).await.unwrap();
        let header = Header::decode(&header_bytes);
        let mut payload = vec![0u8; header.len as usize];
        stream.read_exact(&mut payload).await.unwrap();
        (header, payload)
    }

    /// Send one message from the fake server side
    async fn server_send(stream: &mut UnixStream, op: u32, req_id: u32, payload: &[u8]) {
        let header = Header {
            op,
            req_id,
            tx_id: 0,
            len: payload.len() as u32,
        };
        stream.write_all(&header.encode()).await.unwrap();
        stream.write_all(payload).await.unwrap();
    }

    #[tokio::test]
    async fn read_roundtrip() {
        let (client_end, mut server) = UnixStream::pair().unwrap();
        let store = XenbusStore::from_stream(client_end);

        let server_task = tokio::spawn(async move {
            let (header, payload) = server_recv(&mut server).await;
            assert_eq!(header.op, wire::XS_READ);
            assert_eq!(payload, b"a/b\0");
            server_send(&mut server, wire::XS_READ, header.req_id, b"value").await;
            server
        });

        assert_eq!(store.read("a/b").await.unwrap(), "value");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn enoent_maps_to_not_found() {
        let (client_end, mut server) = UnixStream::pair().unwrap();
        let store = XenbusStore::from_stream(client_end);

        let server_task = tokio::spawn(async move {
            let (header, _) = server_recv(&mut server).await;
            server_send(&mut server, wire::XS_ERROR, header.req_id, b"ENOENT\0").await;
            server
        });

        assert!(matches!(
            store.read("missing/key").await,
            Err(Error::NotFound(_))
        ));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn directory_passes_raw_listing_through() {
        let (client_end, mut server) = UnixStream::pair().unwrap();
        let store = XenbusStore::from_stream(client_end);

        let server_task = tokio::spawn(async move {
            let (header, _) = server_recv(&mut server).await;
            server_send(&mut server, wire::XS_DIRECTORY, header.req_id, b"0\x001\x00").await;
            server
        });

        let raw = store.directory("xenserver/device/vif").await.unwrap();
        assert_eq!(raw, "0\x001\x00");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn watch_and_event_delivery() {
        let (client_end, mut server) = UnixStream::pair().unwrap();
        let store = XenbusStore::from_stream(client_end);

        let server_task = tokio::spawn(async move {
            let (header, payload) = server_recv(&mut server).await;
            assert_eq!(header.op, wire::XS_WATCH);
            assert_eq!(payload, b"xenserver/device/vif\0tok\0");
            server_send(&mut server, wire::XS_WATCH, header.req_id, b"OK\0").await;
            // Unsolicited event, request id 0
            server_send(
                &mut server,
                wire::XS_WATCH_EVENT,
                0,
                b"xenserver/device/vif/3\0tok\0",
            )
            .await;
            server
        });

        store.watch("xenserver/device/vif", "tok").await.unwrap();
        let event = store.wait_event("xenserver/device/vif").await.unwrap();
        assert_eq!(event.path, "xenserver/device/vif/3");
        assert_eq!(event.token, "tok");
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn refused_watch_is_an_error_and_unregisters() {
        let (client_end, mut server) = UnixStream::pair().unwrap();
        let store = XenbusStore::from_stream(client_end);

        let server_task = tokio::spawn(async move {
            let (header, _) = server_recv(&mut server).await;
            server_send(&mut server, wire::XS_ERROR, header.req_id, b"EACCES\0").await;
            server
        });

        assert!(store.watch("root", "tok").await.is_err());
        assert!(store.wait_event("root").await.is_none());
        server_task.await.unwrap();
    }
}
