//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides deterministic doubles for the store and apply-step
//! capabilities, with counters the contract tests assert on.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use ipsetting_core::config::FeatureConfig;
use ipsetting_core::error::{Error, Result};
use ipsetting_core::os::OsVariant;
use ipsetting_core::request::StaticIpRequest;
use ipsetting_core::traits::{Applier, WatchEvent, XenStore};

/// A store double with scripted key/value state and on-demand watch events
pub struct ScriptedStore {
    /// Scripted key/value state
    data: StdMutex<HashMap<String, String>>,
    /// Raw NUL-joined listing returned by directory()
    listing: StdMutex<String>,
    /// Receiver the engine blocks on in wait_event()
    events: Mutex<mpsc::UnboundedReceiver<WatchEvent>>,
    /// Sender tests use to simulate host-side change notifications
    events_tx: mpsc::UnboundedSender<WatchEvent>,
    /// When set, watch() refuses registration
    fail_watch: AtomicBool,
    /// When set, directory() fails
    fail_directory: AtomicBool,
    /// When set, write() fails
    fail_writes: AtomicBool,
    watch_calls: AtomicUsize,
    wait_calls: AtomicUsize,
    directory_calls: AtomicUsize,
    /// Every write observed, in order
    writes: StdMutex<Vec<(String, String)>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            data: StdMutex::new(HashMap::new()),
            listing: StdMutex::new(String::new()),
            events: Mutex::new(events_rx),
            events_tx,
            fail_watch: AtomicBool::new(false),
            fail_directory: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            watch_calls: AtomicUsize::new(0),
            wait_calls: AtomicUsize::new(0),
            directory_calls: AtomicUsize::new(0),
            writes: StdMutex::new(Vec::new()),
        }
    }

    /// Script a key's value
    pub fn set(&self, key: &str, value: &str) {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    /// Script the raw NUL-joined listing directory() returns
    pub fn set_listing(&self, raw: &str) {
        *self.listing.lock().unwrap() = raw.to_string();
    }

    /// Simulate a host-side change notification under the watched root
    pub fn fire(&self, path: &str) {
        let _ = self.events_tx.send(WatchEvent {
            path: path.to_string(),
            token: "static-ip-setting".to_string(),
        });
    }

    pub fn refuse_watch(&self) {
        self.fail_watch.store(true, Ordering::SeqCst);
    }

    pub fn fail_directory(&self) {
        self.fail_directory.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn wait_calls(&self) -> usize {
        self.wait_calls.load(Ordering::SeqCst)
    }

    /// Number of directory() calls, i.e. scans attempted
    pub fn directory_calls(&self) -> usize {
        self.directory_calls.load(Ordering::SeqCst)
    }

    /// Values written to `key`, in order
    pub fn writes_to(&self, key: &str) -> Vec<String> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[async_trait]
impl XenStore for ScriptedStore {
    async fn read(&self, key: &str) -> Result<String> {
        self.data
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(key.to_string()))
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store("write refused"));
        }
        self.writes
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn directory(&self, _path: &str) -> Result<String> {
        self.directory_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_directory.load(Ordering::SeqCst) {
            return Err(Error::store("listing refused"));
        }
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn watch(&self, _path: &str, _token: &str) -> Result<()> {
        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(Error::watch("registration refused"));
        }
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_event(&self, _path: &str) -> Option<WatchEvent> {
        self.wait_calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().await.recv().await
    }
}

/// One recorded apply invocation
#[derive(Debug, Clone)]
pub struct AppliedCall {
    pub interface: String,
    pub request: StaticIpRequest,
    pub os: OsVariant,
}

/// An applier that records every invocation and succeeds
#[derive(Default)]
pub struct CountingApplier {
    calls: StdMutex<Vec<AppliedCall>>,
}

impl CountingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<AppliedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Applier for CountingApplier {
    async fn apply(
        &self,
        interface_path: &str,
        request: &StaticIpRequest,
        os: OsVariant,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(AppliedCall {
            interface: interface_path.to_string(),
            request: request.clone(),
            os,
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// An applier that records invocations and always fails
#[derive(Default)]
pub struct FailingApplier {
    attempts: AtomicUsize,
}

impl FailingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Applier for FailingApplier {
    async fn apply(
        &self,
        _interface_path: &str,
        _request: &StaticIpRequest,
        _os: OsVariant,
    ) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::apply("failing", "refused by test double"))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Feature configuration for tests: fast debounce, no descriptor file
pub fn test_config(debounce_ms: u64) -> FeatureConfig {
    FeatureConfig {
        debounce_interval_ms: debounce_ms,
        distro_file: PathBuf::from("/nonexistent/distribution-descriptor"),
        ..FeatureConfig::default()
    }
}
