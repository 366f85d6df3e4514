//! Headless native runtime
//!
//! A windowless event loop: one owner thread drains a bounded FIFO of
//! posted records, a binding table stands in for the JS bridge, and a
//! result table collects what scripts hand back through `resolve`.

use super::NativeRuntime;
use crate::callback;
use crate::dispatch;
use crate::error::{NativeError, Rejected};
use crate::record::{BindingRecord, DispatchRecord};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const TERMINATED: u8 = 2;

/// Headless runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the post queue; posts beyond it fail with `Canceled`
    pub queue_capacity: usize,
    /// Name given to the owner thread by `Window::spawn`
    pub thread_name: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            thread_name: "hostview-owner".to_string(),
        }
    }
}

/// Result delivered for a bound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    /// 0 on success, otherwise an application error code
    pub status: i32,
    /// Result payload
    pub payload: String,
}

#[derive(Debug, Default)]
struct Calls {
    pending: FxHashSet<String>,
    results: FxHashMap<String, CallResult>,
}

/// In-process [`NativeRuntime`] with no display
#[derive(Debug)]
pub struct HeadlessRuntime {
    tx: Sender<DispatchRecord>,
    rx: Receiver<DispatchRecord>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    state: AtomicU8,
    /// Set once the loop has exited; posts hold it shared across the send
    closed: RwLock<bool>,
    owner: Mutex<Option<ThreadId>>,
    bindings: RwLock<FxHashMap<String, Arc<BindingRecord>>>,
    calls: Mutex<Calls>,
    resolved: Condvar,
}

impl HeadlessRuntime {
    /// Create an idle runtime
    pub fn new(config: RuntimeConfig) -> Self {
        let (tx, rx) = channel::bounded(config.queue_capacity.max(1));
        let (wake_tx, wake_rx) = channel::bounded(1);
        Self {
            tx,
            rx,
            wake_tx,
            wake_rx,
            state: AtomicU8::new(IDLE),
            closed: RwLock::new(false),
            owner: Mutex::new(None),
            bindings: RwLock::new(FxHashMap::default()),
            calls: Mutex::new(Calls::default()),
            resolved: Condvar::new(),
        }
    }

    /// Simulate JS calling the bound function `name` from the current thread.
    ///
    /// Returns after the script target has finished. `id` becomes pending
    /// until a matching `resolve`.
    pub fn call_binding(&self, name: &str, id: &str, payload: &str) -> Result<(), NativeError> {
        let binding = self
            .bindings
            .read()
            .get(name)
            .cloned()
            .ok_or(NativeError::NotFound)?;

        self.calls.lock().pending.insert(id.to_string());
        callback::on_foreign_call(Some(&binding), Some(id), Some(payload));
        Ok(())
    }

    /// Take the result delivered for `id`, if any
    pub fn take_result(&self, id: &str) -> Option<CallResult> {
        self.calls.lock().results.remove(id)
    }

    /// Wait up to `timeout` for the result of `id` and take it
    pub fn wait_result(&self, id: &str, timeout: Duration) -> Option<CallResult> {
        let deadline = Instant::now() + timeout;
        let mut calls = self.calls.lock();
        loop {
            if let Some(result) = calls.results.remove(id) {
                return Some(result);
            }
            if self.resolved.wait_until(&mut calls, deadline).timed_out() {
                return calls.results.remove(id);
            }
        }
    }

    /// Whether `name` is currently bound
    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.read().contains_key(name)
    }

    /// Thread running the event loop, while it runs
    pub fn owner_thread_id(&self) -> Option<ThreadId> {
        *self.owner.lock()
    }

    /// Whether `terminate` has been called
    pub fn is_terminated(&self) -> bool {
        self.state.load(Ordering::Acquire) == TERMINATED
    }

    /// Number of posted records not yet run
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Close the queue to new posts, then run whatever was accepted before
    fn close_and_drain(&self) {
        *self.closed.write() = true;
        let mut drained = 0usize;
        for record in self.rx.try_iter() {
            dispatch::run(record);
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!(drained, "ran fragments accepted during shutdown");
        }
    }
}

impl NativeRuntime for HeadlessRuntime {
    fn bind(&self, name: &str, binding: Arc<BindingRecord>) -> Result<(), NativeError> {
        let mut bindings = self.bindings.write();
        if bindings.contains_key(name) {
            return Err(NativeError::Duplicate);
        }
        bindings.insert(name.to_string(), binding);
        Ok(())
    }

    fn unbind(&self, name: &str) -> Result<(), NativeError> {
        self.bindings
            .write()
            .remove(name)
            .map(drop)
            .ok_or(NativeError::NotFound)
    }

    fn post(&self, record: DispatchRecord) -> Result<(), Rejected> {
        let closed = self.closed.read();
        if *closed || self.is_terminated() {
            return Err(Rejected {
                error: NativeError::InvalidState,
                record,
            });
        }

        self.tx.try_send(record).map_err(|e| match e {
            TrySendError::Full(record) => Rejected {
                error: NativeError::Canceled,
                record,
            },
            TrySendError::Disconnected(record) => Rejected {
                error: NativeError::InvalidState,
                record,
            },
        })
    }

    fn resolve(&self, id: &str, status: i32, payload: &str) -> Result<(), NativeError> {
        let mut calls = self.calls.lock();
        if !calls.pending.remove(id) {
            return Err(NativeError::NotFound);
        }
        calls.results.insert(
            id.to_string(),
            CallResult {
                status,
                payload: payload.to_string(),
            },
        );
        self.resolved.notify_all();
        Ok(())
    }

    fn run(&self) -> bool {
        {
            let mut owner = self.owner.lock();
            if owner.is_some() {
                tracing::warn!("event loop is already running");
                return false;
            }
            *owner = Some(thread::current().id());
        }
        let _ = self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire);

        loop {
            // queued work always runs before a pending stop is honored
            match self.rx.try_recv() {
                Ok(record) => {
                    dispatch::run(record);
                    continue;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }
            if self.is_terminated() {
                break;
            }
            channel::select! {
                recv(self.rx) -> record => match record {
                    Ok(record) => dispatch::run(record),
                    Err(_) => break,
                },
                recv(self.wake_rx) -> _ => {}
            }
        }

        self.close_and_drain();
        *self.owner.lock() = None;
        true
    }

    fn terminate(&self) {
        if self.state.swap(TERMINATED, Ordering::AcqRel) != TERMINATED {
            // a full wake channel already carries a wake-up
            let _ = self.wake_tx.try_send(());
        }
    }
}
