//! Window: one native runtime paired with one VM
//!
//! Owns the binding registry and the lifecycle handler slots. The VM is held
//! weakly, so a window never keeps its interpreter alive and a VM can own
//! the window through its script API closures without a reference cycle.

use crate::callback;
use crate::dispatch;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{EventHandlers, HandlerSlot, LifecycleEvent};
use crate::record::{try_copy, BindingRecord};
use crate::runtime::NativeRuntime;
use hostview_vm::{VmHandle, WeakVm};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const TERMINATED: u8 = 2;

/// A native window driven by a script VM
pub struct Window {
    vm: WeakVm,
    runtime: Arc<dyn NativeRuntime>,
    bindings: Mutex<FxHashMap<String, Arc<BindingRecord>>>,
    handlers: RwLock<EventHandlers>,
    /// `IDLE`, `RUNNING` or `TERMINATED`; the last is final
    state: AtomicU8,
}

impl Window {
    /// Create a window for `vm` on top of `runtime`
    pub fn new(vm: &VmHandle, runtime: Arc<dyn NativeRuntime>) -> Arc<Self> {
        Arc::new(Self {
            vm: vm.downgrade(),
            runtime,
            bindings: Mutex::new(FxHashMap::default()),
            handlers: RwLock::new(EventHandlers::default()),
            state: AtomicU8::new(IDLE),
        })
    }

    /// The VM, if it is still alive
    pub fn vm(&self) -> Option<VmHandle> {
        self.vm.upgrade()
    }

    /// The native runtime
    pub fn runtime(&self) -> &Arc<dyn NativeRuntime> {
        &self.runtime
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    /// Expose script function `function` to JS as `js_name`.
    ///
    /// # Errors
    ///
    /// - `BridgeError::OutOfMemory` if a name cannot be copied.
    /// - `BridgeError::Native` if the runtime refuses the binding (for
    ///   example `Duplicate`); the record is released and nothing changes.
    pub fn bind(&self, js_name: &str, function: &str) -> BridgeResult<()> {
        let key = try_copy(js_name)?;
        let record = BindingRecord::with_owner(self.vm.clone(), function)?;

        self.runtime.bind(js_name, Arc::clone(&record))?;
        tracing::debug!(js_name, function = record.target_name(), "bound");
        self.bindings.lock().insert(key, record);
        Ok(())
    }

    /// Remove the JS function `js_name`.
    ///
    /// Both the runtime's and the window's references to the binding record
    /// are dropped here. A callback already running keeps its own reference
    /// and finishes normally.
    ///
    /// # Errors
    ///
    /// `BridgeError::Native` from the runtime, e.g. `NotFound`. The registry
    /// is left untouched in that case.
    pub fn unbind(&self, js_name: &str) -> BridgeResult<()> {
        self.runtime.unbind(js_name)?;
        self.bindings.lock().remove(js_name);
        tracing::debug!(js_name, "unbound");
        Ok(())
    }

    /// The binding record currently registered for `js_name`
    pub fn binding(&self, js_name: &str) -> Option<Arc<BindingRecord>> {
        self.bindings.lock().get(js_name).cloned()
    }

    /// Number of live bindings in the registry
    pub fn binding_count(&self) -> usize {
        self.bindings.lock().len()
    }

    // ========================================================================
    // Dispatch and results
    // ========================================================================

    /// Schedule `source` to run on the owner thread. Returns without waiting.
    ///
    /// # Errors
    ///
    /// `BridgeError::VmUnavailable` if the VM is gone, otherwise as
    /// [`dispatch::schedule`].
    pub fn dispatch(&self, source: &str) -> BridgeResult<()> {
        let vm = self.vm.upgrade().ok_or(BridgeError::VmUnavailable)?;
        dispatch::schedule(&vm, self.runtime.as_ref(), source)
    }

    /// Deliver the asynchronous result of the bound call `id`.
    ///
    /// Never touches the VM; safe to call from script code.
    pub fn return_value(&self, id: &str, status: i32, payload: &str) -> BridgeResult<()> {
        self.runtime.resolve(id, status, payload)?;
        Ok(())
    }

    // ========================================================================
    // Lifecycle events
    // ========================================================================

    /// Set the script handler for `slot`; an empty name clears it
    pub fn set_handler(&self, slot: HandlerSlot, function: &str) -> BridgeResult<()> {
        let function = try_copy(function)?;
        self.handlers.write().set(slot, function);
        Ok(())
    }

    /// Handler currently set for `slot`
    pub fn handler(&self, slot: HandlerSlot) -> Option<String> {
        self.handlers.read().get(slot).map(str::to_string)
    }

    /// Forward `event` to its handlers on the calling thread.
    ///
    /// Each handler runs to completion before the next; events outside the
    /// run loop are dropped.
    pub fn fire(&self, event: &LifecycleEvent) {
        let calls: Vec<_> = {
            let handlers = self.handlers.read();
            event
                .routes()
                .into_iter()
                .map(|(slot, payload)| (handlers.get(slot).map(str::to_string), payload))
                .collect()
        };

        for (handler, payload) in calls {
            callback::on_event(self, handler.as_deref(), payload.as_deref());
        }
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Run the native event loop on the calling thread until terminated.
    ///
    /// Returns `false` if the loop was already running on another thread;
    /// the window then stays running.
    pub fn run(&self) -> bool {
        self.mark_running();
        tracing::debug!("event loop started");
        if !self.runtime.run() {
            return false;
        }
        let _ = self
            .state
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire);
        tracing::debug!("event loop stopped");
        true
    }

    /// Run the event loop on a new thread named `thread_name`.
    ///
    /// Unless the window was terminated, it counts as running as soon as
    /// this returns.
    pub fn spawn(self: &Arc<Self>, thread_name: &str) -> std::io::Result<JoinHandle<bool>> {
        let marked = self.mark_running();
        let window = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || window.run());
        if spawned.is_err() && marked {
            let _ = self
                .state
                .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire);
        }
        spawned
    }

    /// Stop the event loop; callable from any thread, including script code.
    ///
    /// Final: the window never counts as running again.
    pub fn terminate(&self) {
        self.state.store(TERMINATED, Ordering::Release);
        self.runtime.terminate();
    }

    /// Whether the event loop is running
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Move from idle to running; a terminated window stays terminated
    fn mark_running(&self) -> bool {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("vm", &self.vm)
            .field("bindings", &self.bindings.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NativeError;
    use crate::runtime::{HeadlessRuntime, RuntimeConfig};
    use hostview_vm::{Value, VmOptions};

    fn setup() -> (VmHandle, Arc<HeadlessRuntime>, Arc<Window>) {
        let vm = VmHandle::new(VmOptions::default());
        let runtime = Arc::new(HeadlessRuntime::new(RuntimeConfig::default()));
        let window = Window::new(&vm, runtime.clone());
        (vm, runtime, window)
    }

    #[test]
    fn test_bind_stores_lowercased_target() {
        let (_vm, _rt, window) = setup();
        window.bind("greet", "OnGreet").unwrap();
        let record = window.binding("greet").unwrap();
        assert_eq!(record.target_name(), "ongreet");
        assert_eq!(window.binding_count(), 1);
    }

    #[test]
    fn test_duplicate_bind_keeps_first() {
        let (_vm, _rt, window) = setup();
        window.bind("greet", "first").unwrap();
        let err = window.bind("greet", "second").unwrap_err();
        assert!(matches!(err, BridgeError::Native(NativeError::Duplicate)));
        assert_eq!(window.binding("greet").unwrap().target_name(), "first");
    }

    #[test]
    fn test_unbind_unknown_keeps_registry() {
        let (_vm, _rt, window) = setup();
        window.bind("a", "f").unwrap();
        let err = window.unbind("b").unwrap_err();
        assert_eq!(err.native_code(), Some(NativeError::NotFound.code()));
        assert_eq!(window.binding_count(), 1);

        window.unbind("a").unwrap();
        assert_eq!(window.binding_count(), 0);
    }

    #[test]
    fn test_events_only_reach_handlers_while_running() {
        let (vm, _rt, window) = setup();
        vm.run_code_from_thread("func OnTitle(t) { title = t }").unwrap();
        window.set_handler(HandlerSlot::Title, "OnTitle").unwrap();

        let event = LifecycleEvent::TitleChanged("Home".to_string());
        window.fire(&event);
        assert_eq!(vm.enter().global("title"), None);

        let owner = window.spawn("window-test").unwrap();
        window.fire(&event);
        assert_eq!(vm.enter().global("title"), Some(&Value::from("Home")));

        window.terminate();
        owner.join().unwrap();
        assert!(!window.is_running());
    }

    #[test]
    fn test_spawn_after_terminate_stays_stopped() {
        let (vm, rt, window) = setup();
        vm.run_code_from_thread("func OnClose() { closed = 1 }").unwrap();
        window.set_handler(HandlerSlot::Close, "OnClose").unwrap();

        window.terminate();
        let owner = window.spawn("window-late").unwrap();
        assert!(!window.is_running());
        window.fire(&LifecycleEvent::CloseRequested);
        owner.join().unwrap();

        assert!(rt.is_terminated());
        assert_eq!(vm.enter().global("closed"), None);
    }

    #[test]
    fn test_second_run_leaves_loop_running() {
        let (vm, rt, window) = setup();
        vm.run_code_from_thread("func OnClose() { closed = 1 }").unwrap();
        window.set_handler(HandlerSlot::Close, "OnClose").unwrap();

        let owner = window.spawn("window-first").unwrap();
        while rt.owner_thread_id().is_none() {
            thread::yield_now();
        }
        assert!(!window.run());
        assert!(window.is_running());

        window.fire(&LifecycleEvent::CloseRequested);
        assert_eq!(vm.enter().global("closed"), Some(&Value::Number(1.0)));

        window.terminate();
        assert!(owner.join().unwrap());
        assert!(!window.is_running());
    }

    #[test]
    fn test_dispatch_without_vm() {
        let (vm, _rt, window) = setup();
        drop(vm);
        assert!(matches!(
            window.dispatch("x = 1"),
            Err(BridgeError::VmUnavailable)
        ));
    }
}
