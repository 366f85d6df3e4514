//! Callback bridge
//!
//! Entry points the native runtime calls from its own threads. Every guard
//! failure is a silent drop: a callback racing teardown is normal, not a
//! bug, and must never take the process down.

use crate::invoke::invoke;
use crate::record::BindingRecord;
use crate::window::Window;

/// A bound JS-callable function was invoked.
///
/// Calls the binding's target with `(id, payload)` and returns once the
/// script call tree has finished. Dropped when the binding is absent, its
/// target is empty, its VM is gone, or either argument is missing.
pub fn on_foreign_call(binding: Option<&BindingRecord>, id: Option<&str>, payload: Option<&str>) {
    let Some(binding) = binding else {
        tracing::trace!("foreign call without binding; dropped");
        return;
    };
    if binding.target_name().is_empty() {
        return;
    }
    let Some(vm) = binding.owner() else {
        tracing::trace!(function = binding.target_name(), "foreign call after VM teardown; dropped");
        return;
    };
    let (Some(id), Some(payload)) = (id, payload) else {
        tracing::trace!(function = binding.target_name(), "foreign call with missing arguments; dropped");
        return;
    };

    invoke(&vm, binding.target_name(), &[id, payload]);
}

/// A lifecycle event fired for `window`.
///
/// Calls `handler` with the payload, if any, as its only argument. Dropped
/// when no handler is set, the VM is gone, or the window is not running.
pub fn on_event(window: &Window, handler: Option<&str>, payload: Option<&str>) {
    let Some(handler) = handler.filter(|h| !h.is_empty()) else {
        return;
    };
    let Some(vm) = window.vm() else {
        tracing::trace!(handler, "event after VM teardown; dropped");
        return;
    };
    if !window.is_running() {
        tracing::trace!(handler, "event outside run loop; dropped");
        return;
    }

    match payload {
        Some(payload) => invoke(&vm, handler, &[payload]),
        None => invoke(&vm, handler, &[]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{HeadlessRuntime, RuntimeConfig};
    use hostview_vm::{Value, VmHandle, VmOptions};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn setup() -> (VmHandle, Arc<Mutex<Vec<String>>>) {
        let vm = VmHandle::new(VmOptions::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        vm.register_native("record", move |args| {
            sink.lock().extend(args.iter().map(|v| v.to_string()));
            Ok(Value::Null)
        });
        vm.run_code_from_thread("func OnGreet(id, payload) { record(id, payload) }")
            .unwrap();
        (vm, seen)
    }

    #[test]
    fn test_call_reaches_target() {
        let (vm, seen) = setup();
        let binding = BindingRecord::new(&vm, "OnGreet").unwrap();
        on_foreign_call(Some(&binding), Some("42"), Some("hello"));
        assert_eq!(*seen.lock(), vec!["42", "hello"]);
    }

    #[test]
    fn test_missing_pieces_are_dropped() {
        let (vm, seen) = setup();
        let binding = BindingRecord::new(&vm, "OnGreet").unwrap();
        let empty = BindingRecord::new(&vm, "").unwrap();

        on_foreign_call(None, Some("1"), Some("p"));
        on_foreign_call(Some(&empty), Some("1"), Some("p"));
        on_foreign_call(Some(&binding), None, Some("p"));
        on_foreign_call(Some(&binding), Some("1"), None);

        assert!(seen.lock().is_empty());
        assert!(!vm.is_locked());
    }

    #[test]
    fn test_dead_vm_is_dropped() {
        let (vm, seen) = setup();
        let binding = BindingRecord::new(&vm, "OnGreet").unwrap();
        drop(vm);
        on_foreign_call(Some(&binding), Some("1"), Some("p"));
        assert!(seen.lock().is_empty());
    }

    fn running_window(vm: &VmHandle) -> (Arc<Window>, std::thread::JoinHandle<bool>) {
        let runtime = Arc::new(HeadlessRuntime::new(RuntimeConfig::default()));
        let window = Window::new(vm, runtime.clone());
        let owner = window.spawn("callback-test").unwrap();
        (window, owner)
    }

    #[test]
    fn test_event_reaches_handler_while_running() {
        let (vm, seen) = setup();
        vm.run_code_from_thread("func OnTitle(t) { record(t) }").unwrap();
        let (window, owner) = running_window(&vm);

        on_event(&window, Some("OnTitle"), Some("Home"));
        window.terminate();
        owner.join().unwrap();

        on_event(&window, Some("OnTitle"), Some("Late"));
        assert_eq!(*seen.lock(), vec!["Home"]);
    }

    #[test]
    fn test_event_without_handler_is_dropped() {
        let (vm, seen) = setup();
        let (window, owner) = running_window(&vm);
        let steps = vm.enter().steps_executed();

        on_event(&window, None, Some("p"));
        on_event(&window, Some(""), Some("p"));
        on_event(&window, Some(""), None);

        assert_eq!(vm.enter().steps_executed(), steps);
        assert!(seen.lock().is_empty());
        window.terminate();
        owner.join().unwrap();
    }

    #[test]
    fn test_event_for_dead_vm_is_dropped() {
        let (vm, seen) = setup();
        let (window, owner) = running_window(&vm);
        drop(vm);

        assert!(window.is_running());
        on_event(&window, Some("OnGreet"), Some("p"));

        assert!(window.vm().is_none());
        assert!(seen.lock().is_empty());
        window.terminate();
        owner.join().unwrap();
    }
}
