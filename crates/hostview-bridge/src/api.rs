//! Script-facing API
//!
//! Registers the `webview_*` functions in a VM. They run while the VM is
//! locked, so none of them may enter the VM again: everything they need is
//! captured, and the window only ever holds the VM weakly.

use crate::error::{BridgeError, BridgeResult, NativeError};
use crate::events::HandlerSlot;
use crate::window::Window;
use hostview_vm::{Value, VmError, VmHandle, VmResult};
use std::sync::Arc;

/// Version string reported by `webview_version()`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Register the webview API for `window` in `vm`
pub fn install(vm: &VmHandle, window: &Arc<Window>) {
    let w = Arc::clone(window);
    vm.register_native("webview_bind", move |args| {
        expect_args("webview_bind", args, 2)?;
        let js_name = string_arg("webview_bind", args, 0)?;
        let function = string_arg("webview_bind", args, 1)?;
        Ok(status(w.bind(js_name, function)))
    });

    let w = Arc::clone(window);
    vm.register_native("webview_unbind", move |args| {
        expect_args("webview_unbind", args, 1)?;
        let js_name = string_arg("webview_unbind", args, 0)?;
        Ok(status(w.unbind(js_name)))
    });

    let w = Arc::clone(window);
    vm.register_native("webview_dispatch", move |args| {
        expect_args("webview_dispatch", args, 1)?;
        let source = string_arg("webview_dispatch", args, 0)?;
        Ok(status(w.dispatch(source)))
    });

    let w = Arc::clone(window);
    vm.register_native("webview_return", move |args| {
        expect_args("webview_return", args, 3)?;
        let id = string_arg("webview_return", args, 0)?;
        let code = number_arg("webview_return", args, 1)?;
        let payload = string_arg("webview_return", args, 2)?;
        Ok(status(w.return_value(id, code as i32, payload)))
    });

    let w = Arc::clone(window);
    vm.register_native("webview_terminate", move |args| {
        expect_args("webview_terminate", args, 0)?;
        w.terminate();
        Ok(Value::Number(NativeError::OK as f64))
    });

    for slot in HandlerSlot::ALL {
        let name = format!("webview_on_{}", slot.ident());
        let label = name.clone();
        let w = Arc::clone(window);
        vm.register_native(&name, move |args| {
            expect_args(&label, args, 1)?;
            let function = string_arg(&label, args, 0)?;
            Ok(status(w.set_handler(slot, function)))
        });
    }

    vm.register_native("webview_version", |args| {
        expect_args("webview_version", args, 0)?;
        Ok(Value::string(VERSION))
    });

    vm.register_native("get_webview_error_ok", |_| Ok(Value::Number(NativeError::OK as f64)));
    for error in NativeError::ALL {
        let name = format!("get_webview_error_{}", error.ident());
        vm.register_native(&name, move |_| Ok(Value::Number(error.code() as f64)));
    }

    tracing::debug!("webview API installed");
}

/// Numeric result code for a bridge operation
fn status(result: BridgeResult<()>) -> Value {
    let code = match result {
        Ok(()) => NativeError::OK,
        Err(BridgeError::Native(e)) => e.code(),
        Err(BridgeError::VmUnavailable) => NativeError::InvalidState.code(),
        Err(e) => {
            tracing::debug!(error = %e, "webview call failed");
            NativeError::Unspecified.code()
        }
    };
    Value::Number(code as f64)
}

fn expect_args(function: &str, args: &[Value], count: usize) -> VmResult<()> {
    if args.len() == count {
        Ok(())
    } else {
        Err(VmError::TypeError(format!(
            "{} expects {} argument(s), got {}",
            function,
            count,
            args.len()
        )))
    }
}

fn string_arg<'a>(function: &str, args: &'a [Value], index: usize) -> VmResult<&'a str> {
    args[index].as_str().ok_or_else(|| {
        VmError::TypeError(format!(
            "{} argument {} must be a string, got {}",
            function,
            index + 1,
            args[index].type_name()
        ))
    })
}

fn number_arg(function: &str, args: &[Value], index: usize) -> VmResult<f64> {
    args[index].as_number().ok_or_else(|| {
        VmError::TypeError(format!(
            "{} argument {} must be a number, got {}",
            function,
            index + 1,
            args[index].type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{HeadlessRuntime, RuntimeConfig};
    use hostview_vm::VmOptions;

    fn setup() -> (VmHandle, Arc<HeadlessRuntime>, Arc<Window>) {
        let vm = VmHandle::new(VmOptions::default());
        let runtime = Arc::new(HeadlessRuntime::new(RuntimeConfig::default()));
        let window = Window::new(&vm, runtime.clone());
        install(&vm, &window);
        (vm, runtime, window)
    }

    #[test]
    fn test_error_constants() {
        let (vm, _rt, _window) = setup();
        vm.run_code_from_thread(
            "ok = get_webview_error_ok()
             dup = get_webview_error_duplicate()
             missing = get_webview_error_missing_dependency()",
        )
        .unwrap();
        let guard = vm.enter();
        assert_eq!(guard.global("ok"), Some(&Value::Number(0.0)));
        assert_eq!(guard.global("dup"), Some(&Value::Number(1.0)));
        assert_eq!(guard.global("missing"), Some(&Value::Number(-5.0)));
    }

    #[test]
    fn test_bind_returns_codes() {
        let (vm, rt, window) = setup();
        vm.run_code_from_thread(
            "first = webview_bind(\"greet\", \"OnGreet\")
             second = webview_bind(\"greet\", \"Other\")
             gone = webview_unbind(\"nothing\")",
        )
        .unwrap();
        let guard = vm.enter();
        assert_eq!(guard.global("first"), Some(&Value::Number(0.0)));
        assert_eq!(guard.global("second"), Some(&Value::Number(1.0)));
        assert_eq!(guard.global("gone"), Some(&Value::Number(2.0)));
        assert!(rt.is_bound("greet"));
        assert_eq!(window.binding("greet").unwrap().target_name(), "ongreet");
    }

    #[test]
    fn test_handler_registration() {
        let (vm, _rt, window) = setup();
        vm.run_code_from_thread("webview_on_dom_ready(\"Ready\")").unwrap();
        assert_eq!(window.handler(HandlerSlot::DomReady).as_deref(), Some("Ready"));
    }

    #[test]
    fn test_argument_errors_raise() {
        let (vm, _rt, _window) = setup();
        assert!(matches!(
            vm.run_code_from_thread("webview_bind(\"only\")"),
            Err(VmError::TypeError(_))
        ));
        assert!(matches!(
            vm.run_code_from_thread("webview_return(\"1\", \"zero\", \"p\")"),
            Err(VmError::TypeError(_))
        ));
        assert!(!vm.is_locked());
    }

    #[test]
    fn test_version() {
        let (vm, _rt, _window) = setup();
        vm.run_code_from_thread("v = webview_version()").unwrap();
        assert_eq!(vm.enter().global("v"), Some(&Value::from(VERSION)));
    }

    #[test]
    fn test_terminate_from_script() {
        let (vm, rt, window) = setup();
        vm.run_code_from_thread("webview_terminate()").unwrap();
        assert!(rt.is_terminated());
        assert!(!window.is_running());
    }
}
