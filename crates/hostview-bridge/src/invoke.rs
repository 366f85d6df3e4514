//! Invocation primitive
//!
//! Synchronously calls a script function from any thread, waits for the
//! whole call tree to return, and throws the result away. Both the bound
//! function path and the lifecycle event path end up here.

use hostview_vm::{Value, VmError, VmHandle};

/// Call `function_name` in `vm` with string arguments and discard the result.
///
/// Blocks the calling thread until the call and everything it calls has
/// returned. The VM's stacks are exactly as they were before the call when
/// this returns, including when the function is unknown or fails partway.
/// An empty name, an unknown name and script errors are all silent: nothing
/// is propagated to the caller, which is usually a native runtime thread.
pub fn invoke(vm: &VmHandle, function_name: &str, args: &[&str]) {
    if function_name.is_empty() {
        return;
    }

    let mut guard = vm.enter();
    let state = guard.snapshot();

    if !guard.load_function(function_name) {
        guard.restore(state);
        tracing::trace!(function = function_name, "bridge target not found; dropped");
        return;
    }

    let result = args
        .iter()
        .try_for_each(|arg| guard.push(Value::string(*arg)))
        .and_then(|()| guard.call())
        .and_then(|()| guard.run_until(state.pending_calls));

    guard.restore(state);
    drop(guard);

    if let Err(error) = result {
        report(function_name, &error);
    }
}

fn report(function_name: &str, error: &VmError) {
    tracing::warn!(
        function = function_name,
        %error,
        "script error in bridge call; VM state restored"
    );
}
