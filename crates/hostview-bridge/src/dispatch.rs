//! Dispatch queue adapter and trampoline
//!
//! [`schedule`] hands a fragment to the native runtime from any thread and
//! returns without waiting. [`run`] is what the runtime calls back on its
//! owner thread, once per accepted record.

use crate::error::{BridgeError, BridgeResult, Rejected};
use crate::record::DispatchRecord;
use crate::runtime::NativeRuntime;
use hostview_vm::VmHandle;

/// Schedule `source` to run later on the runtime's owner thread.
///
/// # Errors
///
/// - `BridgeError::OutOfMemory` if the fragment cannot be copied; nothing
///   was queued.
/// - `BridgeError::Native` with the runtime's error if the post was refused;
///   the record has already been released and will never run.
pub fn schedule(vm: &VmHandle, runtime: &dyn NativeRuntime, source: &str) -> BridgeResult<()> {
    let record = DispatchRecord::new(vm, source)?;
    let bytes = record.source_code().len();

    match runtime.post(record) {
        Ok(()) => {
            tracing::debug!(bytes, "fragment dispatched");
            Ok(())
        }
        Err(Rejected { error, record }) => {
            drop(record);
            tracing::debug!(bytes, %error, "dispatch refused");
            Err(BridgeError::Native(error))
        }
    }
}

/// Run a dispatched fragment and release its record.
///
/// Called by the native runtime on its owner thread. Script errors are
/// logged and otherwise ignored; the record is released either way and is
/// never retried.
pub fn run(record: DispatchRecord) {
    let Some(vm) = record.owner() else {
        tracing::trace!("dispatched fragment outlived its VM; dropped");
        return;
    };

    if let Err(error) = vm.run_code_from_thread(record.source_code()) {
        tracing::warn!(%error, "dispatched fragment failed");
    }
}
