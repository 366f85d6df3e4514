//! Binding and dispatch records
//!
//! These are the two small heap objects the bridge hands to the native
//! runtime. Both hold their VM weakly and own copies of their strings.
//! Neither is ever freed by hand: dropping the last owner releases it, and
//! the process-wide [`RecordStats`] ledger counts every creation and drop.

use crate::error::{BridgeError, BridgeResult};
use hostview_vm::{normalize_name, VmHandle, WeakVm};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static BINDINGS_CREATED: AtomicU64 = AtomicU64::new(0);
static BINDINGS_DROPPED: AtomicU64 = AtomicU64::new(0);
static DISPATCHES_CREATED: AtomicU64 = AtomicU64::new(0);
static DISPATCHES_DROPPED: AtomicU64 = AtomicU64::new(0);

/// Copy a string, reporting allocation failure instead of aborting
pub(crate) fn try_copy(s: &str) -> BridgeResult<String> {
    let mut out = String::new();
    out.try_reserve_exact(s.len())
        .map_err(|_| BridgeError::OutOfMemory)?;
    out.push_str(s);
    Ok(out)
}

// ============================================================================
// Binding Record
// ============================================================================

/// Pairs a foreign-callable name's target script function with its VM.
///
/// Shared between the window's binding registry and the native runtime's
/// dispatch entry; see `Window::unbind` for when it is released.
#[derive(Debug)]
pub struct BindingRecord {
    owner: WeakVm,
    target_name: String,
}

impl BindingRecord {
    /// Create a record targeting `function` in `vm`.
    ///
    /// The name is stored in the VM's function-table key form.
    ///
    /// # Errors
    ///
    /// `BridgeError::OutOfMemory` if the name cannot be copied.
    pub fn new(vm: &VmHandle, function: &str) -> BridgeResult<Arc<Self>> {
        Self::with_owner(vm.downgrade(), function)
    }

    /// Create a record from an already-weak VM reference
    pub fn with_owner(owner: WeakVm, function: &str) -> BridgeResult<Arc<Self>> {
        let target_name = normalize_name(&try_copy(function)?);
        BINDINGS_CREATED.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(Self { owner, target_name }))
    }

    /// The owning VM, if it is still alive
    pub fn owner(&self) -> Option<VmHandle> {
        self.owner.upgrade()
    }

    /// Lower-cased target function name
    pub fn target_name(&self) -> &str {
        &self.target_name
    }
}

impl Drop for BindingRecord {
    fn drop(&mut self) {
        BINDINGS_DROPPED.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Dispatch Record
// ============================================================================

/// A source fragment scheduled to run on the owner thread.
///
/// Exactly one party owns it at any time: the scheduling caller, the native
/// runtime's queue, or the trampoline running it.
#[derive(Debug)]
pub struct DispatchRecord {
    owner: WeakVm,
    source_code: String,
}

impl DispatchRecord {
    /// Create a record that will run `source` against `vm`.
    ///
    /// # Errors
    ///
    /// `BridgeError::OutOfMemory` if the source cannot be copied.
    pub fn new(vm: &VmHandle, source: &str) -> BridgeResult<Self> {
        let source_code = try_copy(source)?;
        DISPATCHES_CREATED.fetch_add(1, Ordering::Relaxed);
        Ok(Self {
            owner: vm.downgrade(),
            source_code,
        })
    }

    /// The owning VM, if it is still alive
    pub fn owner(&self) -> Option<VmHandle> {
        self.owner.upgrade()
    }

    /// The fragment to run
    pub fn source_code(&self) -> &str {
        &self.source_code
    }
}

impl Drop for DispatchRecord {
    fn drop(&mut self) {
        DISPATCHES_DROPPED.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Process-wide counts of records created and dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordStats {
    /// Binding records created
    pub bindings_created: u64,
    /// Binding records dropped
    pub bindings_dropped: u64,
    /// Dispatch records created
    pub dispatches_created: u64,
    /// Dispatch records dropped
    pub dispatches_dropped: u64,
}

impl RecordStats {
    /// Read the current counters
    pub fn current() -> Self {
        Self {
            bindings_created: BINDINGS_CREATED.load(Ordering::Relaxed),
            bindings_dropped: BINDINGS_DROPPED.load(Ordering::Relaxed),
            dispatches_created: DISPATCHES_CREATED.load(Ordering::Relaxed),
            dispatches_dropped: DISPATCHES_DROPPED.load(Ordering::Relaxed),
        }
    }

    /// Counter growth since an earlier reading
    pub fn since(&self, earlier: &RecordStats) -> RecordStats {
        RecordStats {
            bindings_created: self.bindings_created - earlier.bindings_created,
            bindings_dropped: self.bindings_dropped - earlier.bindings_dropped,
            dispatches_created: self.dispatches_created - earlier.dispatches_created,
            dispatches_dropped: self.dispatches_dropped - earlier.dispatches_dropped,
        }
    }

    /// Binding records currently alive
    pub fn live_bindings(&self) -> u64 {
        self.bindings_created.saturating_sub(self.bindings_dropped)
    }

    /// Dispatch records currently alive
    pub fn live_dispatches(&self) -> u64 {
        self.dispatches_created.saturating_sub(self.dispatches_dropped)
    }
}
