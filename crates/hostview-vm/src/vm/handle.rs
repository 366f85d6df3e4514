//! Thread-safe VM handle
//!
//! The VM itself is single-threaded. Every thread that wants to touch it goes
//! through one [`VmHandle`], whose mutex is the only serialization point.
//! Cloning a handle clones the reference, never the VM.

use super::{Vm, VmOptions};
use crate::value::Value;
use crate::VmResult;
use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

struct VmShared {
    vm: Mutex<Vm>,
}

/// Shared reference to the single VM instance
#[derive(Clone)]
pub struct VmHandle {
    inner: Arc<VmShared>,
}

impl VmHandle {
    /// Create a VM and wrap it in a handle
    pub fn new(options: VmOptions) -> Self {
        Self::from_vm(Vm::with_options(options))
    }

    /// Wrap an existing VM
    pub fn from_vm(vm: Vm) -> Self {
        Self {
            inner: Arc::new(VmShared { vm: Mutex::new(vm) }),
        }
    }

    /// Acquire the VM mutex, blocking until it is free.
    ///
    /// The mutex is not reentrant: a thread already inside the VM (for
    /// example a native function called from script) must not call this.
    pub fn enter(&self) -> VmGuard<'_> {
        VmGuard {
            vm: self.inner.vm.lock(),
        }
    }

    /// Whether some thread currently holds the VM mutex
    pub fn is_locked(&self) -> bool {
        self.inner.vm.is_locked()
    }

    /// Create a non-owning reference
    pub fn downgrade(&self) -> WeakVm {
        WeakVm {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same VM
    pub fn ptr_eq(&self, other: &VmHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Run `source` as a top-level unit from whatever thread is calling.
    ///
    /// Takes the VM mutex for the duration of the unit. The unit manages its
    /// own stack usage; the stacks are as they were when this returns.
    pub fn run_code_from_thread(&self, source: &str) -> VmResult<()> {
        tracing::trace!(
            thread = ?std::thread::current().id(),
            bytes = source.len(),
            "running code from thread"
        );
        let mut vm = self.enter();
        vm.run_source(source).map(|_| ())
    }

    /// Register a host function
    pub fn register_native<F>(&self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.enter().register_native(name, Arc::new(f));
    }
}

impl std::fmt::Debug for VmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmHandle")
            .field("ptr", &Arc::as_ptr(&self.inner))
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Non-owning reference to a VM
///
/// Holders of a `WeakVm` never keep the VM alive; once the last
/// [`VmHandle`] is dropped, [`WeakVm::upgrade`] returns `None`.
#[derive(Clone, Default)]
pub struct WeakVm {
    inner: Weak<VmShared>,
}

impl WeakVm {
    /// Get a handle if the VM is still alive
    pub fn upgrade(&self) -> Option<VmHandle> {
        self.inner.upgrade().map(|inner| VmHandle { inner })
    }

    /// Whether the VM is still alive
    pub fn is_live(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl std::fmt::Debug for WeakVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakVm")
            .field("live", &self.is_live())
            .finish()
    }
}

/// RAII guard for the VM mutex (unlocks on drop)
pub struct VmGuard<'a> {
    vm: MutexGuard<'a, Vm>,
}

impl Deref for VmGuard<'_> {
    type Target = Vm;

    fn deref(&self) -> &Vm {
        &self.vm
    }
}

impl DerefMut for VmGuard<'_> {
    fn deref_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }
}
