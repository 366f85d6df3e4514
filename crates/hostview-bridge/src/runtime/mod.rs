//! Native runtime contract
//!
//! The GUI/browser runtime is an external collaborator. The bridge only
//! talks to it through [`NativeRuntime`]; [`HeadlessRuntime`] is an
//! in-process implementation with a real owner-thread event loop and no
//! window.

mod headless;

pub use headless::{CallResult, HeadlessRuntime, RuntimeConfig};

use crate::error::{NativeError, Rejected};
use crate::record::{BindingRecord, DispatchRecord};
use std::sync::Arc;

/// What the bridge needs from a native GUI/browser runtime
pub trait NativeRuntime: Send + Sync {
    /// Register a JS-callable function under `name`.
    ///
    /// When JS calls it, the runtime must call
    /// [`crate::callback::on_foreign_call`] with the binding, the call's
    /// correlation id and its payload. Binding a name twice fails with
    /// `NativeError::Duplicate` and leaves the first binding in place.
    fn bind(&self, name: &str, binding: Arc<BindingRecord>) -> Result<(), NativeError>;

    /// Remove a JS-callable function, dropping the runtime's reference to its
    /// binding. Unknown names fail with `NativeError::NotFound`.
    fn unbind(&self, name: &str) -> Result<(), NativeError>;

    /// Queue `record` to run on the owner thread via
    /// [`crate::dispatch::run`].
    ///
    /// Success or failure is known before this returns. On failure the
    /// record is handed back inside [`Rejected`] and must not run.
    fn post(&self, record: DispatchRecord) -> Result<(), Rejected>;

    /// Deliver the result of the bound call identified by `id`
    fn resolve(&self, id: &str, status: i32, payload: &str) -> Result<(), NativeError>;

    /// Run the event loop on the calling thread until terminated.
    ///
    /// Returns `false` without running anything if another thread already
    /// runs the loop. Records accepted by `post` before the loop stops still
    /// run before this returns.
    fn run(&self) -> bool;

    /// Ask the event loop to stop; callable from any thread
    fn terminate(&self);
}
