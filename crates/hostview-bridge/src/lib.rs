//! Hostview callback bridge
//!
//! Lets a native, event-driven GUI/browser runtime call into a hostview VM
//! from threads the VM does not own:
//! - [`invoke`]: blocking "call this script function and discard the result"
//! - [`callback`]: entry points for bound JS calls and lifecycle events
//! - [`dispatch`]: schedule source to run later on the runtime's owner thread
//! - [`record`]: the binding and dispatch records handed to the runtime
//! - [`window`] and [`api`]: the window object and its `webview_*` script API
//!
//! The native runtime itself is reached through [`NativeRuntime`];
//! [`HeadlessRuntime`] implements it without a display.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod api;
pub mod callback;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod invoke;
pub mod record;
pub mod runtime;
pub mod window;

pub use config::{ConfigError, HostviewConfig};
pub use error::{BridgeError, BridgeResult, NativeError, Rejected};
pub use events::{EventHandlers, HandlerSlot, LifecycleEvent, ParseEventError};
pub use invoke::invoke;
pub use record::{BindingRecord, DispatchRecord, RecordStats};
pub use runtime::{CallResult, HeadlessRuntime, NativeRuntime, RuntimeConfig};
pub use window::Window;
