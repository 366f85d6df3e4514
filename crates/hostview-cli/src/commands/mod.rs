pub mod eval;
pub mod run;

use anyhow::Context;
use hostview_bridge::{api, HeadlessRuntime, HostviewConfig, Window};
use hostview_vm::VmHandle;
use std::path::Path;
use std::sync::Arc;

/// Load the configuration file, or defaults when none was given
pub fn load_config(path: Option<&Path>) -> anyhow::Result<HostviewConfig> {
    match path {
        Some(path) => HostviewConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(HostviewConfig::default()),
    }
}

/// A VM with the webview API installed over a headless runtime
pub struct Session {
    pub vm: VmHandle,
    pub runtime: Arc<HeadlessRuntime>,
    pub window: Arc<Window>,
}

impl Session {
    pub fn new(config: &HostviewConfig) -> Self {
        let vm = VmHandle::new(config.vm.clone());
        let runtime = Arc::new(HeadlessRuntime::new(config.runtime.clone()));
        let window = Window::new(&vm, runtime.clone());
        api::install(&vm, &window);
        Self {
            vm,
            runtime,
            window,
        }
    }
}
