//! `hostview eval`: run inline code and print globals

use super::Session;
use anyhow::Context;
use hostview_bridge::HostviewConfig;
use hostview_vm::Value;

pub fn execute(code: &str, print: &[String], config: HostviewConfig) -> anyhow::Result<()> {
    let session = Session::new(&config);
    session
        .vm
        .run_code_from_thread(code)
        .context("evaluation failed")?;

    // drain anything the code dispatched, on this thread
    session.window.terminate();
    session.window.run();

    let vm = session.vm.enter();
    for name in print {
        let value = vm.global(name).cloned().unwrap_or(Value::Null);
        println!("{} = {}", name, value);
    }
    Ok(())
}
