//! `hostview run`: load a script, drive it through the headless runtime

use super::Session;
use anyhow::{anyhow, Context};
use hostview_bridge::{HostviewConfig, LifecycleEvent};
use std::path::PathBuf;

pub struct RunArgs {
    pub file: PathBuf,
    pub emit: Vec<String>,
    pub call: Vec<String>,
    pub config: HostviewConfig,
}

struct SimulatedCall {
    name: String,
    id: String,
    payload: String,
}

fn parse_call(arg: &str) -> anyhow::Result<SimulatedCall> {
    let mut parts = arg.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(id), Some(payload)) if !name.is_empty() => Ok(SimulatedCall {
            name: name.to_string(),
            id: id.to_string(),
            payload: payload.to_string(),
        }),
        _ => Err(anyhow!("invalid --call '{}', expected name:id:payload", arg)),
    }
}

pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let events = args
        .emit
        .iter()
        .map(|e| e.parse::<LifecycleEvent>())
        .collect::<Result<Vec<_>, _>>()?;
    let calls = args
        .call
        .iter()
        .map(|c| parse_call(c))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let session = Session::new(&args.config);
    let owner = session
        .window
        .spawn(&args.config.runtime.thread_name)
        .context("starting owner thread")?;

    let result = drive(&session, &source, &events, &calls);

    session.window.terminate();
    owner
        .join()
        .map_err(|_| anyhow!("owner thread panicked"))?;
    result?;

    for call in &calls {
        match session.runtime.take_result(&call.id) {
            Some(r) => println!("{}: {} {}", call.id, r.status, r.payload),
            None => println!("{}: no result", call.id),
        }
    }
    Ok(())
}

fn drive(
    session: &Session,
    source: &str,
    events: &[LifecycleEvent],
    calls: &[SimulatedCall],
) -> anyhow::Result<()> {
    session
        .vm
        .run_code_from_thread(source)
        .context("running script")?;

    for event in events {
        tracing::debug!(%event, "firing");
        session.window.fire(event);
    }

    for call in calls {
        session
            .runtime
            .call_binding(&call.name, &call.id, &call.payload)
            .with_context(|| format!("calling '{}'", call.name))?;
    }
    Ok(())
}
