// Run a task from an inline configuration and print the event stream.
//
// cargo run --example run_task

use gantry_engine::{
    config, progress_channel, run_task, Registry, RunContext, RunEvent, TaskExecRequest,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let yaml = r#"
tools:
  demo:
    tasks:
      greet:
        matrix:
          os: [linux, darwin]
          arch: amd64
        steps:
          - name: hello
            run: echo hello from ${matrix.os}/${matrix.arch}
"#;

    let config = config::load_str(yaml)?;
    let registry = Registry::builtin();

    let (tx, mut rx) = progress_channel();
    let ctx = RunContext::new(Arc::new(config), Arc::new(registry)).with_events(tx);

    let handle = tokio::spawn(run_task(ctx, TaskExecRequest::new("demo", "greet")));

    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::StepOutput { line, .. } => println!("| {}", line),
            RunEvent::EntryCompleted { entry, success, .. } => {
                println!("entry {} -> {}", entry, if success { "ok" } else { "failed" });
            }
            _ => {}
        }
    }

    handle.await??;
    Ok(())
}
