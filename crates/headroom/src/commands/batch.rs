use super::{read_input, Session};
use anyhow::Context;
use headroom_runtime::{Controller, Operation};
use serde_json::json;

pub fn run(file: Option<&str>) -> anyhow::Result<()> {
    let session = Session::open()?;
    let input = read_input(file)?;
    let ops: Vec<Operation> =
        serde_json::from_str(&input).context("expected a JSON array of operations")?;

    let controller = Controller::new(&session.config, session.orchestrator()?)?;
    let batch = controller.batch_execute(ops);

    let output = json!({
        "batch": batch,
        "cache": controller.cache_entries(),
        "cache_stats": controller.cache_stats(),
        "checkpoint": controller.take_checkpoint(),
    });
    println!("{output}");
    Ok(())
}
