use super::{read_input, write_output, Session};
use headroom_core::{CompressionLevel, StaticTask};
use headroom_runtime::ProcessResult;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

pub struct CompressArgs {
    pub file: Option<String>,
    pub level: Option<CompressionLevel>,
    pub force: bool,
    pub output: Option<PathBuf>,
    pub task: Option<String>,
    pub keywords: Vec<String>,
}

pub fn run(args: CompressArgs) -> anyhow::Result<()> {
    let session = Session::open()?;
    let content = read_input(args.file.as_deref())?;

    let mut orchestrator = session.orchestrator()?;
    if args.task.is_some() || !args.keywords.is_empty() {
        let task = StaticTask::new(args.task.unwrap_or_default()).with_keywords(args.keywords);
        orchestrator.set_task(Arc::new(task));
    }

    let result = orchestrator.process(&content, args.force, args.level);
    println!("{}", report(result, args.output.as_deref())?);
    Ok(())
}

fn report(result: ProcessResult, output: Option<&std::path::Path>) -> anyhow::Result<Value> {
    let mut report = json!({
        "status": result.status,
        "tier_before": result.tier_before,
        "tier_after": result.tier_after,
        "level": result.level,
        "original_hash": result.original_hash,
        "manifest_hash": result.manifest_hash,
        "reduction": result.reduction,
        "reduction_percent": result.reduction_percent,
        "segments_compressed": result.segments_compressed,
        "recommendation": result.recommendation,
        "warnings": result.warnings,
    });
    if let Some(content) = write_output(result.compressed_content, output)? {
        report["compressed_content"] = json!(content);
    }
    Ok(report)
}
