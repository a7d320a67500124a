use super::{read_input, write_output, Session};
use anyhow::Context;
use headroom_compress::Expander;
use headroom_core::Category;
use headroom_telemetry::Persistence;
use serde_json::json;
use std::path::Path;

pub fn run(
    file: Option<&str>,
    original: Option<&str>,
    categories: &[Category],
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let session = Session::open()?;
    let content = read_input(file)?;

    let manifest = match original {
        Some(hash) => Some(
            session
                .store
                .latest_manifest_for(hash)?
                .with_context(|| format!("no manifest recorded for {hash}"))?,
        ),
        None => None,
    };

    let filter = (!categories.is_empty()).then_some(categories);
    let result = Expander::new(session.store.clone()).expand_filtered(
        &content,
        manifest.as_ref(),
        filter,
    );

    let mut report = json!({
        "segments_expanded": result.segments_expanded,
        "warnings": result.warnings,
    });
    if let Some(content) = write_output(result.expanded_content, output)? {
        report["expanded_content"] = json!(content);
    }
    println!("{report}");
    Ok(())
}

pub fn rollback(hash: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let session = Session::open()?;
    let bytes = session
        .store
        .read_by_hash(hash)
        .with_context(|| format!("reading content {hash}"))?;
    let content = String::from_utf8(bytes).context("stored content is not UTF-8")?;

    match write_output(content, output)? {
        Some(content) => print!("{content}"),
        None => println!("{}", json!({ "restored": hash })),
    }
    Ok(())
}
