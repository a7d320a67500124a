use super::Session;
use serde_json::json;

pub fn run(window: usize) -> anyhow::Result<()> {
    let session = Session::open()?;
    let monitor = session.monitor()?;

    let output = json!({
        "snapshots": monitor.history().count(),
        "tier": monitor.current_tier(),
        "latest_ratio": monitor.latest().map(|s| s.usage_ratio),
        "trend": monitor.get_trend(window),
        "should_compress": monitor.should_compress(),
        "recommendation": monitor.recommendation(),
    });

    println!("{output}");
    Ok(())
}
