use super::{read_input, Session};
use headroom_core::{PressureMonitor, UsageInput};
use serde_json::{json, Value};

pub fn run(usage: Option<u64>, file: Option<&str>) -> anyhow::Result<()> {
    let session = Session::open()?;
    let mut monitor = session.monitor()?;
    let content = file.map(|f| read_input(Some(f))).transpose()?;

    let input = match (usage, content.as_deref()) {
        (Some(units), _) => UsageInput::Units(units),
        (None, Some(text)) => UsageInput::Content(text),
        (None, None) => UsageInput::Previous,
    };

    println!("{}", check(&mut monitor, input));
    Ok(())
}

/// Status report for one check; a missing measurement is reported, not raised
pub fn check(monitor: &mut PressureMonitor, input: UsageInput<'_>) -> Value {
    match monitor.check(input) {
        Ok(reading) => json!({
            "tier": reading.tier(),
            "usage_ratio": reading.usage_ratio(),
            "total_size": reading.snapshot.total_size,
            "effective_capacity": monitor.budget().effective_capacity(),
            "tier_changed": reading.tier_changed,
            "persisted": reading.persisted,
            "should_compress": monitor.should_compress(),
            "should_handoff": monitor.should_handoff(),
            "should_stop": monitor.should_stop(),
            "recommendation": reading.recommendation,
        }),
        Err(e) => json!({
            "tier": monitor.current_tier(),
            "error": e.to_string(),
            "recommendation": monitor.recommendation(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headroom_core::Config;

    #[test]
    fn test_scenario_status_reports() {
        let mut monitor = PressureMonitor::new(&Config::new()).unwrap();

        let safe = check(&mut monitor, UsageInput::Units(50_000));
        assert_eq!(safe["tier"], "SAFE");
        assert_eq!(safe["should_compress"], false);

        let emergency = check(&mut monitor, UsageInput::Units(190_000));
        assert_eq!(emergency["tier"], "EMERGENCY");
        assert_eq!(emergency["should_compress"], true);
        assert_eq!(emergency["should_stop"], true);
    }

    #[test]
    fn test_no_data_is_reported() {
        let mut monitor = PressureMonitor::new(&Config::new()).unwrap();
        let report = check(&mut monitor, UsageInput::Previous);
        assert_eq!(report["tier"], "SAFE");
        assert!(report["error"].as_str().unwrap().contains("no usage"));
        assert!(report["recommendation"].is_string());
    }
}
