use headroom_core::Config;
use headroom_telemetry::Paths;

pub fn run(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let path = paths.config_file();

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let json = serde_json::to_string_pretty(&Config::new())?;
    headroom_telemetry::atomic_write(&path, json.as_bytes())?;

    println!("✓ Wrote default config to {}", path.display());
    Ok(())
}
