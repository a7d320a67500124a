pub mod batch;
pub mod compress;
pub mod expand;
pub mod init;
pub mod status;
pub mod trend;

use anyhow::Context;
use headroom_compress::DiskStore;
use headroom_core::{Config, PressureMonitor, Snapshot};
use headroom_runtime::Orchestrator;
use headroom_telemetry::{Paths, RecordKind};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Paths, config and store shared by every command
pub struct Session {
    pub paths: Paths,
    pub config: Config,
    pub store: Arc<DiskStore>,
}

impl Session {
    pub fn open() -> anyhow::Result<Self> {
        Self::open_at(Paths::new()?)
    }

    pub fn open_at(paths: Paths) -> anyhow::Result<Self> {
        let config = load_config(&paths)?;
        let store = Arc::new(DiskStore::open(&paths)?);
        Ok(Self {
            paths,
            config,
            store,
        })
    }

    /// Snapshots previously logged, in write order
    pub fn snapshots(&self) -> anyhow::Result<Vec<Snapshot>> {
        Ok(self
            .store
            .records(RecordKind::Snapshot)?
            .into_iter()
            .filter_map(|e| serde_json::from_value(e.payload).ok())
            .collect())
    }

    /// Monitor with history restored from the log
    pub fn monitor(&self) -> anyhow::Result<PressureMonitor> {
        let mut monitor = PressureMonitor::new(&self.config)?.with_log(self.store.clone());
        monitor.replay(self.snapshots()?);
        Ok(monitor)
    }

    pub fn orchestrator(&self) -> anyhow::Result<Orchestrator> {
        let mut orchestrator = Orchestrator::new(&self.config, self.store.clone())?;
        orchestrator.monitor_mut().replay(self.snapshots()?);
        Ok(orchestrator)
    }
}

/// `headroom.json` from the data directory, or defaults when absent
pub fn load_config(paths: &Paths) -> anyhow::Result<Config> {
    let path = paths.config_file();
    Config::load(&path).with_context(|| format!("loading {}", path.display()))
}

/// Read `file`, or stdin when `None`
pub fn read_input(file: Option<&str>) -> anyhow::Result<String> {
    match file {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("reading {path}"))
        }
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Write `content` to `output` if given; otherwise hand it back for the JSON
pub fn write_output(content: String, output: Option<&Path>) -> anyhow::Result<Option<String>> {
    match output {
        Some(path) => {
            headroom_telemetry::atomic_write(path, content.as_bytes())
                .with_context(|| format!("writing {}", path.display()))?;
            Ok(None)
        }
        None => Ok(Some(content)),
    }
}
