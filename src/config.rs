use std::path::PathBuf;

/// Runtime configuration, collected from `QUITBOOK_*` environment variables.
/// The embedding process decides when to read it; every field has a default
/// so a bare environment works.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the schedule WAL.
    pub data_dir: PathBuf,
    /// WAL appends between background compactions.
    pub compact_threshold: u64,
    /// Prometheus exporter port; None disables the exporter.
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("QUITBOOK_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let compact_threshold: u64 = std::env::var("QUITBOOK_COMPACT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        let metrics_port: Option<u16> = std::env::var("QUITBOOK_METRICS_PORT")
            .ok()
            .and_then(|s| s.parse().ok());

        Self {
            data_dir: PathBuf::from(data_dir),
            compact_threshold,
            metrics_port,
        }
    }

    /// Path of the schedule WAL inside `data_dir`.
    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("schedule.wal")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}
