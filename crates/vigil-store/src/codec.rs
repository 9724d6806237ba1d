use crate::error::{Result, StoreError};
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing;
use vigil_common::types::{Alert, AlertLevel};

/// Converts alerts to and from the newline-delimited on-disk format.
///
/// Each line is a JSON-encoded [`Alert`]. The loader also accepts the
/// legacy reduced form `level:name` (an open alert with `name` as its
/// attribute and an empty pattern). Lines that are neither are skipped
/// with a warning; a bad line never aborts the load.
pub struct PersistenceCodec {
    path: PathBuf,
}

/// Result of loading the store file.
pub struct Loaded {
    pub alerts: Vec<Alert>,
    pub skipped: usize,
}

impl PersistenceCodec {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the store file. A missing file is an empty table, not an
    /// error.
    pub fn load(&self) -> Result<Loaded> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Loaded {
                    alerts: Vec::new(),
                    skipped: 0,
                });
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut alerts = Vec::new();
        let mut skipped = 0;
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match decode_line(line, idx + 1) {
                Ok(alert) => alerts.push(alert),
                Err(StoreError::PersistenceLoadCorrupt { line_no }) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line_no,
                        "Skipping unparseable alert store line"
                    );
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        if skipped > 0 {
            tracing::warn!(
                path = %self.path.display(),
                skipped,
                loaded = alerts.len(),
                "Alert store loaded with corrupt lines skipped"
            );
        }
        Ok(Loaded { alerts, skipped })
    }

    /// Serialize the full table state, one alert per line, replacing the
    /// prior file contents atomically (write a sibling temp file, then
    /// rename over the target) so a crash mid-write cannot truncate the
    /// store.
    pub fn flush(&self, alerts: &[Alert]) -> Result<()> {
        let tmp = self.path.with_extension("db.tmp");
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::File::create(&tmp)?;
            for alert in alerts {
                let line = serde_json::to_string(alert).map_err(std::io::Error::other)?;
                writeln!(file, "{line}")?;
            }
            file.sync_all()?;
            std::fs::rename(&tmp, &self.path)
        };
        write().map_err(|source| StoreError::PersistenceWriteFailed {
            path: self.path.clone(),
            source,
        })
    }
}

fn decode_line(line: &str, line_no: usize) -> Result<Alert> {
    let trimmed = line.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|_| StoreError::PersistenceLoadCorrupt { line_no });
    }
    // Legacy reduced form: "level:name". The name stands in for the
    // attribute; the legacy store carried no pattern, timestamps, or id.
    let (level, name) = trimmed
        .split_once(':')
        .ok_or(StoreError::PersistenceLoadCorrupt { line_no })?;
    let level: AlertLevel = level
        .parse()
        .map_err(|_| StoreError::PersistenceLoadCorrupt { line_no })?;
    if name.is_empty() {
        return Err(StoreError::PersistenceLoadCorrupt { line_no });
    }
    let now = Utc::now();
    Ok(Alert {
        uuid: uuid::Uuid::new_v4().to_string(),
        level,
        attribute: name.to_string(),
        pattern: String::new(),
        back_to_normal: false,
        rule_name: None,
        first_seen: now,
        last_seen: now,
        properties: Default::default(),
    })
}
