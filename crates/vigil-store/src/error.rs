use std::path::PathBuf;

/// Errors that can occur within the alert store.
///
/// Per-alert and per-line failures never abort a whole-table operation:
/// invalid events are dropped, corrupt persisted lines are skipped, and a
/// failed background flush is logged rather than surfaced. Only startup
/// (a data directory that can neither be read nor created) and the
/// explicit flush path return errors to the caller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An inbound event was missing a required alert field.
    #[error("alert event rejected: missing or invalid '{missing}'")]
    InvalidAlertFields { missing: &'static str },

    /// The persisted table could not be written.
    #[error("failed to write alert store file '{path}': {source}")]
    PersistenceWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted line could not be parsed at load time. Classification
    /// only: the loader skips the line and keeps going.
    #[error("unparseable alert store line {line_no}")]
    PersistenceLoadCorrupt { line_no: usize },

    /// An underlying I/O error opening or reading the store file.
    #[error("alert store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience `Result` alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
