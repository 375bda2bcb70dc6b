use thiserror::Error;

/// Failures at the import boundary.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("no records found in {0}")]
    NoRecords(String),

    #[error("student {student} has more than one snapshot for period {period}")]
    DuplicatePeriod { student: String, period: String },

    #[error("failed to read import file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse import file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures parsing settings supplied on the command line.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid threshold {0:?}, expected Label=value")]
    InvalidThreshold(String),

    #[error("invalid threshold mode {0:?}, expected rank or percent")]
    InvalidMode(String),

    #[error("invalid full score {0:?}, expected Subject=value")]
    InvalidFullScore(String),
}
