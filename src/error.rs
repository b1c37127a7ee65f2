use thiserror::Error;

/// Rejected field values. Surfaced to the user before any worker starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Interval must be a positive number of seconds")]
    NonPositiveInterval,
    #[error("Duration must be zero (unlimited) or a positive number of seconds")]
    InvalidDuration,
    #[error("Please enter text to type!")]
    EmptyText,
    #[error("'{0}' is not a valid key: use exactly one character")]
    InvalidKey(String),
}

/// Failures of the OS input/key-state capabilities.
#[derive(Debug, Clone, Error)]
pub enum PortError {
    #[error("Input device unavailable: {0}")]
    Unavailable(String),
    #[error("Input operation failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Port(#[from] PortError),
    #[error("GUI failed: {0}")]
    Gui(#[from] eframe::Error),
}
