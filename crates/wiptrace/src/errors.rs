use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Missing precondition: {0}")]
    PreconditionMissing(String),

    #[error("Invalid batch file: {0}")]
    BatchFormat(#[from] serde_json::Error),

    #[error("Invalid report: {0}")]
    ReportFormat(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScrapeError {
    /// True for failures that abort the whole run before any serial is
    /// attempted, as opposed to per-serial lookup failures.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScrapeError::PreconditionMissing(_))
    }
}
