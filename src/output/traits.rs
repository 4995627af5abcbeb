//! Output traits and error types
//!
//! Every table Sitesnap writes is a CSV file with a fixed header. Record types
//! implement [`TableRow`] so a single sink implementation can serve all of them.

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path {0} is outside the archive root")]
    OutsideRoot(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A record that can be written as one CSV row
pub trait TableRow {
    /// Column names, written once as the first row
    const HEADER: &'static [&'static str];

    /// Field values in header order
    fn fields(&self) -> Vec<String>;
}

/// Renders a flag the way the tables expect it: `yes` or empty
pub fn yes_or_empty(flag: bool) -> String {
    if flag {
        "yes".to_string()
    } else {
        String::new()
    }
}
