use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::export::ExportError;
use crate::setlistfm::FetchError;

/// A recoverable problem. The run carries on after each one.
#[derive(Debug, Error)]
pub enum Issue {
    #[error("page {page}: {source}")]
    Fetch { page: u32, source: FetchError },
    #[error("setlist {id}: unparseable event date {raw:?}")]
    EventDate { id: String, raw: String },
    #[error("cannot prepare output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Write { path: PathBuf, source: ExportError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Partial { errors: usize },
    Fatal(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Partial { errors } => {
                write!(f, "partial success ({errors} recoverable errors)")
            }
            Outcome::Fatal(reason) => write!(f, "fatal: {reason}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Record count announced by the first page.
    pub total: u32,
    pub fetched: usize,
    pub pages: u32,
    pub list_written: bool,
    pub event_files_written: usize,
    pub issues: Vec<Issue>,
    pub fatal: Option<String>,
}

impl RunReport {
    pub fn outcome(&self) -> Outcome {
        if let Some(reason) = &self.fatal {
            return Outcome::Fatal(reason.clone());
        }
        if self.issues.is_empty() {
            Outcome::Success
        } else {
            Outcome::Partial {
                errors: self.issues.len(),
            }
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "fetched {} of {} setlists over {} pages; list.json {}; {} event files written; {}",
            self.fetched,
            self.total,
            self.pages,
            if self.list_written { "written" } else { "not written" },
            self.event_files_written,
            self.outcome()
        )
    }
}
