//! The error types of the calendar pipeline.

use std::{io, path::PathBuf};

/// A fatal error ending the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no announcements could be fetched for any of the years {years:?}")]
    AllFetchesFailed { years: Vec<i32> },
    #[error("no years to fetch")]
    NoYears,
    #[error("the output directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("could not write the calendar to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Fetching the announcements of a single year failed.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("upstream reported {0:?}")]
    Status(String),
}

/// A raw row could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("row has no security code")]
    MissingCode,
    #[error("unparseable date {value:?} in column {column}")]
    InvalidDate { column: String, value: String },
}

/// A cell holds something other than the expected value or placeholder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unparseable value {0:?}")]
pub struct InvalidValue(pub String);

pub type Result<T, E = Error> = std::result::Result<T, E>;
