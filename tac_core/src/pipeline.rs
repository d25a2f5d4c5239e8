//! The single pass from the exchange's announcements to the calendar file.

use std::path::PathBuf;

use chrono::Datelike;
use tracing::{info, warn};

use crate::{
    auction_client::{AuctionClient, RawRow, BASE_URL},
    calendar,
    error::{Error, Result},
    event::{map_events, EventKindBitmask},
    normalize::normalize_rows,
    record::AuctionRecord,
};

/// Everything a run depends on.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Gregorian years to fetch the announcements of.
    pub years: Vec<i32>,
    pub output: PathBuf,
    pub base_url: String,
    /// Prefix of every event id, distinguishing calendars generated with different settings.
    pub uid_prefix: String,
    pub excluded_kinds: EventKindBitmask,
    /// Create the output directory if it is missing.
    pub create_dirs: bool,
}

impl PipelineConfig {
    /// The previous, the current and the next year.
    pub fn default_years() -> Vec<i32> {
        let year = chrono::Local::now().year();
        vec![year - 1, year, year + 1]
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            years: Self::default_years(),
            output: PathBuf::from("twse-auction.ics"),
            base_url: BASE_URL.to_string(),
            uid_prefix: String::from("twse-auction"),
            excluded_kinds: EventKindBitmask::none(),
            create_dirs: false,
        }
    }
}

/// What a run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub years_fetched: Vec<i32>,
    pub years_failed: Vec<i32>,
    pub rows: usize,
    pub records: usize,
    pub dropped_rows: usize,
    pub events: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetch, normalize, map and write.
    ///
    /// The output file is left untouched if no year could be fetched.
    pub async fn run(&self) -> Result<RunSummary> {
        if self.config.years.is_empty() {
            return Err(Error::NoYears);
        }
        let client = AuctionClient::new(&self.config.base_url)?;
        let mut summary = RunSummary::default();
        let mut rows: Vec<RawRow> = vec![];
        for fetch in client.fetch_years(&self.config.years).await {
            match fetch.result {
                Ok(year_rows) => {
                    summary.years_fetched.push(fetch.year);
                    rows.extend(year_rows);
                }
                Err(_) => summary.years_failed.push(fetch.year),
            }
        }
        if summary.years_fetched.is_empty() {
            return Err(Error::AllFetchesFailed {
                years: summary.years_failed,
            });
        }
        if !summary.years_failed.is_empty() {
            warn!(years = ?summary.years_failed, "calendar is missing years");
        }
        let written = self.write_calendar(&rows)?;
        let summary = RunSummary {
            years_fetched: summary.years_fetched,
            years_failed: summary.years_failed,
            ..written
        };
        info!(?summary, "calendar generated");
        Ok(summary)
    }

    /// Normalize the rows, map them to events and replace the output file.
    pub fn write_calendar(&self, rows: &[RawRow]) -> Result<RunSummary> {
        let normalized = normalize_rows(rows);
        let (contents, events) = self.build_calendar(&normalized.records);
        calendar::write_atomically(&self.config.output, &contents, self.config.create_dirs)?;
        Ok(RunSummary {
            rows: rows.len(),
            records: normalized.records.len(),
            dropped_rows: normalized.dropped.len(),
            events,
            ..RunSummary::default()
        })
    }

    /// Render the calendar document of the records, returning it with its number of events.
    pub fn build_calendar(&self, records: &[AuctionRecord]) -> (String, usize) {
        let events = map_events(
            records,
            &self.config.uid_prefix,
            self.config.excluded_kinds,
        );
        (calendar::render(&events), events.len())
    }
}
