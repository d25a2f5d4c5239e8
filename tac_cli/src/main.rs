use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tac_core::{
    auction_client::{AuctionClient, BASE_URL},
    event::EventKindBitmask,
    pipeline::{Pipeline, PipelineConfig},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Generate an iCalendar file of the Taiwan Stock Exchange's auction announcements.
#[derive(Debug, Parser)]
pub struct Arguments {
    /// the years to fetch, e.g. 2025,2026 [default: previous, current and next year]
    #[arg(long, value_delimiter = ',', conflicts_with = "all_years")]
    pub years: Vec<i32>,
    /// fetch every year the exchange publishes announcements for
    #[arg(long)]
    pub all_years: bool,
    /// the calendar file to write
    #[arg(short, long, default_value = "twse-auction.ics")]
    pub output: PathBuf,
    /// create the directory of the calendar file if it is missing
    #[arg(long)]
    pub create_dirs: bool,
    /// the exchange's web site
    #[arg(long, default_value = BASE_URL)]
    pub base_url: String,
    /// the prefix of the event ids
    #[arg(long, default_value = "twse-auction")]
    pub uid_prefix: String,
    /// exclude the bidding periods
    #[arg(long)]
    pub exclude_bid_period: bool,
    /// exclude the opening of the bids
    #[arg(long)]
    pub exclude_result: bool,
    /// exclude the listing dates
    #[arg(long)]
    pub exclude_listing: bool,
}

impl From<&Arguments> for EventKindBitmask {
    fn from(value: &Arguments) -> Self {
        let mut event_kind_bitmask = EventKindBitmask::none();
        if value.exclude_bid_period {
            event_kind_bitmask |= EventKindBitmask::BidPeriod;
        }
        if value.exclude_result {
            event_kind_bitmask |= EventKindBitmask::Result;
        }
        if value.exclude_listing {
            event_kind_bitmask |= EventKindBitmask::Listing;
        }
        event_kind_bitmask
    }
}

async fn years(args: &Arguments) -> Result<Vec<i32>> {
    if args.all_years {
        let (start, end) = AuctionClient::new(&args.base_url)?
            .fetch_year_range()
            .await?;
        return Ok((start..=end).collect());
    }
    if args.years.is_empty() {
        return Ok(PipelineConfig::default_years());
    }
    Ok(args.years.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Arguments::parse();
    let config = PipelineConfig {
        years: years(&args).await?,
        output: args.output.clone(),
        base_url: args.base_url.clone(),
        uid_prefix: args.uid_prefix.clone(),
        excluded_kinds: EventKindBitmask::from(&args),
        create_dirs: args.create_dirs,
    };
    info!(years = ?config.years, output = %config.output.display(), "generating calendar");
    let summary = Pipeline::new(config).run().await?;
    info!(
        events = summary.events,
        records = summary.records,
        dropped_rows = summary.dropped_rows,
        "done"
    );
    Ok(())
}
