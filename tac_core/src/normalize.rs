//! Turn raw announcement rows into typed auction records.

use std::{str::FromStr, sync::OnceLock};

use chrono::NaiveDate;
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::{
    auction_client::{
        RawRow, COLUMN_BIDDING_METHOD, COLUMN_BID_END, COLUMN_BID_START, COLUMN_CANCELLATION,
        COLUMN_CODE, COLUMN_HANDLING_FEE, COLUMN_ISSUE_TYPE, COLUMN_LISTING_DATE, COLUMN_MARGIN_RATE,
        COLUMN_MARKET, COLUMN_MAX_LOTS_PER_BIDDER, COLUMN_MIN_BID_PRICE, COLUMN_MIN_LOTS_PER_BID,
        COLUMN_NAME, COLUMN_QUANTITY, COLUMN_RESULT_DATE, COLUMN_UNDERWRITER,
    },
    error::{InvalidValue, RowError},
    record::{AuctionRecord, AuctionStatus, Market},
};

/// Cells the exchange fills in when a value is not known yet.
static PLACEHOLDERS: [&str; 6] = ["", "0", "-", "--", "－", "N/A"];

/// The offset between years of the Minguo era and the Gregorian calendar.
const MINGUO_OFFSET: i32 = 1911;

fn separated_date_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(
            r"(?x)
                ^
                (?:民國)?\s*
                (?P<year>\d{1,4}) # a Gregorian year or a year of the Minguo era
                \s*[/\-.年]\s*
                (?P<month>\d{1,2})
                \s*[/\-.月]\s*
                (?P<day>\d{1,2})
                \s*日?
                $
            ",
        )
        .unwrap()
    })
}

fn compact_date_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(?P<year>\d{3,4})(?P<month>\d{2})(?P<day>\d{2})$").unwrap()
    })
}

fn is_placeholder(value: &str) -> bool {
    PLACEHOLDERS.contains(&value.trim())
}

/// Convert a date as written by the exchange to a date of the proleptic Gregorian calendar.
///
/// Years with up to three digits count from the founding of the Republic of China in 1912,
/// so `114/03/01` is the 1st of March 2025. So do zero padded years like `0114`. Other four
/// digit years are Gregorian already.
/// Placeholders yield `Ok(None)`, anything else that is not a valid date is an error.
pub fn parse_exchange_date(value: &str) -> Result<Option<NaiveDate>, InvalidValue> {
    let value = value.trim();
    if is_placeholder(value) {
        return Ok(None);
    }
    separated_date_regex()
        .captures(value)
        .or_else(|| compact_date_regex().captures(value))
        .and_then(|captures| date_from_captures(&captures))
        .map(Some)
        .ok_or_else(|| InvalidValue(value.to_string()))
}

fn date_from_captures(captures: &Captures) -> Option<NaiveDate> {
    let year_digits = &captures["year"];
    let year: i32 = year_digits.parse().ok()?;
    let year = if year_digits.len() <= 3 || year_digits.starts_with('0') {
        if year == 0 {
            return None;
        }
        year + MINGUO_OFFSET
    } else {
        year
    };
    let month: u32 = captures["month"].parse().ok()?;
    let day: u32 = captures["day"].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a price, removing thousands separators.
///
/// Placeholders yield `Ok(None)` since the price has not been announced yet.
pub fn parse_price(value: &str) -> Result<Option<Decimal>, InvalidValue> {
    let value = value.trim();
    if is_placeholder(value) {
        return Ok(None);
    }
    let price = Decimal::from_str(&value.replace(',', ""))
        .map_err(|_| InvalidValue(value.to_string()))?;
    if price.is_sign_negative() {
        return Err(InvalidValue(value.to_string()));
    }
    Ok(Some(price))
}

fn parse_market(value: &str) -> Market {
    match () {
        _ if value.contains("興櫃") => Market::Emerging,
        _ if value.contains('櫃') => Market::OverTheCounter,
        _ if value.contains('市') => Market::Listed,
        _ => Market::Other(value.to_string()),
    }
}

fn parse_status(value: &str) -> AuctionStatus {
    match () {
        _ if value.is_empty() => AuctionStatus::Normal,
        _ if value.contains("流標") => AuctionStatus::FailedToSell,
        _ => AuctionStatus::Cancelled,
    }
}

fn optional_text(value: &str) -> Option<String> {
    (!is_placeholder(value)).then(|| value.to_string())
}

/// Convert a single raw row into a record.
pub fn normalize_row(row: &RawRow) -> Result<AuctionRecord, RowError> {
    let code = row.get(COLUMN_CODE);
    if code.is_empty() {
        return Err(RowError::MissingCode);
    }
    let date = |column: &str| -> Result<Option<NaiveDate>, RowError> {
        parse_exchange_date(row.get(column)).map_err(|InvalidValue(value)| {
            RowError::InvalidDate {
                column: column.to_string(),
                value,
            }
        })
    };
    let min_bid_price = parse_price(row.get(COLUMN_MIN_BID_PRICE)).unwrap_or_else(|_| {
        warn!(
            code,
            price = row.get(COLUMN_MIN_BID_PRICE),
            "ignoring unparseable minimum bid price"
        );
        None
    });
    let raw_status = row.get(COLUMN_CANCELLATION).to_string();
    let record = AuctionRecord {
        code: code.to_string(),
        name: row.get(COLUMN_NAME).to_string(),
        market: parse_market(row.get(COLUMN_MARKET)),
        issue_type: row.get(COLUMN_ISSUE_TYPE).to_string(),
        bidding_method: row.get(COLUMN_BIDDING_METHOD).to_string(),
        bid_start: date(COLUMN_BID_START)?,
        bid_end: date(COLUMN_BID_END)?,
        result_date: date(COLUMN_RESULT_DATE)?,
        listing_date: date(COLUMN_LISTING_DATE)?,
        min_bid_price,
        quantity: optional_text(row.get(COLUMN_QUANTITY)),
        min_lots_per_bid: optional_text(row.get(COLUMN_MIN_LOTS_PER_BID)),
        max_lots_per_bidder: optional_text(row.get(COLUMN_MAX_LOTS_PER_BIDDER)),
        margin_rate: optional_text(row.get(COLUMN_MARGIN_RATE)),
        handling_fee: optional_text(row.get(COLUMN_HANDLING_FEE)),
        underwriter: optional_text(row.get(COLUMN_UNDERWRITER)),
        status: parse_status(&raw_status),
        raw_status,
    };
    if !record.has_dates() {
        debug!(code, "auction has no dates yet");
    }
    check_invariants(&record);
    Ok(record)
}

/// Log date orders the exchange should never publish.
fn check_invariants(record: &AuctionRecord) {
    if let (Some(start), Some(end)) = (record.bid_start, record.bid_end) {
        if start > end {
            warn!(code = %record.code, %start, %end, "bidding starts after it ends");
        }
    }
    if let (Some(end), Some(result)) = (record.bid_end, record.result_date) {
        if result < end {
            warn!(code = %record.code, %end, %result, "bids are opened before bidding ends");
        }
    }
}

/// The records of a batch of rows and the diagnostics of the rows which were dropped.
#[derive(Debug, Default)]
pub struct Normalized {
    pub records: Vec<AuctionRecord>,
    pub dropped: Vec<RowError>,
}

/// Convert every row, dropping the rows which cannot be converted.
pub fn normalize_rows<'a>(rows: impl IntoIterator<Item = &'a RawRow>) -> Normalized {
    let mut normalized = Normalized::default();
    for row in rows {
        match normalize_row(row) {
            Ok(record) => normalized.records.push(record),
            Err(err) => {
                warn!(code = row.get(COLUMN_CODE), %err, "dropping row");
                normalized.dropped.push(err);
            }
        }
    }
    info!(
        records = normalized.records.len(),
        dropped = normalized.dropped.len(),
        "normalized announcements"
    );
    normalized
}
