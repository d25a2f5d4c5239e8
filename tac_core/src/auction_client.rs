//! This client fetches the auction announcements of the exchange year by year.

use std::{collections::BTreeMap, time::Duration};

use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::FetchError;

pub static BASE_URL: &str = "https://www.twse.com.tw";
static AUCTION_PATH: &str = "/rwd/zh/announcement/auction";
static AUCTION_YEAR_PATH: &str = "/rwd/zh/announcement/auctionYear";
static BROWSER_USER_AGENT: &str = "Mozilla/5.0 (compatible; twse-auction-calendar/1.0)";
static NO_DATA: &str = "沒有符合條件的資料";
static TIMEOUT: Duration = Duration::from_secs(30);

pub const COLUMN_RESULT_DATE: &str = "開標日期";
pub const COLUMN_NAME: &str = "證券名稱";
pub const COLUMN_CODE: &str = "證券代號";
pub const COLUMN_MARKET: &str = "發行市場";
pub const COLUMN_ISSUE_TYPE: &str = "發行性質";
pub const COLUMN_BIDDING_METHOD: &str = "競拍方式";
pub const COLUMN_BID_START: &str = "投標開始日";
pub const COLUMN_BID_END: &str = "投標結束日";
pub const COLUMN_QUANTITY: &str = "競拍數量(張)";
pub const COLUMN_MIN_BID_PRICE: &str = "最低投標價格(元)";
pub const COLUMN_MIN_LOTS_PER_BID: &str = "最低每標單投標數量(張)";
pub const COLUMN_MAX_LOTS_PER_BIDDER: &str = "最高投(得)標數量(張)";
pub const COLUMN_MARGIN_RATE: &str = "保證金成數(%)";
pub const COLUMN_HANDLING_FEE: &str = "每一投標單投標處理費(元)";
pub const COLUMN_LISTING_DATE: &str = "撥券日期(上市、上櫃日期)";
pub const COLUMN_UNDERWRITER: &str = "主辦券商";
pub const COLUMN_CANCELLATION: &str = "取消競價拍賣(流標或取消)";

/// The column layout used when a response carries no `fields` header.
static POSITIONAL_COLUMNS: [(usize, &str); 17] = [
    (1, COLUMN_RESULT_DATE),
    (2, COLUMN_NAME),
    (3, COLUMN_CODE),
    (4, COLUMN_MARKET),
    (5, COLUMN_ISSUE_TYPE),
    (6, COLUMN_BIDDING_METHOD),
    (7, COLUMN_BID_START),
    (8, COLUMN_BID_END),
    (9, COLUMN_QUANTITY),
    (10, COLUMN_MIN_BID_PRICE),
    (11, COLUMN_MIN_LOTS_PER_BID),
    (12, COLUMN_MAX_LOTS_PER_BIDDER),
    (13, COLUMN_MARGIN_RATE),
    (14, COLUMN_HANDLING_FEE),
    (15, COLUMN_LISTING_DATE),
    (16, COLUMN_UNDERWRITER),
    (25, COLUMN_CANCELLATION),
];

/// One unparsed announcement, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    cells: BTreeMap<String, String>,
}

impl RawRow {
    /// Get the trimmed cell of a column, or an empty string if the column is missing.
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        RawRow {
            cells: iter
                .into_iter()
                .map(|(column, value)| {
                    let value: String = value.into();
                    (column.into(), value.trim().to_string())
                })
                .collect(),
        }
    }
}

/// The outcome of fetching a single year.
#[derive(Debug)]
pub struct YearFetch {
    pub year: i32,
    pub result: Result<Vec<RawRow>, FetchError>,
}

/// The announcement table. Rows are kept as plain values so that a single malformed row
/// does not reject the whole year.
#[derive(Debug, Deserialize)]
struct AuctionResponse {
    #[serde(default)]
    stat: Option<String>,
    #[serde(default)]
    fields: Option<Vec<String>>,
    #[serde(default)]
    data: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YearRangeResponse {
    start_year: Value,
    end_year: Value,
}

pub struct AuctionClient {
    http: reqwest::Client,
    base_url: String,
}

impl AuctionClient {
    pub fn new(base_url: &str) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder().timeout(TIMEOUT).build()?;
        Ok(AuctionClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the raw announcements of every year.
    ///
    /// A failing year does not affect the other years, its error is kept in the result.
    pub async fn fetch_years(&self, years: &[i32]) -> Vec<YearFetch> {
        let mut fetches = Vec::with_capacity(years.len());
        for &year in years {
            let result = self.fetch_year(year).await;
            match &result {
                Ok(rows) => info!(year, rows = rows.len(), "fetched announcements"),
                Err(err) => warn!(year, %err, "skipping year"),
            }
            fetches.push(YearFetch { year, result });
        }
        fetches
    }

    /// Fetch the raw announcements of a single year.
    pub async fn fetch_year(&self, year: i32) -> Result<Vec<RawRow>, FetchError> {
        let url = format!("{}{}", self.base_url, AUCTION_PATH);
        debug!(%url, year, "requesting announcements");
        let body = self
            .http
            .get(&url)
            .query(&[("date", year.to_string().as_str()), ("response", "json")])
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "application/json, text/plain, */*")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_response(&body)
    }

    /// Get the first and last year the exchange publishes announcements for.
    pub async fn fetch_year_range(&self) -> Result<(i32, i32), FetchError> {
        let url = format!("{}{}", self.base_url, AUCTION_YEAR_PATH);
        debug!(%url, "requesting year range");
        let body = self
            .http
            .get(&url)
            .query(&[("response", "json")])
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "application/json, text/plain, */*")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_year_range(&body)
    }
}

/// Parse the JSON body of an announcement response into raw rows.
///
/// A response without a `stat` is read like an `OK` one. Rows which are not arrays are skipped.
pub(crate) fn parse_response(body: &str) -> Result<Vec<RawRow>, FetchError> {
    let response: AuctionResponse = serde_json::from_str(body)?;
    if let Some(stat) = response.stat.as_deref().map(str::trim) {
        if !stat.eq_ignore_ascii_case("OK") {
            if stat.contains(NO_DATA) {
                return Ok(vec![]);
            }
            return Err(FetchError::Status(stat.to_string()));
        }
    }
    let data = response.data.unwrap_or_default();
    let arrays = data.iter().enumerate().filter_map(|(index, row)| {
        let cells = row.as_array();
        if cells.is_none() {
            warn!(index, %row, "skipping row which is not an array");
        }
        cells
    });
    let rows = match response.fields {
        Some(fields) => arrays
            .map(|cells| {
                fields
                    .iter()
                    .zip(cells)
                    .map(|(field, cell)| (field.trim(), cell_text(cell)))
                    .collect()
            })
            .collect(),
        None => arrays
            .map(|cells| {
                POSITIONAL_COLUMNS
                    .iter()
                    .filter_map(|&(index, column)| Some((column, cell_text(cells.get(index)?))))
                    .collect()
            })
            .collect(),
    };
    Ok(rows)
}

fn parse_year_range(body: &str) -> Result<(i32, i32), FetchError> {
    let response: YearRangeResponse = serde_json::from_str(body)?;
    let year = |value: &Value| -> Result<i32, FetchError> {
        let year = match value {
            Value::Number(number) => number.as_i64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
        .and_then(|year| i32::try_from(year).ok())
        .ok_or_else(|| FetchError::Status(format!("invalid year {value}")))?;
        // the exchange sometimes reports years of the Minguo era
        Ok(if year < 1000 { year + 1911 } else { year })
    };
    Ok((year(&response.start_year)?, year(&response.end_year)?))
}

fn cell_text(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
