//! Derive the calendar events of an auction.

use std::{collections::BTreeMap, sync::OnceLock};

use bitmask_enum::bitmask;
use chrono::{Days, NaiveDate};
use regex::Regex;

use crate::record::AuctionRecord;

pub static SOURCE_PAGE: &str = "https://www.twse.com.tw/zh/announcement/auction.html";
pub static CANCELLED_MARKER: &str = "【已取消】";
static UID_DOMAIN: &str = "twse.com.tw";
static UID_FORMAT: &str = "%Y%m%d";
static DISPLAY_FORMAT: &str = "%Y/%m/%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    /// From the first to the last day bids are accepted.
    BidPeriod,
    /// The day the bids are opened.
    Result,
    /// The day the securities are allotted and listed.
    Listing,
}

impl EventKind {
    fn slug(self) -> &'static str {
        match self {
            EventKind::BidPeriod => "bid",
            EventKind::Result => "result",
            EventKind::Listing => "listing",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EventKind::BidPeriod => "投標",
            EventKind::Result => "開標",
            EventKind::Listing => "撥券上市櫃",
        }
    }

    pub fn category(self) -> &'static str {
        match self {
            EventKind::BidPeriod => "投標期間",
            EventKind::Result => "開標日",
            EventKind::Listing => "撥券日",
        }
    }

    pub fn bit(self) -> EventKindBitmask {
        match self {
            EventKind::BidPeriod => EventKindBitmask::BidPeriod,
            EventKind::Result => EventKindBitmask::Result,
            EventKind::Listing => EventKindBitmask::Listing,
        }
    }
}

#[bitmask]
pub enum EventKindBitmask {
    BidPeriod,
    Result,
    Listing,
}

/// One all-day entry of the calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub uid: String,
    pub kind: EventKind,
    pub start: NaiveDate,
    /// The first day after the event.
    pub end: NaiveDate,
    pub summary: String,
    pub description: String,
    pub cancelled: bool,
}

/// Get a unique id for an event of an auction.
///
/// Changing this function is a breaking change!
/// Subscribed calendars would show every event twice.
pub fn uid(prefix: &str, code: &str, kind: EventKind, date: &NaiveDate) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace_regex = WHITESPACE.get_or_init(|| Regex::new(r"\s+").unwrap());
    let whitespace_rep = "-";
    let prefix = whitespace_regex.replace_all(prefix.trim(), whitespace_rep);
    let code = whitespace_regex.replace_all(code.trim(), whitespace_rep);
    format!(
        "{prefix}_{}_{code}_{}@{UID_DOMAIN}",
        kind.slug(),
        date.format(UID_FORMAT)
    )
}

fn summary(record: &AuctionRecord, kind: EventKind) -> String {
    let marker = if record.status.is_normal() {
        ""
    } else {
        CANCELLED_MARKER
    };
    let name = if record.name.is_empty() {
        &record.code
    } else {
        &record.name
    };
    format!("{marker}{}｜{name}（{}）", kind.label(), record.code)
}

fn description(record: &AuctionRecord, kind: EventKind) -> String {
    let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| String::from("-"));
    let mut lines = vec![
        format!("事件：{}", kind.category()),
        format!("證券名稱：{}", record.name),
        format!("證券代號：{}", record.code),
        format!("發行市場：{}", record.market),
        format!("發行性質：{}", record.issue_type),
        format!("競拍方式：{}", record.bidding_method),
        format!(
            "最低投標價格(元)：{}",
            record
                .min_bid_price
                .map_or_else(|| String::from("未公告"), |price| price.to_string())
        ),
        format!("競拍數量(張)：{}", or_dash(&record.quantity)),
        format!("最低每標單投標數量(張)：{}", or_dash(&record.min_lots_per_bid)),
        format!("最高投(得)標數量(張)：{}", or_dash(&record.max_lots_per_bidder)),
        format!("保證金成數(%)：{}", or_dash(&record.margin_rate)),
        format!("每一投標單投標處理費(元)：{}", or_dash(&record.handling_fee)),
        format!("主辦券商：{}", or_dash(&record.underwriter)),
    ];
    if let (Some(start), Some(end)) = (record.bid_start, record.bid_end) {
        lines.push(format!(
            "投標期間：{} ~ {}",
            start.format(DISPLAY_FORMAT),
            end.format(DISPLAY_FORMAT)
        ));
    }
    let status = if record.raw_status.is_empty() {
        "正常"
    } else {
        &record.raw_status
    };
    lines.push(format!("狀態：{status}"));
    lines.push(format!("資料來源：{SOURCE_PAGE}"));
    lines.join("\n")
}

/// Derive the events of an auction, in the order bidding period, result, listing.
///
/// Records without dates yield no events.
pub fn events_for(record: &AuctionRecord, prefix: &str) -> Vec<CalendarEvent> {
    let one_day = Days::new(1);
    let bid_period = match (record.bid_start, record.bid_end) {
        (Some(start), Some(end)) => Some((start, end)),
        _ => None,
    };
    let spans = [
        (EventKind::BidPeriod, bid_period),
        (EventKind::Result, record.result_date.map(|date| (date, date))),
        (EventKind::Listing, record.listing_date.map(|date| (date, date))),
    ];
    spans
        .into_iter()
        .filter_map(|(kind, span)| {
            let (start, last) = span?;
            Some(CalendarEvent {
                uid: uid(prefix, &record.code, kind, &start),
                kind,
                start,
                end: last.checked_add_days(one_day)?,
                summary: summary(record, kind),
                description: description(record, kind),
                cancelled: !record.status.is_normal(),
            })
        })
        .collect()
}

/// Derive the events of every auction, leaving out the excluded kinds.
///
/// Events sharing an id are collapsed into the last one, since the announcements of
/// neighbouring years may overlap.
pub fn map_events<'a>(
    records: impl IntoIterator<Item = &'a AuctionRecord>,
    prefix: &str,
    excluded_kinds: EventKindBitmask,
) -> Vec<CalendarEvent> {
    let mut events = BTreeMap::new();
    for record in records {
        for event in events_for(record, prefix) {
            if excluded_kinds.contains(event.kind.bit()) {
                continue;
            }
            events.insert(event.uid.clone(), event);
        }
    }
    events.into_values().collect()
}
