//! The typed representation of one auction announcement.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// The market the auctioned security is going to be listed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Market {
    /// 上市
    Listed,
    /// 上櫃
    OverTheCounter,
    /// 興櫃
    Emerging,
    /// A label the exchange introduced which is not known yet.
    Other(String),
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Listed => f.write_str("上市"),
            Market::OverTheCounter => f.write_str("上櫃"),
            Market::Emerging => f.write_str("興櫃"),
            Market::Other(label) => f.write_str(label),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionStatus {
    Normal,
    Cancelled,
    /// Not enough bids were placed (流標).
    FailedToSell,
}

impl AuctionStatus {
    pub fn is_normal(self) -> bool {
        self == AuctionStatus::Normal
    }
}

/// One auction listing.
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionRecord {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub issue_type: String,
    pub bidding_method: String,
    pub bid_start: Option<NaiveDate>,
    pub bid_end: Option<NaiveDate>,
    /// The day the bids are opened and the result is announced.
    pub result_date: Option<NaiveDate>,
    /// The day the securities are allotted and trading starts.
    pub listing_date: Option<NaiveDate>,
    /// `None` while the price has not been announced.
    pub min_bid_price: Option<Decimal>,
    pub quantity: Option<String>,
    /// The least number of lots a single bid has to ask for.
    pub min_lots_per_bid: Option<String>,
    /// The most lots a single bidder may bid for or be awarded.
    pub max_lots_per_bidder: Option<String>,
    /// The deposit in percent of the bid amount.
    pub margin_rate: Option<String>,
    /// The fee charged for every bid, in NT$.
    pub handling_fee: Option<String>,
    pub underwriter: Option<String>,
    pub status: AuctionStatus,
    /// The status text exactly as reported by the exchange, empty for normal auctions.
    pub raw_status: String,
}

impl AuctionRecord {
    pub fn has_dates(&self) -> bool {
        self.bid_start.is_some()
            || self.bid_end.is_some()
            || self.result_date.is_some()
            || self.listing_date.is_some()
    }
}
