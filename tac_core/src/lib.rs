//! This crate turns the Taiwan Stock Exchange's auction announcements into an iCalendar feed.
//!
//! The announcements are read from <https://www.twse.com.tw/zh/announcement/auction.html>.
//! Every auction contributes up to three all-day events: the bidding period, the opening of the
//! bids and the listing of the security.

pub mod auction_client;
pub mod calendar;
pub mod error;
pub mod event;
pub mod normalize;
pub mod pipeline;
pub mod record;
