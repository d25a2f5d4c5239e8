//! Assemble the events into an iCalendar document and write it to disk.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use ical::{
    generator::{IcalCalendar, IcalCalendarBuilder, IcalEvent, Property},
    ical_param, ical_property,
};
use tempfile::NamedTempFile;
use tracing::info;

use crate::{
    error::{Error, Result},
    event::{CalendarEvent, SOURCE_PAGE},
};

static PROD_ID: &str = "-//twse-auction-calendar//twse.com.tw";
static CALENDAR_NAME: &str = "TWSE 競價拍賣行事曆";
static CALENDAR_CATEGORY: &str = "TWSE競價拍賣";
static TIMEZONE: &str = "Asia/Taipei";
static PUBLISHED_TTL: &str = "PT6H";
static FORMAT: &str = "%Y%m%d";
static LINE_END: &str = "\r\n";
/// The maximum length of a content line in octets, excluding the line break.
const LINE_LIMIT: usize = 75;

/// Escape a TEXT value as described in RFC 5545, section 3.3.11.
pub fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "\\n")
        .replace(';', "\\;")
        .replace(',', "\\,")
}

/// Build an all-day event.
///
/// The time stamp is derived from the start date so that unchanged announcements always
/// yield the same document.
fn get_event(event: &CalendarEvent) -> IcalEvent {
    let start = event.start.format(FORMAT).to_string();
    let mut ical_event = IcalEvent::new();
    ical_event.properties = vec![
        ical_property!("UID", event.uid.clone()),
        ical_property!("DTSTAMP", format!("{start}T000000Z")),
        ical_property!("DTSTART", start, ical_param!("VALUE", "DATE")),
        ical_property!(
            "DTEND",
            event.end.format(FORMAT).to_string(),
            ical_param!("VALUE", "DATE")
        ),
        ical_property!("SUMMARY", escape_text(&event.summary)),
        ical_property!("DESCRIPTION", escape_text(&event.description)),
        ical_property!("URL", SOURCE_PAGE),
        ical_property!(
            "CATEGORIES",
            format!(
                "{},{}",
                escape_text(CALENDAR_CATEGORY),
                escape_text(event.kind.category())
            )
        ),
        ical_property!("TRANSP", "TRANSPARENT"),
    ];
    if event.cancelled {
        ical_event
            .properties
            .push(ical_property!("STATUS", "CANCELLED"));
    }
    ical_event
}

/// Build the calendar, ordering the events by start date and id.
pub fn get_calendar(events: &[CalendarEvent]) -> IcalCalendar {
    let mut calendar = IcalCalendarBuilder::version("2.0")
        .gregorian()
        .prodid(PROD_ID)
        .build();
    calendar.properties.extend([
        ical_property!("METHOD", "PUBLISH"),
        ical_property!("X-WR-CALNAME", escape_text(CALENDAR_NAME)),
        ical_property!("X-WR-TIMEZONE", TIMEZONE),
        ical_property!("X-PUBLISHED-TTL", PUBLISHED_TTL),
    ]);
    let mut ordered: Vec<&CalendarEvent> = events.iter().collect();
    ordered.sort_by(|a, b| (a.start, &a.uid).cmp(&(b.start, &b.uid)));
    calendar.events = ordered.into_iter().map(get_event).collect();
    calendar
}

fn content_line(property: &Property) -> String {
    let mut line = property.name.clone();
    for (name, values) in property.params.iter().flatten() {
        line.push(';');
        line.push_str(name);
        line.push('=');
        line.push_str(&values.join(","));
    }
    line.push(':');
    line.push_str(property.value.as_deref().unwrap_or(""));
    line
}

/// Fold a content line as described in RFC 5545, section 3.1.
///
/// Lines are broken before they exceed 75 octets, never inside a multi-byte character. The
/// leading space of a continuation line counts towards its length.
fn fold(line: &str) -> String {
    let mut folded = String::with_capacity(line.len() + line.len() / LINE_LIMIT * 3);
    let mut octets = 0;
    for character in line.chars() {
        let width = character.len_utf8();
        if octets + width > LINE_LIMIT {
            folded.push_str(LINE_END);
            folded.push(' ');
            octets = 1;
        }
        folded.push(character);
        octets += width;
    }
    folded
}

/// Render the calendar document with folded, CRLF terminated content lines.
pub fn render(events: &[CalendarEvent]) -> String {
    let calendar = get_calendar(events);
    let mut lines = vec![String::from("BEGIN:VCALENDAR")];
    lines.extend(calendar.properties.iter().map(content_line));
    for event in &calendar.events {
        lines.push(String::from("BEGIN:VEVENT"));
        lines.extend(event.properties.iter().map(content_line));
        lines.push(String::from("END:VEVENT"));
    }
    lines.push(String::from("END:VCALENDAR"));
    lines.iter().map(|line| fold(line) + LINE_END).collect()
}

/// Replace the file at `path` with `contents`.
///
/// The contents are written to a temporary file next to the destination first, which is then
/// renamed over the destination. Readers see either the old or the new calendar.
pub fn write_atomically(path: &Path, contents: &str, create_dirs: bool) -> Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let write_error = |source: io::Error| Error::Write {
        path: path.to_path_buf(),
        source,
    };
    if !directory.is_dir() {
        if !create_dirs {
            return Err(Error::MissingDirectory(directory));
        }
        fs::create_dir_all(&directory).map_err(write_error)?;
    }
    let mut file = NamedTempFile::new_in(&directory).map_err(write_error)?;
    file.write_all(contents.as_bytes()).map_err(write_error)?;
    file.as_file().sync_all().map_err(write_error)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // temporary files are private, the calendar is meant to be published
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(write_error)?;
    }
    file.persist(path).map_err(|err| write_error(err.error))?;
    info!(path = %path.display(), bytes = contents.len(), "wrote calendar");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        io::{BufReader, Cursor},
        str::FromStr,
    };

    use chrono::NaiveDate;
    use ical::{
        generator::{IcalCalendar, IcalEvent},
        IcalParser,
    };

    use crate::{
        calendar::{escape_text, fold, get_calendar, render, write_atomically, LINE_LIMIT},
        error::Error,
        event::{events_for, tests::get_test_record, CalendarEvent},
        record::AuctionStatus,
    };

    fn get_test_events() -> Vec<CalendarEvent> {
        let mut events = events_for(&get_test_record(), "twse-auction");
        let mut other = get_test_record();
        other.code = String::from("5678");
        other.name = String::from("XYZ, Inc.");
        other.bid_start = Some(NaiveDate::from_str("2025-02-20").unwrap());
        other.bid_end = Some(NaiveDate::from_str("2025-02-24").unwrap());
        other.result_date = None;
        other.listing_date = None;
        other.status = AuctionStatus::Cancelled;
        other.raw_status = String::from("取消");
        events.extend(events_for(&other, "twse-auction"));
        events
    }

    fn get_property_value<'a>(event: &'a IcalEvent, property_name: &str) -> Option<&'a str> {
        event
            .properties
            .iter()
            .find(|property| property.name == property_name)
            .and_then(|property| property.value.as_deref())
    }

    fn uids(calendar: &IcalCalendar) -> Vec<&str> {
        calendar
            .events
            .iter()
            .filter_map(|event| get_property_value(event, "UID"))
            .collect()
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a,b;c\\d"), "a\\,b\\;c\\\\d");
        assert_eq!(escape_text("line\r\nline\nline"), "line\\nline\\nline");
        assert_eq!(escape_text("投標｜ABC（1234）"), "投標｜ABC（1234）");
    }

    #[test]
    fn test_get_calendar_order() {
        let calendar = get_calendar(&get_test_events());
        assert_eq!(
            uids(&calendar),
            [
                "twse-auction_bid_5678_20250220@twse.com.tw",
                "twse-auction_bid_1234_20250301@twse.com.tw",
                "twse-auction_result_1234_20250310@twse.com.tw",
                "twse-auction_listing_1234_20250320@twse.com.tw",
            ]
        );
    }

    #[test]
    fn test_get_calendar_properties() {
        let calendar = get_calendar(&get_test_events());
        let bid = &calendar.events[1];
        assert_eq!(get_property_value(bid, "DTSTART"), Some("20250301"));
        assert_eq!(get_property_value(bid, "DTEND"), Some("20250306"));
        assert_eq!(get_property_value(bid, "DTSTAMP"), Some("20250301T000000Z"));
        assert_eq!(get_property_value(bid, "STATUS"), None);
        let listing = &calendar.events[3];
        assert_eq!(get_property_value(listing, "DTSTART"), Some("20250320"));
        assert_eq!(get_property_value(listing, "DTEND"), Some("20250321"));
        let cancelled = &calendar.events[0];
        assert_eq!(get_property_value(cancelled, "STATUS"), Some("CANCELLED"));
        assert_eq!(
            get_property_value(cancelled, "SUMMARY"),
            Some("【已取消】投標｜XYZ\\, Inc.（5678）")
        );
    }

    /// Test whether the document only depends on the events, not on their order or the time.
    #[test]
    fn test_render_is_deterministic() {
        let events = get_test_events();
        let mut reversed = events.clone();
        reversed.reverse();
        let rendered = render(&events);
        assert_eq!(rendered, render(&events));
        assert_eq!(rendered, render(&reversed));
        assert!(rendered.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(rendered.ends_with("END:VCALENDAR\r\n"));
        assert_eq!(rendered.matches('\n').count(), rendered.matches("\r\n").count());
        assert_eq!(rendered.matches("BEGIN:VEVENT").count(), 4);
        assert!(rendered.contains("DTSTART;VALUE=DATE:20250301"));
        assert!(rendered.contains("DTEND;VALUE=DATE:20250306"));
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold("SUMMARY:short"), "SUMMARY:short");
        let ascii = "a".repeat(80);
        assert_eq!(fold(&ascii), format!("{}\r\n {}", "a".repeat(75), "a".repeat(5)));
        let line = format!("DESCRIPTION:{}", "長廣精密".repeat(20));
        let folded = fold(&line);
        for physical in folded.split("\r\n") {
            assert!(physical.len() <= LINE_LIMIT);
        }
        assert_eq!(folded.replace("\r\n ", ""), line);
    }

    /// Test whether a calendar with long Chinese descriptions reads back unchanged.
    #[test]
    fn test_render_round_trip() {
        let mut record = get_test_record();
        record.name = String::from("長廣精密工業股份有限公司特別股甲種記名式可轉換公司債");
        record.underwriter = Some(String::from("元大證券股份有限公司"));
        // no spaces, the parser trims the end of each folded line
        record.bid_end = None;
        let events = events_for(&record, "twse-auction");
        assert_eq!(events.len(), 2);
        let rendered = render(&events);
        assert!(rendered.ends_with("END:VCALENDAR\r\n"));
        for line in rendered.split_terminator("\r\n") {
            assert!(!line.contains('\n'));
            assert!(line.len() <= LINE_LIMIT, "{line:?} is too long");
        }
        let calendars: Vec<IcalCalendar> = IcalParser::new(BufReader::new(Cursor::new(rendered)))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(calendars.len(), 1);
        assert_eq!(calendars[0].events.len(), 2);
        for (parsed, event) in calendars[0].events.iter().zip(&events) {
            assert_eq!(get_property_value(parsed, "UID"), Some(event.uid.as_str()));
            assert_eq!(
                get_property_value(parsed, "SUMMARY"),
                Some(escape_text(&event.summary).as_str())
            );
            assert_eq!(
                get_property_value(parsed, "DESCRIPTION"),
                Some(escape_text(&event.description).as_str())
            );
        }
        let dtstart = calendars[0].events[0]
            .properties
            .iter()
            .find(|property| property.name == "DTSTART")
            .unwrap();
        assert_eq!(
            dtstart.params,
            Some(vec![(String::from("VALUE"), vec![String::from("DATE")])])
        );
    }

    #[test]
    fn test_render_without_events() {
        let rendered = render(&[]);
        assert!(rendered.contains("BEGIN:VCALENDAR"));
        assert!(!rendered.contains("BEGIN:VEVENT"));
    }

    #[test]
    fn test_write_atomically_replaces() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("twse-auction.ics");
        fs::write(&path, "old calendar").unwrap();
        write_atomically(&path, "new calendar", false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new calendar");
        assert_eq!(fs::read_dir(directory.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_write_atomically_missing_directory() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("docs").join("twse-auction.ics");
        let result = write_atomically(&path, "calendar", false);
        assert!(matches!(result, Err(Error::MissingDirectory(_))));
        assert!(!path.exists());
        write_atomically(&path, "calendar", true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "calendar");
    }
}
