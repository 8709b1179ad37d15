use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use regex::Regex;

// Accepted grammar: two or more alphabetic words spanning the whole message.
pub fn parse_full_name(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z]+(?:\s+[A-Za-z]+)+)\s*$").expect("name pattern")
    });
    re.captures(text).map(|c| c[1].trim().to_string())
}

// Accepted grammar: US-style phone number, digits with optional separators,
// anywhere in the message.
pub fn parse_phone(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").expect("phone pattern"));
    re.find(text).map(|m| m.as_str().to_string())
}

// Accepted grammar: "try <month> <day>" anywhere in the message,
// case-insensitive. Returns the captured date text.
pub fn parse_try_date(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re =
        RE.get_or_init(|| Regex::new(r"\btry\s+([a-z]+\s+\d{1,2})\b").expect("try-date pattern"));
    re.captures(&text.to_lowercase())
        .map(|c| c[1].trim().to_string())
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

struct DatePart {
    date: NaiveDate,
    explicit_year: bool,
    span_end: usize,
}

fn month_day_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?\b",
        )
        .expect("month-day pattern")
    })
}

fn numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").expect("numeric date pattern")
    })
}

fn relative_day_re(word: &'static str, cell: &'static OnceLock<Regex>) -> &'static Regex {
    cell.get_or_init(|| Regex::new(&format!(r"\b{word}\b")).expect("relative day pattern"))
}

// A 4-digit token only counts as a year when it could plausibly be one;
// anything else fails the parse rather than producing a nonsense date.
fn validate_year(caps: &regex::Captures<'_>, idx: usize) -> Option<Option<i32>> {
    match caps.get(idx) {
        None => Some(None),
        Some(y) => {
            let y: i32 = y.as_str().parse().ok()?;
            let y = if y < 100 { 2000 + y } else { y };
            (1980..=2100).contains(&y).then_some(Some(y))
        }
    }
}

fn parse_date_part(text: &str, today: NaiveDate) -> Option<DatePart> {
    static TODAY: OnceLock<Regex> = OnceLock::new();
    static TOMORROW: OnceLock<Regex> = OnceLock::new();

    if let Some(m) = relative_day_re("today", &TODAY).find(text) {
        return Some(DatePart {
            date: today,
            explicit_year: false,
            span_end: m.end(),
        });
    }
    if let Some(m) = relative_day_re("tomorrow", &TOMORROW).find(text) {
        return Some(DatePart {
            date: today + Duration::days(1),
            explicit_year: false,
            span_end: m.end(),
        });
    }

    if let Some(caps) = month_day_re().captures(text) {
        let month = MONTHS.iter().position(|m| *m == &caps[1])? as u32 + 1;
        let day: u32 = caps[2].parse().ok()?;
        let year = validate_year(&caps, 3)?;
        let date = NaiveDate::from_ymd_opt(year.unwrap_or(today.year()), month, day)?;
        return Some(DatePart {
            date,
            explicit_year: year.is_some(),
            span_end: caps.get(0).map(|m| m.end()).unwrap_or(0),
        });
    }

    if let Some(caps) = numeric_date_re().captures(text) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = validate_year(&caps, 3)?;
        let date = NaiveDate::from_ymd_opt(year.unwrap_or(today.year()), month, day)?;
        return Some(DatePart {
            date,
            explicit_year: year.is_some(),
            span_end: caps.get(0).map(|m| m.end()).unwrap_or(0),
        });
    }

    None
}

enum TimePart {
    Missing,
    Invalid,
    Parsed(NaiveTime),
}

fn parse_time_part(text: &str) -> TimePart {
    static CLOCK12: OnceLock<Regex> = OnceLock::new();
    static CLOCK24: OnceLock<Regex> = OnceLock::new();

    let clock12 = CLOCK12.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("12h clock pattern")
    });
    if let Some(caps) = clock12.captures(text) {
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let minute: u32 = caps
            .get(2)
            .map(|m| m.as_str().parse().unwrap_or(99))
            .unwrap_or(0);
        if !(1..=12).contains(&hour) || minute > 59 {
            return TimePart::Invalid;
        }
        let hour = match (&caps[3], hour) {
            ("am", 12) => 0,
            ("am", h) => h,
            ("pm", 12) => 12,
            (_, h) => h + 12,
        };
        return match NaiveTime::from_hms_opt(hour, minute, 0) {
            Some(t) => TimePart::Parsed(t),
            None => TimePart::Invalid,
        };
    }

    let clock24 =
        CLOCK24.get_or_init(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").expect("24h clock pattern"));
    if let Some(caps) = clock24.captures(text) {
        let hour: u32 = caps[1].parse().unwrap_or(99);
        let minute: u32 = caps[2].parse().unwrap_or(99);
        return match NaiveTime::from_hms_opt(hour, minute, 0) {
            Some(t) => TimePart::Parsed(t),
            None => TimePart::Invalid,
        };
    }

    TimePart::Missing
}

// Accepted grammar: "MONTH DAY [YEAR] [at] TIME" (e.g. "August 3 at 2 PM"),
// numeric "M/D[/Y]", "today"/"tomorrow", each with an optional 12h or 24h
// clock time; a bare time means "today". With `prefer_future`, year-less
// dates that already passed roll forward a year (a bare time, a day).
pub fn parse_datetime(text: &str, prefer_future: bool, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let text = text.trim().to_lowercase();
    let tz = now.timezone();
    let today = now.date_naive();

    let date_part = parse_date_part(&text, today);
    let (date, explicit_year, time_search) = match &date_part {
        Some(part) => (part.date, part.explicit_year, &text[part.span_end..]),
        None => (today, false, text.as_str()),
    };

    let time = match parse_time_part(time_search) {
        TimePart::Invalid => return None,
        TimePart::Parsed(t) => Some(t),
        TimePart::Missing => None,
    };
    if date_part.is_none() && time.is_none() {
        return None;
    }
    let time = time.unwrap_or(NaiveTime::MIN);

    let mut dt = tz.from_local_datetime(&date.and_time(time)).earliest()?;

    if prefer_future && dt < now {
        if date_part.is_none() {
            // Bare time earlier than now means the next occurrence, tomorrow.
            dt = tz
                .from_local_datetime(&(date + Duration::days(1)).and_time(time))
                .earliest()?;
        } else if !explicit_year {
            let next_year = NaiveDate::from_ymd_opt(date.year() + 1, date.month(), date.day())?;
            dt = tz.from_local_datetime(&next_year.and_time(time)).earliest()?;
        }
    }

    Some(dt)
}
