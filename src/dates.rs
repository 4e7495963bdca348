use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// How far a found date may sit from the message's own received time before
/// it is rejected as a false positive (unrelated numbers parsing as dates).
const PLAUSIBLE_WINDOW_DAYS: i64 = 365;

fn month_number(name: &str) -> Option<u32> {
    let key = name.to_lowercase();
    let key = key.get(..3)?;
    let months = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    months.iter().position(|m| *m == key).map(|i| i as u32 + 1)
}

fn month_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
        )
        .unwrap()
    })
}

fn day_first_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec)\.?,?\s+(\d{4})\b",
        )
        .unwrap()
    })
}

fn numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{2,4})\b").unwrap())
}

fn iso_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap())
}

/// Free-text date search: every recognized date in the text, in order of
/// appearance. Impossible calendar dates are dropped, not errors.
pub fn find_dates(text: &str) -> Vec<DateTime<Utc>> {
    let mut found: Vec<(usize, NaiveDate)> = Vec::new();

    for cap in month_name_re().captures_iter(text) {
        let start = cap.get(0).map(|m| m.start()).unwrap_or(0);
        if let (Some(month), Ok(day), Ok(year)) = (
            month_number(&cap[1]),
            cap[2].parse::<u32>(),
            cap[3].parse::<i32>(),
        ) && let Some(date) = NaiveDate::from_ymd_opt(year, month, day)
        {
            found.push((start, date));
        }
    }
    for cap in day_first_re().captures_iter(text) {
        let start = cap.get(0).map(|m| m.start()).unwrap_or(0);
        if let (Ok(day), Some(month), Ok(year)) = (
            cap[1].parse::<u32>(),
            month_number(&cap[2]),
            cap[3].parse::<i32>(),
        ) && let Some(date) = NaiveDate::from_ymd_opt(year, month, day)
        {
            found.push((start, date));
        }
    }
    for cap in numeric_re().captures_iter(text) {
        let start = cap.get(0).map(|m| m.start()).unwrap_or(0);
        if let (Ok(month), Ok(day), Ok(year)) = (
            cap[1].parse::<u32>(),
            cap[2].parse::<u32>(),
            cap[3].parse::<i32>(),
        ) {
            let year = if year < 100 { year + 2000 } else { year };
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                found.push((start, date));
            }
        }
    }
    for cap in iso_re().captures_iter(text) {
        let start = cap.get(0).map(|m| m.start()).unwrap_or(0);
        if let (Ok(year), Ok(month), Ok(day)) = (
            cap[1].parse::<i32>(),
            cap[2].parse::<u32>(),
            cap[3].parse::<u32>(),
        ) && let Some(date) = NaiveDate::from_ymd_opt(year, month, day)
        {
            found.push((start, date));
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found.dedup();
    found
        .into_iter()
        .filter_map(|(_, date)| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .collect()
}

/// Parse a single captured date phrase, e.g. the tail of "dated March 3, 2026".
pub fn parse_date_phrase(phrase: &str) -> Option<DateTime<Utc>> {
    find_dates(phrase).into_iter().next()
}

/// Date Extractor: first found date within the plausibility window of the
/// fallback wins; then an "on/dated <text>" capture; the fallback timestamp
/// is the guaranteed terminal default.
pub fn extract_date(subject: &str, body: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    static ON_DATED: OnceLock<Regex> = OnceLock::new();
    let on_dated =
        ON_DATED.get_or_init(|| Regex::new(r"(?i)(?:on|dated)\s+([A-Za-z0-9, /\-]+)").unwrap());

    let text = format!("{}\n{}", subject, body);

    for date in find_dates(&text) {
        if (fallback - date).num_days().abs() <= PLAUSIBLE_WINDOW_DAYS {
            return date;
        }
    }
    if let Some(cap) = on_dated.captures(&text)
        && let Some(parsed) = parse_date_phrase(&cap[1])
    {
        return parsed;
    }
    fallback
}
