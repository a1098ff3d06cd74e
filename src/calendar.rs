use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

/// Months of the academic year in display order (April through March).
pub const ACADEMIC_MONTHS: [u32; 12] = [4, 5, 6, 7, 8, 9, 10, 11, 12, 1, 2, 3];

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

pub fn is_sunday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Sun
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if leap => 29,
        2 => 28,
        _ => 30,
    }
}

pub fn date_key(year: i32, month: u32, day: u32) -> String {
    format!("{:04}-{:02}-{:02}", year, month, day)
}

/// Calendar navigation anchors for a month header: `(prev, next)` as
/// `(year, month)` pairs, wrapping across December/January.
pub fn month_nav(year: i32, month: u32) -> ((i32, u32), (i32, u32)) {
    let prev = if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    };
    let next = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    (prev, next)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub day: u32,
    pub date: String,
    pub is_sunday: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub days_in_month: u32,
    /// Blank cells before day 1 so a 7-column grid aligns on Sunday.
    pub leading_blanks: u32,
    pub cells: Vec<DayCell>,
}

pub fn month_grid(year: i32, month: u32) -> Option<MonthGrid> {
    if !(1..=12).contains(&month) {
        return None;
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let days = days_in_month(year, month);
    let leading_blanks = first.weekday().num_days_from_sunday();
    let cells = (1..=days)
        .map(|d| {
            let date = date_key(year, month, d);
            let is_sunday = NaiveDate::from_ymd_opt(year, month, d)
                .map(is_sunday)
                .unwrap_or(false);
            DayCell {
                day: d,
                date,
                is_sunday,
            }
        })
        .collect();
    Some(MonthGrid {
        year,
        month,
        days_in_month: days,
        leading_blanks,
        cells,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthStats {
    pub present: u32,
    pub absent: u32,
    pub total_working: u32,
    pub percent: u32,
}

/// Attendance percentage over marked days. Holidays and unmarked days carry
/// no record, so the denominator is exactly present + absent.
pub fn month_stats<'a, I>(statuses: I) -> MonthStats
where
    I: IntoIterator<Item = &'a str>,
{
    let mut present = 0u32;
    let mut absent = 0u32;
    for s in statuses {
        match s {
            "present" => present += 1,
            "absent" => absent += 1,
            _ => {}
        }
    }
    let total = present + absent;
    let percent = if total > 0 {
        ((present as f64 / total as f64) * 100.0).round() as u32
    } else {
        0
    };
    MonthStats {
        present,
        absent,
        total_working: total,
        percent,
    }
}

/// Academic session label for a date: sessions run April to March, so
/// January through March belong to the session that started the prior year.
pub fn session_label(date: NaiveDate) -> String {
    let y = date.year();
    if date.month() < 4 {
        format!("{}-{}", y - 1, y)
    } else {
        format!("{}-{}", y, y + 1)
    }
}
