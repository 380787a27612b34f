use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,4})([-/.])(\d{1,2})([-/.])(\d{2,4})\s*$").unwrap());

/// Component order of a recorded date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    YearMonthDay,
    MonthDayYear,
    DayMonthYear,
}

/// Layout of a date string as it appeared in a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFormat {
    pub order: DateOrder,
    pub separator: char,
    pub two_digit_year: bool,
    pub zero_pad: bool,
    /// Both leading components were <= 12, so the order is a guess.
    pub ambiguous: bool,
}

impl DateFormat {
    pub const ISO: DateFormat = DateFormat {
        order: DateOrder::YearMonthDay,
        separator: '-',
        two_digit_year: false,
        zero_pad: true,
        ambiguous: false,
    };

    pub const US: DateFormat = DateFormat {
        order: DateOrder::MonthDayYear,
        separator: '/',
        two_digit_year: false,
        zero_pad: true,
        ambiguous: false,
    };

    /// Works out how `sample` is laid out.
    ///
    /// A leading 4-digit component means year first. Otherwise whichever of
    /// the first two components exceeds 12 is the day; when neither does,
    /// month-first is assumed and the format is marked ambiguous.
    pub fn detect(sample: &str) -> Option<DateFormat> {
        let caps = DATE_SHAPE.captures(sample)?;
        let first = &caps[1];
        let separator = caps[2].chars().next()?;
        let second = &caps[3];
        let third = &caps[5];

        if caps[2] != caps[4] {
            return None;
        }

        if first.len() == 4 {
            return Some(DateFormat {
                order: DateOrder::YearMonthDay,
                separator,
                two_digit_year: false,
                zero_pad: second.len() == 2 && third.len() == 2,
                ambiguous: false,
            });
        }
        let zero_pad = first.len() == 2 && second.len() == 2;
        if first.len() == 3 || third.len() == 3 {
            return None;
        }

        let a: u32 = first.parse().ok()?;
        let b: u32 = second.parse().ok()?;
        let (order, ambiguous) = if a > 12 && b <= 12 {
            (DateOrder::DayMonthYear, false)
        } else if b > 12 && a <= 12 {
            (DateOrder::MonthDayYear, false)
        } else if a <= 12 && b <= 12 {
            (DateOrder::MonthDayYear, a != b)
        } else {
            return None;
        };

        if ambiguous {
            debug!(sample, "ambiguous date order, assuming month first");
        }

        Some(DateFormat {
            order,
            separator,
            two_digit_year: third.len() == 2,
            zero_pad,
            ambiguous,
        })
    }

    pub fn format(&self, year: u32, month: u32, day: u32) -> String {
        let year = if self.two_digit_year {
            format!("{:02}", year % 100)
        } else {
            format!("{:04}", year)
        };
        let (month, day) = if self.zero_pad {
            (format!("{:02}", month), format!("{:02}", day))
        } else {
            (month.to_string(), day.to_string())
        };
        let sep = self.separator;
        match self.order {
            DateOrder::YearMonthDay => format!("{year}{sep}{month}{sep}{day}"),
            DateOrder::MonthDayYear => format!("{month}{sep}{day}{sep}{year}"),
            DateOrder::DayMonthYear => format!("{day}{sep}{month}{sep}{year}"),
        }
    }

    /// Reads `raw` back into (year, month, day) under this layout.
    pub fn parse(&self, raw: &str) -> Option<(u32, u32, u32)> {
        let caps = DATE_SHAPE.captures(raw)?;
        let parts: [u32; 3] = [
            caps[1].parse().ok()?,
            caps[3].parse().ok()?,
            caps[5].parse().ok()?,
        ];
        let (year, month, day) = match self.order {
            DateOrder::YearMonthDay => (parts[0], parts[1], parts[2]),
            DateOrder::MonthDayYear => (parts[2], parts[0], parts[1]),
            DateOrder::DayMonthYear => (parts[2], parts[1], parts[0]),
        };
        let year = if year < 100 { expand_year(year) } else { year };
        valid(year, month, day).then_some((year, month, day))
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year = if self.two_digit_year { "YY" } else { "YYYY" };
        let sep = self.separator;
        match self.order {
            DateOrder::YearMonthDay => write!(f, "{year}{sep}MM{sep}DD"),
            DateOrder::MonthDayYear => write!(f, "MM{sep}DD{sep}{year}"),
            DateOrder::DayMonthYear => write!(f, "DD{sep}MM{sep}{year}"),
        }
    }
}

// Two-digit years up to 30 years ahead of 2000 land in this century.
fn expand_year(year: u32) -> u32 {
    if year <= 30 {
        2000 + year
    } else {
        1900 + year
    }
}

fn valid(year: u32, month: u32, day: u32) -> bool {
    year >= 1000 && (1..=12).contains(&month) && (1..=31).contains(&day)
}

/// Parses a profile value in any recognized layout.
///
/// Only a 4-digit leading component is read year first; a short leading
/// component follows [`DateFormat::detect`], month first when ambiguous.
pub fn parse_any(raw: &str) -> Option<(u32, u32, u32)> {
    DateFormat::detect(raw).and_then(|format| format.parse(raw))
}

/// Rebuilds a date in the layout the recording used.
///
/// Without a usable sample the date is written as ISO.
pub fn reconstruct(sample: Option<&str>, year: u32, month: u32, day: u32) -> String {
    let format = sample.and_then(DateFormat::detect).unwrap_or(DateFormat::ISO);
    format.format(year, month, day)
}
