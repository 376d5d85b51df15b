use calamine::Data;
use chrono::{Duration, NaiveDate};

/// Worksheet cell reduced to the shapes the importers care about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

/// Excel's day zero in the 1900 date system (serial 60 is the phantom 1900-02-29).
fn excel_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Date for an Excel serial number; the time-of-day fraction is dropped.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    excel_epoch()?.checked_add_signed(Duration::days(serial.trunc() as i64))
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                let s = s.trim();
                if s.is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(s.to_string())
                }
            }
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => serial_to_date(dt.as_f64()).map_or(Cell::Empty, Cell::Date),
        }
    }
}

/// Strips the separators people type into numeric cells ("12日", "1,000").
fn numeric_text(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .trim_end_matches('日')
        .chars()
        .filter(|c| *c != ',')
        .map(|c| match c {
            // full-width digits and dot
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32).unwrap_or(c),
            '．' => '.',
            _ => c,
        })
        .collect();
    cleaned.trim().parse().ok()
}

fn text_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in ["%Y/%m/%d", "%Y-%m-%d", "%Y.%m.%d", "%Y年%m月%d日"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // "2025-04-01 00:00:00" and similar
    s.split_whitespace().next().filter(|head| *head != s).and_then(text_date)
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            // employee numbers are often stored as numbers
            Cell::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Date(d) => Some(d.to_string()),
            Cell::Bool(b) => Some(b.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => numeric_text(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(d) => Some(*d),
            Cell::Number(n) => serial_to_date(*n),
            Cell::Text(s) => text_date(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn converts_serial_numbers() {
        assert_eq!(serial_to_date(45383.0), Some(d(2024, 4, 1)));
        assert_eq!(serial_to_date(45383.75), Some(d(2024, 4, 1)));
        assert_eq!(serial_to_date(0.0), None);
        assert_eq!(serial_to_date(f64::NAN), None);
    }

    #[test]
    fn reads_dates_from_any_shape() {
        assert_eq!(Cell::Number(45383.0).as_date(), Some(d(2024, 4, 1)));
        assert_eq!(Cell::Text("2024/04/01".into()).as_date(), Some(d(2024, 4, 1)));
        assert_eq!(Cell::Text("2024年4月1日".into()).as_date(), Some(d(2024, 4, 1)));
        assert_eq!(Cell::Text("2024-04-01 00:00:00".into()).as_date(), Some(d(2024, 4, 1)));
        assert_eq!(Cell::Text("next week".into()).as_date(), None);
    }

    #[test]
    fn reads_numbers_written_as_text() {
        assert_eq!(Cell::Text("12日".into()).as_f64(), Some(12.0));
        assert_eq!(Cell::Text("４．５".into()).as_f64(), Some(4.5));
        assert_eq!(Cell::Text("-".into()).as_f64(), None);
    }

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(Cell::Number(1024.0).as_text().as_deref(), Some("1024"));
        assert_eq!(Cell::from(&Data::String("  ".into())), Cell::Empty);
        assert_eq!(Cell::from(&Data::Int(7)), Cell::Number(7.0));
    }
}
