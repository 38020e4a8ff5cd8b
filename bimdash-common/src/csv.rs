//! CSV parsing with per-column type coercion
//!
//! The parser is deliberately forgiving: a cell that does not fit its
//! declared column type becomes null and parsing carries on. The only
//! structural rule is the quoting rule for data rows: a comma separates two
//! cells when the rest of the line after it holds an even number of `"`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fields::FieldRoles;
use crate::record::{FieldValue, Record};

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    #[default]
    String,
    Number,
    Boolean,
    Date,
}

impl TypeTag {
    /// Lenient lookup; anything unrecognised is a string column
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "number" => TypeTag::Number,
            "boolean" => TypeTag::Boolean,
            "date" => TypeTag::Date,
            _ => TypeTag::String,
        }
    }
}

/// Headers and typed records produced from one CSV document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub records: Vec<Record>,
}

/// Longest numeric prefix, the same prefix a browser's `parseFloat` accepts
static NUMERIC_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("static regex")
});

/// Parse `text` into records, coercing the i-th cell by the i-th type tag.
///
/// Missing tags fall back to [`TypeTag::String`]; missing cells become null.
/// Columns playing the history role always start out as an empty list.
pub fn parse(text: &str, column_types: &[TypeTag], roles: &FieldRoles) -> ParsedCsv {
    let text = text.trim();
    if text.is_empty() {
        return ParsedCsv::default();
    }

    let mut lines = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));

    let headers: Vec<String> = match lines.next() {
        Some(first) => first
            .split(',')
            .map(|h| h.trim().replace('"', ""))
            .collect(),
        None => return ParsedCsv::default(),
    };

    let records = lines
        .map(|line| parse_row(line, &headers, column_types, roles))
        .collect();

    ParsedCsv { headers, records }
}

fn parse_row(line: &str, headers: &[String], column_types: &[TypeTag], roles: &FieldRoles) -> Record {
    let cells = split_row(line);
    let mut record = Record::new();

    for (i, header) in headers.iter().enumerate() {
        let value = if roles.is_history(header) {
            FieldValue::List(Vec::new())
        } else {
            match cells.get(i) {
                Some(cell) => {
                    let tag = column_types.get(i).copied().unwrap_or_default();
                    coerce(unquote(cell), tag)
                }
                None => FieldValue::Null,
            }
        };
        record.insert(header.clone(), value.into());
    }

    record
}

/// Split a data row on commas followed by an even number of quotes
fn split_row(line: &str) -> Vec<&str> {
    let total_quotes = line.matches('"').count();
    let mut seen_quotes = 0;
    let mut start = 0;
    let mut cells = Vec::new();

    for (i, ch) in line.char_indices() {
        match ch {
            '"' => seen_quotes += 1,
            ',' if (total_quotes - seen_quotes) % 2 == 0 => {
                cells.push(&line[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    cells.push(&line[start..]);

    cells
}

/// Trim and drop one leading and one trailing quote
fn unquote(cell: &str) -> &str {
    let cell = cell.trim();
    let cell = cell.strip_prefix('"').unwrap_or(cell);
    cell.strip_suffix('"').unwrap_or(cell)
}

/// Coerce one cleaned cell to its declared type
pub fn coerce(cell: &str, tag: TypeTag) -> FieldValue {
    match tag {
        TypeTag::String => FieldValue::String(cell.to_string()),
        TypeTag::Number => parse_number(cell)
            .map(FieldValue::Number)
            .unwrap_or(FieldValue::Null),
        TypeTag::Boolean => match cell.to_lowercase().as_str() {
            "true" => FieldValue::Boolean(true),
            "false" => FieldValue::Boolean(false),
            _ => FieldValue::Null,
        },
        TypeTag::Date => parse_date(cell)
            .map(FieldValue::Timestamp)
            .unwrap_or(FieldValue::Null),
    }
}

/// Numeric prefix of `cell`: `"12 units"` is 12, `"abc"` is nothing
pub fn parse_number(cell: &str) -> Option<f64> {
    let m = NUMERIC_PREFIX.find(cell.trim_start())?;
    m.as_str().parse::<f64>().ok().filter(|n| n.is_finite())
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Calendar date or date-time; zone-less values are taken as UTC
pub fn parse_date(cell: &str) -> Option<DateTime<Utc>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(cell) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(cell, format) {
            return Some(naive.and_utc());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(cell, format) {
            return Some(date.and_time(NaiveTime::MIN).and_utc());
        }
    }

    // A bare year is January 1st of that year
    if cell.len() == 4 && cell.bytes().all(|b| b.is_ascii_digit()) {
        let year: i32 = cell.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1).map(|d| d.and_time(NaiveTime::MIN).and_utc());
    }

    None
}
