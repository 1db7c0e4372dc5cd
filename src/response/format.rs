//! Value formatting for result rows

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

use crate::expression::Val;
use crate::plan::Format;

#[derive(Debug, Clone, Copy, Default)]
pub struct FieldFormatter;

impl FieldFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Null values render as no value at all.
    pub fn format(&self, format: &Format, val: &Val) -> Option<String> {
        if val.is_null() {
            return None;
        }
        let formatted = match format {
            Format::General | Format::Text => val.to_string(),
            Format::Number {
                decimal_places,
                use_separator,
            } => match val.as_f64() {
                Some(n) => format_number(n, *decimal_places, *use_separator),
                None => val.to_string(),
            },
            Format::Date { pattern } => match date_of(val) {
                Some(date) => format_date(&date, pattern),
                None => val.to_string(),
            },
        };
        Some(formatted)
    }
}

fn date_of(val: &Val) -> Option<DateTime<Utc>> {
    match val {
        Val::Date(date) => Some(*date),
        Val::Integer(millis) => DateTime::from_timestamp_millis(*millis),
        _ => None,
    }
}

fn format_date(date: &DateTime<Utc>, pattern: &str) -> String {
    let valid = !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error));
    if valid {
        date.format_with_items(StrftimeItems::new(pattern)).to_string()
    } else {
        Val::Date(*date).to_string()
    }
}

fn format_number(n: f64, decimal_places: usize, use_separator: bool) -> String {
    let fixed = format!("{:.*}", decimal_places, n);
    if !use_separator {
        return fixed;
    }

    let (sign, unsigned) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    match fraction {
        Some(fraction) => format!("{}{}.{}", sign, grouped, fraction),
        None => format!("{}{}", sign, grouped),
    }
}
