//! Parsed billing line items.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::forms::classify::{DATE_RE, MONEY_RE, is_rev_code, is_service_code};
use crate::geometry::BBox;
use crate::layout::columns::ColumnType;

/// Typed value of one field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    /// `MM/DD/YYYY`, or `MM/DD` while the year is unknown.
    Date(String),
    /// Text that does not parse as the column's type.
    Invalid,
}

impl FieldValue {
    pub fn is_invalid(&self) -> bool {
        matches!(self, FieldValue::Invalid)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// One field of a line item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub column: ColumnType,
    pub slot: usize,
    pub raw: String,
    pub value: FieldValue,
    /// Copied from a neighbouring item by a fill rule.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub filled: bool,
}

impl Field {
    pub fn new(column: ColumnType, slot: usize, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let value = parse_value(column, &raw);
        Self {
            column,
            slot,
            raw,
            value,
            filled: false,
        }
    }

    /// A typed value that can start a new item.
    pub fn is_anchor(&self) -> bool {
        self.column != ColumnType::Description && !self.value.is_invalid()
    }
}

/// A billing line item, possibly merged from several physical rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub bbox: BBox,
    pub fields: Vec<Field>,
    /// Grid row indices this item was built from.
    pub rows: Vec<usize>,
    pub conf: f64,
}

impl LineItem {
    pub fn get(&self, column: ColumnType) -> Option<&Field> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub(crate) fn get_mut(&mut self, column: ColumnType) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.column == column)
    }

    /// Raw text of a field.
    pub fn text(&self, column: ColumnType) -> Option<&str> {
        self.get(column).map(|f| f.raw.as_str())
    }

    /// At least a date of service or a charge, and no invalid field.
    pub fn valid(&self) -> bool {
        let keyed = [ColumnType::Dos, ColumnType::Charge]
            .iter()
            .any(|c| self.get(*c).is_some_and(|f| !f.value.is_invalid()));
        keyed && !self.fields.iter().any(|f| f.value.is_invalid())
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// `type=raw` pairs in column order.
    pub fn str(&self) -> String {
        let mut fields: Vec<&Field> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.slot);
        fields
            .iter()
            .map(|f| format!("{}={}", f.column, f.raw))
            .collect::<Vec<_>>()
            .join(" | ")
    }

    pub fn json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Append a continuation row's description.
    pub(crate) fn append_text(&mut self, column: ColumnType, slot: usize, text: &str) {
        match self.get_mut(column) {
            Some(f) => {
                f.raw.push(' ');
                f.raw.push_str(text);
                f.value = parse_value(column, &f.raw);
            }
            None => self.fields.push(Field::new(column, slot, text)),
        }
    }
}

/// Parse a raw field according to its column type.
pub fn parse_value(column: ColumnType, raw: &str) -> FieldValue {
    let s = raw.trim();
    match column {
        ColumnType::Units | ColumnType::UnitCost | ColumnType::Charge => {
            parse_number(s).map_or(FieldValue::Invalid, FieldValue::Number)
        }
        ColumnType::Dos => parse_date(s, None).map_or(FieldValue::Invalid, FieldValue::Date),
        ColumnType::RevCode if is_rev_code(s) => FieldValue::Text(s.to_string()),
        ColumnType::ServiceCode if is_service_code(s) => FieldValue::Text(s.to_string()),
        ColumnType::RevCode | ColumnType::ServiceCode => FieldValue::Invalid,
        ColumnType::Description | ColumnType::Unknown => FieldValue::Text(s.to_string()),
    }
}

/// Parse an amount or quantity: `$1,204.50`, `(12.00)`, `12.00-`,
/// `12.00CR` and plain integers.
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let is_int = s.chars().all(|c| c.is_ascii_digit());
    if !is_int && !MONEY_RE.is_match(s) {
        return None;
    }
    let negative = (s.starts_with('(') && s.ends_with(')'))
        || s.ends_with('-')
        || s.ends_with("CR")
        || s.starts_with('-')
        || s.starts_with("(-");
    let digits: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let v: f64 = digits.parse().ok()?;
    Some(if negative { -v } else { v })
}

/// Normalize a date to `MM/DD/YYYY`; without a year in the text and no
/// `default_year` the result is `MM/DD`.
pub fn parse_date(s: &str, default_year: Option<i32>) -> Option<String> {
    let caps = DATE_RE.captures(s.trim())?;
    let month: u32 = caps.get(1)?.as_str().parse().ok()?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    let year = match caps.get(3) {
        Some(y) => {
            let y: i32 = y.as_str().parse().ok()?;
            Some(if y < 100 { 2000 + y } else { y })
        }
        None => default_year,
    };
    Some(match year {
        Some(y) => format!("{month:02}/{day:02}/{y:04}"),
        None => format!("{month:02}/{day:02}"),
    })
}

/// Year of a normalized date.
pub(crate) fn date_year(date: &str) -> Option<i32> {
    date.split('/').nth(2)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(parse_number("$1,204.50"), Some(1204.5));
        assert_eq!(parse_number("(12.00)"), Some(-12.0));
        assert_eq!(parse_number("12.00-"), Some(-12.0));
        assert_eq!(parse_number("3"), Some(3.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("1.2.3"), None);
    }

    #[test]
    fn dates() {
        assert_eq!(parse_date("9/8/21", None).as_deref(), Some("09/08/2021"));
        assert_eq!(parse_date("09-18", None).as_deref(), Some("09/18"));
        assert_eq!(parse_date("09-18", Some(2020)).as_deref(), Some("09/18/2020"));
        assert_eq!(parse_date("13/01/2021", None), None);
        assert_eq!(date_year("09/18/2020"), Some(2020));
    }

    #[test]
    fn item_rendering_and_validity() {
        let mut item = LineItem {
            fields: vec![
                Field::new(ColumnType::Charge, 3, "$10.00"),
                Field::new(ColumnType::Dos, 0, "01/02/2021"),
                Field::new(ColumnType::Description, 1, "PHARMACY"),
            ],
            ..LineItem::default()
        };
        assert!(item.valid());
        assert_eq!(
            item.str(),
            "dos=01/02/2021 | description=PHARMACY | charge=$10.00"
        );
        item.append_text(ColumnType::Description, 1, "GENERAL");
        assert_eq!(item.text(ColumnType::Description), Some("PHARMACY GENERAL"));
        assert!(item.json().unwrap().contains("\"kind\": \"number\""));

        item.fields.push(Field::new(ColumnType::Units, 2, "one"));
        assert!(!item.valid());
    }
}
