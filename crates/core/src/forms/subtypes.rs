//! Column value formats ("subtypes").
//!
//! Some bills print the date of service or the revenue code once per
//! section instead of on every row. Tags name these layouts:
//!
//! | tag                        | effect                 |
//! |----------------------------|------------------------|
//! | `dos_section_top`          | dos: fill down         |
//! | `dos_section_start`        | dos: fill down         |
//! | `dos_section_bottom`       | dos: fill up           |
//! | `dos_missing_year`         | dos: year missing      |
//! | `revCode_section_top`      | revCode: fill down     |
//! | `revCode_section_start`    | revCode: fill down     |
//! | `revCode_section_bottom`   | revCode: fill up       |

use serde::{Deserialize, Serialize};

use crate::layout::columns::ColumnType;

/// Direction in which a sparse value is propagated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    Up,
    Down,
}

/// Part of a value that the bill leaves out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Missing {
    Year,
}

/// Value format of one column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Missing>,
}

impl ColumnFormat {
    pub fn is_plain(&self) -> bool {
        self.fill.is_none() && self.missing.is_none()
    }

    /// Fields set in `other` win.
    pub fn merged(self, other: ColumnFormat) -> ColumnFormat {
        ColumnFormat {
            fill: other.fill.or(self.fill),
            missing: other.missing.or(self.missing),
        }
    }
}

/// Formats of the columns that support subtypes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtypes {
    pub dos: ColumnFormat,
    #[serde(rename = "revCode")]
    pub rev_code: ColumnFormat,
}

impl Subtypes {
    pub fn get(&self, tp: ColumnType) -> ColumnFormat {
        match tp {
            ColumnType::Dos => self.dos,
            ColumnType::RevCode => self.rev_code,
            _ => ColumnFormat::default(),
        }
    }
}

/// Interpret subtype tags; unknown tags are ignored with a warning.
pub fn subtypes_from_tags<S: AsRef<str>>(tags: &[S]) -> Subtypes {
    let mut out = Subtypes::default();
    for tag in tags {
        let tag = tag.as_ref();
        let Some((col, rest)) = tag.split_once('_') else {
            tracing::warn!(tag, "ignoring subtype tag");
            continue;
        };
        let format = match col {
            "dos" => &mut out.dos,
            "revCode" => &mut out.rev_code,
            _ => {
                tracing::warn!(tag, "ignoring subtype tag for unsupported column");
                continue;
            }
        };
        match rest {
            "section_top" | "section_start" => format.fill = Some(Fill::Down),
            "section_bottom" => format.fill = Some(Fill::Up),
            "missing_year" => format.missing = Some(Missing::Year),
            _ => tracing::warn!(tag, "ignoring subtype tag"),
        }
    }
    out
}

/// Format guessed from which items carry a value.
///
/// `present[i]` tells whether item `i` has a value in the column. A column
/// filled in under half of at least three items is sparse; it fills down
/// when the first item has a value and up when only the last one does.
pub fn detect_fill(present: &[bool]) -> Option<Fill> {
    if present.len() < 3 {
        return None;
    }
    let count = present.iter().filter(|p| **p).count();
    if count == 0 || count * 2 >= present.len() {
        return None;
    }
    match (present.first(), present.last()) {
        (Some(true), _) => Some(Fill::Down),
        (Some(false), Some(true)) => Some(Fill::Up),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(tags: &[&str]) -> String {
        serde_json::to_string(&subtypes_from_tags(tags)).unwrap()
    }

    #[test]
    fn tags_to_formats() {
        insta::assert_snapshot!(json(&[]), @r#"{"dos":{},"revCode":{}}"#);
        insta::assert_snapshot!(json(&["revCode_section_bottom"]), @r#"{"dos":{},"revCode":{"fill":"up"}}"#);
        insta::assert_snapshot!(json(&["revCode_section_top"]), @r#"{"dos":{},"revCode":{"fill":"down"}}"#);
        insta::assert_snapshot!(json(&["revCode_section_start"]), @r#"{"dos":{},"revCode":{"fill":"down"}}"#);
        insta::assert_snapshot!(json(&["dos_section_top"]), @r#"{"dos":{"fill":"down"},"revCode":{}}"#);
        insta::assert_snapshot!(json(&["dos_section_start"]), @r#"{"dos":{"fill":"down"},"revCode":{}}"#);
        insta::assert_snapshot!(json(&["dos_missing_year"]), @r#"{"dos":{"missing":"year"},"revCode":{}}"#);
    }

    #[test]
    fn unknown_tags_are_ignored() {
        assert_eq!(subtypes_from_tags(&["charge_section_top", "bogus"]), Subtypes::default());
    }

    #[test]
    fn sparse_columns_fill() {
        assert_eq!(detect_fill(&[true, false, false, true, false]), Some(Fill::Down));
        assert_eq!(detect_fill(&[false, false, false, true]), Some(Fill::Up));
        assert_eq!(detect_fill(&[true, true, false]), None);
        assert_eq!(detect_fill(&[true, false]), None);
    }
}
