//! Form templates: which pipeline steps a layout permits.
//!
//! Templates are loaded from JSON:
//!
//! ```json
//! {
//!   "templates": [
//!     { "id": "default", "deny": ["extend_grid"] },
//!     { "id": "mercy", "when": { "form": "mercy-ib" },
//!       "deny": ["handle_corner_case"], "subtypes": ["dos_section_top"] }
//!   ]
//! }
//! ```
//!
//! The first template whose `when` entries all match the document
//! configuration is selected; otherwise the one with id `default`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::{IbError, Result};
use crate::forms::subtypes::{Subtypes, subtypes_from_tags};
use crate::layout::columns::ColumnType;

/// Id of the template used when no other matches.
pub const DEFAULT_TEMPLATE_ID: &str = "default";

const STEP_COUNT: usize = 6;

/// Report pipeline steps, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    FindColumns,
    HandleCornerCase,
    ExtendGrid,
    WordsToColumns,
    BestColumns,
    Parse,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; STEP_COUNT] = [
        PipelineStep::FindColumns,
        PipelineStep::HandleCornerCase,
        PipelineStep::ExtendGrid,
        PipelineStep::WordsToColumns,
        PipelineStep::BestColumns,
        PipelineStep::Parse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PipelineStep::FindColumns => "find_columns",
            PipelineStep::HandleCornerCase => "handle_corner_case",
            PipelineStep::ExtendGrid => "extend_grid",
            PipelineStep::WordsToColumns => "words_to_columns",
            PipelineStep::BestColumns => "best_columns",
            PipelineStep::Parse => "parse",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PipelineStep {
    type Err = IbError;

    fn from_str(s: &str) -> Result<Self> {
        PipelineStep::ALL
            .into_iter()
            .find(|step| step.name() == s)
            .ok_or_else(|| IbError::UnknownStep(s.to_string()))
    }
}

/// Allowed flag per pipeline step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepPolicy([bool; STEP_COUNT]);

impl Default for StepPolicy {
    fn default() -> Self {
        Self::permissive()
    }
}

impl StepPolicy {
    pub fn permissive() -> Self {
        Self([true; STEP_COUNT])
    }

    pub fn is_allowed(&self, step: PipelineStep) -> bool {
        self.0[step.index()]
    }

    pub fn set(&mut self, step: PipelineStep, allowed: bool) {
        self.0[step.index()] = allowed;
    }
}

#[derive(Deserialize)]
struct RawTemplate {
    id: String,
    #[serde(default)]
    when: BTreeMap<String, String>,
    #[serde(default)]
    allow: Option<Vec<String>>,
    #[serde(default)]
    deny: Vec<String>,
    #[serde(default)]
    subtypes: Vec<String>,
    #[serde(default)]
    column_types: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawTemplateSet {
    templates: Vec<RawTemplate>,
}

/// Step policy and column hints for one form layout.
#[derive(Clone, Debug, PartialEq)]
pub struct FormTemplate {
    id: String,
    when: BTreeMap<String, String>,
    policy: StepPolicy,
    subtype_tags: Vec<String>,
    column_types: Option<Vec<ColumnType>>,
}

impl FormTemplate {
    /// A template permitting every step.
    pub fn permissive(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            when: BTreeMap::new(),
            policy: StepPolicy::permissive(),
            subtype_tags: Vec::new(),
            column_types: None,
        }
    }

    /// Select the template for `doc` from the JSON file at `path`.
    pub fn create(path: impl AsRef<Path>, doc: &Document) -> Result<Option<Self>> {
        Ok(TemplateSet::from_path(path)?.select(doc).cloned())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_allowed(&self, step: PipelineStep) -> bool {
        self.policy.is_allowed(step)
    }

    pub fn deny(mut self, step: PipelineStep) -> Self {
        self.policy.set(step, false);
        self
    }

    pub fn with_subtypes(mut self, tags: Vec<String>) -> Self {
        self.subtype_tags = tags;
        self
    }

    pub fn with_column_types(mut self, types: Vec<ColumnType>) -> Self {
        self.column_types = Some(types);
        self
    }

    pub fn subtype_tags(&self) -> &[String] {
        &self.subtype_tags
    }

    pub fn subtypes(&self) -> Subtypes {
        subtypes_from_tags(&self.subtype_tags)
    }

    /// Fixed column types, left to right.
    pub fn column_types(&self) -> Option<&[ColumnType]> {
        self.column_types.as_deref()
    }

    fn matches(&self, doc: &Document) -> bool {
        !self.when.is_empty()
            && self
                .when
                .iter()
                .all(|(k, v)| doc.config_value(k) == Some(v.as_str()))
    }

    fn from_raw(raw: RawTemplate) -> Result<Self> {
        let mut policy = StepPolicy::permissive();
        if let Some(allow) = &raw.allow {
            policy = StepPolicy([false; STEP_COUNT]);
            for name in allow {
                policy.set(name.parse()?, true);
            }
        }
        for name in &raw.deny {
            policy.set(name.parse()?, false);
        }
        let column_types = raw
            .column_types
            .map(|names| {
                names
                    .iter()
                    .map(|n| {
                        ColumnType::from_name(n).ok_or_else(|| {
                            IbError::Template(format!("{}: unknown column type {n:?}", raw.id))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;
        Ok(Self {
            id: raw.id,
            when: raw.when,
            policy,
            subtype_tags: raw.subtypes,
            column_types,
        })
    }
}

/// A set of templates loaded from one file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateSet {
    templates: Vec<FormTemplate>,
}

impl TemplateSet {
    pub fn from_json_str(js: &str) -> Result<Self> {
        let raw: RawTemplateSet = serde_json::from_str(js)?;
        let templates = raw
            .templates
            .into_iter()
            .map(FormTemplate::from_raw)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { templates })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FormTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Template for `doc`; `None` means every step is allowed.
    pub fn select(&self, doc: &Document) -> Option<&FormTemplate> {
        let selected = self
            .templates
            .iter()
            .find(|t| t.matches(doc))
            .or_else(|| self.get(DEFAULT_TEMPLATE_ID));
        tracing::debug!(template = selected.map(FormTemplate::id), "template selected");
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocConfig;

    const TEMPLATES: &str = r#"{
        "templates": [
            {"id": "default", "deny": ["extend_grid"]},
            {"id": "mercy", "when": {"form": "mercy-ib"},
             "deny": ["handle_corner_case"], "subtypes": ["dos_section_top"],
             "column_types": ["dos", "description", "charge"]},
            {"id": "strict", "when": {"form": "strict"}, "allow": ["find_columns", "parse"]}
        ]
    }"#;

    fn doc_with(form: Option<&str>) -> Document {
        let mut config = DocConfig::new();
        if let Some(f) = form {
            config.insert("form".into(), f.into());
        }
        Document::new(config)
    }

    #[test]
    fn selection_by_config() {
        let set = TemplateSet::from_json_str(TEMPLATES).unwrap();
        assert_eq!(set.len(), 3);

        let mercy = set.select(&doc_with(Some("mercy-ib"))).unwrap();
        assert_eq!(mercy.id(), "mercy");
        assert!(!mercy.is_allowed(PipelineStep::HandleCornerCase));
        assert!(mercy.is_allowed(PipelineStep::ExtendGrid));
        assert_eq!(mercy.subtypes().dos.fill, Some(crate::forms::subtypes::Fill::Down));
        assert_eq!(
            mercy.column_types(),
            Some(&[ColumnType::Dos, ColumnType::Description, ColumnType::Charge][..])
        );

        let fallback = set.select(&doc_with(None)).unwrap();
        assert_eq!(fallback.id(), "default");
        assert!(!fallback.is_allowed(PipelineStep::ExtendGrid));

        let strict = set.select(&doc_with(Some("strict"))).unwrap();
        let allowed: Vec<PipelineStep> = PipelineStep::ALL
            .into_iter()
            .filter(|s| strict.is_allowed(*s))
            .collect();
        assert_eq!(allowed, vec![PipelineStep::FindColumns, PipelineStep::Parse]);
    }

    #[test]
    fn no_default_means_no_template() {
        let set = TemplateSet::from_json_str(r#"{"templates": []}"#).unwrap();
        assert!(set.select(&doc_with(Some("x"))).is_none());
    }

    #[test]
    fn unknown_step_is_rejected() {
        let err = TemplateSet::from_json_str(r#"{"templates": [{"id": "x", "deny": ["dance"]}]}"#)
            .unwrap_err();
        assert!(matches!(err, IbError::UnknownStep(s) if s == "dance"));
        let err = TemplateSet::from_json_str(
            r#"{"templates": [{"id": "x", "column_types": ["price"]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, IbError::Template(_)));
    }

    #[test]
    fn create_reads_template_file() {
        let path = std::env::temp_dir().join(format!("ibextract-tpl-{}.json", std::process::id()));
        std::fs::write(&path, TEMPLATES).unwrap();
        let tpl = FormTemplate::create(&path, &doc_with(Some("strict"))).unwrap();
        assert_eq!(tpl.map(|t| t.id().to_string()).as_deref(), Some("strict"));
        std::fs::remove_file(&path).unwrap();
        assert!(FormTemplate::create(&path, &doc_with(None)).is_err());
    }

    #[test]
    fn step_names_parse() {
        for step in PipelineStep::ALL {
            assert_eq!(step.name().parse::<PipelineStep>().unwrap(), step);
        }
    }
}
