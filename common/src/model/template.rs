use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An admin-uploaded output template ("special CSV" definition).
///
/// The document is a versioned JSON file: `column_order` fixes the output
/// column order, and every entry in it must name a key of
/// `column_definitions`. The backend validates the document at upload time
/// and stores it under a key derived from `template_name` and `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub template_name: String,
    /// Restricted to alphanumerics plus `.`, `-`, `_`; it becomes part of
    /// the storage key.
    pub version: String,
    pub column_order: Vec<String>,
    pub column_definitions: BTreeMap<String, ColumnDefinition>,
    /// Dataset the template renders against. Defaults to the mapped/joined
    /// dataset when absent.
    #[serde(default)]
    pub source_data: Option<String>,
}

/// How a single output column is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Copy `source_column` from the joined row.
    Source,
    /// Evaluate `expression` against the joined row.
    Computed,
    /// Emit `value` unconditionally.
    Constant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    #[serde(default)]
    pub source_column: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    /// Fallback when a source column is absent/empty or a computed
    /// expression fails. Empty string when not given.
    #[serde(default)]
    pub default_value: Option<String>,
}
