use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Discriminates how an order item is mapped.
///
/// `SingleSource` items are joined against the master dataset using only the
/// fields extracted from the primary file. `MultiSource` items additionally
/// pull fields from attachment files, matched through an internal join key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    SingleSource,
    MultiSource,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::SingleSource => "single_source",
            ItemType::MultiSource => "multi_source",
        }
    }

    pub fn parse(value: &str) -> Option<ItemType> {
        match value {
            "single_source" => Some(ItemType::SingleSource),
            "multi_source" => Some(ItemType::MultiSource),
            _ => None,
        }
    }
}

/// Zero-padding width for join keys: a single width applied to every key, or
/// a per-key width map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZfillSpec {
    Global(u32),
    PerKey(BTreeMap<String, u32>),
}

/// Normalization applied to join-key values on both sides of a join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinNormalize {
    /// Remove every character that is not `0`-`9` before comparing.
    #[serde(default)]
    pub strip_non_digits: bool,
    /// Left-pad with `"0"` up to the resolved width. Values are never
    /// truncated, and an empty value is never padded.
    #[serde(default)]
    pub zfill: Option<ZfillSpec>,
}

/// One attachment-selection rule for multi-source items.
///
/// An attachment matches a rule when its storage location starts with `path`
/// and, if `filename_contains` is set, its file name contains that substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSourceRule {
    pub path: String,
    #[serde(default)]
    pub filename_contains: Option<String>,
    /// Field name carrying the attachment's join value. Falls back to the
    /// config-level `internal_join_key` when absent.
    #[serde(default)]
    pub join_key: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_merge_suffix() -> String {
    "_master".to_string()
}

/// Mapping logic carried by a template: where the master dataset lives, how
/// join keys are derived and normalized, and what extra output columns the
/// joined rows carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Blob-store path of the reference CSV to join against.
    pub master_csv_path: String,
    /// Master-dataset column names forming the join-key tuple, in order.
    pub external_join_keys: Vec<String>,
    /// Default field name shared between the primary record and attachments.
    /// Only meaningful for multi-source templates.
    #[serde(default)]
    pub internal_join_key: Option<String>,
    /// Extracted-field name -> master-dataset column name.
    #[serde(default)]
    pub column_aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub join_normalize: JoinNormalize,
    /// Output column name -> `"ctx:<key>"` or `"col:<key>"` source spec.
    #[serde(default)]
    pub output_meta: BTreeMap<String, String>,
    /// Suffix appended to master-side columns whose name collides with a
    /// column already present in the row.
    #[serde(default = "default_merge_suffix")]
    pub merge_suffix: String,
    /// Attachment-selection rules, in processing order. Multi-source only.
    #[serde(default)]
    pub attachment_sources: Vec<AttachmentSourceRule>,
}

/// Partial override layered on top of a template's normalization policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinNormalizeOverride {
    #[serde(default)]
    pub strip_non_digits: Option<bool>,
    #[serde(default)]
    pub zfill: Option<ZfillSpec>,
}

/// Partial `MappingConfig` carried by a mapping default. Absent fields
/// inherit the template's value; present fields win, an empty string being
/// an explicit request to clear an optional scalar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingConfigOverride {
    #[serde(default)]
    pub master_csv_path: Option<String>,
    #[serde(default)]
    pub external_join_keys: Option<Vec<String>>,
    #[serde(default)]
    pub internal_join_key: Option<String>,
    /// Merged per key into the template's aliases; template-only keys survive.
    #[serde(default)]
    pub column_aliases: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub join_normalize: Option<JoinNormalizeOverride>,
    /// Merged per key into the template's output meta.
    #[serde(default)]
    pub output_meta: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub merge_suffix: Option<String>,
    /// When present and non-empty, replaces the template's rule list
    /// wholesale. Rule order and identity matter, so rules never merge.
    #[serde(default)]
    pub attachment_sources: Option<Vec<AttachmentSourceRule>>,
}

/// A reusable mapping template, optionally scoped to a company and/or
/// document type. `priority` breaks ties when several scoped templates match
/// the same item and no explicit default exists; higher wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingTemplate {
    pub id: String,
    pub name: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub doctype_id: Option<String>,
    #[serde(default)]
    pub priority: i64,
    pub config: MappingConfig,
}

/// Binds a (company, document type, item type) triple to a template, with an
/// optional partial config override. At most one default exists per triple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDefault {
    pub company_id: String,
    pub doctype_id: String,
    pub item_type: ItemType,
    pub template_id: String,
    #[serde(default)]
    pub config_override: Option<MappingConfigOverride>,
}

/// Parsed form of an `output_meta` source spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSource {
    /// Pulled from the run context (order id, item id, ...).
    Ctx(String),
    /// Pulled from an already-present column of the joined row.
    Col(String),
}

impl OutputSource {
    pub fn parse(spec: &str) -> Option<OutputSource> {
        if let Some(key) = spec.strip_prefix("ctx:") {
            return Some(OutputSource::Ctx(key.to_string()));
        }
        if let Some(key) = spec.strip_prefix("col:") {
            return Some(OutputSource::Col(key.to_string()));
        }
        None
    }
}
