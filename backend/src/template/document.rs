//! Upload-time handling of output template documents.
//!
//! A document is parsed from the uploaded JSON, checked as a whole, and only
//! then persisted to the blob store. Validation reports every problem in one
//! aggregated error so the admin does not fix columns one upload at a time.

use std::collections::BTreeSet;

use common::model::template::{ColumnKind, TemplateDocument};
use log::warn;
use regex::Regex;

use crate::error::{MappingError, Result};
use crate::template::expr;

pub fn parse_document(data: &[u8]) -> Result<TemplateDocument> {
    serde_json::from_slice(data)
        .map_err(|err| MappingError::Format(format!("invalid template document: {}", err)))
}

/// Validate a template document.
///
/// When `known_columns` is given (the mapped column names of the dataset
/// the template will render against), computed expressions may only
/// reference placeholders from that set.
pub fn validate(
    document: &TemplateDocument,
    known_columns: Option<&BTreeSet<String>>,
) -> Result<()> {
    let mut issues = Vec::new();

    if document.template_name.trim().is_empty() {
        issues.push("template_name must not be empty".to_string());
    }

    // The version becomes part of the storage key, keep it to a safe charset.
    let version_re = Regex::new(r"^[A-Za-z0-9._-]+$")
        .map_err(|err| MappingError::Format(format!("regex error: {}", err)))?;
    if !version_re.is_match(&document.version) {
        issues.push(format!(
            "version '{}' may only contain alphanumerics, '.', '-' and '_'",
            document.version
        ));
    }

    if document.column_order.is_empty() {
        issues.push("column_order must name at least one column".to_string());
    }

    let missing: Vec<&str> = document
        .column_order
        .iter()
        .filter(|name| !document.column_definitions.contains_key(*name))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        issues.push(format!(
            "column_order references undefined column(s): {}",
            missing.join(", ")
        ));
    }

    for name in document.column_definitions.keys() {
        if !document.column_order.iter().any(|ordered| ordered == name) {
            warn!(
                "template '{}': column '{}' is defined but not in column_order",
                document.template_name, name
            );
        }
    }

    for (name, definition) in &document.column_definitions {
        match definition.kind {
            ColumnKind::Source => {
                if definition
                    .source_column
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or("")
                    .is_empty()
                {
                    issues.push(format!("source column '{}' needs a source_column", name));
                }
            }
            ColumnKind::Computed => {
                let Some(expression) = definition.expression.as_deref() else {
                    issues.push(format!("computed column '{}' needs an expression", name));
                    continue;
                };
                match expr::parse(expression) {
                    Ok(parsed) => {
                        if let Some(known) = known_columns {
                            let mut referenced = BTreeSet::new();
                            expr::placeholders(&parsed, &mut referenced);
                            let unknown: Vec<String> = referenced
                                .into_iter()
                                .filter(|field| !known.contains(field))
                                .collect();
                            if !unknown.is_empty() {
                                issues.push(format!(
                                    "computed column '{}' references unknown column(s): {}",
                                    name,
                                    unknown.join(", ")
                                ));
                            }
                        }
                    }
                    Err(err) => {
                        issues.push(format!("computed column '{}': {}", name, err));
                    }
                }
            }
            ColumnKind::Constant => {
                if definition.value.is_none() {
                    issues.push(format!("constant column '{}' needs a value", name));
                }
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(MappingError::config(issues))
    }
}

/// Blob key the document is stored under, derived from name and version.
pub fn storage_key(document: &TemplateDocument) -> String {
    let slug: String = document
        .template_name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("templates/output/{}_{}.json", slug, document.version)
}
