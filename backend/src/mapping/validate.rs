//! Save-time validation of mapping templates and defaults.
//!
//! Configuration problems are rejected here, before persistence, so they
//! can never surface in the middle of a running order. All issues found are
//! reported in one aggregated error.

use common::model::config::{ItemType, MappingDefault, MappingTemplate, OutputSource};

use crate::error::{MappingError, Result};
use crate::mapping::effective::{resolve_effective_config, EffectiveConfig};

const CTX_KEYS: [&str; 4] = ["order_id", "item_id", "source_file", "matched"];

fn config_issues(config: &EffectiveConfig, issues: &mut Vec<String>) {
    if config.master_csv_path.trim().is_empty() {
        issues.push("master_csv_path must not be empty".to_string());
    }

    if config.external_join_keys.is_empty() {
        issues.push("external_join_keys must name at least one key".to_string());
    }
    for (i, key) in config.external_join_keys.iter().enumerate() {
        if key.trim().is_empty() {
            issues.push(format!("external_join_keys[{}] is empty", i));
        }
    }
    let mut seen = std::collections::BTreeSet::new();
    for key in &config.external_join_keys {
        if !seen.insert(key.as_str()) {
            issues.push(format!("duplicate external join key '{}'", key));
        }
    }

    if config.merge_suffix.is_empty() {
        issues.push("merge_suffix must not be empty".to_string());
    }

    for (column, spec) in &config.output_meta {
        match OutputSource::parse(spec) {
            Some(OutputSource::Ctx(key)) => {
                if !CTX_KEYS.contains(&key.as_str()) {
                    issues.push(format!(
                        "output_meta column '{}' references unknown context key '{}'",
                        column, key
                    ));
                }
            }
            Some(OutputSource::Col(_)) => {}
            None => issues.push(format!(
                "output_meta column '{}' must use a 'ctx:' or 'col:' source, got '{}'",
                column, spec
            )),
        }
    }

    match config.item_type {
        ItemType::SingleSource => {
            if !config.attachment_sources.is_empty() {
                issues.push(
                    "attachment_sources only apply to multi_source templates".to_string(),
                );
            }
        }
        ItemType::MultiSource => {
            if config.attachment_sources.is_empty() {
                issues.push(
                    "multi_source templates need at least one attachment source rule"
                        .to_string(),
                );
            }
            for rule in &config.attachment_sources {
                if rule.path.trim().is_empty() {
                    issues.push("attachment rule with an empty path".to_string());
                }
                if rule.join_key.is_none() && config.internal_join_key.is_none() {
                    issues.push(format!(
                        "attachment rule '{}' has no join_key and no internal_join_key is set",
                        rule.path
                    ));
                }
            }
        }
    }
}

/// Validate a template before it is persisted.
pub fn validate_template(template: &MappingTemplate) -> Result<()> {
    let mut issues = Vec::new();
    if template.id.trim().is_empty() {
        issues.push("template id must not be empty".to_string());
    }
    if template.name.trim().is_empty() {
        issues.push("template name must not be empty".to_string());
    }

    config_issues(&resolve_effective_config(template, None), &mut issues);

    if issues.is_empty() {
        Ok(())
    } else {
        Err(MappingError::config(issues))
    }
}

/// Validate a default against its referenced template before it is
/// persisted. The merged effective config is what gets checked, so an
/// override that breaks an otherwise valid template is caught here.
pub fn validate_default(default: &MappingDefault, template: &MappingTemplate) -> Result<()> {
    let mut issues = Vec::new();
    if default.company_id.trim().is_empty() {
        issues.push("company_id must not be empty".to_string());
    }
    if default.doctype_id.trim().is_empty() {
        issues.push("doctype_id must not be empty".to_string());
    }
    if default.item_type != template.item_type {
        issues.push(format!(
            "default item_type '{}' does not match template item_type '{}'",
            default.item_type.as_str(),
            template.item_type.as_str()
        ));
    }

    config_issues(
        &resolve_effective_config(template, default.config_override.as_ref()),
        &mut issues,
    );

    if issues.is_empty() {
        Ok(())
    } else {
        Err(MappingError::config(issues))
    }
}
