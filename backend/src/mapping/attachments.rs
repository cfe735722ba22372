//! Attachment selection for multi-source items.
//!
//! Each configured rule names a storage path (prefix match) and optionally a
//! filename substring; attachments matching a rule contribute their own
//! join-key value, normalized with the run's policy, to the attachment map
//! the join engine looks primary records up in.

use std::collections::BTreeMap;

use common::model::record::AttachmentRecord;
use log::{debug, warn};

use crate::error::{MappingError, Result};
use crate::mapping::effective::EffectiveConfig;
use crate::mapping::normalize::normalize;

fn rule_matches(rule_path: &str, filename_contains: Option<&str>, att: &AttachmentRecord) -> bool {
    if !att.storage_path.starts_with(rule_path) {
        return false;
    }
    match filename_contains {
        Some(fragment) => att.file_name.contains(fragment),
        None => true,
    }
}

/// Build the join map from normalized join-key value to attachment record.
///
/// Rules run in configured order, attachments in processing order; when two
/// attachments resolve to the same key the later one wins, which is logged
/// as a warning rather than escalated.
pub fn resolve(
    attachments: &[AttachmentRecord],
    config: &EffectiveConfig,
) -> Result<BTreeMap<String, AttachmentRecord>> {
    let mut resolved = BTreeMap::new();

    for rule in &config.attachment_sources {
        let key_name = match rule
            .join_key
            .as_deref()
            .or(config.internal_join_key.as_deref())
        {
            Some(name) => name,
            // Save-time validation rejects this; refuse to guess if a stale
            // config slips through.
            None => {
                return Err(MappingError::Config(format!(
                    "attachment rule '{}' has no join key and no internal_join_key is set",
                    rule.path
                )))
            }
        };

        for att in attachments {
            if !rule_matches(&rule.path, rule.filename_contains.as_deref(), att) {
                continue;
            }

            let raw = att
                .record
                .fields
                .get(key_name)
                .map(String::as_str)
                .unwrap_or("");
            let key = normalize(raw, key_name, &config.key_policy);
            if key.is_empty() {
                warn!(
                    "attachment '{}' has no usable '{}' value, skipped",
                    att.file_name, key_name
                );
                continue;
            }

            debug!(
                "rule '{}'{} matched attachment '{}' with key {}",
                rule.path,
                rule.label
                    .as_deref()
                    .map(|l| format!(" ({})", l))
                    .unwrap_or_default(),
                att.file_name,
                key
            );
            if let Some(previous) = resolved.insert(key.clone(), att.clone()) {
                warn!(
                    "attachments '{}' and '{}' share join key {}, keeping the later one",
                    previous.file_name, att.file_name, key
                );
            }
        }
    }

    Ok(resolved)
}
