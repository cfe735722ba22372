//! Template/default layering.
//!
//! An order item is mapped with the template's config plus the matching
//! default's partial override. Scalars override when present, multi-key
//! structures merge per key, and attachment rule lists replace wholesale
//! (rule order and identity matter). The result is a pure function of its
//! two inputs, so recomputing it is free of surprises.

use std::collections::BTreeMap;

use common::model::config::{
    AttachmentSourceRule, ItemType, MappingConfigOverride, MappingTemplate, ZfillSpec,
};

use crate::mapping::normalize::JoinKeyPolicy;

/// The fully merged configuration one mapping run actually uses.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub item_type: ItemType,
    pub master_csv_path: String,
    pub external_join_keys: Vec<String>,
    pub internal_join_key: Option<String>,
    pub column_aliases: BTreeMap<String, String>,
    pub key_policy: JoinKeyPolicy,
    pub output_meta: BTreeMap<String, String>,
    pub merge_suffix: String,
    pub attachment_sources: Vec<AttachmentSourceRule>,
}

pub fn resolve_effective_config(
    template: &MappingTemplate,
    overlay: Option<&MappingConfigOverride>,
) -> EffectiveConfig {
    let base = &template.config;
    let mut effective = EffectiveConfig {
        item_type: template.item_type,
        master_csv_path: base.master_csv_path.clone(),
        external_join_keys: base.external_join_keys.clone(),
        internal_join_key: base.internal_join_key.clone(),
        column_aliases: base.column_aliases.clone(),
        key_policy: JoinKeyPolicy::from_normalize(&base.join_normalize),
        output_meta: base.output_meta.clone(),
        merge_suffix: base.merge_suffix.clone(),
        attachment_sources: base.attachment_sources.clone(),
    };

    let Some(overlay) = overlay else {
        return effective;
    };

    if let Some(path) = &overlay.master_csv_path {
        effective.master_csv_path = path.clone();
    }
    if let Some(keys) = &overlay.external_join_keys {
        effective.external_join_keys = keys.clone();
    }
    if let Some(key) = &overlay.internal_join_key {
        // An empty override string is an explicit clear, absent inherits.
        effective.internal_join_key = if key.is_empty() {
            None
        } else {
            Some(key.clone())
        };
    }
    if let Some(aliases) = &overlay.column_aliases {
        for (field, column) in aliases {
            effective
                .column_aliases
                .insert(field.clone(), column.clone());
        }
    }
    if let Some(join_normalize) = &overlay.join_normalize {
        if let Some(strip) = join_normalize.strip_non_digits {
            effective.key_policy.strip_non_digits = strip;
        }
        match &join_normalize.zfill {
            // A scalar width cannot partially override a map in a
            // well-defined way, so it replaces the template's zfill
            // wholesale.
            Some(ZfillSpec::Global(width)) => {
                effective.key_policy.zfill_global = Some(*width);
                effective.key_policy.zfill_per_key.clear();
            }
            // A per-key map merges key by key; template keys not named in
            // the override survive, as does a template-level global width.
            Some(ZfillSpec::PerKey(widths)) => {
                for (key, width) in widths {
                    effective.key_policy.zfill_per_key.insert(key.clone(), *width);
                }
            }
            None => {}
        }
    }
    if let Some(meta) = &overlay.output_meta {
        for (column, source) in meta {
            effective.output_meta.insert(column.clone(), source.clone());
        }
    }
    if let Some(suffix) = &overlay.merge_suffix {
        effective.merge_suffix = suffix.clone();
    }
    if let Some(rules) = &overlay.attachment_sources {
        if !rules.is_empty() {
            effective.attachment_sources = rules.clone();
        }
    }

    effective
}
