//! The join itself: one extracted record (plus resolved attachments for
//! multi-source items) merged against the shared master dataset.
//!
//! `join` is a pure function of its inputs. It performs no I/O and never
//! mutates the master dataset, which is loaded once per order and read
//! concurrently by every item's mapping work.

use std::collections::BTreeMap;

use common::model::config::OutputSource;
use common::model::record::{AttachmentRecord, ExtractedRecord};
use log::warn;

use crate::mapping::effective::EffectiveConfig;
use crate::mapping::master::MasterDataset;
use crate::mapping::normalize::normalize;

/// Per-item values exposed to `output_meta` columns through `ctx:` sources.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub order_id: String,
    pub item_id: String,
    pub source_file: String,
}

impl RunContext {
    fn get(&self, key: &str, matched: bool) -> Option<String> {
        match key {
            "order_id" => Some(self.order_id.clone()),
            "item_id" => Some(self.item_id.clone()),
            "source_file" => Some(self.source_file.clone()),
            "matched" => Some(matched.to_string()),
            _ => None,
        }
    }
}

/// One output row: the primary record's fields merged with the matched
/// master row (and attachment records), plus the declared meta columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRow {
    pub columns: BTreeMap<String, String>,
    pub matched: bool,
}

/// Look up the record field supplying the value for `key_name`: first a
/// field aliased to that name, then a field carrying the name directly.
fn key_value(record: &ExtractedRecord, key_name: &str, config: &EffectiveConfig) -> String {
    for (field, target) in &config.column_aliases {
        if target == key_name {
            if let Some(value) = record.fields.get(field) {
                return value.clone();
            }
        }
    }
    record
        .fields
        .get(key_name)
        .cloned()
        .unwrap_or_default()
}

/// Compute the primary record's normalized join-key tuple.
pub fn primary_key_tuple(record: &ExtractedRecord, config: &EffectiveConfig) -> Vec<String> {
    config
        .external_join_keys
        .iter()
        .map(|key| normalize(&key_value(record, key, config), key, &config.key_policy))
        .collect()
}

/// Merge one record against the master dataset.
///
/// On a key miss the row is still emitted, with every master column present
/// and empty; unmatched items degrade, they are never dropped.
pub fn join(
    primary: &ExtractedRecord,
    attachment_map: &BTreeMap<String, AttachmentRecord>,
    master: &MasterDataset,
    config: &EffectiveConfig,
    ctx: &RunContext,
) -> JoinedRow {
    let suffix = config.merge_suffix.as_str();
    let mut columns = primary.fields.clone();

    let tuple = primary_key_tuple(primary, config);
    let master_row = if tuple.iter().all(String::is_empty) {
        None
    } else {
        master.lookup(&tuple)
    };
    let matched = master_row.is_some();

    // Master side: collisions with a primary field move to `<name><suffix>`.
    // On a miss the same columns appear empty so the output shape is stable.
    match master_row {
        Some(row) => {
            for (column, value) in row {
                if primary.fields.contains_key(column) {
                    columns.insert(format!("{}{}", column, suffix), value.clone());
                } else {
                    columns.insert(column.clone(), value.clone());
                }
            }
        }
        None => {
            for column in &master.headers {
                if primary.fields.contains_key(column) {
                    columns.insert(format!("{}{}", column, suffix), String::new());
                } else {
                    columns.insert(column.clone(), String::new());
                }
            }
        }
    }

    // Attachment side, multi-source only: each rule contributes the record
    // whose join value equals the primary's, same collision policy.
    for rule in &config.attachment_sources {
        let Some(key_name) = rule
            .join_key
            .as_deref()
            .or(config.internal_join_key.as_deref())
        else {
            continue;
        };
        let key = normalize(
            &key_value(primary, key_name, config),
            key_name,
            &config.key_policy,
        );
        if key.is_empty() {
            continue;
        }
        let Some(attachment) = attachment_map.get(&key) else {
            continue;
        };
        for (column, value) in &attachment.record.fields {
            if columns.contains_key(column) {
                let renamed = format!("{}{}", column, suffix);
                if columns.insert(renamed.clone(), value.clone()).is_some() {
                    warn!(
                        "attachment column '{}' overwrote an existing '{}' value",
                        column, renamed
                    );
                }
            } else {
                columns.insert(column.clone(), value.clone());
            }
        }
    }

    // Declared meta columns, computed against the post-merge row. A `col:`
    // reference to a column that does not exist resolves to empty.
    let meta: Vec<(String, String)> = config
        .output_meta
        .iter()
        .map(|(name, spec)| {
            let value = match OutputSource::parse(spec) {
                Some(OutputSource::Ctx(key)) => ctx.get(&key, matched).unwrap_or_default(),
                Some(OutputSource::Col(key)) => columns.get(&key).cloned().unwrap_or_default(),
                None => String::new(),
            };
            (name.clone(), value)
        })
        .collect();
    for (name, value) in meta {
        columns.insert(name, value);
    }

    JoinedRow { columns, matched }
}

#[cfg(test)]
mod tests {
    use common::model::config::{
        AttachmentSourceRule, ItemType, JoinNormalize, MappingConfig, MappingTemplate, ZfillSpec,
    };
    use common::model::record::ExtractedRecord;

    use super::*;
    use crate::mapping::effective::resolve_effective_config;
    use crate::mapping::master;
    use crate::storage::{BlobStore, LocalBlobStore};

    fn ctx() -> RunContext {
        RunContext {
            order_id: "ord-1".to_string(),
            item_id: "item-1".to_string(),
            source_file: "invoice.pdf".to_string(),
        }
    }

    fn template(config: MappingConfig, item_type: ItemType) -> MappingTemplate {
        MappingTemplate {
            id: "t1".to_string(),
            name: "accounts".to_string(),
            item_type,
            company_id: None,
            doctype_id: None,
            priority: 0,
            config,
        }
    }

    fn single_source_config() -> MappingConfig {
        MappingConfig {
            master_csv_path: "master/accounts.csv".to_string(),
            external_join_keys: vec!["acct".to_string()],
            internal_join_key: None,
            column_aliases: [("ACCOUNT_NO".to_string(), "acct".to_string())]
                .into_iter()
                .collect(),
            join_normalize: JoinNormalize {
                strip_non_digits: true,
                zfill: None,
            },
            output_meta: Default::default(),
            merge_suffix: "_master".to_string(),
            attachment_sources: Vec::new(),
        }
    }

    fn load_master(csv: &[u8], config: &EffectiveConfig) -> MasterDataset {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());
        store.put("master/accounts.csv", csv).expect("seed");
        master::load(
            &store,
            "master/accounts.csv",
            &config.external_join_keys,
            &config.key_policy,
        )
        .expect("load master")
    }

    fn record(fields: &[(&str, &str)]) -> ExtractedRecord {
        ExtractedRecord::new(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn aliased_key_joins_after_normalization() {
        let config = resolve_effective_config(
            &template(single_source_config(), ItemType::SingleSource),
            None,
        );
        let master = load_master(b"acct,name\n123,A\n", &config);
        let primary = record(&[("ACCOUNT_NO", "0123"), ("TOTAL", "19.99")]);

        let row = join(&primary, &BTreeMap::new(), &master, &config, &ctx());
        assert!(row.matched);
        assert_eq!(row.columns.get("name").map(String::as_str), Some("A"));
        assert_eq!(row.columns.get("TOTAL").map(String::as_str), Some("19.99"));
    }

    #[test]
    fn misses_emit_a_row_with_empty_master_columns() {
        let config = resolve_effective_config(
            &template(single_source_config(), ItemType::SingleSource),
            None,
        );
        let master = load_master(b"acct,name\n123,A\n", &config);

        let records = [
            record(&[("ACCOUNT_NO", "999")]),
            record(&[("ACCOUNT_NO", "")]),
        ];
        let rows: Vec<JoinedRow> = records
            .iter()
            .map(|r| join(r, &BTreeMap::new(), &master, &config, &ctx()))
            .collect();

        // Row count preserved, one row per input record.
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert!(!row.matched);
            assert_eq!(row.columns.get("name").map(String::as_str), Some(""));
            assert_eq!(row.columns.get("acct").map(String::as_str), Some(""));
        }
    }

    #[test]
    fn colliding_master_columns_get_the_merge_suffix() {
        let mut config = single_source_config();
        config.column_aliases.clear();
        let config =
            resolve_effective_config(&template(config, ItemType::SingleSource), None);
        let master = load_master(b"acct,status\n123,archived\n", &config);
        let primary = record(&[("acct", "123"), ("status", "open")]);

        let row = join(&primary, &BTreeMap::new(), &master, &config, &ctx());
        assert_eq!(row.columns.get("status").map(String::as_str), Some("open"));
        assert_eq!(
            row.columns.get("status_master").map(String::as_str),
            Some("archived")
        );
    }

    #[test]
    fn output_meta_columns_pull_from_context_and_row() {
        let mut config = single_source_config();
        config.output_meta = [
            ("Order".to_string(), "ctx:order_id".to_string()),
            ("Holder".to_string(), "col:name".to_string()),
            ("Missing".to_string(), "col:not_there".to_string()),
        ]
        .into_iter()
        .collect();
        let config =
            resolve_effective_config(&template(config, ItemType::SingleSource), None);
        let master = load_master(b"acct,name\n123,A\n", &config);
        let primary = record(&[("ACCOUNT_NO", "123")]);

        let row = join(&primary, &BTreeMap::new(), &master, &config, &ctx());
        assert_eq!(row.columns.get("Order").map(String::as_str), Some("ord-1"));
        assert_eq!(row.columns.get("Holder").map(String::as_str), Some("A"));
        assert_eq!(row.columns.get("Missing").map(String::as_str), Some(""));
    }

    #[test]
    fn multi_source_items_merge_matching_attachment_fields() {
        let mut config = single_source_config();
        config.internal_join_key = Some("REFERENCE".to_string());
        config.attachment_sources = vec![AttachmentSourceRule {
            path: "attachments".to_string(),
            filename_contains: None,
            join_key: None,
            label: None,
        }];
        let config = resolve_effective_config(&template(config, ItemType::MultiSource), None);
        let master = load_master(b"acct,name\n123,A\n", &config);

        let primary = record(&[("ACCOUNT_NO", "123"), ("REFERENCE", "77")]);
        let attachment = common::model::record::AttachmentRecord {
            storage_path: "attachments/a".to_string(),
            file_name: "stmt.pdf".to_string(),
            record: record(&[("REFERENCE", "0077"), ("BALANCE", "12.50")]),
        };
        let attachment_map =
            crate::mapping::attachments::resolve(std::slice::from_ref(&attachment), &config)
                .expect("resolve attachments");

        let row = join(&primary, &attachment_map, &master, &config, &ctx());
        assert!(row.matched);
        assert_eq!(row.columns.get("BALANCE").map(String::as_str), Some("12.50"));
        // The attachment's own key field collides with the primary's.
        assert_eq!(
            row.columns.get("REFERENCE_master").map(String::as_str),
            Some("0077")
        );
    }

    #[test]
    fn zfill_applies_to_both_sides_of_the_join() {
        let mut config = single_source_config();
        config.join_normalize.zfill = Some(ZfillSpec::Global(8));
        let config =
            resolve_effective_config(&template(config, ItemType::SingleSource), None);
        let master = load_master(b"acct,name\n123,A\n", &config);
        let primary = record(&[("ACCOUNT_NO", "AC/123")]);

        let row = join(&primary, &BTreeMap::new(), &master, &config, &ctx());
        assert!(row.matched);
    }
}
