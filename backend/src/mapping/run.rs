//! One order's mapping run, executed synchronously on a worker thread.
//!
//! The run resolves each item's effective configuration, loads every
//! distinct master dataset exactly once, maps the items in parallel against
//! the shared read-only index, and writes the deliverables to the blob
//! store under deterministic per-order keys. Re-running an unchanged order
//! therefore reproduces byte-identical outputs.
//!
//! Failure semantics follow the error taxonomy: a missing or malformed
//! master dataset and unresolved configuration abort the whole run; an
//! unmatched join never does.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::model::config::ItemType;
use common::model::record::AttachmentRecord;
use log::info;
use rayon::prelude::*;
use rusqlite::Connection;

use crate::error::{MappingError, Result};
use crate::mapping::attachments;
use crate::mapping::effective::{resolve_effective_config, EffectiveConfig};
use crate::mapping::join::{self, JoinedRow, RunContext};
use crate::mapping::master::{self, MasterDataset};
use crate::mapping::normalize::JoinKeyPolicy;
use crate::output;
use crate::storage::BlobStore;
use crate::store::{self, OrderItem};
use crate::template::{document, render};

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct MappingOutcome {
    pub items_mapped: usize,
    pub matched: usize,
    pub deliverables: Vec<String>,
}

/// Everything one item needs for its (pure) join, gathered up front so the
/// parallel section never touches the database.
struct ItemWork {
    item: OrderItem,
    config: EffectiveConfig,
    attachment_map: BTreeMap<String, AttachmentRecord>,
    master: Arc<MasterDataset>,
}

type MasterCacheKey = (String, Vec<String>, JoinKeyPolicy);

fn effective_config_for(conn: &Connection, company_id: &str, item: &OrderItem) -> Result<EffectiveConfig> {
    if let Some(default) = store::find_default(conn, company_id, &item.doctype_id, item.item_type)? {
        let template = store::get_template(conn, &default.template_id)?;
        return Ok(resolve_effective_config(
            &template,
            default.config_override.as_ref(),
        ));
    }

    let template = store::find_scoped_template(conn, company_id, &item.doctype_id, item.item_type)?
        .ok_or_else(|| {
            MappingError::Config(format!(
                "no mapping template matches item '{}' (company '{}', doctype '{}', {})",
                item.id,
                company_id,
                item.doctype_id,
                item.item_type.as_str()
            ))
        })?;
    Ok(resolve_effective_config(&template, None))
}

/// Map every item of `order_id` and write the deliverables.
///
/// `progress` is called after each mapped item with (done, total).
pub fn run_order_mapping(
    conn: &Connection,
    blobs: &dyn BlobStore,
    order_id: &str,
    progress: &(dyn Fn(usize, usize) + Sync),
) -> Result<MappingOutcome> {
    let order = store::get_order(conn, order_id)?;
    let items = store::list_items(conn, order_id)?;

    // Phase 1, sequential: resolve configs, load masters (one load per
    // distinct dataset/key/policy combination), resolve attachments.
    // Configuration is read once per run; a concurrent admin edit cannot
    // change it between items of the same order.
    let mut configs: HashMap<(String, ItemType), EffectiveConfig> = HashMap::new();
    let mut masters: HashMap<MasterCacheKey, Arc<MasterDataset>> = HashMap::new();
    let mut work = Vec::with_capacity(items.len());
    for item in items {
        let config_key = (item.doctype_id.clone(), item.item_type);
        let config = match configs.get(&config_key) {
            Some(resolved) => resolved.clone(),
            None => {
                let resolved = effective_config_for(conn, &order.company_id, &item)?;
                configs.insert(config_key, resolved.clone());
                resolved
            }
        };

        let cache_key: MasterCacheKey = (
            config.master_csv_path.clone(),
            config.external_join_keys.clone(),
            config.key_policy.clone(),
        );
        let master = match masters.get(&cache_key) {
            Some(loaded) => Arc::clone(loaded),
            None => {
                let loaded = Arc::new(master::load(
                    blobs,
                    &config.master_csv_path,
                    &config.external_join_keys,
                    &config.key_policy,
                )?);
                masters.insert(cache_key, Arc::clone(&loaded));
                loaded
            }
        };

        let attachment_map = match item.item_type {
            ItemType::MultiSource => {
                let attachment_records = store::list_attachments(conn, &item.id)?;
                attachments::resolve(&attachment_records, &config)?
            }
            ItemType::SingleSource => BTreeMap::new(),
        };

        work.push(ItemWork {
            item,
            config,
            attachment_map,
            master,
        });
    }

    // Phase 2, parallel: the join is a pure function over the shared
    // read-only masters, so items map independently.
    let total = work.len();
    let done = AtomicUsize::new(0);
    let rows: Vec<JoinedRow> = work
        .par_iter()
        .map(|unit| {
            let ctx = RunContext {
                order_id: order.id.clone(),
                item_id: unit.item.id.clone(),
                source_file: unit.item.source_file.clone(),
            };
            let row = join::join(
                &unit.item.record,
                &unit.attachment_map,
                &unit.master,
                &unit.config,
                &ctx,
            );
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            progress(finished, total);
            row
        })
        .collect();

    // Phase 3: deliverables.
    let mut deliverables = Vec::new();
    let table = output::table_from_rows(&rows);
    deliverables.push(blobs.put(
        &format!("runs/{}/mapped.csv", order.id),
        &output::to_csv_bytes(&table)?,
    )?);
    deliverables.push(blobs.put(
        &format!("runs/{}/mapped.xlsx", order.id),
        &output::to_xlsx_bytes(&table)?,
    )?);

    if let Some(template_path) = &order.output_template {
        let template = document::parse_document(&blobs.get(template_path)?)?;
        let known: BTreeSet<String> = rows
            .iter()
            .flat_map(|row| row.columns.keys().cloned())
            .collect();
        document::validate(&template, Some(&known))?;
        let special = render::render(&rows, &template)?;
        deliverables.push(blobs.put(
            &format!("runs/{}/special.csv", order.id),
            &output::to_csv_bytes(&special)?,
        )?);
    }

    let matched = rows.iter().filter(|row| row.matched).count();
    info!(
        "order {}: mapped {} item(s), {} matched, {} deliverable(s)",
        order.id,
        rows.len(),
        matched,
        deliverables.len()
    );

    Ok(MappingOutcome {
        items_mapped: rows.len(),
        matched,
        deliverables,
    })
}

#[cfg(test)]
mod tests {
    use rusqlite::params;

    use super::*;
    use crate::db;
    use crate::storage::LocalBlobStore;

    fn setup() -> (Connection, tempfile::TempDir, LocalBlobStore) {
        let conn = Connection::open_in_memory().expect("open db");
        db::init_schema(&conn).expect("schema");
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalBlobStore::new(dir.path());
        (conn, dir, store)
    }

    fn seed_order(conn: &Connection, id: &str, company: &str, output_template: Option<&str>) {
        conn.execute(
            "INSERT INTO orders (id, company_id, status, output_template)
             VALUES (?1, ?2, 'PENDING', ?3)",
            params![id, company, output_template],
        )
        .expect("insert order");
    }

    fn seed_item(
        conn: &Connection,
        id: &str,
        order_id: &str,
        item_type: &str,
        fields: &[(&str, &str)],
    ) {
        let record = serde_json::json!({
            "fields": fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<std::collections::BTreeMap<_, _>>()
        });
        conn.execute(
            "INSERT INTO order_items (id, order_id, doctype_id, item_type, source_file, record)
             VALUES (?1, ?2, 'invoice', ?3, ?4, ?5)",
            params![id, order_id, item_type, format!("{}.pdf", id), record.to_string()],
        )
        .expect("insert item");
    }

    fn seed_attachment(
        conn: &Connection,
        id: &str,
        item_id: &str,
        storage_path: &str,
        file_name: &str,
        fields: &[(&str, &str)],
    ) {
        let record = serde_json::json!({
            "fields": fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<std::collections::BTreeMap<_, _>>()
        });
        conn.execute(
            "INSERT INTO attachments (id, item_id, storage_path, file_name, record)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, item_id, storage_path, file_name, record.to_string()],
        )
        .expect("insert attachment");
    }

    fn seed_phone_template(conn: &Connection) {
        let config = serde_json::json!({
            "master_csv_path": "master/plans.csv",
            "external_join_keys": ["phone"],
            "column_aliases": {"PHONE": "phone"},
            "join_normalize": {"strip_non_digits": true},
            "merge_suffix": "_master"
        });
        conn.execute(
            "INSERT INTO mapping_templates (id, name, item_type, company_id, doctype_id, priority, config)
             VALUES ('plans', 'phone plans', 'single_source', NULL, NULL, 0, ?1)",
            params![config.to_string()],
        )
        .expect("insert template");
    }

    fn no_progress(_done: usize, _total: usize) {}

    #[test]
    fn single_source_end_to_end_renders_the_joined_plan() {
        let (conn, _dir, store) = setup();
        store
            .put("master/plans.csv", b"phone,plan\n5551234,Gold\n")
            .expect("seed master");
        let template = serde_json::json!({
            "template_name": "plans export",
            "version": "1",
            "column_order": ["Plan"],
            "column_definitions": {
                "Plan": {"type": "source", "source_column": "plan", "default_value": ""}
            }
        });
        store
            .put("templates/output/plans_1.json", template.to_string().as_bytes())
            .expect("seed template doc");

        seed_phone_template(&conn);
        seed_order(&conn, "ord-1", "acme", Some("templates/output/plans_1.json"));
        seed_item(&conn, "item-1", "ord-1", "single_source", &[("PHONE", "555-1234")]);

        let outcome =
            run_order_mapping(&conn, &store, "ord-1", &no_progress).expect("run mapping");
        assert_eq!(outcome.items_mapped, 1);
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.deliverables.len(), 3);

        let special = store.get("runs/ord-1/special.csv").expect("special csv");
        assert_eq!(String::from_utf8(special).expect("utf8"), "Plan\nGold\n");

        let mapped = String::from_utf8(store.get("runs/ord-1/mapped.csv").expect("csv"))
            .expect("utf8");
        assert!(mapped.contains("Gold"));
    }

    #[test]
    fn rerunning_an_unchanged_order_is_byte_identical() {
        let (conn, _dir, store) = setup();
        store
            .put(
                "master/plans.csv",
                b"phone,plan\n5551234,Gold\n5550000,Silver\n",
            )
            .expect("seed master");
        seed_phone_template(&conn);
        seed_order(&conn, "ord-1", "acme", None);
        seed_item(&conn, "item-1", "ord-1", "single_source", &[("PHONE", "555-1234")]);
        seed_item(&conn, "item-2", "ord-1", "single_source", &[("PHONE", "555-0000")]);
        seed_item(&conn, "item-3", "ord-1", "single_source", &[("PHONE", "555-9999")]);

        run_order_mapping(&conn, &store, "ord-1", &no_progress).expect("first run");
        let first_csv = store.get("runs/ord-1/mapped.csv").expect("csv");

        run_order_mapping(&conn, &store, "ord-1", &no_progress).expect("second run");
        let second_csv = store.get("runs/ord-1/mapped.csv").expect("csv");
        assert_eq!(first_csv, second_csv);
    }

    #[test]
    fn unmatched_items_still_produce_rows() {
        let (conn, _dir, store) = setup();
        store
            .put("master/plans.csv", b"phone,plan\n5551234,Gold\n")
            .expect("seed master");
        seed_phone_template(&conn);
        seed_order(&conn, "ord-1", "acme", None);
        seed_item(&conn, "item-1", "ord-1", "single_source", &[("PHONE", "555-1234")]);
        seed_item(&conn, "item-2", "ord-1", "single_source", &[("PHONE", "777-0000")]);

        let outcome =
            run_order_mapping(&conn, &store, "ord-1", &no_progress).expect("run mapping");
        assert_eq!(outcome.items_mapped, 2);
        assert_eq!(outcome.matched, 1);

        let mapped = String::from_utf8(store.get("runs/ord-1/mapped.csv").expect("csv"))
            .expect("utf8");
        // Header plus one line per item, matched or not.
        assert_eq!(mapped.lines().count(), 3);
    }

    #[test]
    fn missing_master_csv_aborts_the_run() {
        let (conn, _dir, store) = setup();
        seed_phone_template(&conn);
        seed_order(&conn, "ord-1", "acme", None);
        seed_item(&conn, "item-1", "ord-1", "single_source", &[("PHONE", "555-1234")]);

        match run_order_mapping(&conn, &store, "ord-1", &no_progress) {
            Err(MappingError::NotFound(path)) => assert!(path.contains("master/plans.csv")),
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn items_without_a_template_fail_as_configuration_errors() {
        let (conn, _dir, store) = setup();
        seed_order(&conn, "ord-1", "acme", None);
        seed_item(&conn, "item-1", "ord-1", "single_source", &[("PHONE", "1")]);

        match run_order_mapping(&conn, &store, "ord-1", &no_progress) {
            Err(MappingError::Config(message)) => assert!(message.contains("item-1")),
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn multi_source_items_pull_attachment_fields_through_the_internal_key() {
        let (conn, _dir, store) = setup();
        store
            .put("master/plans.csv", b"phone,plan\n5551234,Gold\n")
            .expect("seed master");

        let config = serde_json::json!({
            "master_csv_path": "master/plans.csv",
            "external_join_keys": ["phone"],
            "internal_join_key": "REFERENCE",
            "column_aliases": {"PHONE": "phone"},
            "join_normalize": {"strip_non_digits": true},
            "merge_suffix": "_master",
            "attachment_sources": [
                {"path": "attachments/statements", "filename_contains": "stmt"}
            ]
        });
        conn.execute(
            "INSERT INTO mapping_templates (id, name, item_type, company_id, doctype_id, priority, config)
             VALUES ('multi', 'plans with statements', 'multi_source', NULL, NULL, 0, ?1)",
            params![config.to_string()],
        )
        .expect("insert template");

        seed_order(&conn, "ord-1", "acme", None);
        seed_item(
            &conn,
            "item-1",
            "ord-1",
            "multi_source",
            &[("PHONE", "555-1234"), ("REFERENCE", "42")],
        );
        seed_attachment(
            &conn,
            "att-1",
            "item-1",
            "attachments/statements/2026-07",
            "stmt-july.pdf",
            &[("REFERENCE", "042"), ("BALANCE", "12.50")],
        );
        seed_attachment(
            &conn,
            "att-2",
            "item-1",
            "attachments/statements/2026-07",
            "invoice-july.pdf",
            &[("REFERENCE", "42"), ("BALANCE", "99.99")],
        );

        run_order_mapping(&conn, &store, "ord-1", &no_progress).expect("run mapping");
        let mapped = String::from_utf8(store.get("runs/ord-1/mapped.csv").expect("csv"))
            .expect("utf8");
        assert!(mapped.contains("12.50"));
        assert!(mapped.contains("Gold"));
        // The filename filter excluded the invoice attachment.
        assert!(!mapped.contains("99.99"));
    }
}
