//! Persistence for mapping templates, defaults, and order data.
//!
//! Plain SQL over the shared SQLite database. Template and default configs
//! are stored as JSON columns; order item and attachment records are the
//! extraction service's JSON output, consumed read-only by the mapping run.

use common::model::config::{ItemType, MappingConfig, MappingConfigOverride, MappingDefault, MappingTemplate};
use common::model::record::{AttachmentRecord, ExtractedRecord};
use rusqlite::{params, Connection};

use crate::error::{MappingError, Result};

/// An order whose uploaded files have been extracted and now await mapping.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    pub company_id: String,
    pub status: String,
    /// Optional blob path of an output template document ("special CSV").
    pub output_template: Option<String>,
}

/// One extracted primary file within an order.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub doctype_id: String,
    pub item_type: ItemType,
    pub source_file: String,
    pub record: ExtractedRecord,
}

fn parse_item_type(raw: &str) -> Result<ItemType> {
    ItemType::parse(raw)
        .ok_or_else(|| MappingError::Format(format!("unknown item_type '{}'", raw)))
}

pub fn save_template(conn: &Connection, template: &MappingTemplate) -> Result<()> {
    let config = serde_json::to_string(&template.config)?;
    conn.execute(
        "INSERT OR REPLACE INTO mapping_templates
             (id, name, item_type, company_id, doctype_id, priority, config)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            template.id,
            template.name,
            template.item_type.as_str(),
            template.company_id,
            template.doctype_id,
            template.priority,
            config
        ],
    )?;
    Ok(())
}

/// Raw `mapping_templates` row, before the JSON/enum columns are decoded.
struct TemplateRow {
    id: String,
    name: String,
    item_type: String,
    company_id: Option<String>,
    doctype_id: Option<String>,
    priority: i64,
    config: String,
}

fn read_template_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemplateRow> {
    Ok(TemplateRow {
        id: row.get(0)?,
        name: row.get(1)?,
        item_type: row.get(2)?,
        company_id: row.get(3)?,
        doctype_id: row.get(4)?,
        priority: row.get(5)?,
        config: row.get(6)?,
    })
}

fn decode_template(row: TemplateRow) -> Result<MappingTemplate> {
    Ok(MappingTemplate {
        item_type: parse_item_type(&row.item_type)?,
        config: serde_json::from_str::<MappingConfig>(&row.config)?,
        id: row.id,
        name: row.name,
        company_id: row.company_id,
        doctype_id: row.doctype_id,
        priority: row.priority,
    })
}

pub fn get_template(conn: &Connection, id: &str) -> Result<MappingTemplate> {
    let mut stmt = conn.prepare(
        "SELECT id, name, item_type, company_id, doctype_id, priority, config
         FROM mapping_templates WHERE id = ?1",
    )?;
    match stmt.query_row(params![id], read_template_row) {
        Ok(row) => decode_template(row),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(MappingError::NotFound(format!("mapping template '{}'", id)))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn list_templates(conn: &Connection) -> Result<Vec<MappingTemplate>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, item_type, company_id, doctype_id, priority, config
         FROM mapping_templates ORDER BY name, id",
    )?;
    let rows = stmt.query_map([], read_template_row)?;

    let mut templates = Vec::new();
    for row in rows {
        templates.push(decode_template(row?)?);
    }
    Ok(templates)
}

pub fn delete_template(conn: &Connection, id: &str) -> Result<()> {
    let affected = conn.execute("DELETE FROM mapping_templates WHERE id = ?1", params![id])?;
    if affected == 0 {
        return Err(MappingError::NotFound(format!("mapping template '{}'", id)));
    }
    Ok(())
}

/// Upsert keyed on (company, doctype, item_type): at most one default per
/// triple ever exists.
pub fn upsert_default(conn: &Connection, default: &MappingDefault) -> Result<()> {
    let config_override = default
        .config_override
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT OR REPLACE INTO mapping_defaults
             (company_id, doctype_id, item_type, template_id, config_override)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            default.company_id,
            default.doctype_id,
            default.item_type.as_str(),
            default.template_id,
            config_override
        ],
    )?;
    Ok(())
}

pub fn find_default(
    conn: &Connection,
    company_id: &str,
    doctype_id: &str,
    item_type: ItemType,
) -> Result<Option<MappingDefault>> {
    let mut stmt = conn.prepare(
        "SELECT template_id, config_override FROM mapping_defaults
         WHERE company_id = ?1 AND doctype_id = ?2 AND item_type = ?3",
    )?;
    let row = stmt.query_row(
        params![company_id, doctype_id, item_type.as_str()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
            ))
        },
    );
    match row {
        Ok((template_id, override_json)) => {
            let config_override: Option<MappingConfigOverride> = override_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?;
            Ok(Some(MappingDefault {
                company_id: company_id.to_string(),
                doctype_id: doctype_id.to_string(),
                item_type,
                template_id,
                config_override,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Pick the best-scoped template for an item when no explicit default
/// exists: matching item type, company/doctype scope either unset or equal,
/// highest priority first, id as the deterministic tie-break.
pub fn find_scoped_template(
    conn: &Connection,
    company_id: &str,
    doctype_id: &str,
    item_type: ItemType,
) -> Result<Option<MappingTemplate>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, item_type, company_id, doctype_id, priority, config
         FROM mapping_templates
         WHERE item_type = ?1
           AND (company_id IS NULL OR company_id = ?2)
           AND (doctype_id IS NULL OR doctype_id = ?3)
         ORDER BY priority DESC, id ASC
         LIMIT 1",
    )?;
    match stmt.query_row(
        params![item_type.as_str(), company_id, doctype_id],
        read_template_row,
    ) {
        Ok(row) => Ok(Some(decode_template(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub fn get_order(conn: &Connection, id: &str) -> Result<Order> {
    let mut stmt = conn.prepare(
        "SELECT id, company_id, status, output_template FROM orders WHERE id = ?1",
    )?;
    let row = stmt.query_row(params![id], |row| {
        Ok(Order {
            id: row.get(0)?,
            company_id: row.get(1)?,
            status: row.get(2)?,
            output_template: row.get(3)?,
        })
    });
    match row {
        Ok(order) => Ok(order),
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            Err(MappingError::NotFound(format!("order '{}'", id)))
        }
        Err(err) => Err(err.into()),
    }
}

pub fn set_order_status(conn: &Connection, id: &str, status: &str) -> Result<()> {
    conn.execute(
        "UPDATE orders SET status = ?1 WHERE id = ?2",
        params![status, id],
    )?;
    Ok(())
}

pub fn list_items(conn: &Connection, order_id: &str) -> Result<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, order_id, doctype_id, item_type, source_file, record
         FROM order_items WHERE order_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![order_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (id, order_id, doctype_id, item_type, source_file, record_json) = row?;
        items.push(OrderItem {
            id,
            order_id,
            doctype_id,
            item_type: parse_item_type(&item_type)?,
            source_file,
            record: serde_json::from_str(&record_json)?,
        });
    }
    Ok(items)
}

pub fn list_attachments(conn: &Connection, item_id: &str) -> Result<Vec<AttachmentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT storage_path, file_name, record
         FROM attachments WHERE item_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![item_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut attachments = Vec::new();
    for row in rows {
        let (storage_path, file_name, record_json) = row?;
        attachments.push(AttachmentRecord {
            storage_path,
            file_name,
            record: serde_json::from_str(&record_json)?,
        });
    }
    Ok(attachments)
}
