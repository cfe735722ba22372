use rusqlite::Connection;

/// SQLite database file, created next to the binary.
pub const DB_FILE: &str = "docbridge.sqlite";

pub fn open() -> rusqlite::Result<Connection> {
    Connection::open(DB_FILE)
}

/// Create the tables the backend relies on. Safe to call on every start.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS mapping_templates (
             id          TEXT PRIMARY KEY,
             name        TEXT NOT NULL,
             item_type   TEXT NOT NULL,
             company_id  TEXT,
             doctype_id  TEXT,
             priority    INTEGER NOT NULL DEFAULT 0,
             config      TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS mapping_defaults (
             company_id      TEXT NOT NULL,
             doctype_id      TEXT NOT NULL,
             item_type       TEXT NOT NULL,
             template_id     TEXT NOT NULL,
             config_override TEXT,
             PRIMARY KEY (company_id, doctype_id, item_type)
         );
         CREATE TABLE IF NOT EXISTS orders (
             id              TEXT PRIMARY KEY,
             company_id      TEXT NOT NULL,
             status          TEXT NOT NULL DEFAULT 'PENDING',
             output_template TEXT
         );
         CREATE TABLE IF NOT EXISTS order_items (
             id          TEXT PRIMARY KEY,
             order_id    TEXT NOT NULL,
             doctype_id  TEXT NOT NULL,
             item_type   TEXT NOT NULL,
             source_file TEXT NOT NULL,
             record      TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS attachments (
             id           TEXT PRIMARY KEY,
             item_id      TEXT NOT NULL,
             storage_path TEXT NOT NULL,
             file_name    TEXT NOT NULL,
             record       TEXT NOT NULL
         );",
    )
}
