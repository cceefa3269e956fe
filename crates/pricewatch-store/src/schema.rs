//! Catalog schema: product types, stores and products, plus the indexes the
//! analytics queries lean on.

use crate::error::Result;
use rusqlite::Connection;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS product_type (
    id          INTEGER PRIMARY KEY,
    name        TEXT    NOT NULL UNIQUE,
    slug        TEXT    NOT NULL UNIQUE,
    description TEXT    NOT NULL DEFAULT '',
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS store (
    id          INTEGER PRIMARY KEY,
    name        TEXT    NOT NULL UNIQUE,
    description TEXT    NOT NULL DEFAULT '',
    is_active   INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL,
    address     TEXT    NOT NULL,
    city        TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS product (
    id              INTEGER PRIMARY KEY,
    name            TEXT    NOT NULL UNIQUE,
    description     TEXT    NOT NULL DEFAULT '',
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT    NOT NULL,
    updated_at      TEXT    NOT NULL,
    product_type_id INTEGER NOT NULL REFERENCES product_type(id) ON DELETE RESTRICT,
    store_id        INTEGER NOT NULL REFERENCES store(id) ON DELETE CASCADE,
    sku             TEXT    NOT NULL UNIQUE,
    regular_price   REAL    NOT NULL,
    promo_price     REAL,
    promo_ends_at   TEXT
);

CREATE INDEX IF NOT EXISTS product_is_active_idx     ON product(is_active);
CREATE INDEX IF NOT EXISTS product_type_id_idx       ON product(product_type_id);
CREATE INDEX IF NOT EXISTS product_store_id_idx      ON product(store_id);
CREATE INDEX IF NOT EXISTS product_regular_price_idx ON product(regular_price);
CREATE INDEX IF NOT EXISTS product_promo_price_idx   ON product(promo_price);
CREATE INDEX IF NOT EXISTS product_created_at_idx    ON product(created_at);
CREATE INDEX IF NOT EXISTS product_active_type_idx   ON product(is_active, product_type_id);
CREATE INDEX IF NOT EXISTS product_active_store_idx  ON product(is_active, store_id);
CREATE INDEX IF NOT EXISTS store_city_idx            ON store(city);
CREATE INDEX IF NOT EXISTS store_is_active_idx       ON store(is_active);
"#;

/// Create tables and indexes if they do not exist yet.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Remove every catalog row, children first.
pub fn clear_catalog(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "DELETE FROM product;
         DELETE FROM store;
         DELETE FROM product_type;",
    )?;
    Ok(())
}

/// Row counts as `(product_types, stores, products)`.
pub fn catalog_counts(conn: &Connection) -> Result<(u64, u64, u64)> {
    let count = |table: &str| -> Result<u64> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(n.max(0) as u64)
    };
    Ok((count("product_type")?, count("store")?, count("product")?))
}
