//! The six analytical reads behind the price-monitor dashboards.
//!
//! Every function runs a single statement against the given connection and
//! returns a fully materialised `Vec<Record>`, never a cursor: results are
//! handed across thread and process boundaries by the benchmark engine.
//!
//! An optional deadline bounds each read. It is enforced twice: an SQLite
//! progress handler interrupts a long-running statement, and row
//! materialisation checks the clock between rows.

use crate::error::{Result, StoreError};
use crate::value::{Record, Value};
use crate::TIMESTAMP_FORMAT;
use chrono::{Duration, NaiveDateTime};
use rusqlite::{Connection, Params};
use std::time::Instant;

/// VM instructions between progress-handler callbacks.
const PROGRESS_OPS: i32 = 1_000;

pub const DEFAULT_TOP_PRODUCTS_LIMIT: usize = 10;

const AVG_PRICES_BY_PRODUCT_TYPE: &str = "
SELECT pt.id                  AS id,
       pt.name                AS product_type_name,
       ROUND(AVG(p.regular_price), 2) AS avg_regular_price,
       ROUND(AVG(p.promo_price), 2)   AS avg_promo_price,
       COUNT(p.id)            AS product_count
FROM product_type pt
JOIN product p ON p.product_type_id = pt.id AND p.is_active = 1
GROUP BY pt.id, pt.name
ORDER BY avg_regular_price DESC";

const STORE_STATISTICS_BY_CITY: &str = "
SELECT s.city                 AS city,
       COUNT(DISTINCT s.id)   AS store_count,
       COUNT(p.id)            AS total_products,
       ROUND(AVG(p.regular_price), 2) AS avg_price,
       COUNT(p.promo_price)   AS promo_products_count
FROM store s
LEFT JOIN product p ON p.store_id = s.id AND p.is_active = 1
WHERE s.is_active = 1
GROUP BY s.city
ORDER BY store_count DESC, city";

const TOP_EXPENSIVE_PRODUCTS: &str = "
SELECT p.name          AS product_name,
       p.sku           AS sku,
       p.regular_price AS regular_price,
       p.promo_price   AS promo_price,
       CASE WHEN p.promo_price IS NOT NULL
            THEN ROUND(p.regular_price - p.promo_price, 2)
            ELSE 0 END AS discount,
       s.name          AS store_name,
       s.city          AS city,
       pt.name         AS product_type_name
FROM product p
JOIN store s         ON s.id = p.store_id
JOIN product_type pt ON pt.id = p.product_type_id
WHERE p.is_active = 1
ORDER BY p.regular_price DESC, p.id
LIMIT ?1";

const PRODUCTS_BY_PRICE_RANGES: &str = "
SELECT CASE WHEN p.regular_price < 30  THEN '0-30 UAH'
            WHEN p.regular_price < 60  THEN '30-60 UAH'
            WHEN p.regular_price < 100 THEN '60-100 UAH'
            ELSE '100+ UAH' END        AS price_range,
       pt.name                         AS product_type_name,
       COUNT(p.id)                     AS count,
       ROUND(COUNT(p.id) * 100.0 /
             (SELECT COUNT(*) FROM product WHERE is_active = 1), 2) AS percentage
FROM product p
JOIN product_type pt ON pt.id = p.product_type_id
WHERE p.is_active = 1
GROUP BY price_range, product_type_name
ORDER BY price_range, product_type_name";

const PROMO_ANALYSIS_BY_STORE: &str = "
SELECT s.id           AS id,
       s.name         AS store_name,
       s.city         AS city,
       COUNT(p.id)    AS promo_products,
       ROUND(AVG((p.regular_price - p.promo_price) * 100.0 / p.regular_price), 2) AS avg_discount_percent,
       ROUND(SUM(p.regular_price - p.promo_price), 2) AS total_savings
FROM store s
JOIN product p ON p.store_id = s.id
WHERE s.is_active = 1 AND p.is_active = 1 AND p.promo_price IS NOT NULL
GROUP BY s.id, s.name, s.city
ORDER BY promo_products DESC, s.id";

const PRODUCT_CREATION_DYNAMICS: &str = "
SELECT strftime('%Y-%m-01', p.created_at) AS month,
       pt.name                            AS product_type_name,
       COUNT(p.id)                        AS products_added
FROM product p
JOIN product_type pt ON pt.id = p.product_type_id
WHERE p.is_active = 1 AND p.created_at >= ?1
GROUP BY month, product_type_name
ORDER BY month, product_type_name";

fn check_deadline(deadline: Option<Instant>) -> Result<()> {
    match deadline {
        Some(limit) if Instant::now() >= limit => Err(StoreError::DeadlineExceeded),
        _ => Ok(()),
    }
}

/// Run `sql` and collect every row. Columns named in `date_columns` are parsed
/// as calendar dates.
fn materialize<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    date_columns: &[&str],
    deadline: Option<Instant>,
) -> Result<Vec<Record>> {
    check_deadline(deadline)?;
    if let Some(limit) = deadline {
        conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= limit));
    }
    let rows = collect_rows(conn, sql, params, date_columns, deadline);
    if deadline.is_some() {
        conn.progress_handler(PROGRESS_OPS, None::<fn() -> bool>);
    }
    rows
}

fn collect_rows<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    date_columns: &[&str],
    deadline: Option<Instant>,
) -> Result<Vec<Record>> {
    let mut stmt = conn.prepare(sql).map_err(StoreError::from_query)?;
    let columns: Vec<(String, bool)> = stmt
        .column_names()
        .into_iter()
        .map(|name| (name.to_string(), date_columns.contains(&name)))
        .collect();
    let mut rows = stmt.query(params).map_err(StoreError::from_query)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(StoreError::from_query)? {
        check_deadline(deadline)?;
        let mut record = Record::with_capacity(columns.len());
        for (idx, (name, as_date)) in columns.iter().enumerate() {
            let raw = row.get_ref(idx).map_err(StoreError::from_query)?;
            record.push(name.clone(), Value::from_sql(raw, *as_date));
        }
        out.push(record);
    }
    Ok(out)
}

fn finish(query: &'static str, started: Instant, rows: &[Record]) {
    tracing::debug!(
        query,
        rows = rows.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "analytics query finished"
    );
}

pub fn avg_prices_by_product_type(
    conn: &Connection,
    deadline: Option<Instant>,
) -> Result<Vec<Record>> {
    let started = Instant::now();
    let rows = materialize(conn, AVG_PRICES_BY_PRODUCT_TYPE, [], &[], deadline)?;
    finish("avg_prices_by_product_type", started, &rows);
    Ok(rows)
}

pub fn store_statistics_by_city(
    conn: &Connection,
    deadline: Option<Instant>,
) -> Result<Vec<Record>> {
    let started = Instant::now();
    let rows = materialize(conn, STORE_STATISTICS_BY_CITY, [], &[], deadline)?;
    finish("store_statistics_by_city", started, &rows);
    Ok(rows)
}

pub fn top_expensive_products(
    conn: &Connection,
    limit: usize,
    deadline: Option<Instant>,
) -> Result<Vec<Record>> {
    let started = Instant::now();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = materialize(conn, TOP_EXPENSIVE_PRODUCTS, [limit], &[], deadline)?;
    finish("top_expensive_products", started, &rows);
    Ok(rows)
}

pub fn products_by_price_ranges(
    conn: &Connection,
    deadline: Option<Instant>,
) -> Result<Vec<Record>> {
    let started = Instant::now();
    let rows = materialize(conn, PRODUCTS_BY_PRICE_RANGES, [], &[], deadline)?;
    finish("products_by_price_ranges", started, &rows);
    Ok(rows)
}

pub fn promo_analysis_by_store(
    conn: &Connection,
    deadline: Option<Instant>,
) -> Result<Vec<Record>> {
    let started = Instant::now();
    let rows = materialize(conn, PROMO_ANALYSIS_BY_STORE, [], &[], deadline)?;
    finish("promo_analysis_by_store", started, &rows);
    Ok(rows)
}

/// Monthly product additions per type over the year preceding `now`.
pub fn product_creation_dynamics(
    conn: &Connection,
    now: NaiveDateTime,
    deadline: Option<Instant>,
) -> Result<Vec<Record>> {
    let started = Instant::now();
    let since = (now - Duration::days(365))
        .format(TIMESTAMP_FORMAT)
        .to_string();
    let rows = materialize(
        conn,
        PRODUCT_CREATION_DYNAMICS,
        [since],
        &["month"],
        deadline,
    )?;
    finish("product_creation_dynamics", started, &rows);
    Ok(rows)
}
