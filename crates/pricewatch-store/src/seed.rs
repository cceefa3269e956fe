//! Deterministic synthetic catalog.
//!
//! Mirrors the shape of a real retail-price monitor: a handful of drink
//! categories, 4-6 stores per city across several chains, and a configurable
//! number of products per store, some of them on promotion.

use crate::error::Result;
use crate::schema::{clear_catalog, ensure_schema};
use crate::TIMESTAMP_FORMAT;
use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::time::Instant;

/// xorshift64* generator; deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        // Avoid the degenerate all-zero state.
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    pub fn gen_range_usize(&mut self, upper: usize) -> usize {
        if upper == 0 {
            return 0;
        }
        (self.next_u64() % (upper as u64)) as usize
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

struct ProductTypeSeed {
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    price_range: (f64, f64),
    brands: &'static [&'static str],
}

const PRODUCT_TYPES: &[ProductTypeSeed] = &[
    ProductTypeSeed {
        name: "Beer",
        slug: "beer",
        description: "Lager, ale and craft beer",
        price_range: (18.0, 95.0),
        brands: &["Lvivske", "Obolon", "Chernigivske", "Carlsberg", "Tuborg", "Stella Artois"],
    },
    ProductTypeSeed {
        name: "Wine",
        slug: "wine",
        description: "Still red, white and rose wine",
        price_range: (90.0, 650.0),
        brands: &["Shabo", "Koblevo", "Inkerman", "Chateau Chizay", "Bolgrad"],
    },
    ProductTypeSeed {
        name: "Whiskey",
        slug: "whiskey",
        description: "Scotch, bourbon and Irish whiskey",
        price_range: (350.0, 2400.0),
        brands: &["Jameson", "Jack Daniel's", "Johnnie Walker", "Ballantine's", "Bell's"],
    },
    ProductTypeSeed {
        name: "Vodka",
        slug: "vodka",
        description: "Classic and flavoured vodka",
        price_range: (120.0, 480.0),
        brands: &["Nemiroff", "Khortytsa", "Absolut", "Finlandia", "Morosha"],
    },
    ProductTypeSeed {
        name: "Cognac",
        slug: "cognac",
        description: "Cognac and brandy",
        price_range: (260.0, 3200.0),
        brands: &["Shustov", "Hennessy", "Martell", "Tavria", "Remy Martin"],
    },
    ProductTypeSeed {
        name: "Champagne",
        slug: "champagne",
        description: "Sparkling wine",
        price_range: (110.0, 2900.0),
        brands: &["Artemivske", "Bagrationi", "Moet", "Martini Asti", "Bolgrad Brut"],
    },
    ProductTypeSeed {
        name: "Liqueur",
        slug: "liqueur",
        description: "Sweet and herbal liqueurs",
        price_range: (160.0, 900.0),
        brands: &["Baileys", "Jagermeister", "Amaretto", "Sheridan's", "Becherovka"],
    },
    ProductTypeSeed {
        name: "Rum",
        slug: "rum",
        description: "White, gold and spiced rum",
        price_range: (280.0, 1500.0),
        brands: &["Bacardi", "Captain Morgan", "Havana Club", "Kraken", "Bumbu"],
    },
];

const CITIES: &[&str] = &[
    "Kyiv",
    "Kharkiv",
    "Odesa",
    "Dnipro",
    "Lviv",
    "Zaporizhzhia",
    "Vinnytsia",
    "Poltava",
    "Chernivtsi",
    "Ivano-Frankivsk",
];

const STORE_CHAINS: &[&str] = &["Silpo", "ATB", "Novus", "Fora", "Tavria V"];

const VOLUMES: &[&str] = &["0.33 l", "0.5 l", "0.7 l", "0.75 l", "1 l"];

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub seed: u64,
    pub products_per_store: usize,
    pub min_stores_per_city: usize,
    pub max_stores_per_city: usize,
    /// Share of products carrying a promo price.
    pub promo_ratio: f64,
    /// Creation timestamps are spread over this many days before `now`.
    pub history_days: i64,
    pub now: NaiveDateTime,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            products_per_store: 40,
            min_stores_per_city: 4,
            max_stores_per_city: 6,
            promo_ratio: 0.3,
            history_days: 540,
            now: Utc::now().naive_utc(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedSummary {
    pub product_types: usize,
    pub stores: usize,
    pub products: usize,
    pub promo_products: usize,
    pub elapsed_ms: u64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Replace the catalog contents with a freshly generated dataset.
pub fn seed_catalog(conn: &mut Connection, config: &SeedConfig) -> Result<SeedSummary> {
    let start = Instant::now();
    let mut rng = XorShift64::new(config.seed);
    let now_text = config.now.format(TIMESTAMP_FORMAT).to_string();

    let tx = conn.transaction()?;
    ensure_schema(&tx)?;
    clear_catalog(&tx)?;

    let mut type_ids = Vec::with_capacity(PRODUCT_TYPES.len());
    {
        let mut insert = tx.prepare_cached(
            "INSERT INTO product_type (name, slug, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
        )?;
        for pt in PRODUCT_TYPES {
            insert.execute(params![pt.name, pt.slug, pt.description, now_text])?;
            type_ids.push(tx.last_insert_rowid());
        }
    }

    let mut store_ids = Vec::new();
    {
        let mut insert = tx.prepare_cached(
            "INSERT INTO store (name, description, is_active, created_at, updated_at, address, city)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)",
        )?;
        let spread = config
            .max_stores_per_city
            .saturating_sub(config.min_stores_per_city)
            + 1;
        let mut counter = 1usize;
        for city in CITIES {
            let stores_in_city = config.min_stores_per_city + rng.gen_range_usize(spread);
            for _ in 0..stores_in_city {
                let chain = STORE_CHAINS[rng.gen_range_usize(STORE_CHAINS.len())];
                let name = format!("{chain} {city} #{counter}");
                let address = format!("Testova St, {}", 1 + rng.gen_range_usize(200));
                let description = format!("{chain} store in {city}");
                let is_active = !rng.gen_bool(0.05);
                insert.execute(params![name, description, is_active, now_text, address, city])?;
                store_ids.push(tx.last_insert_rowid());
                counter += 1;
            }
        }
    }

    let mut products = 0usize;
    let mut promo_products = 0usize;
    {
        let mut insert = tx.prepare_cached(
            "INSERT INTO product (name, description, is_active, created_at, updated_at,
                                  product_type_id, store_id, sku, regular_price, promo_price, promo_ends_at)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for store_id in &store_ids {
            for _ in 0..config.products_per_store {
                let type_idx = rng.gen_range_usize(PRODUCT_TYPES.len());
                let pt = &PRODUCT_TYPES[type_idx];
                let brand = pt.brands[rng.gen_range_usize(pt.brands.len())];
                let volume = VOLUMES[rng.gen_range_usize(VOLUMES.len())];
                let serial = products + 1;
                let name = format!("{brand} {volume} #{serial}");
                let sku = format!("{}-{serial:07}", pt.slug.to_uppercase());

                let (lo, hi) = pt.price_range;
                let regular = round2(lo + rng.next_f64() * (hi - lo));
                let (promo, promo_ends) = if rng.gen_bool(config.promo_ratio) {
                    let discount = 0.05 + rng.next_f64() * 0.30;
                    let ends =
                        config.now.date() + Duration::days(1 + rng.gen_range_usize(30) as i64);
                    promo_products += 1;
                    (
                        Some(round2(regular * (1.0 - discount))),
                        Some(ends.format("%Y-%m-%d").to_string()),
                    )
                } else {
                    (None, None)
                };

                let age_secs = rng.gen_range_usize((config.history_days.max(1) * 86_400) as usize);
                let created_at = (config.now - Duration::seconds(age_secs as i64))
                    .format(TIMESTAMP_FORMAT)
                    .to_string();
                let is_active = !rng.gen_bool(0.05);

                insert.execute(params![
                    name,
                    format!("{} by {brand}", pt.name),
                    is_active,
                    created_at,
                    type_ids[type_idx],
                    store_id,
                    sku,
                    regular,
                    promo,
                    promo_ends,
                ])?;
                products += 1;
            }
        }
    }

    tx.commit()?;

    let summary = SeedSummary {
        product_types: type_ids.len(),
        stores: store_ids.len(),
        products,
        promo_products,
        elapsed_ms: start.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
    };
    tracing::info!(
        product_types = summary.product_types,
        stores = summary.stores,
        products = summary.products,
        promo_products = summary.promo_products,
        "seeded catalog"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xorshift_is_deterministic() {
        let mut a = XorShift64::new(42);
        let mut b = XorShift64::new(42);
        for _ in 0..64 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        let f = XorShift64::new(7).next_f64();
        assert!((0.0..1.0).contains(&f));
    }

    #[test]
    fn zero_seed_does_not_stall() {
        let mut rng = XorShift64::new(0);
        assert_ne!(rng.next_u64(), 0);
        assert_eq!(rng.gen_range_usize(0), 0);
    }

    #[test]
    fn seeding_is_reproducible() {
        let config = SeedConfig {
            seed: 9,
            products_per_store: 5,
            now: NaiveDateTime::parse_from_str("2026-06-01 12:00:00", TIMESTAMP_FORMAT)
                .expect("now"),
            ..SeedConfig::default()
        };
        let mut first = Connection::open_in_memory().expect("open");
        let mut second = Connection::open_in_memory().expect("open");
        let a = seed_catalog(&mut first, &config).expect("seed");
        let b = seed_catalog(&mut second, &config).expect("seed");
        assert_eq!(a.stores, b.stores);
        assert_eq!(a.products, b.products);
        assert_eq!(a.promo_products, b.promo_products);
        assert_eq!(a.products, a.stores * 5);
        assert_eq!(a.product_types, PRODUCT_TYPES.len());
        assert!(a.stores >= CITIES.len() * 4 && a.stores <= CITIES.len() * 6);
    }

    #[test]
    fn reseeding_replaces_rows() {
        let config = SeedConfig {
            products_per_store: 2,
            ..SeedConfig::default()
        };
        let mut conn = Connection::open_in_memory().expect("open");
        let first = seed_catalog(&mut conn, &config).expect("seed");
        let second = seed_catalog(&mut conn, &config).expect("reseed");
        let (_, stores, products) = crate::schema::catalog_counts(&conn).expect("counts");
        assert_eq!(stores as usize, second.stores);
        assert_eq!(products as usize, second.products);
        assert_eq!(first.products, second.products);
    }
}
