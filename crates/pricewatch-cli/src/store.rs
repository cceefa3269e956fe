//! `seed` and `query` commands.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use pricewatch_bench::{
    BenchConfig, CatalogProvider, QueryContext, QueryName, SqliteCatalogProvider,
};
use pricewatch_store::{seed_catalog, SeedConfig, StoreConn};

use crate::DbArgs;

#[derive(Args, Debug)]
pub struct SeedArgs {
    #[command(flatten)]
    pub target: DbArgs,

    /// RNG seed (deterministic).
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Products generated per store.
    #[arg(long, default_value_t = 40)]
    pub products_per_store: usize,

    /// Share of products carrying a promo price (0.0..=1.0).
    #[arg(long, default_value_t = 0.3)]
    pub promo_ratio: f64,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Query name, e.g. `avg_prices_by_product_type`.
    pub name: QueryName,

    #[command(flatten)]
    pub target: DbArgs,

    /// Row limit for `top_expensive_products`.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Abort the query after this many seconds (0 disables).
    #[arg(long)]
    pub timeout_secs: Option<f64>,
}

pub fn cmd_seed(args: &SeedArgs, config: &BenchConfig) -> Result<()> {
    if !(0.0..=1.0).contains(&args.promo_ratio) {
        return Err(anyhow!("--promo-ratio must be within 0.0..=1.0"));
    }
    let db = args.target.resolve(config)?;
    if let Some(parent) = db.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut conn = StoreConn::open_read_write(&db)?;
    let seed_config = SeedConfig {
        seed: args.seed,
        products_per_store: args.products_per_store,
        promo_ratio: args.promo_ratio,
        ..SeedConfig::default()
    };
    let summary = seed_catalog(conn.connection_mut(), &seed_config)
        .with_context(|| format!("failed to seed {}", db.display()))?;

    eprintln!("{} {}", "seeded".green().bold(), db.display().to_string().bold());
    println!("  product_types={}", summary.product_types);
    println!("  stores={}", summary.stores);
    println!(
        "  products={} (promo={})",
        summary.products, summary.promo_products
    );
    println!("  elapsed_ms={}", summary.elapsed_ms);
    Ok(())
}

pub fn cmd_query(args: &QueryArgs, config: &BenchConfig) -> Result<()> {
    let db = args.target.resolve(config)?;
    let provider = SqliteCatalogProvider::new(&db)
        .with_top_products_limit(args.limit.unwrap_or(config.top_products_limit));
    let catalog = provider.catalog()?;

    let timeout = crate::bench::resolve_timeout(args.timeout_secs, config)?;
    let records = catalog
        .invoke(args.name, &QueryContext::with_timeout(timeout))
        .map_err(|failure| anyhow!("query '{}' failed: {failure}", args.name))?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    eprintln!("{} {} rows", args.name.to_string().bold(), records.len());
    Ok(())
}
