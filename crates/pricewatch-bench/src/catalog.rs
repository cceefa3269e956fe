//! Query catalog: `QueryName` → operation.
//!
//! A catalog is built fresh for each worker (thread mode) or each task (inside
//! a worker process) by a [`CatalogProvider`]. Nothing in a catalog is shared
//! across workers, and every SQLite operation opens and drops its own
//! connection.

use crate::error::{BenchError, Result, TaskFailure};
use crate::query::QueryName;
use chrono::{NaiveDateTime, Utc};
use pricewatch_store::analytics::{self, DEFAULT_TOP_PRODUCTS_LIMIT};
use pricewatch_store::{Connection, Record, StoreConn};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-invocation context handed to an operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryContext {
    pub deadline: Option<Instant>,
}

impl QueryContext {
    /// A timeout too large to represent as an `Instant` leaves no deadline.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            deadline: timeout.and_then(|limit| Instant::now().checked_add(limit)),
        }
    }
}

/// A registered analytics operation returning a materialised result.
pub type QueryOp =
    Arc<dyn Fn(&QueryContext) -> std::result::Result<Vec<Record>, TaskFailure> + Send + Sync>;

#[derive(Clone, Default)]
pub struct QueryCatalog {
    ops: HashMap<QueryName, QueryOp>,
}

impl QueryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the operation for `name`.
    pub fn register<F>(mut self, name: QueryName, op: F) -> Self
    where
        F: Fn(&QueryContext) -> std::result::Result<Vec<Record>, TaskFailure>
            + Send
            + Sync
            + 'static,
    {
        self.ops.insert(name, Arc::new(op));
        self
    }

    pub fn operation(&self, name: QueryName) -> Result<&QueryOp> {
        self.ops
            .get(&name)
            .ok_or_else(|| BenchError::UnknownQuery(name.to_string()))
    }

    pub fn contains(&self, name: QueryName) -> bool {
        self.ops.contains_key(&name)
    }

    /// Every name in `queries` must be registered.
    pub fn validate(&self, queries: &[QueryName]) -> Result<()> {
        for name in queries {
            self.operation(*name)?;
        }
        Ok(())
    }

    /// Look up and run `name`. A missing entry becomes a task failure here;
    /// callers validate names up front so this only trips on a broken provider.
    pub fn invoke(
        &self,
        name: QueryName,
        ctx: &QueryContext,
    ) -> std::result::Result<Vec<Record>, TaskFailure> {
        match self.ops.get(&name) {
            Some(op) => op(ctx),
            None => Err(TaskFailure::query(format!("query '{name}' is not registered"))),
        }
    }

    /// The six analytics reads against the SQLite file at `database`.
    pub fn sqlite(database: impl Into<PathBuf>, top_products_limit: usize) -> Self {
        let database: Arc<Path> = Arc::from(database.into().into_boxed_path());
        let mut catalog = Self::new();
        for name in QueryName::ALL {
            let database = Arc::clone(&database);
            catalog = catalog.register(name, move |ctx| {
                let conn = StoreConn::open_read_only(&database)?;
                run_analytics(
                    name,
                    conn.connection(),
                    top_products_limit,
                    Utc::now().naive_utc(),
                    ctx,
                )
            });
        }
        catalog
    }
}

impl fmt::Debug for QueryCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.ops.keys().copied().collect();
        names.sort();
        f.debug_struct("QueryCatalog").field("queries", &names).finish()
    }
}

fn run_analytics(
    name: QueryName,
    conn: &Connection,
    top_products_limit: usize,
    now: NaiveDateTime,
    ctx: &QueryContext,
) -> std::result::Result<Vec<Record>, TaskFailure> {
    let deadline = ctx.deadline;
    tracing::debug!(query = %name, "executing analytics query");
    let rows = match name {
        QueryName::AvgPricesByProductType => analytics::avg_prices_by_product_type(conn, deadline),
        QueryName::StoreStatisticsByCity => analytics::store_statistics_by_city(conn, deadline),
        QueryName::TopExpensiveProducts => {
            analytics::top_expensive_products(conn, top_products_limit, deadline)
        }
        QueryName::ProductsByPriceRanges => analytics::products_by_price_ranges(conn, deadline),
        QueryName::PromoAnalysisByStore => analytics::promo_analysis_by_store(conn, deadline),
        QueryName::ProductCreationDynamics => {
            analytics::product_creation_dynamics(conn, now, deadline)
        }
    }?;
    Ok(rows)
}

/// Builds a fresh [`QueryCatalog`] for each worker.
pub trait CatalogProvider: Send + Sync {
    fn catalog(&self) -> Result<QueryCatalog>;
}

impl<F> CatalogProvider for F
where
    F: Fn() -> Result<QueryCatalog> + Send + Sync,
{
    fn catalog(&self) -> Result<QueryCatalog> {
        self()
    }
}

/// Provider for the SQLite analytics catalog.
#[derive(Debug, Clone)]
pub struct SqliteCatalogProvider {
    database: PathBuf,
    top_products_limit: usize,
}

impl SqliteCatalogProvider {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            top_products_limit: DEFAULT_TOP_PRODUCTS_LIMIT,
        }
    }

    pub fn with_top_products_limit(mut self, limit: usize) -> Self {
        self.top_products_limit = limit;
        self
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    pub fn top_products_limit(&self) -> usize {
        self.top_products_limit
    }
}

impl CatalogProvider for SqliteCatalogProvider {
    fn catalog(&self) -> Result<QueryCatalog> {
        if self.top_products_limit == 0 {
            return Err(BenchError::CatalogSetup(
                "top_products_limit must be at least 1".to_string(),
            ));
        }
        Ok(QueryCatalog::sqlite(
            self.database.clone(),
            self.top_products_limit,
        ))
    }
}
