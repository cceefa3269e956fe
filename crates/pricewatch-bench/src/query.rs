use crate::error::BenchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Symbolic name of a registered read-only analytics query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryName {
    AvgPricesByProductType,
    StoreStatisticsByCity,
    TopExpensiveProducts,
    ProductsByPriceRanges,
    PromoAnalysisByStore,
    ProductCreationDynamics,
}

impl QueryName {
    /// Catalog order; workloads cycle through it.
    pub const ALL: [QueryName; 6] = [
        QueryName::AvgPricesByProductType,
        QueryName::StoreStatisticsByCity,
        QueryName::TopExpensiveProducts,
        QueryName::ProductsByPriceRanges,
        QueryName::PromoAnalysisByStore,
        QueryName::ProductCreationDynamics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryName::AvgPricesByProductType => "avg_prices_by_product_type",
            QueryName::StoreStatisticsByCity => "store_statistics_by_city",
            QueryName::TopExpensiveProducts => "top_expensive_products",
            QueryName::ProductsByPriceRanges => "products_by_price_ranges",
            QueryName::PromoAnalysisByStore => "promo_analysis_by_store",
            QueryName::ProductCreationDynamics => "product_creation_dynamics",
        }
    }

    /// `count` names taken round-robin from [`QueryName::ALL`] (entry `i mod 6`).
    pub fn round_robin(count: usize) -> Vec<QueryName> {
        (0..count)
            .map(|i| Self::ALL[i % Self::ALL.len()])
            .collect()
    }
}

impl fmt::Display for QueryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryName {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == wanted)
            .ok_or_else(|| BenchError::UnknownQuery(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_cycles_catalog_order() {
        let names = QueryName::round_robin(8);
        assert_eq!(names.len(), 8);
        assert_eq!(names[0], QueryName::AvgPricesByProductType);
        assert_eq!(names[5], QueryName::ProductCreationDynamics);
        assert_eq!(names[6], QueryName::AvgPricesByProductType);
        assert_eq!(names[7], QueryName::StoreStatisticsByCity);
        assert!(QueryName::round_robin(0).is_empty());
    }

    #[test]
    fn names_parse_and_display() {
        for name in QueryName::ALL {
            assert_eq!(name.as_str().parse::<QueryName>().unwrap(), name);
            let json = serde_json::to_string(&name).unwrap();
            assert_eq!(json, format!("\"{}\"", name.as_str()));
        }
        let err = "drop_tables".parse::<QueryName>().unwrap_err();
        assert!(matches!(err, BenchError::UnknownQuery(ref n) if n == "drop_tables"));
    }
}
