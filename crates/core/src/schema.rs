//! Static description of what we ask the scanner for and how its answer is read.
//!
//! Everything here is data: the pipeline receives a [`ScannerSchema`] value instead of
//! reaching for globals, so a changed upstream column list is a new schema, not a code edit.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const SCHEMA_VERSION: u32 = 1;

pub const NAME_COLUMN: &str = "name";
pub const SCORE_COLUMN: &str = "Recommend.All";
pub const CATEGORY_COLUMN: &str = "recommendation_category";

const COLUMNS: &[&str] = &[
    "name",
    "description",
    "logoid",
    "update_mode",
    "type",
    "typespecs",
    "close",
    "pricescale",
    "minmov",
    "fractional",
    "minmove2",
    "currency",
    "change",
    "volume",
    "relative_volume_10d_calc",
    "market_cap_basic",
    "fundamental_currency_code",
    "price_earnings_ttm",
    "earnings_per_share_diluted_ttm",
    "earnings_per_share_diluted_yoy_growth_ttm",
    "dividends_yield_current",
    "sector.tr",
    "market",
    "sector",
    "recommendation_mark",
    "open",
    "high",
    "low",
    "VWAP",
    "premarket_open",
    "premarket_high",
    "premarket_low",
    "premarket_close",
    "postmarket_open",
    "postmarket_high",
    "postmarket_low",
    "postmarket_close",
    "SMA20",
    "SMA50",
    "SMA100",
    "EMA20",
    "EMA50",
    "EMA200",
    "RSI",
    "MACD.macd",
    "MACD.signal",
    "BB.upper",
    "BB.basis",
    "BB.lower",
    "ATR",
    "gap",
    "Pivot.M.Classic.R1",
    "Pivot.M.Classic.S1",
    "Perf.W",
    "Perf.1M",
    "Perf.3M",
    "beta_1_year",
    "relative_volume_10d_calc|1W",
    "average_volume_10d_calc",
    "average_volume_30d_calc",
    "Candle.3BlackCrows",
    "Candle.3WhiteSoldiers",
    "Candle.AbandonedBaby.Bearish",
    "Candle.AbandonedBaby.Bullish",
    "Candle.Doji",
    "Candle.Doji.Dragonfly",
    "Candle.Doji.Gravestone",
    "Candle.Engulfing.Bearish",
    "Candle.Engulfing.Bullish",
    "Candle.EveningStar",
    "Candle.Hammer",
    "Candle.HangingMan",
    "Candle.Harami.Bearish",
    "Candle.Harami.Bullish",
    "Candle.InvertedHammer",
    "Candle.Kicking.Bearish",
    "Candle.Kicking.Bullish",
    "Candle.LongShadow.Lower",
    "Candle.LongShadow.Upper",
    "Candle.Marubozu.Black",
    "Candle.Marubozu.White",
    "Candle.MorningStar",
    "Candle.ShootingStar",
    "Candle.SpinningTop.Black",
    "Candle.SpinningTop.White",
    "Candle.TriStar.Bearish",
    "Candle.TriStar.Bullish",
    "exchange",
    "Recommend.All",
];

/// Moving averages, RSI, MACD, Bollinger Bands, ATR and monthly classic pivots.
const TECHNICAL_COLUMNS: &[&str] = &[
    "SMA20",
    "SMA50",
    "SMA100",
    "EMA20",
    "EMA50",
    "EMA200",
    "RSI",
    "MACD.macd",
    "MACD.signal",
    "BB.upper",
    "BB.basis",
    "BB.lower",
    "ATR",
    "Pivot.M.Classic.R1",
    "Pivot.M.Classic.S1",
];

const SYMBOLSET: &[&str] = &["SYML:NSE;NIFTY", "SYML:NSE;NIFTYJR"];
const MARKETS: &[&str] = &["india"];

const HEADERS: &[(&str, &str)] = &[
    ("accept", "application/json"),
    ("accept-language", "en-IN,en-GB;q=0.9,en;q=0.8,en-US;q=0.7"),
    ("content-type", "text/plain;charset=UTF-8"),
    ("origin", "https://in.tradingview.com"),
    ("referer", "https://in.tradingview.com/"),
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36 Edg/136.0.0.0",
    ),
];

const QUERY_PARAMS: &[(&str, &str)] = &[("label-product", "screener-stock")];

/// Discrete signal bucket derived from the composite recommendation score.
///
/// Variant order is the order of the score bands; `Unknown` sorts last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    StrongSell,
    Sell,
    Neutral,
    Buy,
    StrongBuy,
    Unknown,
}

impl RecommendationCategory {
    pub const ALL: [RecommendationCategory; 6] = [
        RecommendationCategory::StrongSell,
        RecommendationCategory::Sell,
        RecommendationCategory::Neutral,
        RecommendationCategory::Buy,
        RecommendationCategory::StrongBuy,
        RecommendationCategory::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationCategory::StrongSell => "strong_sell",
            RecommendationCategory::Sell => "sell",
            RecommendationCategory::Neutral => "neutral",
            RecommendationCategory::Buy => "buy",
            RecommendationCategory::StrongBuy => "strong_buy",
            RecommendationCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RecommendationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategoryLabel(pub String);

impl FromStr for RecommendationCategory {
    type Err = UnknownCategoryLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecommendationCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategoryLabel(s.to_string()))
    }
}

/// Band edges over `Recommend.All`, ascending:
/// `[strong_sell_min, strong_sell_max, sell_max, neutral_max, buy_max, strong_buy_max]`.
///
/// The first band is closed on both ends; every later band is `(previous edge, edge]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecommendationThresholds {
    pub bounds: [f64; 6],
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            bounds: [-1.0, -0.5, -0.1, 0.1, 0.5, 1.0],
        }
    }
}

impl RecommendationThresholds {
    pub fn classify(&self, score: f64) -> RecommendationCategory {
        let [lo, strong_sell, sell, neutral, buy, hi] = self.bounds;
        if !score.is_finite() || score < lo || score > hi {
            return RecommendationCategory::Unknown;
        }

        if score <= strong_sell {
            RecommendationCategory::StrongSell
        } else if score <= sell {
            RecommendationCategory::Sell
        } else if score <= neutral {
            RecommendationCategory::Neutral
        } else if score <= buy {
            RecommendationCategory::Buy
        } else {
            RecommendationCategory::StrongBuy
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let finite = self.bounds.iter().all(|b| b.is_finite());
        let ascending = self.bounds.windows(2).all(|w| w[0] < w[1]);
        if !finite || !ascending {
            return Err(ConfigError::Schema(format!(
                "threshold bounds must be finite and strictly ascending (got {:?})",
                self.bounds
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerSchema {
    pub version: u32,
    pub columns: Vec<String>,
    pub technical_columns: Vec<String>,
    pub symbolset: Vec<String>,
    pub markets: Vec<String>,
    pub sort_by: String,
    pub sort_order: String,
    pub headers: Vec<(String, String)>,
    pub query_params: Vec<(String, String)>,
    pub thresholds: RecommendationThresholds,
}

impl Default for ScannerSchema {
    fn default() -> Self {
        fn owned(xs: &[&str]) -> Vec<String> {
            xs.iter().map(|s| s.to_string()).collect()
        }
        fn owned_pairs(xs: &[(&str, &str)]) -> Vec<(String, String)> {
            xs.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }

        Self {
            version: SCHEMA_VERSION,
            columns: owned(COLUMNS),
            technical_columns: owned(TECHNICAL_COLUMNS),
            symbolset: owned(SYMBOLSET),
            markets: owned(MARKETS),
            sort_by: "market_cap_basic".to_string(),
            sort_order: "desc".to_string(),
            headers: owned_pairs(HEADERS),
            query_params: owned_pairs(QUERY_PARAMS),
            thresholds: RecommendationThresholds::default(),
        }
    }
}

impl ScannerSchema {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.columns.is_empty() {
            return Err(ConfigError::Schema("column list is empty".to_string()));
        }

        let mut seen = BTreeSet::new();
        for col in &self.columns {
            if !seen.insert(col.as_str()) {
                return Err(ConfigError::Schema(format!("duplicate column {col}")));
            }
        }

        for required in [NAME_COLUMN, SCORE_COLUMN] {
            if !seen.contains(required) {
                return Err(ConfigError::Schema(format!("missing required column {required}")));
            }
        }

        if seen.contains(CATEGORY_COLUMN) {
            return Err(ConfigError::Schema(format!(
                "{CATEGORY_COLUMN} is derived and must not be requested upstream"
            )));
        }

        if let Some(col) = self
            .technical_columns
            .iter()
            .find(|c| !seen.contains(c.as_str()))
        {
            return Err(ConfigError::Schema(format!(
                "technical column {col} is not in the column list"
            )));
        }

        if self.symbolset.is_empty() || self.markets.is_empty() {
            return Err(ConfigError::Schema(
                "symbolset and markets must be non-empty".to_string(),
            ));
        }

        self.thresholds.validate()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Columns of the persisted table: the requested columns followed by the derived category.
    pub fn cache_header(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(CATEGORY_COLUMN))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_is_valid() {
        let schema = ScannerSchema::default();
        schema.validate().unwrap();
        assert_eq!(schema.column_index(NAME_COLUMN), Some(0));
        assert_eq!(schema.columns.last().map(String::as_str), Some(SCORE_COLUMN));
        assert_eq!(schema.technical_columns.len(), 15);
    }

    #[test]
    fn rejects_technical_column_outside_column_list() {
        let mut schema = ScannerSchema::default();
        schema.technical_columns.push("Stoch.K".to_string());
        assert!(schema.validate().is_err());
    }

    #[test]
    fn rejects_missing_score_column() {
        let mut schema = ScannerSchema::default();
        schema.columns.retain(|c| c != SCORE_COLUMN);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn rejects_unordered_thresholds() {
        let mut schema = ScannerSchema::default();
        schema.thresholds.bounds = [-1.0, -0.1, -0.5, 0.1, 0.5, 1.0];
        assert!(schema.validate().is_err());
    }

    #[test]
    fn category_labels_round_trip_through_from_str() {
        for c in RecommendationCategory::ALL {
            assert_eq!(c.as_str().parse::<RecommendationCategory>(), Ok(c));
        }
        assert!("hold".parse::<RecommendationCategory>().is_err());
        assert!("BUY".parse::<RecommendationCategory>().is_err());
    }

    #[test]
    fn cache_header_appends_category() {
        let schema = ScannerSchema::default();
        let header = schema.cache_header();
        assert_eq!(header.len(), schema.columns.len() + 1);
        assert_eq!(header.last().copied(), Some(CATEGORY_COLUMN));
    }
}
