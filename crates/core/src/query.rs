use crate::cache::CacheStore;
use crate::dataset::{self, DatasetSnapshot, ScalarValue};
use crate::error::{ConfigError, QueryError, ScannerError};
use crate::fetch::ScannerClient;
use crate::normalize;
use crate::schema::{RecommendationCategory, ScannerSchema, NAME_COLUMN};
use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryMatch {
    pub name: String,
    pub recommendation_category: RecommendationCategory,
}

/// A record cut down to a fixed set of columns; serializes as a map in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRecord {
    pub fields: Vec<(String, ScalarValue)>,
}

impl ProjectedRecord {
    pub fn get(&self, column: &str) -> Option<&ScalarValue> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }
}

impl Serialize for ProjectedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

pub type CategorySummary = BTreeMap<RecommendationCategory, usize>;

pub fn parse_category(label: &str) -> Result<RecommendationCategory, QueryError> {
    label
        .parse::<RecommendationCategory>()
        .map_err(|_| QueryError::UnsupportedCategory(label.to_string()))
}

pub fn select_by_category(
    snapshot: &DatasetSnapshot,
    category: RecommendationCategory,
) -> Vec<CategoryMatch> {
    snapshot
        .records
        .iter()
        .filter(|r| r.recommendation_category == category)
        .map(|r| CategoryMatch {
            name: r.name.clone(),
            recommendation_category: r.recommendation_category,
        })
        .collect()
}

/// Records whose ticker is in `tickers`, projected to `name` plus `columns`, in snapshot order.
pub fn select_technical_values(
    snapshot: &DatasetSnapshot,
    columns: &[String],
    tickers: &[String],
) -> Vec<ProjectedRecord> {
    let wanted: HashSet<&str> = tickers.iter().map(String::as_str).collect();
    let indices: Vec<(&String, Option<usize>)> = columns
        .iter()
        .map(|c| (c, snapshot.column_index(c)))
        .collect();

    snapshot
        .records
        .iter()
        .filter(|r| wanted.contains(r.name.as_str()))
        .map(|r| {
            let mut fields = Vec::with_capacity(columns.len() + 1);
            fields.push((NAME_COLUMN.to_string(), ScalarValue::Text(r.name.clone())));
            for (column, idx) in &indices {
                let value = idx
                    .and_then(|i| r.values.get(i))
                    .cloned()
                    .unwrap_or(ScalarValue::Null);
                fields.push(((*column).clone(), value));
            }
            ProjectedRecord { fields }
        })
        .collect()
}

/// Counts per category; categories with no records are absent.
pub fn summarize(snapshot: &DatasetSnapshot) -> CategorySummary {
    let mut out = CategorySummary::new();
    for record in &snapshot.records {
        *out.entry(record.recommendation_category).or_insert(0) += 1;
    }
    out
}

/// The public face of the pipeline: every operation names the date it reads.
pub struct ScannerService<C> {
    client: C,
    cache: CacheStore,
    schema: ScannerSchema,
}

impl<C: ScannerClient> ScannerService<C> {
    pub fn new(client: C, cache: CacheStore, schema: ScannerSchema) -> Result<Self, ConfigError> {
        schema.validate()?;
        Ok(Self {
            client,
            cache,
            schema,
        })
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Fetch, normalize and build without touching the cache.
    pub async fn fetch_and_build(
        &self,
        as_of_date: NaiveDate,
    ) -> Result<DatasetSnapshot, ScannerError> {
        let body = self.client.fetch_scan(&self.schema).await?;
        let rows = normalize::normalize(&body)?;
        let snapshot = dataset::build(&self.schema, as_of_date, rows)?;
        tracing::info!(
            %as_of_date,
            provider = self.client.provider_name(),
            records = snapshot.len(),
            "built scanner snapshot"
        );
        Ok(snapshot)
    }

    /// The cached snapshot for `as_of_date`, fetching and persisting it on a miss.
    pub async fn snapshot(&self, as_of_date: NaiveDate) -> Result<DatasetSnapshot, ScannerError> {
        self.cache
            .get_or_build(&self.schema, as_of_date, || self.fetch_and_build(as_of_date))
            .await
            .inspect_err(|err| {
                tracing::error!(
                    %as_of_date,
                    kind = err.kind().as_str(),
                    error = %err,
                    "failed to load scanner snapshot"
                );
            })
    }

    pub async fn get_by_category(
        &self,
        as_of_date: NaiveDate,
        category: &str,
    ) -> Result<Vec<CategoryMatch>, ScannerError> {
        let category = parse_category(category)?;
        let snapshot = self.snapshot(as_of_date).await?;
        Ok(select_by_category(&snapshot, category))
    }

    pub async fn get_technical_values(
        &self,
        as_of_date: NaiveDate,
        tickers: &[String],
    ) -> Result<Vec<ProjectedRecord>, ScannerError> {
        if tickers.is_empty() {
            return Err(QueryError::NoTickers.into());
        }
        let snapshot = self.snapshot(as_of_date).await?;
        Ok(select_technical_values(
            &snapshot,
            &self.schema.technical_columns,
            tickers,
        ))
    }

    pub async fn get_summary(
        &self,
        as_of_date: NaiveDate,
    ) -> Result<CategorySummary, ScannerError> {
        let snapshot = self.snapshot(as_of_date).await?;
        Ok(summarize(&snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::tests::{sample_rows, tiny_schema};
    use crate::error::{ErrorKind, UpstreamError};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubClient {
        body: Value,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl ScannerClient for StubClient {
        fn provider_name(&self) -> &'static str {
            "stub"
        }

        async fn fetch_scan(&self, _schema: &ScannerSchema) -> Result<Value, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }

    fn scanner_body() -> Value {
        let data: Vec<Value> = sample_rows()
            .into_iter()
            .map(|d| json!({"s": format!("NSE:{}", d[0].as_str().unwrap()), "d": d}))
            .collect();
        json!({"totalCount": data.len(), "data": data})
    }

    fn service(
        dir: &std::path::Path,
        body: Value,
    ) -> (ScannerService<StubClient>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = StubClient {
            body,
            calls: Arc::clone(&calls),
        };
        let svc = ScannerService::new(client, CacheStore::new(dir), tiny_schema()).unwrap();
        (svc, calls)
    }

    #[tokio::test]
    async fn by_category_returns_only_matching_records() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(temp_dir.path(), scanner_body());

        let buys = svc.get_by_category(date(), "buy").await.unwrap();
        assert_eq!(
            buys,
            vec![CategoryMatch {
                name: "TCS".to_string(),
                recommendation_category: RecommendationCategory::Buy,
            }]
        );

        let unknown = svc.get_by_category(date(), "unknown").await.unwrap();
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].name, "ITC");

        assert!(svc.get_by_category(date(), "strong_sell").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_counts_present_categories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(temp_dir.path(), scanner_body());

        let summary = svc.get_summary(date()).await.unwrap();
        let expected: CategorySummary = [
            (RecommendationCategory::Sell, 1),
            (RecommendationCategory::Buy, 1),
            (RecommendationCategory::StrongBuy, 1),
            (RecommendationCategory::Unknown, 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(summary, expected);
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({"sell": 1, "buy": 1, "strong_buy": 1, "unknown": 1})
        );
    }

    #[tokio::test]
    async fn technical_values_project_requested_tickers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(temp_dir.path(), scanner_body());

        let tickers = vec!["RELIANCE".to_string(), "TCS".to_string(), "NOPE".to_string()];
        let out = svc.get_technical_values(date(), &tickers).await.unwrap();

        let names: Vec<_> = out.iter().map(|r| r.get("name").cloned()).collect();
        assert_eq!(
            names,
            vec![
                Some(ScalarValue::Text("TCS".to_string())),
                Some(ScalarValue::Text("RELIANCE".to_string())),
            ]
        );
        assert_eq!(out[0].get("SMA20"), Some(&ScalarValue::Number(4010.0)));
        assert_eq!(out[0].get("close"), None);

        let text = serde_json::to_string(&out[0]).unwrap();
        assert_eq!(text, r#"{"name":"TCS","SMA20":4010.0,"RSI":61.2}"#);
    }

    #[tokio::test]
    async fn repeated_queries_fetch_once_per_date() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (svc, calls) = service(temp_dir.path(), scanner_body());

        svc.get_summary(date()).await.unwrap();
        svc.get_by_category(date(), "sell").await.unwrap();
        svc.get_technical_values(date(), &["INFY".to_string()])
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        svc.get_summary(date().succ_opt().unwrap()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_fetch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (svc, calls) = service(temp_dir.path(), scanner_body());

        let err = svc.get_by_category(date(), "hold").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);
        assert!(err.is_caller_error());

        let err = svc.get_technical_values(date(), &[]).await.unwrap_err();
        assert!(matches!(err, ScannerError::Query(QueryError::NoTickers)));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn shape_failures_surface_and_are_not_cached() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (svc, calls) = service(temp_dir.path(), json!({"data": []}));

        let err = svc.get_summary(date()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Shape);
        assert!(!svc.cache().path_for(date()).exists());

        svc.get_summary(date()).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rejects_invalid_schema_at_construction() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut schema = tiny_schema();
        schema.columns.push("name".to_string());
        let client = StubClient {
            body: Value::Null,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        assert!(ScannerService::new(client, CacheStore::new(temp_dir.path()), schema).is_err());
    }
}
