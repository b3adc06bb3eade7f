use crate::error::ShapeError;
use crate::normalize::ValueArray;
use crate::schema::{
    RecommendationCategory, RecommendationThresholds, ScannerSchema, NAME_COLUMN, SCORE_COLUMN,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashSet;

/// One cell of the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ScalarValue {
    /// Nested arrays/objects (e.g. `typespecs`) are kept as compact JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ScalarValue::Null,
            Value::Bool(b) => ScalarValue::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(ScalarValue::Null, ScalarValue::Number),
            Value::String(s) => ScalarValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => ScalarValue::Text(value.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_csv_field(&self) -> Cow<'_, str> {
        match self {
            ScalarValue::Null => Cow::Borrowed(""),
            ScalarValue::Bool(true) => Cow::Borrowed("true"),
            ScalarValue::Bool(false) => Cow::Borrowed("false"),
            ScalarValue::Number(n) => Cow::Owned(n.to_string()),
            ScalarValue::Text(s) => Cow::Borrowed(s),
        }
    }

    pub fn from_csv_field(field: &str) -> Self {
        match field {
            "" => ScalarValue::Null,
            "true" => ScalarValue::Bool(true),
            "false" => ScalarValue::Bool(false),
            _ => match field.parse::<f64>() {
                Ok(n) if n.is_finite() => ScalarValue::Number(n),
                _ => ScalarValue::Text(field.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentRecord {
    pub name: String,
    /// Aligned with [`DatasetSnapshot::columns`].
    pub values: Vec<ScalarValue>,
    pub recommendation_category: RecommendationCategory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSnapshot {
    pub as_of_date: NaiveDate,
    pub columns: Vec<String>,
    pub records: Vec<InstrumentRecord>,
}

impl DatasetSnapshot {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn value<'a>(&self, record: &'a InstrumentRecord, column: &str) -> Option<&'a ScalarValue> {
        self.column_index(column).and_then(|i| record.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn categorize_recommendation(
    score: &ScalarValue,
    thresholds: &RecommendationThresholds,
) -> RecommendationCategory {
    match score.as_f64() {
        Some(v) => thresholds.classify(v),
        None => RecommendationCategory::Unknown,
    }
}

/// Zips each value array against the schema's column order.
///
/// Short arrays are padded with trailing nulls. Arrays longer than the column list are
/// rejected because positional alignment no longer holds. Output order mirrors input order.
pub fn build(
    schema: &ScannerSchema,
    as_of_date: NaiveDate,
    rows: Vec<ValueArray>,
) -> Result<DatasetSnapshot, ShapeError> {
    let width = schema.columns.len();
    let name_idx = schema.column_index(NAME_COLUMN);
    let score_idx = schema.column_index(SCORE_COLUMN);

    let mut seen = HashSet::with_capacity(rows.len());
    let mut records = Vec::with_capacity(rows.len());
    let mut padded: usize = 0;

    for (index, row) in rows.into_iter().enumerate() {
        if row.len() > width {
            return Err(ShapeError::RowTooLong {
                index,
                values: row.len(),
                columns: width,
            });
        }
        if row.len() < width {
            padded += 1;
            tracing::warn!(
                index,
                values = row.len(),
                columns = width,
                "padding short scanner row with nulls"
            );
        }

        let mut values: Vec<ScalarValue> = row.iter().map(ScalarValue::from_json).collect();
        values.resize(width, ScalarValue::Null);

        let name = name_idx
            .and_then(|i| values[i].as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ShapeError::MissingTicker { index })?
            .to_string();
        if let Some(i) = name_idx {
            values[i] = ScalarValue::Text(name.clone());
        }

        if !seen.insert(name.clone()) {
            return Err(ShapeError::DuplicateTicker { index, name });
        }

        let recommendation_category = score_idx
            .map(|i| categorize_recommendation(&values[i], &schema.thresholds))
            .unwrap_or(RecommendationCategory::Unknown);

        records.push(InstrumentRecord {
            name,
            values,
            recommendation_category,
        });
    }

    tracing::debug!(%as_of_date, records = records.len(), padded, "built dataset snapshot");

    Ok(DatasetSnapshot {
        as_of_date,
        columns: schema.columns.clone(),
        records,
    })
}
