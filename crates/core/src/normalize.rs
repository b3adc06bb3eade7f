use crate::error::ShapeError;
use serde_json::Value;

pub type ValueArray = Vec<Value>;

/// Pulls each instrument's positional `d` array out of a scanner body.
///
/// Entries without an array-valued `d` are skipped. Array length is not checked here;
/// alignment against the column list belongs to the dataset builder.
pub fn normalize(body: &Value) -> Result<Vec<ValueArray>, ShapeError> {
    let data = body.get("data").ok_or(ShapeError::MissingData)?;
    let entries = match data {
        Value::Array(entries) => entries,
        // `null` is what the scanner sends when nothing matched.
        Value::Null => return Err(ShapeError::EmptyData),
        _ => return Err(ShapeError::DataNotArray),
    };

    if entries.is_empty() {
        return Err(ShapeError::EmptyData);
    }

    let rows: Vec<ValueArray> = entries
        .iter()
        .filter_map(|entry| match entry.get("d") {
            Some(Value::Array(values)) => Some(values.clone()),
            _ => None,
        })
        .collect();

    let dropped = entries.len() - rows.len();
    if dropped > 0 {
        tracing::debug!(dropped, kept = rows.len(), "skipped scanner entries without row data");
    }

    if rows.is_empty() {
        return Err(ShapeError::NoRowData);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_rows_in_order() {
        let body = json!({
            "totalCount": 2,
            "data": [
                {"s": "NSE:TCS", "d": ["TCS", 0.2]},
                {"s": "NSE:INFY", "d": ["INFY", -0.4]},
            ]
        });
        let rows = normalize(&body).unwrap();
        assert_eq!(rows, vec![vec![json!("TCS"), json!(0.2)], vec![json!("INFY"), json!(-0.4)]]);
    }

    #[test]
    fn drops_entries_without_row_data() {
        let body = json!({
            "data": [
                {"s": "NSE:TCS"},
                {"s": "NSE:INFY", "d": ["INFY"]},
                {"s": "NSE:HDFC", "d": null},
                "garbage",
            ]
        });
        let rows = normalize(&body).unwrap();
        assert_eq!(rows, vec![vec![json!("INFY")]]);
    }

    #[test]
    fn rejects_missing_data_key() {
        assert_eq!(normalize(&json!({})), Err(ShapeError::MissingData));
    }

    #[test]
    fn rejects_empty_data() {
        assert_eq!(normalize(&json!({"data": []})), Err(ShapeError::EmptyData));
        assert_eq!(normalize(&json!({"data": null})), Err(ShapeError::EmptyData));
    }

    #[test]
    fn rejects_when_no_row_survives() {
        assert_eq!(
            normalize(&json!({"data": [{"foo": 1}]})),
            Err(ShapeError::NoRowData)
        );
    }

    #[test]
    fn rejects_non_array_data() {
        assert_eq!(
            normalize(&json!({"data": {"d": []}})),
            Err(ShapeError::DataNotArray)
        );
    }

    #[test]
    fn keeps_short_rows_for_the_builder_to_judge() {
        let rows = normalize(&json!({"data": [{"d": []}]})).unwrap();
        assert_eq!(rows, vec![Vec::<Value>::new()]);
    }
}
