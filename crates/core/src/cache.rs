//! One CSV file per calendar date under a working directory.
//!
//! Layout: `{cache_dir}/{YYYY-MM-DD}.csv`, header row first, registry columns followed by
//! `recommendation_category`. The file's existence is the only freshness signal: once
//! today's file is on disk it is served for the rest of the day and never rewritten.
//! Writes go to `{date}.csv.tmp` and are renamed into place.

use crate::dataset::{DatasetSnapshot, InstrumentRecord, ScalarValue};
use crate::error::{CacheError, ScannerError};
use crate::schema::{RecommendationCategory, ScannerSchema, CATEGORY_COLUMN, NAME_COLUMN};
use chrono::NaiveDate;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, as_of_date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.csv", as_of_date.format("%Y-%m-%d")))
    }

    /// Serves the cached snapshot for `as_of_date`, or runs `build_fn` and persists its result.
    pub async fn get_or_build<F, Fut>(
        &self,
        schema: &ScannerSchema,
        as_of_date: NaiveDate,
        build_fn: F,
    ) -> Result<DatasetSnapshot, ScannerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DatasetSnapshot, ScannerError>>,
    {
        if let Some(snapshot) = self.load(schema, as_of_date)? {
            tracing::debug!(%as_of_date, records = snapshot.len(), "scanner cache hit");
            return Ok(snapshot);
        }

        tracing::info!(
            %as_of_date,
            path = %self.path_for(as_of_date).display(),
            "scanner cache miss; building snapshot"
        );
        let snapshot = build_fn().await?;
        if snapshot.as_of_date != as_of_date {
            return Err(CacheError::write(
                self.path_for(as_of_date),
                format!("snapshot is dated {}, expected {as_of_date}", snapshot.as_of_date),
            )
            .into());
        }

        self.store(&snapshot)?;
        Ok(snapshot)
    }

    /// `Ok(None)` when no file exists for the date.
    pub fn load(
        &self,
        schema: &ScannerSchema,
        as_of_date: NaiveDate,
    ) -> Result<Option<DatasetSnapshot>, CacheError> {
        let path = self.path_for(as_of_date);
        if !path.exists() {
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&path).map_err(|e| CacheError::load(&path, e))?;

        let header = reader
            .headers()
            .map_err(|e| CacheError::load(&path, e))?
            .clone();
        let expected = schema.cache_header();
        if header.iter().ne(expected.iter().copied()) {
            return Err(CacheError::load(
                &path,
                format!(
                    "header does not match the scanner schema ({} columns, expected {})",
                    header.len(),
                    expected.len()
                ),
            ));
        }

        let width = schema.columns.len();
        let name_idx = schema.column_index(NAME_COLUMN);
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(|e| CacheError::load(&path, e))?;

            let name = name_idx
                .and_then(|i| row.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    CacheError::load(&path, format!("row {line} has no {NAME_COLUMN}"))
                })?
                .to_string();
            if !seen.insert(name.clone()) {
                return Err(CacheError::load(
                    &path,
                    format!("row {line} repeats {NAME_COLUMN} {name:?}"),
                ));
            }

            let mut values = Vec::with_capacity(width);
            for (i, field) in row.iter().take(width).enumerate() {
                if Some(i) == name_idx {
                    values.push(ScalarValue::Text(name.clone()));
                } else {
                    values.push(ScalarValue::from_csv_field(field));
                }
            }

            let label = row.get(width).unwrap_or_default();
            let recommendation_category = label.parse::<RecommendationCategory>().map_err(|_| {
                CacheError::load(
                    &path,
                    format!("row {line} has unrecognized {CATEGORY_COLUMN} {label:?}"),
                )
            })?;

            records.push(InstrumentRecord {
                name,
                values,
                recommendation_category,
            });
        }

        Ok(Some(DatasetSnapshot {
            as_of_date,
            columns: schema.columns.clone(),
            records,
        }))
    }

    pub fn store(&self, snapshot: &DatasetSnapshot) -> Result<PathBuf, CacheError> {
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(snapshot.as_of_date);
        let tmp_path = path.with_extension("csv.tmp");

        if let Err(err) = write_csv(&tmp_path, snapshot) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::write(&path, format!("atomic rename failed: {e}"))
        })?;

        tracing::info!(
            as_of_date = %snapshot.as_of_date,
            records = snapshot.len(),
            path = %path.display(),
            "scanner snapshot cached"
        );
        Ok(path)
    }
}

fn write_csv(path: &Path, snapshot: &DatasetSnapshot) -> Result<(), CacheError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| CacheError::write(path, e))?;

    wtr.write_record(
        snapshot
            .columns
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(CATEGORY_COLUMN)),
    )
    .map_err(|e| CacheError::write(path, e))?;

    for record in &snapshot.records {
        let fields: Vec<Cow<'_, str>> =
            record.values.iter().map(ScalarValue::to_csv_field).collect();
        wtr.write_record(
            fields
                .iter()
                .map(|f| f.as_bytes())
                .chain(std::iter::once(record.recommendation_category.as_str().as_bytes())),
        )
        .map_err(|e| CacheError::write(path, e))?;
    }

    wtr.flush().map_err(|e| CacheError::write(path, e))
}
