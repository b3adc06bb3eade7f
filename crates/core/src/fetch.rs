use crate::config::Settings;
use crate::error::{ConfigError, UpstreamError};
use crate::schema::ScannerSchema;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

#[async_trait::async_trait]
pub trait ScannerClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// One request, no retries. The decoded body is returned as-is for the normalizer.
    async fn fetch_scan(&self, schema: &ScannerSchema) -> Result<Value, UpstreamError>;
}

#[derive(Debug, Serialize)]
pub struct ScanRequest<'a> {
    pub columns: &'a [String],
    pub sort: ScanSort<'a>,
    pub symbols: ScanSymbols<'a>,
    pub markets: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSort<'a> {
    pub sort_by: &'a str,
    pub sort_order: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ScanSymbols<'a> {
    pub symbolset: &'a [String],
}

impl<'a> ScanRequest<'a> {
    pub fn from_schema(schema: &'a ScannerSchema) -> Self {
        Self {
            columns: &schema.columns,
            sort: ScanSort {
                sort_by: &schema.sort_by,
                sort_order: &schema.sort_order,
            },
            symbols: ScanSymbols {
                symbolset: &schema.symbolset,
            },
            markets: &schema.markets,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpScannerClient {
    http: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl HttpScannerClient {
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            url: settings.scanner_url.clone(),
            timeout_secs: settings.timeout_secs,
        })
    }

    fn headers(schema: &ScannerSchema) -> Result<HeaderMap, UpstreamError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &schema.headers {
            let invalid = || UpstreamError::InvalidHeader(name.clone());
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }

    fn transport_error(&self, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout {
                timeout_secs: self.timeout_secs,
                source: err,
            }
        } else {
            UpstreamError::Transport(err)
        }
    }

    async fn fetch_once(&self, schema: &ScannerSchema) -> Result<Value, UpstreamError> {
        let headers = Self::headers(schema)?;
        let body = serde_json::to_string(&ScanRequest::from_schema(schema))
            .map_err(UpstreamError::Encode)?;

        let res = self
            .http
            .post(&self.url)
            .headers(headers)
            .query(&schema.query_params)
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = res.status();
        let text = res.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status,
                body: truncate_for_log(&text),
            });
        }

        serde_json::from_str::<Value>(&text).map_err(UpstreamError::Decode)
    }
}

#[async_trait::async_trait]
impl ScannerClient for HttpScannerClient {
    fn provider_name(&self) -> &'static str {
        "tradingview_scanner"
    }

    async fn fetch_scan(&self, schema: &ScannerSchema) -> Result<Value, UpstreamError> {
        tracing::info!(
            url = %self.url,
            columns = schema.columns.len(),
            "fetching scanner snapshot"
        );
        match self.fetch_once(schema).await {
            Ok(body) => {
                let rows = body
                    .get("data")
                    .and_then(Value::as_array)
                    .map(Vec::len)
                    .unwrap_or(0);
                let total_count = body.get("totalCount").and_then(Value::as_u64);
                tracing::info!(rows, ?total_count, "scanner snapshot fetched");
                Ok(body)
            }
            Err(err) => {
                tracing::error!(url = %self.url, error = %err, "scanner request failed");
                Err(err)
            }
        }
    }
}

fn truncate_for_log(text: &str) -> String {
    const MAX: usize = 512;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut end = MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
