pub mod cache;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod query;
pub mod schema;
pub mod time;

pub use error::{ErrorKind, ScannerError};

pub mod config {
    use crate::error::ConfigError;
    use chrono::FixedOffset;
    use std::path::PathBuf;

    pub const DEFAULT_SCANNER_URL: &str = "https://scanner.tradingview.com/india/scan";
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_CACHE_DIR: &str = "tempDir";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub scanner_url: String,
        pub timeout_secs: u64,
        pub cache_dir: PathBuf,
        pub utc_offset_minutes: Option<i32>,
        pub sentry_dsn: Option<String>,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                scanner_url: DEFAULT_SCANNER_URL.to_string(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
                utc_offset_minutes: None,
                sentry_dsn: None,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> Result<Self, ConfigError> {
            let mut out = Self::default();

            if let Some(url) = non_empty_var("SCANNER_URL") {
                out.scanner_url = url;
            }

            if let Some(s) = non_empty_var("SCANNER_TIMEOUT_SECS") {
                out.timeout_secs = s
                    .parse::<u64>()
                    .map_err(|_| ConfigError::invalid("SCANNER_TIMEOUT_SECS", &s))?;
                if out.timeout_secs == 0 {
                    return Err(ConfigError::invalid("SCANNER_TIMEOUT_SECS", &s));
                }
            }

            if let Some(dir) = non_empty_var("SCANNER_CACHE_DIR") {
                out.cache_dir = PathBuf::from(dir);
            }

            if let Some(s) = non_empty_var("SCANNER_UTC_OFFSET_MINUTES") {
                let minutes = s
                    .parse::<i32>()
                    .map_err(|_| ConfigError::invalid("SCANNER_UTC_OFFSET_MINUTES", &s))?;
                out.utc_offset_minutes = Some(minutes);
                out.utc_offset()?;
            }

            out.sentry_dsn = non_empty_var("SENTRY_DSN");

            Ok(out)
        }

        /// Fixed offset used to decide "today"; `None` means the host's local timezone.
        pub fn utc_offset(&self) -> Result<Option<FixedOffset>, ConfigError> {
            match self.utc_offset_minutes {
                None => Ok(None),
                Some(minutes) => FixedOffset::east_opt(minutes * 60).map(Some).ok_or_else(|| {
                    ConfigError::invalid("SCANNER_UTC_OFFSET_MINUTES", &minutes.to_string())
                }),
            }
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn utc_offset_is_built_from_minutes() {
            let settings = Settings {
                utc_offset_minutes: Some(330),
                ..Settings::default()
            };
            assert_eq!(
                settings.utc_offset().unwrap(),
                FixedOffset::east_opt(19_800)
            );
            assert_eq!(Settings::default().utc_offset().unwrap(), None);
        }

        #[test]
        fn rejects_offsets_beyond_a_day() {
            let settings = Settings {
                utc_offset_minutes: Some(24 * 60),
                ..Settings::default()
            };
            assert!(settings.utc_offset().is_err());
        }
    }
}
