//! Runtime configuration, read from the environment with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_MIRRORS: &[&str] = &[
    "https://standards-oui.ieee.org/oui/oui.txt",
    "http://linuxnet.ca/ieee/oui.txt",
    "https://standards.ieee.org/regauth/oui/oui.txt",
];

const DEFAULT_DATABASE_PATH: &str = "instance/oui_cache.db";
const DEFAULT_MAX_AGE_DAYS: i64 = 7;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;
/// The full export is ~3-4MB, so a declared size under 1MB means a truncated download
const DEFAULT_MIN_CONTENT_LENGTH: u64 = 1_000_000;
const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub database_path: PathBuf,
    pub max_age_days: i64,
    pub mirrors: Vec<Url>,
    pub fetch_timeout: Duration,
    pub min_content_length: u64,
    pub bind: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            mirrors: DEFAULT_MIRRORS
                .iter()
                .filter_map(|m| Url::parse(m).ok())
                .collect(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            min_content_length: DEFAULT_MIN_CONTENT_LENGTH,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = lookup("OUI_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(days) = lookup("OUI_MAX_AGE_DAYS") {
            config.max_age_days = parse_max_age_days("OUI_MAX_AGE_DAYS", &days)?;
        }
        if let Some(mirrors) = lookup("OUI_MIRRORS") {
            config.mirrors = parse_mirrors(&mirrors)?;
        }
        if let Some(secs) = lookup("OUI_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout = Duration::from_secs(parse_number("OUI_FETCH_TIMEOUT_SECS", &secs)?);
        }
        if let Some(bytes) = lookup("OUI_MIN_CONTENT_LENGTH") {
            config.min_content_length = parse_number("OUI_MIN_CONTENT_LENGTH", &bytes)?;
        }
        if let Some(bind) = lookup("OUI_BIND") {
            config.bind = bind;
        }

        Ok(config)
    }

    /// Validate and apply a max age given on the command line.
    pub fn set_max_age_days(&mut self, days: i64) -> Result<(), ConfigError> {
        self.max_age_days = parse_max_age_days("--max-age-days", &days.to_string())?;
        Ok(())
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.max_age_days)
    }

    /// Database path made absolute so a later working directory change can't move it.
    pub fn resolved_database_path(&self) -> PathBuf {
        if self.database_path.is_relative()
            && let Ok(cwd) = env::current_dir()
        {
            return cwd.join(&self.database_path);
        }
        self.database_path.clone()
    }
}

fn parse_number(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_max_age_days(name: &'static str, value: &str) -> Result<i64, ConfigError> {
    let days = parse_number(name, value)?;
    if days == 0 || days > 3650 {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "must be between 1 and 3650 days".to_string(),
        });
    }
    Ok(days as i64)
}

fn parse_mirrors(value: &str) -> Result<Vec<Url>, ConfigError> {
    let mirrors = value
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| {
            let url = Url::parse(m).map_err(|e| ConfigError::Invalid {
                name: "OUI_MIRRORS",
                value: m.to_string(),
                reason: e.to_string(),
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid {
                    name: "OUI_MIRRORS",
                    value: m.to_string(),
                    reason: "only http and https mirrors are supported".to_string(),
                });
            }
            Ok(url)
        })
        .collect::<Result<Vec<_>, _>>()?;

    if mirrors.is_empty() {
        return Err(ConfigError::Invalid {
            name: "OUI_MIRRORS",
            value: value.to_string(),
            reason: "at least one mirror is required".to_string(),
        });
    }
    Ok(mirrors)
}
