use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "https://maimai.lxns.net/api/v0/";
const DEFAULT_SITE_URL: &str = "https://maimai.lxns.net";
const STORAGE_DIR: &str = "maimai_tracker";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub site_url: String,
    pub storage_dir: Option<PathBuf>,
    pub production: bool,
    pub request_timeout: Duration,
    pub version_poll_interval: Duration,
    pub error_retry_count: u32,
    pub error_retry_interval: Duration,
    pub dedupe_interval: Duration,
    pub fetch_parallelism: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            storage_dir: default_storage_dir(),
            production: !cfg!(debug_assertions),
            request_timeout: Duration::from_secs(10),
            version_poll_interval: Duration::from_secs(60),
            error_retry_count: 3,
            error_retry_interval: Duration::from_secs(5),
            dedupe_interval: Duration::from_secs(2),
            fetch_parallelism: 8,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_base_url = env::var("MAIMAI_API_BASE_URL")
            .ok()
            .and_then(non_empty)
            .unwrap_or(defaults.api_base_url);
        let site_url = env::var("MAIMAI_SITE_URL")
            .ok()
            .and_then(non_empty)
            .unwrap_or(defaults.site_url);
        let storage_dir = env::var("MAIMAI_STORAGE_DIR")
            .ok()
            .and_then(non_empty)
            .map(PathBuf::from)
            .or(defaults.storage_dir);
        let production = env::var("MAIMAI_PRODUCTION")
            .ok()
            .and_then(|val| parse_flag(&val))
            .unwrap_or(defaults.production);
        let request_timeout = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs.max(1)))
            .unwrap_or(defaults.request_timeout);
        let version_poll_interval = env::var("VERSION_POLL_SECS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs.max(10)))
            .unwrap_or(defaults.version_poll_interval);
        let error_retry_count = env::var("ERROR_RETRY_COUNT")
            .ok()
            .and_then(|val| val.parse::<u32>().ok())
            .unwrap_or(defaults.error_retry_count)
            .min(10);
        let error_retry_interval = env::var("ERROR_RETRY_INTERVAL_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.error_retry_interval);
        let dedupe_interval = env::var("DEDUPE_INTERVAL_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.dedupe_interval);
        let fetch_parallelism = env::var("FETCH_PARALLELISM")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(defaults.fetch_parallelism)
            .clamp(1, 64);

        Self {
            api_base_url,
            site_url,
            storage_dir,
            production,
            request_timeout,
            version_poll_interval,
            error_retry_count,
            error_retry_interval,
            dedupe_interval,
            fetch_parallelism,
        }
    }

    pub fn version_marker_url(&self) -> String {
        format!("{}/version.json", self.site_url.trim_end_matches('/'))
    }
}

/// Loads `.env.local` then `.env` into the process environment, ignoring
/// missing files.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

fn default_storage_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_DATA_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(STORAGE_DIR));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(STORAGE_DIR),
    )
}

fn non_empty(val: String) -> Option<String> {
    let trimmed = val.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_flag, ClientConfig};

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn version_marker_url_has_single_slash() {
        let config = ClientConfig {
            site_url: "https://example.com/".to_string(),
            ..ClientConfig::default()
        };
        assert_eq!(config.version_marker_url(), "https://example.com/version.json");
    }
}
