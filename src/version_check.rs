use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::fetcher::{HttpRequest, Method, Transport};

pub trait VersionSource: Send {
    fn current_version(&self) -> Result<String, ApiError>;
}

#[derive(Debug, Deserialize)]
struct VersionMarker {
    version: String,
}

pub struct HttpVersionSource {
    url: String,
    transport: Arc<dyn Transport>,
}

impl HttpVersionSource {
    pub fn new(url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            url: url.into(),
            transport,
        }
    }

    pub fn from_config(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(config.version_marker_url(), transport)
    }
}

impl VersionSource for HttpVersionSource {
    fn current_version(&self) -> Result<String, ApiError> {
        let resp = self.transport.send(HttpRequest {
            method: Method::Get,
            url: stamped_marker_url(&self.url, Utc::now().timestamp_millis())?,
            headers: Vec::new(),
            body: None,
        })?;
        if !(200..300).contains(&resp.status) {
            return Err(ApiError::Application {
                status: resp.status,
                message: format!("http {}", resp.status),
            });
        }
        let marker: VersionMarker = serde_json::from_str(&resp.body)?;
        Ok(marker.version)
    }
}

fn stamped_marker_url(marker: &str, stamp: i64) -> Result<String, ApiError> {
    let mut url = Url::parse(marker)
        .map_err(|err| ApiError::validation("version_marker_url", err.to_string()))?;
    let stamped = url.query_pairs().any(|(name, _)| name == "_");
    if !stamped {
        url.query_pairs_mut().append_pair("_", &stamp.to_string());
    }
    Ok(url.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionNotice {
    pub previous: String,
    pub current: String,
}

pub struct VersionChecker<S> {
    source: S,
    baseline: Option<String>,
    notified: bool,
}

impl<S: VersionSource> VersionChecker<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            baseline: None,
            notified: false,
        }
    }

    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }

    pub fn has_notified(&self) -> bool {
        self.notified
    }

    pub fn poll(&mut self) -> Option<VersionNotice> {
        if self.notified {
            return None;
        }
        let current = match self.source.current_version() {
            Ok(version) => version,
            Err(err) => {
                warn!("version check failed: {err}");
                return None;
            }
        };
        let Some(baseline) = self.baseline.clone() else {
            debug!(version = %current, "version baseline");
            self.baseline = Some(current);
            return None;
        };
        if baseline == current {
            return None;
        }
        self.notified = true;
        info!(previous = %baseline, current = %current, "new version deployed");
        Some(VersionNotice {
            previous: baseline,
            current,
        })
    }
}

/// Handle on the background poller. Dropping it stops the thread.
pub struct VersionWatch {
    stop: Arc<AtomicBool>,
}

impl VersionWatch {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for VersionWatch {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn spawn_version_watch<S>(
    config: &ClientConfig,
    source: S,
    tx: Sender<VersionNotice>,
) -> Option<VersionWatch>
where
    S: VersionSource + 'static,
{
    if !config.production {
        debug!("version watch disabled outside production");
        return None;
    }
    let interval = config.version_poll_interval;
    let tick = interval.min(Duration::from_millis(250));
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);

    thread::spawn(move || {
        let mut checker = VersionChecker::new(source);
        let mut last_poll: Option<Instant> = None;
        while !flag.load(Ordering::Relaxed) {
            if last_poll.is_none_or(|at| at.elapsed() >= interval) {
                last_poll = Some(Instant::now());
                if let Some(notice) = checker.poll() {
                    let _ = tx.send(notice);
                    break;
                }
            }
            thread::sleep(tick);
        }
    });

    Some(VersionWatch { stop })
}

#[cfg(test)]
mod tests {
    use super::stamped_marker_url;

    const MARKER: &str = "https://maimai.lxns.net/version.json";

    #[test]
    fn marker_url_gets_a_millisecond_stamp() {
        let url = stamped_marker_url(MARKER, 1_767_225_600_000).expect("valid marker");
        assert_eq!(url, "https://maimai.lxns.net/version.json?_=1767225600000");

        let url = stamped_marker_url(&format!("{MARKER}?build=canary"), 42).expect("valid marker");
        assert_eq!(url, "https://maimai.lxns.net/version.json?build=canary&_=42");
    }

    #[test]
    fn pinned_stamp_is_left_alone() {
        let pinned = format!("{MARKER}?_=7");
        assert_eq!(stamped_marker_url(&pinned, 99).as_deref(), Ok(pinned.as_str()));
        assert!(stamped_marker_url("version.json", 1).is_err());
    }
}
