use crate::error::Error;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, str::FromStr, time::Duration};

pub const DEFAULT_SEND_INTERVAL_SECS: f64 = 60.0;
pub const DEFAULT_DEBUG_SEND_INTERVAL_SECS: f64 = 2.0;
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 25;
pub const DEFAULT_MAX_PENDING_EVENTS: usize = 10_000;

/// The ingestion hosts an app key can target.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum HostSelector {
    #[display("EU")]
    #[serde(alias = "eu")]
    Eu,
    #[display("US")]
    #[serde(alias = "us")]
    Us,
    /// Local development server
    #[display("DEV")]
    #[serde(alias = "dev")]
    Dev,
    /// Self-hosted instance, see [`Config::custom_host`]
    #[display("SH")]
    #[serde(alias = "sh", alias = "self-hosted")]
    Sh,
}

impl FromStr for HostSelector {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "EU" => Self::Eu,
            "US" => Self::Us,
            "DEV" => Self::Dev,
            "SH" => Self::Sh,
            _ => return Err(()),
        })
    }
}

impl HostSelector {
    /// Infers the host from an app key of the form `A-<HOST>-<id>`.
    pub fn from_app_key(app_key: &str) -> Option<Self> {
        let parts: Vec<&str> = app_key.split('-').collect();
        if parts.len() != 3 {
            return None;
        }
        parts[1].parse().ok()
    }
}

/// Returns the base URL that all requests for `host` are sent to.
///
/// Self-hosted instances use `custom_host` (with any trailing slash removed),
/// which yields an empty string when unset.
pub fn resolve_base_url(host: HostSelector, custom_host: Option<&str>) -> String {
    match host {
        HostSelector::Eu => "https://eu.aptabase.com".to_owned(),
        HostSelector::Us => "https://us.aptabase.com".to_owned(),
        HostSelector::Dev => "http://localhost:3000".to_owned(),
        HostSelector::Sh => custom_host
            .map(|h| h.trim().trim_end_matches('/').to_owned())
            .unwrap_or_default(),
    }
}

/// Provider configuration, usually deserialized from YAML.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Key used to identify the app when making requests.
    pub app_key: String,
    /// Ingestion host. Inferred from the app key when absent.
    #[serde(default)]
    pub host: Option<HostSelector>,
    /// Base URL for self-hosted instances ([`HostSelector::Sh`]).
    #[serde(default)]
    pub custom_host: Option<String>,
    /// How often batched events are flushed (seconds).
    #[serde(default = "default_send_interval")]
    pub send_interval: f64,
    /// How often batched events are flushed in debug mode (seconds).
    #[serde(default = "default_debug_send_interval")]
    pub debug_send_interval: f64,
    /// Marks events for the debug dashboard and selects the debug interval.
    #[serde(default = "default_debug")]
    pub debug: bool,
    /// Queue events and flush them periodically instead of sending each one.
    #[serde(default = "default_batching")]
    pub batching: bool,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    /// Upper bound on queued events; the oldest are dropped beyond it.
    #[serde(default = "default_max_pending_events")]
    pub max_pending_events: Option<usize>,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
}

impl Config {
    pub fn new<S: Into<String>>(app_key: S) -> Self {
        Self {
            app_key: app_key.into(),
            host: None,
            custom_host: None,
            send_interval: DEFAULT_SEND_INTERVAL_SECS,
            debug_send_interval: DEFAULT_DEBUG_SEND_INTERVAL_SECS,
            debug: default_debug(),
            batching: true,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_pending_events: Some(DEFAULT_MAX_PENDING_EVENTS),
            app_version: String::new(),
            locale: None,
            os_version: None,
        }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let s = fs::read_to_string(path)?;
        Self::from_yaml_str(&s)
    }

    /// The configured host, or the one named by the app key.
    pub fn host(&self) -> Option<HostSelector> {
        self.host.or_else(|| HostSelector::from_app_key(&self.app_key))
    }

    pub fn base_url(&self) -> Result<String, Error> {
        let host = self
            .host()
            .ok_or_else(|| Error::UnresolvedHost(self.app_key.clone()))?;
        let url = resolve_base_url(host, self.custom_host.as_deref());
        if url.is_empty() {
            return Err(Error::MissingCustomHost);
        }
        Ok(url)
    }

    /// The interval between timer-driven flushes, honoring [`Config::debug`].
    pub fn flush_interval(&self) -> Result<Duration, Error> {
        let (name, secs) = if self.debug {
            ("debug-send-interval", self.debug_send_interval)
        } else {
            ("send-interval", self.send_interval)
        };
        match Duration::try_from_secs_f64(secs) {
            Ok(d) if !d.is_zero() => Ok(d),
            _ => Err(Error::InvalidInterval(name, secs)),
        }
    }

    /// Checks everything a provider needs before it is constructed.
    pub fn validate(&self) -> Result<(), Error> {
        self.base_url()?;
        self.flush_interval()?;
        if self.max_chunk_size == 0 {
            return Err(Error::ZeroChunkSize);
        }
        Ok(())
    }
}

fn default_send_interval() -> f64 {
    DEFAULT_SEND_INTERVAL_SECS
}

fn default_debug_send_interval() -> f64 {
    DEFAULT_DEBUG_SEND_INTERVAL_SECS
}

fn default_debug() -> bool {
    cfg!(debug_assertions)
}

fn default_batching() -> bool {
    true
}

fn default_max_chunk_size() -> usize {
    DEFAULT_MAX_CHUNK_SIZE
}

fn default_max_pending_events() -> Option<usize> {
    Some(DEFAULT_MAX_PENDING_EVENTS)
}
