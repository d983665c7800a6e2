use crate::{
    config::Config,
    types::{AttributeValue, Event, SessionId},
};
use chrono::SecondsFormat;
use internment::Intern;
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use std::env;

pub const SDK_NAME: &str = env!("CARGO_PKG_NAME");
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

const FALLBACK_LOCALE: &str = "en-US";

/// Properties of the system the events were recorded on.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemProperties {
    /// Routes the event to the debug dashboard instead of the release one.
    pub is_debug: bool,
    /// Language tag of the current user, e.g. `en-US`.
    pub locale: String,
    pub app_version: String,
    /// `<sdk name>@<sdk version>`
    pub sdk_version: String,
    pub os_name: String,
    pub os_version: String,
}

impl SystemProperties {
    pub fn collect(cfg: &Config) -> Self {
        Self {
            is_debug: cfg.debug,
            locale: cfg
                .locale
                .clone()
                .or_else(locale_from_env)
                .unwrap_or_else(|| FALLBACK_LOCALE.to_owned()),
            app_version: cfg.app_version.clone(),
            sdk_version: format!("{SDK_NAME}@{SDK_VERSION}"),
            os_name: env::consts::OS.to_owned(),
            os_version: cfg.os_version.clone().unwrap_or_default(),
        }
    }
}

/// Reads a POSIX locale (`en_US.UTF-8`) from the environment as a language
/// tag (`en-US`).
fn locale_from_env() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| env::var(var).ok())
        .find_map(|v| posix_locale_to_tag(&v))
}

fn posix_locale_to_tag(s: &str) -> Option<String> {
    let tag = s.split(['.', '@']).next()?.trim();
    if tag.is_empty() || tag == "C" || tag == "POSIX" {
        return None;
    }
    Some(tag.replace('_', "-"))
}

/// A recorded event plus the session and system metadata it is delivered with.
///
/// This is the unit of queuing and delivery. Note that there is intentionally
/// no user identifier here; the wire shape never carries one.
#[derive(Clone, PartialEq, Debug)]
pub struct EventPayload {
    pub event: Event,
    pub system_props: SystemProperties,
    pub session_id: SessionId,
    /// ISO-8601 rendering of the event timestamp
    pub timestamp: String,
}

impl EventPayload {
    pub fn new(event: Event, system_props: SystemProperties, session_id: SessionId) -> Self {
        let timestamp = event
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            event,
            system_props,
            session_id,
            timestamp,
        }
    }

    pub fn event_name(&self) -> &str {
        self.event.name.as_str()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload<'a> {
    timestamp: &'a str,
    session_id: &'a str,
    event_name: &'a str,
    system_props: &'a SystemProperties,
    props: WireProps<'a>,
}

struct WireProps<'a>(&'a [(Intern<String>, AttributeValue)]);

impl Serialize for WireProps<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in self.0.iter() {
            map.serialize_entry(k.as_str(), v)?;
        }
        map.end()
    }
}

impl Serialize for EventPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WirePayload {
            timestamp: &self.timestamp,
            session_id: &self.session_id,
            event_name: self.event.name.as_str(),
            system_props: &self.system_props,
            props: WireProps(&self.event.attributes),
        }
        .serialize(serializer)
    }
}
