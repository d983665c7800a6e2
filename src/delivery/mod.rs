use crate::{
    error::{Error, TransportError},
    types::EventPayload,
};
use async_trait::async_trait;
use bytes::Bytes;
use derive_more::Display;
use std::{fmt, sync::Arc};
use tracing::debug;

#[cfg(feature = "reqwest")]
pub use self::reqwest::ReqwestTransport;

#[cfg(feature = "reqwest")]
pub mod reqwest;

pub const SINGLE_EVENT_PATH: &str = "/api/v0/event";
pub const BATCH_EVENTS_PATH: &str = "/api/v0/events";
pub const APP_KEY_HEADER: &str = "App-Key";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// An outbound `POST` handed to a [`Transport`].
#[derive(Clone, PartialEq, Debug)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Bytes,
}

impl TransportRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// The HTTP client collaborator.
///
/// Returns the response status code, or a [`TransportError`] when no response
/// arrived at all. Request timeouts are the implementation's concern.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn post(&self, request: TransportRequest) -> Result<u16, TransportError>;
}

/// Wire shape used for a chunk.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum DeliveryMode {
    /// One JSON object per request to [`SINGLE_EVENT_PATH`]
    #[display("single")]
    Single,
    /// A JSON array per request to [`BATCH_EVENTS_PATH`]
    #[display("batch")]
    Batch,
}

impl DeliveryMode {
    pub fn path(&self) -> &'static str {
        match self {
            DeliveryMode::Single => SINGLE_EVENT_PATH,
            DeliveryMode::Batch => BATCH_EVENTS_PATH,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum DeliveryOutcome {
    #[display("success")]
    Success,
    /// The payload was rejected and will not be retried. `status` is `None`
    /// when it could not be encoded in the first place.
    #[display("client error ({status:?})")]
    ClientError { status: Option<u16> },
    /// Any 5xx or otherwise unrecognized status.
    #[display("server error ({status})")]
    ServerError { status: u16 },
    /// No response arrived.
    #[display("network failure")]
    NetworkFailure,
}

impl DeliveryOutcome {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => DeliveryOutcome::Success,
            400..=499 => DeliveryOutcome::ClientError {
                status: Some(status),
            },
            _ => DeliveryOutcome::ServerError { status },
        }
    }

    pub fn classify(result: &Result<u16, TransportError>) -> Self {
        match result {
            Ok(status) => Self::from_status(*status),
            Err(_) => DeliveryOutcome::NetworkFailure,
        }
    }

    /// Whether the chunk should be requeued for another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryOutcome::ServerError { .. } | DeliveryOutcome::NetworkFailure
        )
    }
}

/// Sends chunks of payloads and classifies the outcome.
///
/// Stateless apart from its configuration; clones share the transport and can
/// deliver independent chunks concurrently.
#[derive(Clone, Debug)]
pub struct Delivery {
    transport: Arc<dyn Transport>,
    url: String,
    app_key: String,
    mode: DeliveryMode,
}

impl Delivery {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: &str,
        app_key: &str,
        mode: DeliveryMode,
    ) -> Self {
        Self {
            transport,
            url: format!("{}{}", base_url.trim_end_matches('/'), mode.path()),
            app_key: app_key.to_owned(),
            mode,
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self, body: Bytes) -> TransportRequest {
        TransportRequest {
            url: self.url.clone(),
            headers: vec![
                (APP_KEY_HEADER, self.app_key.clone()),
                ("Content-Type", CONTENT_TYPE_JSON.to_owned()),
            ],
            body,
        }
    }

    async fn post(&self, body: Result<Vec<u8>, serde_json::Error>) -> DeliveryOutcome {
        let body = match body.map_err(Error::from) {
            Ok(b) => Bytes::from(b),
            Err(e) => {
                debug!(error = %e, "Rejecting chunk before sending");
                return DeliveryOutcome::ClientError { status: None };
            }
        };
        let result = self.transport.post(self.request(body)).await;
        if let Err(e) = &result {
            debug!(url = %self.url, error = %e, "No response from ingestion host");
        }
        DeliveryOutcome::classify(&result)
    }

    /// Delivers one chunk.
    ///
    /// In [`DeliveryMode::Single`] each payload is its own request and the
    /// first unsuccessful outcome is returned, in which case later payloads
    /// of the chunk are not attempted. [`Flusher`](crate::Flusher) only hands
    /// this mode single-payload chunks.
    pub async fn send_chunk(&self, chunk: &[EventPayload]) -> DeliveryOutcome {
        if chunk.is_empty() {
            return DeliveryOutcome::Success;
        }
        debug!(url = %self.url, mode = %self.mode, events = chunk.len(), "Sending chunk");
        match self.mode {
            DeliveryMode::Batch => self.post(serde_json::to_vec(chunk)).await,
            DeliveryMode::Single => {
                for payload in chunk.iter() {
                    let outcome = self.post(serde_json::to_vec(payload)).await;
                    if outcome != DeliveryOutcome::Success {
                        return outcome;
                    }
                }
                DeliveryOutcome::Success
            }
        }
    }
}
