use crate::{
    delivery::{Transport, TransportRequest},
    error::TransportError,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::trace;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: ::reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = ::reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: ::reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::from_client(::reqwest::Client::new())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, request: TransportRequest) -> Result<u16, TransportError> {
        let mut req = self.client.post(&request.url);
        for (name, value) in request.headers.iter() {
            req = req.header(*name, value);
        }
        match req.body(request.body).send().await {
            Ok(resp) => {
                let status = resp.status();
                trace!(%status, url = %request.url, "Received response");
                Ok(status.as_u16())
            }
            Err(e) if e.is_timeout() => Err(TransportError::Timeout),
            Err(e) if e.is_connect() => Err(TransportError::Connect(e.to_string())),
            Err(e) => Err(TransportError::Other(e.to_string())),
        }
    }
}
