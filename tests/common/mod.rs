#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use session_telemetry::{Config, Transport, TransportError, TransportRequest};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

pub const APP_KEY: &str = "A-DEV-0000000000";

pub fn config() -> Config {
    let mut cfg = Config::new(APP_KEY);
    cfg.debug = false;
    cfg.app_version = "1.0.0".to_owned();
    cfg.locale = Some("en-US".to_owned());
    cfg
}

/// Records every request and answers from a script, falling back to a
/// default response once the script is exhausted.
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<u16, TransportError>>>,
    default: Mutex<Result<u16, TransportError>>,
    requests: Mutex<Vec<TransportRequest>>,
    latency: Mutex<Option<Duration>>,
}

impl MockTransport {
    pub fn new(default: Result<u16, TransportError>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(default),
            requests: Mutex::new(Vec::new()),
            latency: Mutex::new(None),
        })
    }

    pub fn respond_with(&self, response: Result<u16, TransportError>) {
        *self.default.lock().unwrap() = response;
    }

    /// Delays every response. Requests are recorded when they arrive.
    pub fn with_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn then(&self, response: Result<u16, TransportError>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.requests()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    /// Event names of every batch request, in request order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.bodies()
            .iter()
            .map(|b| {
                b.as_array()
                    .unwrap()
                    .iter()
                    .map(|e| e["eventName"].as_str().unwrap().to_owned())
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(&self, request: TransportRequest) -> Result<u16, TransportError> {
        self.requests.lock().unwrap().push(request);
        let scripted = self.script.lock().unwrap().pop_front();
        let response = scripted.unwrap_or_else(|| self.default.lock().unwrap().clone());
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        response
    }
}
