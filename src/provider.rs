use crate::{
    config::Config,
    delivery::{Delivery, DeliveryMode, Transport},
    error::Error,
    queue::EventQueue,
    scheduler::{FlushScheduler, FlushSummary, Flusher},
    session::SessionController,
    types::{Attribute, Event, EventPayload, SessionId, SystemProperties},
};
use async_trait::async_trait;
use derive_more::Display;
use std::{
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle notifications from the hosting application.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum HostSignal {
    #[display("application shutdown")]
    ApplicationShutdown,
    /// An in-editor play/simulation run ended
    #[display("simulation ended")]
    SimulationEnded,
}

/// The operations an analytics backend exposes to its host.
#[async_trait]
pub trait AnalyticsProvider: Send + Sync {
    fn start_session(&self, attributes: Vec<Attribute>) -> bool;
    async fn end_session(&self);
    fn record_event(&self, name: &str, attributes: &[Attribute]);
    async fn flush_events(&self);
    fn session_id(&self) -> SessionId;
    fn set_session_id(&self, id: &str) -> bool;
    fn set_user_id(&self, id: &str);
    fn user_id(&self) -> String;
    fn set_default_event_attributes(&self, attributes: Vec<Attribute>);
    fn default_event_attributes(&self) -> Vec<Attribute>;
    fn default_event_attribute_count(&self) -> usize;
    fn default_event_attribute(&self, index: usize) -> Option<Attribute>;
}

#[derive(Debug)]
struct Inner {
    config: Config,
    flush_interval: Duration,
    system_props: SystemProperties,
    session: SessionController,
    flusher: Arc<Flusher>,
    scheduler: FlushScheduler,
    /// Serializes session start against the synchronous part of session end
    lifecycle: Mutex<()>,
    /// Kept locally only, never part of a payload
    user_id: RwLock<String>,
    default_attributes: RwLock<Arc<[Attribute]>>,
}

/// Records events within a session and delivers them to the ingestion host.
///
/// Cloning is cheap; clones share the same session and queue.
#[derive(Clone, Debug)]
pub struct Provider {
    inner: Arc<Inner>,
}

impl Provider {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self, Error> {
        config.validate()?;
        let base_url = config.base_url()?;
        let flush_interval = config.flush_interval()?;

        let mode = if config.batching {
            DeliveryMode::Batch
        } else {
            DeliveryMode::Single
        };
        let delivery = Delivery::new(transport, &base_url, &config.app_key, mode);
        let flusher = Flusher::new(
            Arc::new(EventQueue::new()),
            delivery,
            config.max_chunk_size,
            config.max_pending_events,
        );
        debug!(url = %flusher.delivery().url(), %mode, ?flush_interval, "Created provider");

        Ok(Self {
            inner: Arc::new(Inner {
                system_props: SystemProperties::collect(&config),
                session: SessionController::new(config.batching),
                flusher: Arc::new(flusher),
                scheduler: FlushScheduler::new(),
                lifecycle: Mutex::new(()),
                user_id: RwLock::new(String::new()),
                default_attributes: RwLock::new(Vec::<Attribute>::new().into()),
                flush_interval,
                config,
            }),
        })
    }

    /// Creates a provider that delivers over HTTP with `reqwest`.
    #[cfg(feature = "reqwest")]
    pub fn with_reqwest(config: Config) -> Result<Self, Error> {
        Self::new(
            config,
            Arc::new(crate::delivery::ReqwestTransport::default()),
        )
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Starts a new session. `attributes` are added to every event recorded
    /// during it.
    ///
    /// Returns false when a session is already running or when called outside
    /// of a Tokio runtime, which is needed to schedule flushes.
    pub fn start_session(&self, attributes: Vec<Attribute>) -> bool {
        let handle = match Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                warn!("Cannot start a session without a Tokio runtime to schedule flushes on");
                return false;
            }
        };

        let _lifecycle = self.inner.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        match self.inner.session.start(attributes) {
            Ok(id) => {
                if self.inner.config.batching {
                    self.inner.scheduler.arm(
                        &handle,
                        Arc::clone(&self.inner.flusher),
                        self.inner.flush_interval,
                    );
                }
                info!(session_id = %id, "Session started");
                true
            }
            Err(e) => {
                warn!(error = %e, "Cannot start session");
                false
            }
        }
    }

    /// Ends the active session: stops the flush timer, flushes everything
    /// pending and then clears the session.
    pub async fn end_session(&self) {
        let (id, timer) = {
            let _lifecycle = self.inner.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
            match self.inner.session.begin_end() {
                Ok(id) => (id, self.inner.scheduler.disarm()),
                Err(e) => {
                    warn!(error = %e, "Ignoring request to end the session");
                    return;
                }
            }
        };

        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                error!(error = %e, "Flush timer task failed");
            }
        }
        let summary = self.inner.flusher.flush().await;
        self.inner.session.finish_end();
        info!(
            session_id = %id,
            delivered = summary.delivered,
            requeued = summary.requeued,
            "Session ended"
        );
    }

    /// Records an event in the active session. Without one the event is
    /// discarded.
    pub fn record_event(&self, name: &str, attributes: &[Attribute]) {
        let Some(session) = self.inner.session.active() else {
            warn!(event_name = name, "No active session, discarding event");
            return;
        };

        let defaults = Arc::clone(
            &self
                .inner
                .default_attributes
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let event = Event::with_layers(name, [&defaults[..], &session.attributes[..], attributes]);
        let payload = EventPayload::new(event, self.inner.system_props.clone(), session.id);

        let queue = self.inner.flusher.queue();
        queue.append(payload);
        self.inner.flusher.enforce_limit();
        trace!(event_name = name, pending = queue.count(), "Recorded event");

        if !self.inner.config.batching {
            match Handle::try_current() {
                Ok(handle) => {
                    let flusher = Arc::clone(&self.inner.flusher);
                    handle.spawn(async move {
                        flusher.flush().await;
                    });
                }
                Err(_) => debug!("No Tokio runtime, event stays queued until the next flush"),
            }
        }
    }

    /// Delivers everything pending now. An empty queue is a no-op.
    pub async fn flush_events(&self) -> FlushSummary {
        self.inner.flusher.flush().await
    }

    pub fn is_session_active(&self) -> bool {
        self.inner.session.is_active()
    }

    /// The current session identifier, or an empty string.
    pub fn session_id(&self) -> SessionId {
        self.inner.session.session_id()
    }

    /// Assigns the identifier of the next session. Always fails while
    /// batching, where identifiers are generated per session.
    pub fn set_session_id(&self, id: &str) -> bool {
        match self.inner.session.set_session_id(id.to_owned()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Cannot set the session id");
                false
            }
        }
    }

    /// Stores the user identifier. It is never sent to the ingestion host.
    pub fn set_user_id(&self, id: &str) {
        info!("The user id is only kept locally and is never sent");
        *self.inner.user_id.write().unwrap_or_else(PoisonError::into_inner) = id.to_owned();
    }

    pub fn user_id(&self) -> String {
        self.inner
            .user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the attributes added to every recorded event.
    pub fn set_default_event_attributes(&self, attributes: Vec<Attribute>) {
        *self
            .inner
            .default_attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner) = attributes.into();
    }

    pub fn default_event_attributes(&self) -> Vec<Attribute> {
        self.inner
            .default_attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    pub fn default_event_attribute_count(&self) -> usize {
        self.inner
            .default_attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn default_event_attribute(&self, index: usize) -> Option<Attribute> {
        self.inner
            .default_attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// Number of events waiting for delivery.
    pub fn pending_events(&self) -> usize {
        self.inner.flusher.queue().count()
    }

    /// Ends the active session, if any, when the host shuts down.
    pub async fn handle_host_signal(&self, signal: HostSignal) {
        debug!(%signal, "Received host signal");
        if self.is_session_active() {
            self.end_session().await;
        }
    }
}

#[async_trait]
impl AnalyticsProvider for Provider {
    fn start_session(&self, attributes: Vec<Attribute>) -> bool {
        Provider::start_session(self, attributes)
    }

    async fn end_session(&self) {
        Provider::end_session(self).await
    }

    fn record_event(&self, name: &str, attributes: &[Attribute]) {
        Provider::record_event(self, name, attributes)
    }

    async fn flush_events(&self) {
        Provider::flush_events(self).await;
    }

    fn session_id(&self) -> SessionId {
        Provider::session_id(self)
    }

    fn set_session_id(&self, id: &str) -> bool {
        Provider::set_session_id(self, id)
    }

    fn set_user_id(&self, id: &str) {
        Provider::set_user_id(self, id)
    }

    fn user_id(&self) -> String {
        Provider::user_id(self)
    }

    fn set_default_event_attributes(&self, attributes: Vec<Attribute>) {
        Provider::set_default_event_attributes(self, attributes)
    }

    fn default_event_attributes(&self) -> Vec<Attribute> {
        Provider::default_event_attributes(self)
    }

    fn default_event_attribute_count(&self) -> usize {
        Provider::default_event_attribute_count(self)
    }

    fn default_event_attribute(&self, index: usize) -> Option<Attribute> {
        Provider::default_event_attribute(self, index)
    }
}
