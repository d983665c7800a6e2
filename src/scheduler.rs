use crate::{
    delivery::{Delivery, DeliveryMode, DeliveryOutcome},
    queue::EventQueue,
    types::EventPayload,
};
use itertools::Itertools;
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{
    runtime::Handle,
    task::{JoinHandle, JoinSet},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// What a single flush cycle did with the events it drained.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct FlushSummary {
    /// Chunks attempted
    pub chunks: usize,
    /// Events confirmed by the ingestion host
    pub delivered: usize,
    /// Events put back for the next cycle
    pub requeued: usize,
    /// Events dropped, either rejected or over the pending limit
    pub dropped: usize,
}

/// A delivered chunk together with its outcome.
#[derive(Debug)]
struct Completion {
    chunk: Vec<EventPayload>,
    outcome: DeliveryOutcome,
}

/// Runs drain-and-deliver cycles against a shared [`EventQueue`].
///
/// Cycles are serialized: a cycle drains the queue, delivers every chunk
/// concurrently and settles every completion (requeueing retryable failures)
/// before the next cycle may start.
#[derive(Debug)]
pub struct Flusher {
    queue: Arc<EventQueue>,
    delivery: Delivery,
    max_chunk_size: usize,
    max_pending_events: Option<usize>,
    cycle: tokio::sync::Mutex<()>,
}

impl Flusher {
    /// In [`DeliveryMode::Single`] every chunk holds exactly one payload, so
    /// each event gets its own outcome and `max_chunk_size` is ignored.
    pub fn new(
        queue: Arc<EventQueue>,
        delivery: Delivery,
        max_chunk_size: usize,
        max_pending_events: Option<usize>,
    ) -> Self {
        let max_chunk_size = match delivery.mode() {
            DeliveryMode::Single => 1,
            DeliveryMode::Batch => max_chunk_size,
        };
        Self {
            queue,
            delivery,
            max_chunk_size,
            max_pending_events,
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Runs one full cycle.
    ///
    /// The cycle runs on its own task, so dropping the returned future does
    /// not abandon chunks that are already in flight.
    pub async fn flush(self: &Arc<Self>) -> FlushSummary {
        let this = Arc::clone(self);
        match tokio::spawn(async move { this.cycle().await }).await {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "Flush cycle failed");
                FlushSummary::default()
            }
        }
    }

    async fn cycle(&self) -> FlushSummary {
        let _cycle = self.cycle.lock().await;
        let mut summary = FlushSummary::default();

        let chunks = self.queue.drain_chunks(self.max_chunk_size).collect_vec();
        if chunks.is_empty() {
            trace!("Nothing to flush");
            return summary;
        }
        summary.chunks = chunks.len();
        debug!(chunks = chunks.len(), "Flushing events");

        let mut in_flight = JoinSet::new();
        for chunk in chunks {
            let delivery = self.delivery.clone();
            in_flight.spawn(async move {
                let outcome = delivery.send_chunk(&chunk).await;
                Completion { chunk, outcome }
            });
        }

        while let Some(res) = in_flight.join_next().await {
            match res {
                Ok(completion) => self.settle(completion, &mut summary),
                Err(e) => error!(error = %e, "Chunk delivery task failed, its events are lost"),
            }
        }

        summary.dropped += self.enforce_limit();
        debug!(
            delivered = summary.delivered,
            requeued = summary.requeued,
            dropped = summary.dropped,
            pending = self.queue.count(),
            "Flush complete"
        );
        summary
    }

    fn settle(&self, completion: Completion, summary: &mut FlushSummary) {
        let Completion { chunk, outcome } = completion;
        let events = chunk.len();
        match outcome {
            DeliveryOutcome::Success => {
                trace!(events, "Chunk delivered");
                summary.delivered += events;
            }
            DeliveryOutcome::ClientError { .. } => {
                error!(events, %outcome, "Ingestion host rejected chunk, dropping it");
                summary.dropped += events;
            }
            DeliveryOutcome::ServerError { .. } | DeliveryOutcome::NetworkFailure => {
                error!(events, %outcome, "Chunk delivery failed, requeueing it");
                self.queue.requeue(chunk);
                summary.requeued += events;
            }
        }
    }

    /// Drops the oldest pending events beyond the configured limit.
    pub fn enforce_limit(&self) -> usize {
        let Some(max) = self.max_pending_events else {
            return 0;
        };
        let dropped = self.queue.trim_oldest(max);
        if dropped != 0 {
            error!(dropped, max, "Pending event limit reached, dropped the oldest events");
        }
        dropped
    }
}

#[derive(Debug)]
struct Armed {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Fires a flush cycle every interval while armed.
#[derive(Debug, Default)]
pub struct FlushScheduler {
    armed: Mutex<Option<Armed>>,
}

impl FlushScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Armed>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the recurring timer on `handle`. The first fire happens one
    /// `interval` from now. Re-arming replaces the previous timer.
    pub fn arm(&self, handle: &Handle, flusher: Arc<Flusher>, interval: Duration) {
        let token = CancellationToken::new();
        let task = handle.spawn(run_timer(flusher, interval, token.clone()));
        if let Some(prev) = self.lock().replace(Armed { token, task }) {
            prev.token.cancel();
        }
        debug!(?interval, "Flush timer armed");
    }

    /// Stops future fires immediately. A fire that is already flushing runs to
    /// completion; the returned handle resolves once it has.
    pub fn disarm(&self) -> Option<JoinHandle<()>> {
        let armed = self.lock().take()?;
        armed.token.cancel();
        Some(armed.task)
    }

    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        if let Some(armed) = self.lock().take() {
            armed.token.cancel();
        }
    }
}

async fn run_timer(flusher: Arc<Flusher>, interval: Duration, token: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if token.is_cancelled() {
            break;
        }
        trace!("Flush timer fired");
        flusher.flush().await;
    }
    debug!("Flush timer stopped");
}
