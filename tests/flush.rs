use common::{config, MockTransport, APP_KEY};
use pretty_assertions::assert_eq;
use session_telemetry::*;
use std::{sync::Arc, time::Duration};
use test_log::test;
use tokio::time::{sleep, timeout};

mod common;

fn provider(transport: &Arc<MockTransport>, cfg: Config) -> Provider {
    Provider::new(cfg, transport.clone()).unwrap()
}

async fn flush_once_with(response: Result<u16, TransportError>) -> (FlushSummary, usize) {
    let transport = MockTransport::new(response);
    let p = provider(&transport, config());
    assert!(p.start_session(vec![]));
    for i in 0..3 {
        p.record_event(&format!("e{i}"), &[]);
    }
    let summary = p.flush_events().await;
    (summary, p.pending_events())
}

#[test(tokio::test)]
async fn service_unavailable_requeues_the_chunk() {
    let (summary, pending) = flush_once_with(Ok(503)).await;
    assert_eq!(summary.requeued, 3);
    assert_eq!(summary.dropped, 0);
    assert_eq!(pending, 3);
}

#[test(tokio::test)]
async fn no_response_requeues_the_chunk() {
    let (summary, pending) =
        flush_once_with(Err(TransportError::Connect("connection refused".to_owned()))).await;
    assert_eq!(summary.requeued, 3);
    assert_eq!(pending, 3);
}

#[test(tokio::test)]
async fn unrecognized_status_requeues_the_chunk() {
    let (summary, pending) = flush_once_with(Ok(302)).await;
    assert_eq!(summary.requeued, 3);
    assert_eq!(pending, 3);
}

#[test(tokio::test)]
async fn unprocessable_entity_drops_the_chunk() {
    let (summary, pending) = flush_once_with(Ok(422)).await;
    assert_eq!(summary.dropped, 3);
    assert_eq!(summary.requeued, 0);
    assert_eq!(pending, 0);
}

#[test(tokio::test)]
async fn flushing_an_empty_queue() {
    let transport = MockTransport::new(Ok(200));
    let p = provider(&transport, config());
    assert_eq!(p.flush_events().await, FlushSummary::default());
    assert!(p.start_session(vec![]));
    assert_eq!(p.flush_events().await, FlushSummary::default());
    assert_eq!(transport.request_count(), 0);
}

#[test(tokio::test)]
async fn large_queues_are_sent_in_chunks() {
    let transport = MockTransport::new(Ok(200));
    let p = provider(&transport, config());
    assert!(p.start_session(vec![]));
    for i in 0..60 {
        p.record_event(&format!("e{i:02}"), &[]);
    }

    let summary = p.flush_events().await;
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.delivered, 60);

    // Chunks are delivered concurrently, so request order is not fixed
    let mut batches = transport.batches();
    batches.sort_by_key(|b| b[0].clone());
    assert_eq!(
        batches.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![25, 25, 10]
    );
    let flattened: Vec<String> = batches.concat();
    let expected: Vec<String> = (0..60).map(|i| format!("e{i:02}")).collect();
    assert_eq!(flattened, expected);
}

#[test(tokio::test)]
async fn partial_failures_only_requeue_their_chunk() {
    let transport = MockTransport::new(Ok(200));
    let mut cfg = config();
    cfg.max_chunk_size = 2;
    let p = provider(&transport, cfg);
    assert!(p.start_session(vec![]));
    p.record_event("a", &[]);
    p.record_event("b", &[]);
    p.flush_events().await;

    p.record_event("c", &[]);
    transport.then(Ok(500));
    let summary = p.flush_events().await;
    assert_eq!(summary.requeued, 1);
    assert_eq!(p.pending_events(), 1);

    p.record_event("d", &[]);
    p.record_event("e", &[]);
    transport.then(Ok(400));
    let summary = p.flush_events().await;
    // One of [c, d] and [e] is rejected, the other delivered
    assert_eq!(summary.chunks, 2);
    assert_eq!(summary.requeued, 0);
    assert!(summary.dropped == 1 || summary.dropped == 2);
    assert_eq!(summary.dropped + summary.delivered, 3);
    assert_eq!(p.pending_events(), 0);
}

fn single_event_flusher(transport: &Arc<MockTransport>, names: &[&str]) -> Arc<Flusher> {
    let cfg = config();
    let delivery = Delivery::new(
        transport.clone(),
        "http://localhost:3000",
        APP_KEY,
        DeliveryMode::Single,
    );
    let flusher = Arc::new(Flusher::new(Arc::new(EventQueue::new()), delivery, 3, None));
    let props = SystemProperties::collect(&cfg);
    for name in names {
        flusher.queue().append(EventPayload::new(
            Event::new(name, &[]),
            props.clone(),
            "s1".to_owned(),
        ));
    }
    flusher
}

#[test(tokio::test)]
async fn single_event_delivery_settles_each_event() {
    let transport = MockTransport::new(Ok(200));
    transport.then(Ok(400));
    let flusher = single_event_flusher(&transport, &["a", "b", "c"]);

    let summary = flusher.flush().await;
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.dropped, 1);
    assert_eq!(transport.request_count(), 3);
    assert_eq!(flusher.queue().count(), 0);

    let transport = MockTransport::new(Ok(200));
    transport.then(Ok(503));
    let flusher = single_event_flusher(&transport, &["a", "b", "c"]);

    let summary = flusher.flush().await;
    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.requeued, 1);
    assert_eq!(flusher.queue().count(), 1);

    // Only the failed event is sent again
    flusher.flush().await;
    assert_eq!(transport.request_count(), 4);
    assert_eq!(flusher.queue().count(), 0);
    assert!(transport
        .requests()
        .iter()
        .all(|r| r.url == "http://localhost:3000/api/v0/event"));
}

#[test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_flushes_deliver_each_event_once() {
    let transport = MockTransport::new(Ok(200));
    let p = provider(&transport, config());
    assert!(p.start_session(vec![]));
    for i in 0..30 {
        p.record_event(&format!("e{i}"), &[]);
    }

    let (a, b, c) = tokio::join!(p.flush_events(), p.flush_events(), p.flush_events());
    assert_eq!(a.delivered + b.delivered + c.delivered, 30);
    assert_eq!(transport.request_count(), 2);

    let mut names: Vec<String> = transport.batches().concat();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 30);
}

#[test(tokio::test)]
async fn pending_limit_drops_the_oldest_events() {
    let transport = MockTransport::new(Ok(503));
    let mut cfg = config();
    cfg.max_pending_events = Some(3);
    let p = provider(&transport, cfg);
    assert!(p.start_session(vec![]));
    for i in 0..5 {
        p.record_event(&format!("e{i}"), &[]);
    }
    assert_eq!(p.pending_events(), 3);

    let summary = p.flush_events().await;
    assert_eq!(summary.requeued, 3);
    assert_eq!(p.pending_events(), 3);

    transport.respond_with(Ok(200));
    p.flush_events().await;
    assert_eq!(transport.batches()[1], vec!["e2", "e3", "e4"]);
}

#[test(tokio::test(start_paused = true))]
async fn timer_flushes_while_the_session_is_active() {
    let transport = MockTransport::new(Ok(200));
    let p = provider(&transport, config());
    assert!(p.start_session(vec![]));
    p.record_event("first", &[]);

    sleep(Duration::from_secs(59)).await;
    assert_eq!(transport.request_count(), 0);

    sleep(Duration::from_secs(2)).await;
    assert_eq!(transport.request_count(), 1);
    assert_eq!(p.pending_events(), 0);

    p.record_event("second", &[]);
    sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.request_count(), 2);

    // Empty queues don't produce requests
    sleep(Duration::from_secs(120)).await;
    assert_eq!(transport.request_count(), 2);
}

#[test(tokio::test(start_paused = true))]
async fn debug_interval() {
    let transport = MockTransport::new(Ok(200));
    let mut cfg = config();
    cfg.debug = true;
    let p = provider(&transport, cfg);
    assert!(p.start_session(vec![]));
    p.record_event("tick", &[]);

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(transport.request_count(), 1);
    assert_eq!(transport.bodies()[0][0]["systemProps"]["isDebug"], true);
}

#[test(tokio::test(start_paused = true))]
async fn ending_the_session_stops_the_timer() {
    let transport = MockTransport::new(Ok(500));
    let p = provider(&transport, config());
    assert!(p.start_session(vec![]));
    p.record_event("e", &[]);

    p.end_session().await;
    assert_eq!(transport.request_count(), 1);
    assert_eq!(p.pending_events(), 1);

    // The requeued event stays put until a session flushes it again
    sleep(Duration::from_secs(600)).await;
    assert_eq!(transport.request_count(), 1);
    assert_eq!(p.pending_events(), 1);
}

#[test(tokio::test(start_paused = true))]
async fn ending_the_session_during_a_timer_flush() {
    let transport = MockTransport::new(Ok(503));
    transport.with_latency(Duration::from_secs(5));
    let mut cfg = config();
    cfg.send_interval = 1.0;
    let p = provider(&transport, cfg);
    assert!(p.start_session(vec![]));
    p.record_event("slow", &[]);

    // The timer fired at 1s and its chunk is still in flight
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(transport.request_count(), 1);
    assert_eq!(p.pending_events(), 0);

    p.end_session().await;
    assert!(!p.is_session_active());
    // The in-flight chunk was requeued, then sent once more by the final flush
    assert_eq!(transport.request_count(), 2);
    assert_eq!(p.pending_events(), 1);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.request_count(), 2);
    assert_eq!(p.pending_events(), 1);
}

#[test(tokio::test(start_paused = true))]
async fn abandoned_flush_still_settles_its_chunks() {
    let transport = MockTransport::new(Ok(503));
    transport.with_latency(Duration::from_secs(5));
    let p = provider(&transport, config());
    assert!(p.start_session(vec![]));
    p.record_event("e", &[]);

    assert!(timeout(Duration::from_secs(1), p.flush_events())
        .await
        .is_err());
    assert_eq!(transport.request_count(), 1);
    assert_eq!(p.pending_events(), 0);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(p.pending_events(), 1);

    transport.respond_with(Ok(200));
    let summary = p.flush_events().await;
    assert_eq!(summary.delivered, 1);
    assert_eq!(transport.request_count(), 2);
    assert_eq!(p.pending_events(), 0);
}
