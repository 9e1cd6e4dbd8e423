//! Integration tests: producer/consumer exchanges over real TCP on
//! localhost, under both disciplines, plus protocol error scenarios.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use framehub_core::wire::message::{self, FrameBody};
use framehub_core::{
    ACK_TOKEN, Channel, ChannelOptions, Consumer, ConsumerOutcome, Discipline, Endpoint,
    Envelope, FrameCodec, LinkError, LinkPhase, MessageKind, NullDisplay, Packet, Producer,
    ProducerConfig, Report, StopReason, SyntheticSource,
};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

const LIMIT: Duration = Duration::from_secs(5);

// ── Helpers ──────────────────────────────────────────────────────

/// Bind a consumer channel on an OS-assigned port and return the
/// endpoint producers should dial.
async fn bind_consumer(discipline: Discipline) -> (Channel, Endpoint) {
    let channel = Channel::bind(&Endpoint::new("127.0.0.1", 0), discipline)
        .await
        .unwrap();
    let port = channel.local_addr().unwrap().port();
    (channel, Endpoint::new("127.0.0.1", port))
}

/// Run a consumer loop in the background.
fn spawn_consumer(channel: Channel) -> (CancellationToken, JoinHandle<ConsumerOutcome>) {
    let cancel = CancellationToken::new();
    let consumer = Consumer::new(channel, NullDisplay);
    let handle = tokio::spawn(consumer.run(cancel.clone()));
    (cancel, handle)
}

async fn stop_consumer(
    cancel: CancellationToken,
    handle: JoinHandle<ConsumerOutcome>,
) -> ConsumerOutcome {
    cancel.cancel();
    tokio::time::timeout(LIMIT, handle)
        .await
        .expect("consumer did not stop")
        .unwrap()
}

async fn connected_producer(endpoint: &Endpoint, discipline: Discipline) -> Channel {
    let mut channel = Channel::connect(endpoint, discipline).unwrap();
    channel.wait_connected(LIMIT).await.unwrap();
    channel
}

/// A raw framed connection that has completed the handshake.
async fn raw_producer(endpoint: &Endpoint, discipline: Discipline) -> Framed<TcpStream, FrameCodec> {
    let stream = TcpStream::connect(endpoint.connect_addr().unwrap())
        .await
        .unwrap();
    let mut framed = Framed::new(stream, FrameCodec);
    framed.send(Packet::hello(discipline).unwrap()).await.unwrap();
    let answer = framed.next().await.unwrap().unwrap();
    assert_eq!(answer.kind().unwrap(), MessageKind::Welcome);
    framed
}

/// A port nothing listens on, for producers that start first.
fn free_port() -> u16 {
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    reserved.local_addr().unwrap().port()
}

fn summary(report: &Report) -> &framehub_core::Summary {
    match report {
        Report::Summary(s) => s,
        Report::NoData => panic!("expected a summary, got no data"),
    }
}

// ── Request/reply ────────────────────────────────────────────────

#[tokio::test]
async fn test_request_reply_ten_frames_at_ten_fps() {
    let (channel, endpoint) = bind_consumer(Discipline::RequestReply).await;
    let (cancel, handle) = spawn_consumer(channel);

    let producer_channel = connected_producer(&endpoint, Discipline::RequestReply).await;
    let config = ProducerConfig {
        sender_id: "nodeA".into(),
        target_fps: 10,
        ..ProducerConfig::default()
    };
    let producer = Producer::new(
        producer_channel,
        SyntheticSource::new(32, 24).with_limit(10),
        config,
    )
    .unwrap();
    let sent = tokio::time::timeout(LIMIT, producer.run(CancellationToken::new()))
        .await
        .expect("producer did not finish")
        .unwrap();
    assert_eq!(sent.stop, StopReason::Exhausted);
    assert_eq!(sent.frames_sent, 10);
    assert_eq!(sent.replies, 10);
    assert!(sent.round_trip.is_some());

    let outcome = stop_consumer(cancel, handle).await;
    let s = summary(&outcome.report);
    assert_eq!(s.total_frames, 10);
    assert_eq!(outcome.report.frames_from("nodeA"), 10);
    assert_eq!(s.last_sender, "nodeA");
    assert_eq!(s.last_payload_size, b"P6\n32 24\n255\n".len() + 32 * 24 * 3);

    // Ten frames 100 ms apart span roughly 0.9 s.
    assert!(s.elapsed_secs > 0.8 && s.elapsed_secs < 1.5, "elapsed {}", s.elapsed_secs);
    let fps = s.final_fps.unwrap();
    assert!(fps > 6.5 && fps < 12.5, "fps {fps}");
}

#[tokio::test]
async fn test_send_returns_acknowledgment() {
    let (mut consumer, endpoint) = bind_consumer(Discipline::RequestReply).await;
    let mut producer = connected_producer(&endpoint, Discipline::RequestReply).await;

    let sender = tokio::spawn(async move {
        let envelope = Envelope::now("nodeA", vec![7; 64]).unwrap();
        let reply = producer.send(&envelope).await.unwrap();
        producer.close().await;
        reply
    });

    let envelope = tokio::time::timeout(LIMIT, consumer.receive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(envelope.sender_id(), "nodeA");
    assert_eq!(envelope.payload(), &[7; 64][..]);

    // A second receive before acknowledging is a contract violation.
    assert!(matches!(
        consumer.receive().await,
        Err(LinkError::ProtocolMisuse(_))
    ));

    consumer.acknowledge(ACK_TOKEN).unwrap();
    let reply = tokio::time::timeout(LIMIT, sender).await.unwrap().unwrap();
    assert_eq!(reply.as_deref(), Some(ACK_TOKEN));
    consumer.close().await;
}

#[tokio::test]
async fn test_producer_waits_for_late_consumer() {
    // Start the producer before anything listens.
    let endpoint = Endpoint::new("127.0.0.1", free_port());
    let options = ChannelOptions {
        reconnect_interval: Duration::from_millis(50),
        ..ChannelOptions::default()
    };
    let mut producer =
        Channel::connect_with(&endpoint, Discipline::RequestReply, &options).unwrap();
    assert!(!producer.link_phase().unwrap().is_connected());

    let sender = tokio::spawn(async move {
        let envelope = Envelope::now("late-start", vec![1, 2, 3]).unwrap();
        let reply = producer.send(&envelope).await;
        producer.close().await;
        reply
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut consumer = Channel::bind(&endpoint, Discipline::RequestReply)
        .await
        .unwrap();
    let envelope = tokio::time::timeout(LIMIT, consumer.receive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(envelope.sender_id(), "late-start");
    consumer.acknowledge(ACK_TOKEN).unwrap();

    let reply = tokio::time::timeout(LIMIT, sender).await.unwrap().unwrap();
    assert_eq!(reply.unwrap().as_deref(), Some(ACK_TOKEN));
    consumer.close().await;
}

#[tokio::test]
async fn test_timed_out_frame_is_never_delivered() {
    let endpoint = Endpoint::new("127.0.0.1", free_port());
    let options = ChannelOptions {
        reply_timeout: Some(Duration::from_millis(300)),
        reconnect_interval: Duration::from_millis(50),
        ..ChannelOptions::default()
    };
    let mut producer =
        Channel::connect_with(&endpoint, Discipline::RequestReply, &options).unwrap();

    let stale = Envelope::now("stale", vec![0; 8]).unwrap();
    assert!(matches!(
        producer.send(&stale).await,
        Err(LinkError::Timeout(_))
    ));

    let mut consumer = Channel::bind(&endpoint, Discipline::RequestReply)
        .await
        .unwrap();
    let sender = tokio::spawn(async move {
        let fresh = Envelope::now("fresh", vec![1; 8]).unwrap();
        let reply = producer.send(&fresh).await;
        producer.close().await;
        reply
    });

    let envelope = tokio::time::timeout(LIMIT, consumer.receive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(envelope.sender_id(), "fresh");
    consumer.acknowledge(ACK_TOKEN).unwrap();

    let reply = tokio::time::timeout(LIMIT, sender).await.unwrap().unwrap();
    assert_eq!(reply.unwrap().as_deref(), Some(ACK_TOKEN));
    consumer.close().await;
}

// ── Publish/subscribe ────────────────────────────────────────────

#[tokio::test]
async fn test_publish_subscribe_two_senders_interleaved() {
    let (channel, endpoint) = bind_consumer(Discipline::PublishSubscribe).await;
    let (cancel, handle) = spawn_consumer(channel);

    let mut node_a = connected_producer(&endpoint, Discipline::PublishSubscribe).await;
    let mut node_b = connected_producer(&endpoint, Discipline::PublishSubscribe).await;

    for i in 0..5u8 {
        let a = Envelope::now("nodeA", vec![i; 100]).unwrap();
        assert_eq!(node_a.send(&a).await.unwrap(), None);
        let b = Envelope::now("nodeB", vec![i; 200]).unwrap();
        assert_eq!(node_b.send(&b).await.unwrap(), None);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let c = Envelope::now("nodeB", vec![0; 300]).unwrap();
    node_b.send(&c).await.unwrap();

    node_a.close().await;
    node_b.close().await;
    assert_eq!(node_a.dropped(), 0);
    assert_eq!(node_b.dropped(), 0);

    // Let the last frames drain through the consumer.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let outcome = stop_consumer(cancel, handle).await;

    let s = summary(&outcome.report);
    assert_eq!(s.total_frames, 11);
    assert_eq!(outcome.report.frames_from("nodeA"), 5);
    assert_eq!(outcome.report.frames_from("nodeB"), 6);
    assert_eq!(s.per_sender.len(), 2);
    let a = s.per_sender.iter().find(|p| p.sender_id == "nodeA").unwrap();
    assert_eq!(a.bytes, 500);
    assert_eq!(a.last_payload_size, 100);
    assert_eq!(outcome.dropped, 0);
}

#[tokio::test]
async fn test_acknowledge_under_publish_subscribe_is_misuse() {
    let (mut consumer, endpoint) = bind_consumer(Discipline::PublishSubscribe).await;
    let mut producer = connected_producer(&endpoint, Discipline::PublishSubscribe).await;

    let envelope = Envelope::now("nodeA", vec![9; 16]).unwrap();
    producer.send(&envelope).await.unwrap();

    let received = tokio::time::timeout(LIMIT, consumer.receive())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.sent_at(), envelope.sent_at());
    assert!(matches!(
        consumer.acknowledge(ACK_TOKEN),
        Err(LinkError::ProtocolMisuse(_))
    ));

    producer.close().await;
    consumer.close().await;
}

// ── Handshake ────────────────────────────────────────────────────

#[tokio::test]
async fn test_discipline_mismatch_is_rejected() {
    let (consumer, endpoint) = bind_consumer(Discipline::PublishSubscribe).await;
    let (cancel, handle) = spawn_consumer(consumer);

    let mut producer = Channel::connect(&endpoint, Discipline::RequestReply).unwrap();
    let err = producer.wait_connected(LIMIT).await.unwrap_err();
    assert!(matches!(err, LinkError::Rejected(_)), "{err}");
    assert!(err.to_string().contains("publish-subscribe"));
    assert!(matches!(
        producer.link_phase(),
        Some(LinkPhase::Rejected { .. })
    ));

    let envelope = Envelope::now("nodeA", vec![1]).unwrap();
    assert!(matches!(
        producer.send(&envelope).await,
        Err(LinkError::Rejected(_))
    ));
    producer.close().await;

    let outcome = stop_consumer(cancel, handle).await;
    assert_eq!(outcome.report, Report::NoData);
}

// ── Malformed envelopes ──────────────────────────────────────────

#[tokio::test]
async fn test_malformed_timestamp_is_dropped_and_acknowledged() {
    let (consumer, endpoint) = bind_consumer(Discipline::RequestReply).await;
    let (cancel, handle) = spawn_consumer(consumer);
    let mut raw = raw_producer(&endpoint, Discipline::RequestReply).await;

    let bad = FrameBody {
        sender_id: "nodeA".into(),
        sent_at: "18-10-2026 09:00".into(),
        image: vec![0; 32],
    };
    let packet = Packet::new(MessageKind::Frame, message::to_bytes(&bad).unwrap()).unwrap();
    raw.send(packet).await.unwrap();
    let ack = tokio::time::timeout(LIMIT, raw.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(ack.kind().unwrap(), MessageKind::Ack);
    assert_eq!(ack.payload(), ACK_TOKEN);

    let good = Envelope::now("nodeA", vec![0; 32]).unwrap();
    raw.send(Packet::frame(&good).unwrap()).await.unwrap();
    let ack = tokio::time::timeout(LIMIT, raw.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(ack.kind().unwrap(), MessageKind::Ack);

    raw.send(Packet::empty(MessageKind::Goodbye)).await.unwrap();
    let outcome = stop_consumer(cancel, handle).await;
    assert_eq!(outcome.malformed, 1);
    assert_eq!(outcome.report.total_frames(), 1);
}

// ── Cancellation ─────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_during_receive_keeps_prior_frames() {
    let (consumer, endpoint) = bind_consumer(Discipline::RequestReply).await;
    let (cancel, handle) = spawn_consumer(consumer);
    let mut producer = connected_producer(&endpoint, Discipline::RequestReply).await;

    for i in 0..3u8 {
        let envelope = Envelope::now("nodeA", vec![i; 10]).unwrap();
        let reply = tokio::time::timeout(LIMIT, producer.send(&envelope))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.as_deref(), Some(ACK_TOKEN));
    }

    // The consumer is now parked in receive with nothing arriving.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let outcome = stop_consumer(cancel, handle).await;
    assert!(outcome.fault.is_none());
    let s = summary(&outcome.report);
    assert_eq!(s.total_frames, 3);
    assert_eq!(s.last_payload_size, 10);

    producer.close().await;
}

#[tokio::test]
async fn test_cancel_with_no_frames_reports_no_data() {
    let (consumer, _) = bind_consumer(Discipline::PublishSubscribe).await;
    let (cancel, handle) = spawn_consumer(consumer);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let outcome = stop_consumer(cancel, handle).await;
    assert_eq!(outcome.report, Report::NoData);
    assert!(outcome.report.to_string().contains("No frames received"));
}
