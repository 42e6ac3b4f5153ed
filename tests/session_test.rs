//! Integration tests for stream sessions driven through in-memory streams.

use recognition_link::{
    create_shared_stats, ChannelObserver, ChannelStream, SessionEnd, SessionEvent, SessionState,
    StreamSession, TransportError,
};
use std::time::Duration;

fn record_sequences(events: &[SessionEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Record { record, .. } => Some(record.sequence),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_split_record_is_delivered_once() {
    let (observer, events) = ChannelObserver::new();
    let session = StreamSession::new(3, vec![observer], create_shared_stats()).unwrap();
    let (sender, stream) = ChannelStream::new(8);
    session.attach(Box::new(stream)).unwrap();

    sender
        .send(Ok(br#"{"ModelNumber":0,"Classif"#.to_vec()))
        .await
        .unwrap();
    sender
        .send(Ok(b"ication\":4}\n{\"ModelNumber\":0,\"Classification\":4}\n".to_vec()))
        .await
        .unwrap();
    drop(sender);

    assert_eq!(session.closed().await, Some(SessionEnd::Completed));
    let collected: Vec<SessionEvent> = events.try_iter().collect();
    assert_eq!(record_sequences(&collected), vec![0, 1]);

    let last_window = collected
        .iter()
        .rev()
        .find_map(|event| match event {
            SessionEvent::Record { window, .. } => Some(window.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        last_window.majority("Classification"),
        Some((serde_json::json!(4), 2))
    );
}

#[tokio::test]
async fn test_sequence_stays_contiguous_across_bad_frames() {
    let stats = create_shared_stats();
    let (observer, events) = ChannelObserver::new();
    let session = StreamSession::new(10, vec![observer], stats.clone()).unwrap();
    let (sender, stream) = ChannelStream::new(8);
    session.attach(Box::new(stream)).unwrap();

    sender
        .send(Ok(b"{\"n\":1}\nnot json\n\n[1,2]\n{\"n\":2}\n".to_vec()))
        .await
        .unwrap();
    sender.send(Ok(b"{\"n\":3}\n{\"n\":".to_vec())).await.unwrap();
    drop(sender);

    session.closed().await;
    let collected: Vec<SessionEvent> = events.try_iter().collect();
    assert_eq!(record_sequences(&collected), vec![0, 1, 2]);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.records_delivered, 3);
    assert_eq!(snapshot.decode_errors, 3);
    assert_eq!(snapshot.discarded_tail_bytes, 5);
}

#[tokio::test]
async fn test_new_session_restarts_sequence_at_zero() {
    let stats = create_shared_stats();

    for _ in 0..2 {
        let (observer, events) = ChannelObserver::new();
        let session = StreamSession::new(2, vec![observer], stats.clone()).unwrap();
        let (sender, stream) = ChannelStream::new(4);
        session.attach(Box::new(stream)).unwrap();
        sender.send(Ok(b"{\"a\":1}\n{\"a\":2}\n".to_vec())).await.unwrap();
        drop(sender);
        session.closed().await;

        let collected: Vec<SessionEvent> = events.try_iter().collect();
        assert_eq!(record_sequences(&collected), vec![0, 1]);
    }

    assert_eq!(stats.snapshot().sessions_started, 2);
}

#[tokio::test]
async fn test_no_record_after_cancel_returns() {
    let (observer, events) = ChannelObserver::new();
    let session = StreamSession::new(5, vec![observer], create_shared_stats()).unwrap();
    let (sender, stream) = ChannelStream::new(64);
    session.attach(Box::new(stream)).unwrap();

    sender.send(Ok(b"{\"n\":0}\n".to_vec())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(session.cancel());
    // Buffered after the stop; none of it may reach observers
    for n in 1..20 {
        let _ = sender.send(Ok(format!("{{\"n\":{n}}}\n").into_bytes())).await;
    }

    assert_eq!(session.closed().await, Some(SessionEnd::Cancelled));
    assert_eq!(session.state(), SessionState::Closed);

    let collected: Vec<SessionEvent> = events.try_iter().collect();
    assert_eq!(record_sequences(&collected), vec![0]);
    assert!(matches!(
        collected.last(),
        Some(SessionEvent::Ended {
            end: SessionEnd::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn test_transport_error_ends_session_as_failed() {
    let stats = create_shared_stats();
    let (observer, events) = ChannelObserver::new();
    let session = StreamSession::new(1, vec![observer], stats.clone()).unwrap();
    let (sender, stream) = ChannelStream::new(4);
    session.attach(Box::new(stream)).unwrap();

    sender.send(Ok(b"{\"n\":0}\n".to_vec())).await.unwrap();
    sender
        .send(Err(TransportError::new("connection reset")))
        .await
        .unwrap();

    let end = session.closed().await;
    assert_eq!(
        end,
        Some(SessionEnd::Failed(TransportError::new("connection reset")))
    );
    assert!(end.unwrap().is_error());
    assert_eq!(stats.snapshot().transport_errors, 1);

    let collected: Vec<SessionEvent> = events.try_iter().collect();
    assert_eq!(record_sequences(&collected), vec![0]);
}
