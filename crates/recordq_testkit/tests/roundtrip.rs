//! Write-then-read behavior of the queue.

use proptest::prelude::*;
use recordq_core::{ErrorKind, SequenceNumber};
use recordq_testkit::prelude::*;

#[tokio::test]
async fn three_records_write_read_confirm() {
    let dir = TestDir::new();
    let log = UploadLog::new();
    let queue = dir.open(&log).await;

    assert_eq!(queue.write(b"a").await.unwrap(), SequenceNumber::new(0));
    assert_eq!(queue.write(b"bb").await.unwrap(), SequenceNumber::new(1));
    assert_eq!(queue.write(b"").await.unwrap(), SequenceNumber::new(2));

    queue
        .read_from(SequenceNumber::new(0), log.session())
        .await
        .unwrap();
    assert_eq!(
        log.payloads(),
        vec![b"a".to_vec(), b"bb".to_vec(), Vec::new()]
    );
    assert_eq!(log.completions(), vec![Ok(())]);

    queue.confirm(SequenceNumber::new(1)).await.unwrap();
    log.clear();

    let err = queue
        .read_from(SequenceNumber::new(0), log.session())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfRange);
    assert_eq!(log.completions(), vec![Err(ErrorKind::OutOfRange)]);
    log.clear();

    queue
        .read_from(SequenceNumber::new(2), log.session())
        .await
        .unwrap();
    assert_eq!(log.records(), vec![record(2, b"")]);
}

#[tokio::test]
async fn records_arrive_in_write_order_across_segments() {
    let dir = TestDir::new();
    let log = UploadLog::new();
    let queue = dir
        .open_with(dir.options_with_frames_per_segment(4), log.factory())
        .await;

    write_small(&queue, 25).await;
    queue.flush().await.unwrap();

    assert_eq!(log.sequences(), (0..25).collect::<Vec<u64>>());
    let expected: Vec<Vec<u8>> = (0..25).map(small_payload).collect();
    assert_eq!(log.payloads(), expected);
}

#[tokio::test]
async fn flush_includes_current_segment() {
    let dir = TestDir::new();
    let log = UploadLog::new();
    let queue = dir.open(&log).await;

    queue.write(b"pending").await.unwrap();
    queue.flush().await.unwrap();

    assert_eq!(log.records(), vec![record(0, b"pending")]);
    assert_eq!(dir.segment_keys(), vec![0, 1]);
}

#[tokio::test]
async fn session_can_stop_walk_early() {
    let dir = TestDir::new();
    let log = UploadLog::new();
    let queue = dir.open(&log).await;
    write_small(&queue, 5).await;

    queue
        .read_from(SequenceNumber::new(0), log.session_with_limit(2))
        .await
        .unwrap();

    assert_eq!(log.sequences(), vec![0, 1]);
    assert_eq!(log.completions(), vec![Ok(())]);
    assert_eq!(queue.stats().await.unwrap().active_reads, 0);
}

#[tokio::test]
async fn reading_past_last_record_is_out_of_range() {
    let dir = TestDir::new();
    let log = UploadLog::new();
    let queue = dir.open(&log).await;
    write_small(&queue, 2).await;

    let err = queue
        .read_from(SequenceNumber::new(2), log.session())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfRange);
    assert!(log.records().is_empty());
}

#[tokio::test]
async fn large_records_span_many_read_buffers() {
    let dir = TestDir::new();
    let log = UploadLog::new();
    let options = dir.options().read_buffer_size(64);
    let queue = dir.open_with(options, log.factory()).await;

    let big: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    queue.write(&big).await.unwrap();
    queue.write(b"after").await.unwrap();
    queue.flush().await.unwrap();

    assert_eq!(log.payloads(), vec![big, b"after".to_vec()]);
}

#[tokio::test]
async fn record_over_queue_budget_is_rejected() {
    let dir = TestDir::new();
    let log = UploadLog::new();
    let options = dir.options().total_queue_max_size(1024);
    let queue = dir.open_with(options, log.factory()).await;

    let err = queue.write(&[0u8; 2000]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfRange);

    // The rejected record took no sequence number.
    assert_eq!(queue.write(b"ok").await.unwrap(), SequenceNumber::new(0));
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn written_records_read_back_from_any_start(
        payloads in payloads_strategy(12),
        pick in any::<prop::sample::Index>(),
    ) {
        let start = pick.index(payloads.len());
        let (sequences, read) = test_runtime().block_on(async {
            let dir = TestDir::new();
            let log = UploadLog::new();
            let options = dir.options().single_file_max_size(256);
            let queue = dir.open_with(options, log.factory()).await;

            let mut sequences = Vec::new();
            for payload in &payloads {
                sequences.push(queue.write(payload).await.unwrap());
            }
            queue.read_from(sequences[start], log.session()).await.unwrap();
            queue.close().await.unwrap();
            (sequences, log.records())
        });

        let expected: Vec<u64> = (0..payloads.len() as u64).collect();
        let assigned: Vec<u64> = sequences.iter().map(|s| s.as_u64()).collect();
        prop_assert_eq!(assigned, expected);

        prop_assert_eq!(read.len(), payloads.len() - start);
        for (record, (index, payload)) in read.iter().zip(payloads.iter().enumerate().skip(start)) {
            prop_assert_eq!(record.sequence.as_u64(), index as u64);
            prop_assert_eq!(&record.payload[..], &payload[..]);
        }
    }
}
