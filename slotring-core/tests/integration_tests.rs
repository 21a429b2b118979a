// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! End-to-end integration tests for slotring.
//!
//! These tests run full sessions through the LifecycleManager, with the
//! producer on its own thread and the consumer on the test thread.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use slotring_core::ring::{Message, SharedRegion};
use slotring_core::shm::SharedMemoryRegion;
use slotring_core::state::ProducerState;
use slotring_core::{
    Backing, ConfigLoader, LifecycleManager, MessageSize, RegionHandle, RegionLayout, RegionName,
    RingConfig, RingError, SlotCount,
};

fn layout(slots: usize, msg_size: usize) -> RegionLayout {
    RegionLayout::new(
        SlotCount::new(slots).expect("valid slot count"),
        MessageSize::new(msg_size).expect("valid message size"),
    )
}

fn heap_config(slots: usize, msg_size: usize, count: Option<u64>) -> RingConfig {
    let mut config = RingConfig::default();
    config.layout = layout(slots, msg_size);
    config.session.message_count = count;
    config.session.poll_timeout = Duration::from_secs(2);
    config
}

fn posix_config(tag: &str, slots: usize, msg_size: usize, count: Option<u64>) -> RingConfig {
    let mut config = heap_config(slots, msg_size, count);
    let name = format!("slotring-it-{}-{}", std::process::id(), tag);
    config.backing = Backing::Posix {
        name: RegionName::new(name).expect("valid region name"),
    };
    config
}

fn wait_for_state(handle: &RegionHandle, state: ProducerState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.producer_state() != state {
        assert!(
            Instant::now() < deadline,
            "producer stuck in {}",
            handle.producer_state()
        );
        thread::sleep(Duration::from_millis(1));
    }
}

fn run_scenario(config: RingConfig) {
    let count = config.session.message_count.expect("bounded scenario");
    let msg_size = config.layout.msg_size() as u64;
    let poll = config.session.poll_timeout;

    let manager = LifecycleManager::new(config);
    let mut handle = manager.acquire().expect("acquire");
    let mut consumer = handle.take_consumer().expect("consumer");

    let report = consumer.drain(count, poll).expect("drain");
    assert_eq!(report.messages, count);
    assert_eq!(report.bytes, count * msg_size);
    assert!(report.in_sync, "desync: {:?}", report.first_desync);
    assert_eq!(report.mismatches, 0);

    let (head, tail) = handle.region().snapshot();
    assert_eq!(head, tail);

    let produced = manager.release(handle).expect("release");
    assert_eq!(produced.published, count);
    assert!(!produced.stopped_early);

    manager.destroy().expect("destroy");
}

/// 8 slots, 4096-byte messages, 4000 messages: everything arrives in order.
#[test]
fn test_reference_scenario_heap() {
    run_scenario(heap_config(8, 4096, Some(4000)));
}

#[test]
fn test_reference_scenario_posix() {
    run_scenario(posix_config("scenario", 8, 4096, Some(4000)));
}

#[test]
fn test_in_order_delivery_across_slot_counts() {
    for slots in [2, 3, 5, 16, 64] {
        for count in [0u64, 1, 7, 500] {
            let manager = LifecycleManager::new(heap_config(slots, 64, Some(count)));
            let mut handle = manager.acquire().expect("acquire");
            let mut consumer = handle.take_consumer().expect("consumer");

            let report = consumer
                .drain(count, Duration::from_secs(2))
                .expect("drain");
            assert_eq!(report.messages, count, "slots={slots}");
            assert!(report.in_sync, "slots={slots} count={count}");

            manager.release(handle).expect("release");
        }
    }
}

/// A slow consumer must never observe an overwritten slot, and the producer
/// never has more than SLOTS - 1 messages outstanding.
#[test]
fn test_slow_consumer_no_overwrite() {
    let slots = 4;
    let count = 40;
    let manager = LifecycleManager::new(heap_config(slots, 64, Some(count)));
    let mut handle = manager.acquire().expect("acquire");
    let mut consumer = handle.take_consumer().expect("consumer");

    let mut buf = vec![0u8; 64];
    for seq in 0..count {
        thread::sleep(Duration::from_millis(1));
        assert!(handle.region().occupied() <= slots - 1);
        consumer
            .consume_timeout(&mut buf, Duration::from_secs(2))
            .expect("message");
        assert_eq!(Message::sequence_of(&buf), Some(seq));
    }

    manager.release(handle).expect("release");
}

#[test]
fn test_producer_blocks_when_full() {
    let slots = 8;
    let manager = LifecycleManager::new(heap_config(slots, 64, Some(100)));
    let handle = manager.acquire().expect("acquire");

    // Without a consumer the producer fills SLOTS - 1 slots and spins.
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.region().occupied() < slots - 1 {
        assert!(Instant::now() < deadline, "ring never filled");
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(20));
    assert_eq!(handle.region().occupied(), slots - 1);
    assert_eq!(handle.producer_state(), ProducerState::Running);

    let report = manager.release(handle).expect("release");
    assert_eq!(report.published, (slots - 1) as u64);
    assert!(report.stopped_early);
}

#[test]
fn test_boundary_capacity_in_process() {
    let slots = 6;
    let region = SharedRegion::heap(layout(slots, 32)).expect("region");
    let (mut producer, mut consumer) = region.into_split();

    for _ in 0..slots - 1 {
        producer.try_publish(b"payload").expect("free slot");
    }
    assert_eq!(producer.try_publish(b"payload"), Err(RingError::Full));

    let mut buf = [0u8; 32];
    consumer.try_consume(&mut buf).expect("message");
    assert_eq!(&buf[..7], b"payload");
    producer.try_publish(b"payload").expect("slot freed");
}

#[test]
fn test_bytes_round_trip() {
    let region = SharedRegion::heap(layout(4, 128)).expect("region");
    let (mut producer, mut consumer) = region.into_split();

    let payload: Vec<u8> = (0..128u8).collect();
    producer.try_publish(&payload).expect("publish");

    let mut buf = vec![0u8; 128];
    consumer.try_consume(&mut buf).expect("consume");
    assert_eq!(buf, payload);
}

/// Each session starts from head = tail = 0; leftover slot bytes stay but
/// are unreachable.
#[test]
fn test_session_reset_keeps_stale_bytes_unreachable() {
    let manager = LifecycleManager::new(heap_config(8, 64, Some(5)));

    let mut first = manager.acquire().expect("first session");
    let mut consumer = first.take_consumer().expect("consumer");
    wait_for_state(&first, ProducerState::Stopped);
    let mut buf = vec![0u8; 64];
    consumer.try_consume(&mut buf).expect("message 0");
    consumer.try_consume(&mut buf).expect("message 1");
    assert_eq!(first.region().snapshot(), (5, 2));
    manager.release(first).expect("release first");

    let second = manager.acquire_with_count(Some(0)).expect("second session");
    assert_eq!(second.session_id(), 2);
    wait_for_state(&second, ProducerState::Stopped);
    assert_eq!(second.region().snapshot(), (0, 0));
    assert_eq!(
        Message::sequence_of(&manager.inspect_slot(0).expect("slot 0")),
        Some(0)
    );
    manager.release(second).expect("release second");
    assert_eq!(manager.header().expect("header"), (0, 0));
}

#[test]
fn test_teardown_state_ordering() {
    let manager = LifecycleManager::new(heap_config(2, 64, None));
    let handle = manager.acquire().expect("acquire");
    assert_eq!(handle.producer_state(), ProducerState::Running);

    assert_eq!(handle.control().request_stop(), ProducerState::StopRequested);
    assert!(handle.producer_state().is_stopping());
    // Idempotent once stopping.
    assert!(handle.control().request_stop().is_stopping());
    wait_for_state(&handle, ProducerState::Stopped);

    let report = manager.release(handle).expect("release");
    assert!(report.stopped_early);
    // No half-published message: every published one is whole.
    assert_eq!(manager.header().expect("header").0 as u64, report.published);
}

#[test]
fn test_unbounded_session_until_stop_flag() {
    let manager = LifecycleManager::new(heap_config(4, 64, None));
    let mut handle = manager.acquire().expect("acquire");
    let mut consumer = handle.take_consumer().expect("consumer");

    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let drainer =
        thread::spawn(move || consumer.drain_until(&flag, Duration::from_millis(10)));

    thread::sleep(Duration::from_millis(50));
    handle.control().request_stop();
    wait_for_state(&handle, ProducerState::Stopped);
    stop.store(true, Ordering::Release);

    let consumed = drainer.join().expect("drainer");
    let produced = manager.release(handle).expect("release");

    assert!(consumed.in_sync);
    assert_eq!(consumed.messages, produced.published);
    assert!(produced.published > 0);
}

#[test]
fn test_phase_recording_both_sides() {
    let manager =
        LifecycleManager::new(heap_config(8, 64, Some(20))).with_phase_recording(true);
    let mut handle = manager.acquire().expect("acquire");
    let mut consumer = handle.take_consumer().expect("consumer");

    let consumed = consumer.drain(20, Duration::from_secs(2)).expect("drain");
    let produced = manager.release(handle).expect("release");

    assert!(!produced.timestamps.is_empty());
    assert!(!consumed.timestamps.is_empty());

    let mut all = produced.timestamps;
    all.extend(consumed.timestamps);
    let summary = slotring_core::timestamp::PhaseSummary::from_records(&all);
    assert_eq!(summary.write.count, 20);
    assert_eq!(summary.read.count, 20);
    assert_eq!(summary.transit.count, 20);
}

#[test]
fn test_single_side_attach_from_separate_views() {
    let layout = layout(4, 128);
    let name = RegionName::new(format!("slotring-it-{}-attach", std::process::id()))
        .expect("valid region name");
    let owner = SharedMemoryRegion::create(&name, layout.total_len()).expect("create block");

    let producer_view = SharedMemoryRegion::open(&name, layout.total_len()).expect("open view");
    let consumer_view = SharedMemoryRegion::open(&name, layout.total_len()).expect("open view");
    assert!(owner.is_owner());
    assert!(!producer_view.is_owner());

    let mut producer = SharedRegion::new(Arc::new(producer_view), layout)
        .expect("producer region")
        .into_producer();
    let mut consumer = SharedRegion::new(Arc::new(consumer_view), layout)
        .expect("consumer region")
        .into_consumer();

    const COUNT: u64 = 50;
    let writer = thread::spawn(move || {
        for seq in 0..COUNT {
            let message = Message::numbered(seq, 128);
            producer
                .publish_timeout(message.as_bytes(), Duration::from_secs(5))
                .expect("publish");
        }
        producer.published()
    });

    let mut buf = vec![0u8; 128];
    for seq in 0..COUNT {
        consumer
            .consume_timeout(&mut buf, Duration::from_secs(5))
            .expect("consume");
        assert_eq!(Message::sequence_of(&buf), Some(seq));
    }

    assert_eq!(writer.join().expect("producer thread"), COUNT);
    assert_eq!(consumer.consumed(), COUNT);
    assert!(matches!(consumer.try_consume(&mut buf), Err(RingError::Empty)));
    drop(owner);
}

#[test]
fn test_posix_name_collision_fails_cleanly() {
    let config = posix_config("collide", 4, 64, Some(0));
    let first = LifecycleManager::new(config.clone());
    first.init().expect("first init");

    let second = LifecycleManager::new(config);
    assert!(second.init().is_err());
    assert!(!second.is_initialized());

    first.destroy().expect("destroy");
    second.init().expect("name free again");
}

#[test]
fn test_config_file_drives_session() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "ring:\n  slots: 4\n  message_size: 256\nsession:\n  message_count: 50\n"
    )
    .expect("write config");

    let config = ConfigLoader::load_file(file.path()).expect("load config");
    assert_eq!(config.layout.slots(), 4);
    run_scenario(config);
}
