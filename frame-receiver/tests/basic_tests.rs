// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the receiver lifecycle.
//!
//! Every test binds a receiver to its own in-process queue and plays the
//! producer itself, so no external frame source is needed.
//!
//! # Test Coverage
//!
//! - Reading from an empty queue, delivering and releasing frames
//! - Rejection of incompatible frames without losing slots
//! - Bind failure reporting per negotiation step
//! - Unbinding with frames outstanding
//! - Availability notifications from a producer thread
//! - Read latest, registry and configuration loading

mod common;

use std::{sync::mpsc, time::Duration};

use common::{bound_receiver, setup_logging};
use frame_receiver::{
    AcquireState, Error, Fault, ImageReceiver, LogicalFormat, MemoryQueueFactory,
    ProducedFrame, QueueError, ReceiverConfig, ReceiverRegistry, Rect,
    config::{USAGE_CPU_READ_OFTEN, USAGE_CPU_WRITE_OFTEN, USAGE_PROTECTED},
    format::pixel_format,
};
use tracing::info;

fn yuv_config(capacity: usize) -> ReceiverConfig {
    ReceiverConfig::new(64, 48, LogicalFormat::Yuv420_888, capacity)
}

/// Binding succeeds and polling an empty queue never blocks or fails hard.
#[test]
fn empty_queue_reports_no_frame() {
    let (mut receiver, _producer) = bound_receiver(
        &ReceiverConfig::new(1920, 1080, LogicalFormat::Yuv420_888, 4)
            .with_usage(USAGE_CPU_READ_OFTEN),
    );
    for _ in 0..4 {
        let err = receiver.read_next_frame().err().unwrap();
        assert!(matches!(err, Error::NoFrameAvailable));
        assert!(err.is_recoverable());
        assert_eq!(receiver.acquire_state(), AcquireState::Empty);
    }
    assert_eq!(receiver.free_slots(), 4);
}

/// A matching frame is delivered, decomposed and returned to the pool.
#[test]
fn matching_frame_is_delivered_and_released() {
    let (mut receiver, producer) = bound_receiver(&yuv_config(4));
    producer
        .queue_frame(producer.default_frame().timestamp(42).fill(0x80))
        .unwrap();

    let frame = receiver.read_next_frame().unwrap();
    assert_eq!(receiver.acquire_state(), AcquireState::Filled);
    assert_eq!(receiver.free_slots(), 3);
    assert_eq!(frame.timestamp(), 42);
    assert_eq!(frame.crop(), Rect::from_size(64, 48));
    assert_eq!(receiver.size(&frame), (64, 48));
    assert_eq!(receiver.format(&frame), LogicalFormat::Yuv420_888);
    {
        let planes = receiver
            .components(&frame, 3, LogicalFormat::Yuv420_888)
            .unwrap();
        assert_eq!(planes.len(), 3);
        assert!(planes[0].row_stride >= 64);
        assert!(planes.iter().all(|p| p.data.iter().all(|&b| b == 0x80)));
    }
    assert!(frame.is_locked());

    receiver.release_frame(frame).unwrap();
    assert_eq!(receiver.free_slots(), 4);
    assert_eq!(producer.queue().acquired_len(), 0);
    assert_eq!(producer.queue().free_buffers(), 1);
}

/// An incompatible frame goes back to the queue and the receiver keeps working.
#[test]
fn mismatched_format_is_returned_to_queue() {
    let (mut receiver, producer) = bound_receiver(&yuv_config(2));
    producer
        .queue_frame(ProducedFrame::new(64, 48, pixel_format::RGB_565))
        .unwrap();

    let err = receiver.read_next_frame().err().unwrap();
    match err {
        Error::FormatMismatch {
            produced,
            requested,
        } => {
            assert_eq!(produced, pixel_format::RGB_565);
            assert_eq!(requested, pixel_format::YCBCR_420_888);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(receiver.acquire_state(), AcquireState::Mismatched);
    assert_eq!(receiver.free_slots(), 2);
    assert_eq!(receiver.frames_held(), 0);
    assert_eq!(producer.queue().acquired_len(), 0);

    producer.queue_frame(producer.default_frame()).unwrap();
    let frame = receiver.read_next_frame().unwrap();
    receiver.release_frame(frame).unwrap();
}

/// Frames cropped away from the origin never reach the caller.
#[test]
fn crop_away_from_origin_is_rejected() {
    let (mut receiver, producer) = bound_receiver(&yuv_config(2));
    producer
        .queue_frame(producer.default_frame().crop(Rect::new(2, 0, 64, 48)))
        .unwrap();

    let err = receiver.read_next_frame().err().unwrap();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.is_recoverable());
    assert_eq!(receiver.acquire_state(), AcquireState::Mismatched);
    assert_eq!(receiver.free_slots(), 2);
    assert_eq!(producer.queue().acquired_len(), 0);
}

/// A producer using a different size is accepted.
#[test]
fn size_mismatch_is_tolerated() {
    let (mut receiver, producer) = bound_receiver(&yuv_config(1));
    producer
        .queue_frame(ProducedFrame::new(32, 16, pixel_format::YCBCR_420_888))
        .unwrap();
    let frame = receiver.read_next_frame().unwrap();
    assert_eq!(receiver.size(&frame), (32, 16));
    receiver.release_frame(frame).unwrap();
}

/// Holding every slot turns further reads into "no frame".
#[test]
fn exhausted_pool_reports_no_frame() {
    let (mut receiver, producer) = bound_receiver(&yuv_config(2));
    for _ in 0..3 {
        producer.queue_frame(producer.default_frame()).unwrap();
    }
    let first = receiver.read_next_frame().unwrap();
    let second = receiver.read_next_frame().unwrap();
    assert!(matches!(
        receiver.read_next_frame(),
        Err(Error::NoFrameAvailable)
    ));
    assert_eq!(receiver.acquire_state(), AcquireState::Empty);
    assert_eq!(producer.queue().queued_len(), 1);
    assert_eq!(receiver.free_slots() + receiver.frames_held(), receiver.capacity());

    receiver.release_frame(first).unwrap();
    let third = receiver.read_next_frame().unwrap();
    assert!(third.frame_number() > second.frame_number());
    receiver.release_frame(second).unwrap();
    receiver.release_frame(third).unwrap();
    assert_eq!(receiver.free_slots(), 2);
}

/// The producer refuses to run ahead of the consumer indefinitely.
#[test]
fn producer_is_bounded_by_capacity() {
    let (_receiver, producer) = bound_receiver(&yuv_config(1));
    for _ in 0..3 {
        producer.queue_frame(producer.default_frame()).unwrap();
    }
    assert_eq!(
        producer.queue_frame(producer.default_frame()),
        Err(QueueError::NoBufferAvailable)
    );
}

/// Each failing negotiation step is reported with the right error class.
#[test]
fn bind_failures_name_the_step() {
    setup_logging();
    let config = yuv_config(2);

    let mut receiver = ImageReceiver::new(MemoryQueueFactory::with_fault(Fault::CreateQueue));
    assert!(matches!(
        receiver.bind(&config),
        Err(Error::Allocation(_))
    ));
    assert!(!receiver.is_bound());

    for (fault, step) in [
        (Fault::BufferSize, "size"),
        (Fault::BufferFormat, "format"),
        (Fault::BufferDataspace, "data space"),
    ] {
        let mut receiver = ImageReceiver::new(MemoryQueueFactory::with_fault(fault));
        match receiver.bind(&config) {
            Err(Error::Configuration(message)) => {
                info!("{fault:?} reported as: {message}");
                assert!(message.contains(step));
            }
            Err(other) => panic!("unexpected error for {fault:?}: {other}"),
            Ok(_) => panic!("bind succeeded despite {fault:?}"),
        }
        assert!(!receiver.is_bound());
        assert!(receiver.producer_handle().is_err());
    }
}

/// Invalid parameters are rejected before the factory is asked for a queue.
#[test]
fn invalid_parameters_are_rejected_before_queue_creation() {
    setup_logging();
    for config in [
        ReceiverConfig::new(0, 48, LogicalFormat::Yuv420_888, 2),
        ReceiverConfig::new(64, -1, LogicalFormat::Yuv420_888, 2),
        ReceiverConfig::new(64, 48, LogicalFormat::Yuv420_888, 0),
        ReceiverConfig::new(64, 48, LogicalFormat::Unknown, 2),
    ] {
        let mut receiver = ImageReceiver::new(MemoryQueueFactory::with_fault(Fault::CreateQueue));
        assert!(
            matches!(receiver.bind(&config), Err(Error::Configuration(_))),
            "{config:?} was not rejected"
        );
    }
}

/// A receiver is bound at most once and keeps handing out the same surface.
#[test]
fn producer_handle_is_stable_and_rebinding_fails() {
    let (mut receiver, producer) = bound_receiver(&yuv_config(2));
    let handle = receiver.producer_handle().unwrap();
    assert!(std::sync::Arc::ptr_eq(handle.queue(), producer.queue()));
    assert!(producer.queue().name().starts_with("ImageReceiver-64x48f23c2-"));
    assert_eq!(producer.queue().default_size(), (64, 48));
    assert_eq!(producer.queue().default_format(), pixel_format::YCBCR_420_888);

    assert!(matches!(
        receiver.bind(&yuv_config(2)),
        Err(Error::InvalidState(_))
    ));
    receiver.unbind();
    assert!(matches!(
        receiver.bind(&yuv_config(2)),
        Err(Error::InvalidState(_))
    ));
}

/// Queue names stay unique within the process.
#[test]
fn queue_names_are_unique() {
    let (_first, a) = bound_receiver(&yuv_config(2));
    let (_second, b) = bound_receiver(&yuv_config(2));
    assert_ne!(a.queue().name(), b.queue().name());
}

#[test]
fn protected_usage_marks_the_consumer() {
    let (_receiver, producer) =
        bound_receiver(&yuv_config(2).with_usage(USAGE_CPU_READ_OFTEN | USAGE_PROTECTED));
    assert!(producer.queue().is_protected());
    assert_eq!(producer.queue().usage(), USAGE_CPU_READ_OFTEN | USAGE_PROTECTED);
}

/// Frames held across an unbind stay readable and releasable.
#[test]
fn unbind_with_outstanding_frames() {
    let (mut receiver, producer) = bound_receiver(&yuv_config(2));
    producer
        .queue_frame(producer.default_frame().fill(0x33))
        .unwrap();
    let frame = receiver.read_next_frame().unwrap();

    receiver.unbind();
    receiver.unbind();
    assert!(!receiver.is_bound());
    assert!(producer.is_abandoned());
    assert!(!producer.queue().has_listener());
    assert_eq!(
        producer.queue_frame(producer.default_frame()),
        Err(QueueError::Abandoned)
    );
    assert!(matches!(
        receiver.read_next_frame(),
        Err(Error::InvalidState(_))
    ));
    assert!(receiver.discard_free_buffers().is_err());

    {
        let planes = receiver
            .components(&frame, 1, LogicalFormat::Yuv420_888)
            .unwrap();
        assert_eq!(planes[0].data[0], 0x33);
    }
    receiver.release_frame(frame).unwrap();
    assert_eq!(receiver.frames_held(), 0);
    assert_eq!(receiver.free_slots(), 2);
}

/// Dropping the receiver abandons its queue.
#[test]
fn drop_unbinds() {
    let (receiver, producer) = bound_receiver(&yuv_config(2));
    drop(receiver);
    assert!(producer.is_abandoned());
}

/// A frame can only be released to the receiver it was read from.
///
/// The refused frame comes back still mapped and still owning its slot, so
/// the receiver it belongs to can take it back.
#[test]
fn foreign_frame_is_rejected() {
    let (mut first, first_producer) = bound_receiver(&yuv_config(1));
    let (mut second, second_producer) = bound_receiver(&yuv_config(1));
    first_producer
        .queue_frame(first_producer.default_frame().fill(0x10))
        .unwrap();
    let frame = first.read_next_frame().unwrap();
    drop(first.components(&frame, 3, LogicalFormat::Yuv420_888).unwrap());

    let frame = match second.release_frame(frame) {
        Err(Error::ForeignFrame(frame)) => *frame,
        other => panic!("expected a foreign frame error, got {other:?}"),
    };
    assert!(frame.is_locked());
    assert_eq!(first.free_slots(), 0);
    assert_eq!(first_producer.queue().acquired_len(), 1);
    assert_eq!(second.free_slots(), 1);
    assert_eq!(second_producer.queue().acquired_len(), 0);

    first.release_frame(frame).unwrap();
    assert_eq!(first.free_slots(), 1);
    assert_eq!(first_producer.queue().acquired_len(), 0);

    first_producer
        .queue_frame(first_producer.default_frame())
        .unwrap();
    let next = first.read_next_frame().unwrap();
    first.release_frame(next).unwrap();
}

/// A receiver that was never bound refuses frames without consuming them.
#[test]
fn unbound_receiver_returns_released_frame() {
    let (mut owner, producer) = bound_receiver(&yuv_config(1));
    producer.queue_frame(producer.default_frame()).unwrap();
    let frame = owner.read_next_frame().unwrap();

    let mut unbound = ImageReceiver::new(MemoryQueueFactory::new());
    let frame = match unbound.release_frame(frame) {
        Err(Error::ForeignFrame(frame)) => *frame,
        other => panic!("expected a foreign frame error, got {other:?}"),
    };
    assert_eq!(owner.frames_held(), 1);

    owner.release_frame(frame).unwrap();
    assert_eq!(owner.frames_held(), 0);
    assert_eq!(producer.queue().acquired_len(), 0);
}

/// Releasing returns buffers the queue may later discard.
#[test]
fn discard_free_buffers_after_release() {
    let (mut receiver, producer) = bound_receiver(&yuv_config(2));
    producer.queue_frame(producer.default_frame()).unwrap();
    let frame = receiver.read_next_frame().unwrap();
    receiver.release_frame(frame).unwrap();
    assert_eq!(producer.queue().free_buffers(), 1);

    receiver.discard_free_buffers().unwrap();
    assert_eq!(producer.queue().free_buffers(), 0);
}

/// The listener fires on the producer thread for every queued frame.
#[test]
fn availability_listener_fires_from_producer_thread() {
    setup_logging();
    let (tx, rx) = mpsc::channel();
    let mut receiver = ImageReceiver::new(MemoryQueueFactory::new());
    receiver.set_availability_listener(move || {
        let _ = tx.send(std::thread::current().id());
    });
    let producer = receiver.bind(&yuv_config(3)).unwrap();

    let source = std::thread::spawn(move || {
        for i in 0..3 {
            producer
                .queue_frame(producer.default_frame().timestamp(i))
                .unwrap();
        }
        std::thread::current().id()
    });
    let source_id = source.join().unwrap();

    for _ in 0..3 {
        let fired_on = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(fired_on, source_id);
    }
    let mut frames = Vec::new();
    for _ in 0..3 {
        frames.push(receiver.read_next_frame().unwrap());
    }

    receiver.clear_availability_listener();
    let producer = receiver.producer_handle().unwrap();
    producer.queue_frame(producer.default_frame()).unwrap();
    assert!(rx.try_recv().is_err());

    for frame in frames {
        receiver.release_frame(frame).unwrap();
    }
}

/// Older frames are released and only the newest one is returned.
#[test]
fn read_latest_frame_skips_older_frames() {
    let (mut receiver, producer) = bound_receiver(&yuv_config(3));
    for timestamp in 1..=3 {
        producer
            .queue_frame(producer.default_frame().timestamp(timestamp))
            .unwrap();
    }
    producer
        .queue_frame(ProducedFrame::new(64, 48, pixel_format::RGBA_8888).timestamp(4))
        .unwrap();

    let latest = receiver.read_latest_frame().unwrap();
    assert_eq!(latest.timestamp(), 3);
    assert_eq!(receiver.frames_held(), 1);
    assert_eq!(producer.queue().queued_len(), 0);
    assert_eq!(producer.queue().acquired_len(), 1);

    assert!(matches!(
        receiver.read_latest_frame(),
        Err(Error::NoFrameAvailable)
    ));
    receiver.release_frame(latest).unwrap();
}

/// When the queue refuses a skipped frame, the newest frame is not leaked.
#[test]
fn read_latest_frame_returns_slots_when_release_fails() {
    setup_logging();
    let mut receiver = ImageReceiver::new(MemoryQueueFactory::with_fault(Fault::ReleaseBuffer));
    let producer = receiver.bind(&yuv_config(3)).unwrap();
    for timestamp in 1..=2 {
        producer
            .queue_frame(producer.default_frame().timestamp(timestamp))
            .unwrap();
    }

    assert!(matches!(
        receiver.read_latest_frame(),
        Err(Error::Queue(QueueError::BadValue(_)))
    ));
    assert_eq!(receiver.frames_held(), 0);
    assert_eq!(receiver.free_slots(), 3);
}

#[test]
fn registry_resolves_producers_by_key() {
    let (receiver, producer) = bound_receiver(&yuv_config(2));
    let registry = ReceiverRegistry::new();
    assert!(registry.is_empty());

    let key = receiver.register(&registry).unwrap();
    assert_eq!(Some(key), receiver.key());
    let found = registry.producer(&key).unwrap();
    assert_eq!(found.queue().name(), producer.queue().name());

    let other = registry.register(producer.clone());
    assert_ne!(other, key);
    assert_eq!(registry.len(), 2);

    assert!(registry.remove(&key).is_some());
    assert!(registry.producer(&key).is_none());
    assert_eq!(registry.len(), 1);
}

#[test]
fn config_loads_from_json() {
    let config = ReceiverConfig::from_json(
        r#"{"width": 640, "height": 480, "format": "JPEG", "capacity": 2, "usage": 16387}"#,
    )
    .unwrap();
    assert_eq!(
        config,
        ReceiverConfig::new(640, 480, LogicalFormat::Jpeg, 2)
            .with_usage(USAGE_CPU_READ_OFTEN | USAGE_PROTECTED)
    );
    assert!(config.is_protected());
    assert!(
        !ReceiverConfig::new(640, 480, LogicalFormat::Jpeg, 2)
            .with_usage(USAGE_CPU_READ_OFTEN | USAGE_CPU_WRITE_OFTEN)
            .is_protected()
    );

    let defaulted =
        ReceiverConfig::from_json(r#"{"width": 8, "height": 8, "format": "NV21", "capacity": 1}"#)
            .unwrap();
    assert_eq!(defaulted.usage, USAGE_CPU_READ_OFTEN);

    assert!(matches!(
        ReceiverConfig::from_json(r#"{"width": 0, "height": 8, "format": "NV21", "capacity": 1}"#),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        ReceiverConfig::from_json(r#"{"width": 8, "height": 8, "format": "BMP", "capacity": 1}"#),
        Err(Error::Json(_))
    ));
}
