// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Setup shared by the integration tests.

#![allow(dead_code)]

use frame_receiver::{ImageReceiver, MemoryProducer, MemoryQueueFactory, ReceiverConfig};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// Initializes logging, respecting the `RUST_LOG` environment variable.
pub fn setup_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });
}

/// Creates a receiver on an in-process queue and binds it with `config`.
pub fn bound_receiver(config: &ReceiverConfig) -> (ImageReceiver, MemoryProducer) {
    setup_logging();
    let mut receiver = ImageReceiver::new(MemoryQueueFactory::new());
    let producer = receiver.bind(config).unwrap();
    (receiver, producer)
}

/// An I420-style payload with constant Y, U and V planes.
///
/// Matches the 16 byte row alignment of the in-process queue.
pub fn planar_payload(width: u32, height: u32, y: u8, first: u8, second: u8) -> Vec<u8> {
    let stride = width.div_ceil(16) * 16;
    let luma = (stride * height) as usize;
    let chroma = ((stride / 2) * height.div_ceil(2)) as usize;
    let mut data = vec![y; luma];
    data.extend(std::iter::repeat_n(first, chroma));
    data.extend(std::iter::repeat_n(second, chroma));
    data
}
