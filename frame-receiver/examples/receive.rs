// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Runs a synthetic frame source on its own thread and receives its frames.
//!
//! ```bash
//! cargo run --example receive -- --width 640 --height 480 --format yuv420888 --frames 10
//! cargo run --example receive -- --config receiver.json
//! ```

mod common;

use std::{path::PathBuf, sync::mpsc, time::Duration};

use clap::Parser;
use frame_receiver::{
    Error, Frame, ImageReceiver, LogicalFormat, MemoryQueueFactory, ProducedFrame, ReceiverConfig,
    format::pixel_format,
};
use tracing::{info, warn};

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq)]
enum Format {
    Nv21,
    Yuv420888,
    Jpeg,
    Raw10,
    Raw16,
    H264,
    H265,
}

impl From<Format> for LogicalFormat {
    fn from(value: Format) -> Self {
        match value {
            Format::Nv21 => LogicalFormat::Nv21,
            Format::Yuv420888 => LogicalFormat::Yuv420_888,
            Format::Jpeg => LogicalFormat::Jpeg,
            Format::Raw10 => LogicalFormat::Raw10,
            Format::Raw16 => LogicalFormat::Raw16,
            Format::H264 => LogicalFormat::H264,
            Format::H265 => LogicalFormat::H265,
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Receive frames from an in-process producer", long_about = None)]
struct Args {
    /// JSON receiver configuration; overrides the size and format options
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 640)]
    width: i32,

    #[arg(long, default_value_t = 480)]
    height: i32,

    #[arg(long, value_enum, default_value = "yuv420888")]
    format: Format,

    /// Frames the consumer may hold at once
    #[arg(long, default_value_t = 3)]
    capacity: usize,

    /// Number of frames the producer writes
    #[arg(long, default_value_t = 10)]
    frames: u32,

    /// Every n-th frame is written as RGB_565 to show rejection
    #[arg(long)]
    mismatch_every: Option<u32>,
}

fn log_components(
    receiver: &ImageReceiver,
    frame: &Frame,
    format: LogicalFormat,
) -> Result<(), Error> {
    let components = receiver.components(frame, format.component_count(), format)?;
    for component in &components {
        info!(
            frame = frame.frame_number(),
            kind = ?component.kind,
            row_stride = component.row_stride,
            pixel_stride = component.pixel_stride,
            "{} byte(s)",
            component.data.len()
        );
    }
    Ok(())
}

fn main() -> Result<(), Error> {
    common::setup_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|error| {
                Error::Other(format!(
                    "Error while reading receiver configuration from \"{}\": {}",
                    path.display(),
                    error
                ))
            })?;
            ReceiverConfig::from_json(&json)?
        }
        None => ReceiverConfig::new(args.width, args.height, args.format.into(), args.capacity),
    };
    info!("Receiver configuration: {}", serde_json::to_string(&config)?);

    let (tx, rx) = mpsc::channel();
    let mut receiver = ImageReceiver::new(MemoryQueueFactory::new());
    receiver.set_availability_listener(move || {
        let _ = tx.send(());
    });
    let producer = receiver.bind(&config)?;

    let frames = args.frames;
    let mismatch_every = args.mismatch_every;
    let (width, height) = (config.width, config.height);
    let source = std::thread::spawn(move || {
        for i in 0..frames {
            let frame = match mismatch_every {
                Some(n) if n > 0 && i % n == n - 1 => {
                    ProducedFrame::new(width, height, pixel_format::RGB_565)
                }
                _ => producer.default_frame().fill(i as u8),
            };
            if let Err(error) = producer.queue_frame(frame) {
                warn!("Producer stopped: {error}");
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    });

    let mut received = 0;
    while rx.recv_timeout(Duration::from_secs(1)).is_ok() {
        loop {
            match receiver.read_next_frame() {
                Ok(frame) => {
                    let logged = log_components(&receiver, &frame, config.format);
                    receiver.release_frame(frame)?;
                    logged?;
                    received += 1;
                }
                Err(Error::NoFrameAvailable) => break,
                Err(error) if error.is_recoverable() => warn!("Frame rejected: {error}"),
                Err(error) => return Err(error),
            }
        }
    }

    if source.join().is_err() {
        warn!("Producer thread panicked");
    }
    receiver.unbind();
    info!("Received {received} of {frames} frame(s)");
    Ok(())
}
