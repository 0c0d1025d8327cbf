// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Receiver configuration.
//!
//! [`ReceiverConfig`] carries everything a binding is negotiated from. It can
//! be built in code or loaded from a JSON document:
//!
//! ```
//! use frame_receiver::{LogicalFormat, ReceiverConfig};
//!
//! let config = ReceiverConfig::from_json(
//!     r#"{"width": 1920, "height": 1080, "format": "YUV420_888", "capacity": 4}"#,
//! )
//! .unwrap();
//! assert_eq!(config.format, LogicalFormat::Yuv420_888);
//! assert_eq!(config.usage, frame_receiver::config::USAGE_CPU_READ_OFTEN);
//! ```

use serde::{Deserialize, Serialize};

use crate::{Error, LogicalFormat, Result};

/// Buffers are read by the CPU often.
pub const USAGE_CPU_READ_OFTEN: u64 = 0x3;
/// Buffers are written by the CPU often.
pub const USAGE_CPU_WRITE_OFTEN: u64 = 0x30;
/// Buffers hold protected content; the consumer is marked accordingly.
pub const USAGE_PROTECTED: u64 = 0x4000;

/// Parameters a receiver is bound with.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Default frame width in pixels.
    pub width: i32,
    /// Default frame height in pixels.
    pub height: i32,
    /// Logical format frames are expected in.
    pub format: LogicalFormat,
    /// Maximum number of frames the consumer may hold at once.
    pub capacity: usize,
    /// Buffer usage flags requested from the queue.
    #[serde(default = "default_usage")]
    pub usage: u64,
}

fn default_usage() -> u64 {
    USAGE_CPU_READ_OFTEN
}

impl ReceiverConfig {
    /// Configuration with [`USAGE_CPU_READ_OFTEN`] usage.
    pub fn new(width: i32, height: i32, format: LogicalFormat, capacity: usize) -> Self {
        Self {
            width,
            height,
            format,
            capacity,
            usage: default_usage(),
        }
    }

    pub fn with_usage(mut self, usage: u64) -> Self {
        self.usage = usage;
        self
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the parameters before any queue is created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a non-positive size, a zero
    /// capacity or an unknown format.
    pub fn validate(&self) -> Result<()> {
        if self.width < 1 || self.height < 1 {
            return Err(Error::Configuration(format!(
                "image size [{}, {}] must be positive.",
                self.width, self.height
            )));
        }
        if self.capacity < 1 {
            return Err(Error::Configuration(
                "image capacity must be larger than zero.".to_string(),
            ));
        }
        if self.format == LogicalFormat::Unknown {
            return Err(Error::Configuration(
                "image format is unknown and cannot be bound.".to_string(),
            ));
        }
        Ok(())
    }

    /// `true` if the usage flags request protected buffers.
    pub fn is_protected(&self) -> bool {
        self.usage & USAGE_PROTECTED != 0
    }
}
