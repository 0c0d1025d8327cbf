// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Logical image formats and their platform encodings.
//!
//! A receiver is configured with a [`LogicalFormat`]. The buffer queue, on the
//! other hand, speaks in platform pixel formats and dataspaces (see
//! [`pixel_format`] and [`dataspace`]). [`FormatDescriptor`] is the lookup
//! between the two.

use serde::{Deserialize, Serialize};

/// Platform pixel format codes understood by the buffer queue.
pub mod pixel_format {
    pub const RGBA_8888: i32 = 0x1;
    pub const RGBX_8888: i32 = 0x2;
    pub const RGB_888: i32 = 0x3;
    pub const RGB_565: i32 = 0x4;
    pub const BGRA_8888: i32 = 0x5;
    pub const YCBCR_422_SP: i32 = 0x10;
    /// NV21: Y plane followed by interleaved V/U.
    pub const YCRCB_420_SP: i32 = 0x11;
    pub const YCBCR_422_I: i32 = 0x14;
    pub const RAW16: i32 = 0x20;
    /// Compressed or otherwise unstructured payload, one byte row.
    pub const BLOB: i32 = 0x21;
    pub const IMPLEMENTATION_DEFINED: i32 = 0x22;
    /// Flexible 4:2:0 YUV, layout described by the lock step.
    pub const YCBCR_420_888: i32 = 0x23;
    pub const RAW_OPAQUE: i32 = 0x24;
    pub const RAW10: i32 = 0x25;
    pub const RAW12: i32 = 0x26;
    /// Y plane followed by interleaved U/V (fourcc `NV12`).
    pub const NV12: i32 = 0x3231_564E;
    /// Planar Y, U, V (fourcc `I420`).
    pub const I420: i32 = 0x3032_3449;
    /// Planar Y, V, U (fourcc `YV12`).
    pub const YV12: i32 = 0x3231_5659;
    /// Luma only (fourcc `Y8  `).
    pub const Y8: i32 = 0x2020_3859;
}

/// Platform dataspace codes.
pub mod dataspace {
    pub const UNKNOWN: i32 = 0;
    pub const ARBITRARY: i32 = 1;
    pub const JFIF: i32 = 0x8C2_0000;
    pub const H264: i32 = 0x1000_0001;
    pub const H265: i32 = 0x1000_0002;
}

/// Image format as seen by the consuming application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LogicalFormat {
    /// Not mapped to any platform encoding.
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown = 0,
    #[serde(rename = "NV21")]
    Nv21 = 1,
    #[serde(rename = "YUV420_888")]
    Yuv420_888 = 2,
    #[serde(rename = "JPEG")]
    Jpeg = 3,
    #[serde(rename = "RAW10")]
    Raw10 = 4,
    #[serde(rename = "RAW16")]
    Raw16 = 5,
    #[serde(rename = "H264")]
    H264 = 6,
    #[serde(rename = "H265")]
    H265 = 7,
}

impl From<i32> for LogicalFormat {
    /// Converts the integer encoding used by bridge layers.
    fn from(value: i32) -> Self {
        match value {
            1 => LogicalFormat::Nv21,
            2 => LogicalFormat::Yuv420_888,
            3 => LogicalFormat::Jpeg,
            4 => LogicalFormat::Raw10,
            5 => LogicalFormat::Raw16,
            6 => LogicalFormat::H264,
            7 => LogicalFormat::H265,
            _ => LogicalFormat::Unknown,
        }
    }
}

impl From<LogicalFormat> for i32 {
    fn from(value: LogicalFormat) -> Self {
        value as i32
    }
}

impl LogicalFormat {
    /// `true` for formats always exposed as a single blob component.
    pub fn is_blob(self) -> bool {
        matches!(
            self,
            LogicalFormat::Jpeg
                | LogicalFormat::Raw10
                | LogicalFormat::Raw16
                | LogicalFormat::H264
                | LogicalFormat::H265
        )
    }

    /// `true` for the planar/semi-planar 4:2:0 family.
    pub fn is_yuv(self) -> bool {
        matches!(self, LogicalFormat::Nv21 | LogicalFormat::Yuv420_888)
    }

    /// Bits per pixel, or 0 when the format has no fixed pixel depth.
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            LogicalFormat::Nv21 | LogicalFormat::Yuv420_888 => 12,
            LogicalFormat::Raw10 => 10,
            LogicalFormat::Raw16 => 16,
            _ => 0,
        }
    }

    /// Natural number of components a frame of this format decomposes into.
    pub fn component_count(self) -> usize {
        match self {
            LogicalFormat::Unknown => 0,
            f if f.is_yuv() => 3,
            _ => 1,
        }
    }

    /// Kind of the component at `index`, [`ComponentKind::Unknown`] if the
    /// format has no component there.
    pub fn component_kind(self, index: usize) -> ComponentKind {
        match (self, index) {
            (LogicalFormat::Nv21 | LogicalFormat::Yuv420_888, 0) => ComponentKind::Y,
            (LogicalFormat::Nv21 | LogicalFormat::Yuv420_888, 1) => ComponentKind::U,
            (LogicalFormat::Nv21 | LogicalFormat::Yuv420_888, 2) => ComponentKind::V,
            (LogicalFormat::Jpeg, 0) => ComponentKind::JpegBlob,
            (LogicalFormat::Raw10, 0) => ComponentKind::Raw10Blob,
            (LogicalFormat::Raw16, 0) => ComponentKind::Raw16Blob,
            (LogicalFormat::H264, 0) => ComponentKind::H264Blob,
            (LogicalFormat::H265, 0) => ComponentKind::H265Blob,
            _ => ComponentKind::Unknown,
        }
    }
}

/// Kind of a decomposed frame component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Unknown = 0,
    Y = 1,
    U = 2,
    V = 3,
    JpegBlob = 4,
    Raw10Blob = 5,
    Raw16Blob = 6,
    H264Blob = 7,
    H265Blob = 8,
}

/// One row of the logical ↔ platform table.
const FORMAT_TABLE: [(LogicalFormat, i32, i32); 7] = [
    (LogicalFormat::Nv21, pixel_format::YCRCB_420_SP, dataspace::UNKNOWN),
    (LogicalFormat::Yuv420_888, pixel_format::YCBCR_420_888, dataspace::UNKNOWN),
    (LogicalFormat::Jpeg, pixel_format::BLOB, dataspace::JFIF),
    (LogicalFormat::Raw10, pixel_format::RAW10, dataspace::ARBITRARY),
    (LogicalFormat::Raw16, pixel_format::RAW16, dataspace::ARBITRARY),
    (LogicalFormat::H264, pixel_format::BLOB, dataspace::H264),
    (LogicalFormat::H265, pixel_format::BLOB, dataspace::H265),
];

/// Mapping of one logical format onto its platform pixel format and dataspace.
///
/// The table is a partial bijection on `(platform_format, dataspace)`. Logical
/// formats without an entry resolve to [`LogicalFormat::Unknown`] with
/// `platform_format == 0` and must not be bound or decomposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub logical: LogicalFormat,
    pub platform_format: i32,
    pub dataspace: i32,
}

impl FormatDescriptor {
    /// Looks up the platform encoding of `logical`.
    pub fn from_logical(logical: LogicalFormat) -> Self {
        FORMAT_TABLE
            .iter()
            .find(|(l, _, _)| *l == logical)
            .map(|&(logical, platform_format, dataspace)| Self {
                logical,
                platform_format,
                dataspace,
            })
            .unwrap_or(Self::UNKNOWN)
    }

    /// Reverse lookup of a platform `(format, dataspace)` pair.
    ///
    /// `BLOB` buffers are disambiguated by their dataspace; an unrecognised
    /// blob dataspace is treated as JPEG. Any other platform format matches
    /// regardless of dataspace.
    pub fn from_platform(platform_format: i32, dataspace: i32) -> Self {
        let exact = FORMAT_TABLE
            .iter()
            .find(|(_, f, d)| *f == platform_format && *d == dataspace);
        let by_format = || {
            if platform_format == pixel_format::BLOB {
                return None;
            }
            FORMAT_TABLE.iter().find(|(_, f, _)| *f == platform_format)
        };
        match exact.or_else(by_format) {
            Some(&(logical, platform_format, dataspace)) => Self {
                logical,
                platform_format,
                dataspace,
            },
            None if platform_format == pixel_format::BLOB => {
                Self::from_logical(LogicalFormat::Jpeg)
            }
            None => Self::UNKNOWN,
        }
    }

    const UNKNOWN: Self = Self {
        logical: LogicalFormat::Unknown,
        platform_format: 0,
        dataspace: dataspace::UNKNOWN,
    };

    /// `true` if this descriptor can be bound.
    pub fn is_known(&self) -> bool {
        self.logical != LogicalFormat::Unknown
    }
}

/// Formats whose content the CPU cannot interpret at all.
pub fn is_platform_opaque(platform_format: i32) -> bool {
    matches!(
        platform_format,
        pixel_format::RAW_OPAQUE | pixel_format::IMPLEMENTATION_DEFINED
    )
}

/// Platform formats that may carry 4:2:0 or 4:2:2 YUV data.
pub fn is_possibly_yuv(platform_format: i32) -> bool {
    matches!(
        platform_format,
        pixel_format::YCBCR_422_SP
            | pixel_format::YCRCB_420_SP
            | pixel_format::NV12
            | pixel_format::I420
            | pixel_format::YV12
            | pixel_format::YCBCR_422_I
            | pixel_format::YCBCR_420_888
            | pixel_format::Y8
            | pixel_format::IMPLEMENTATION_DEFINED
    )
}
