// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Decomposition of an acquired frame into planes or a blob.

use tracing::{debug, error};

use crate::{
    ComponentKind, Error, LogicalFormat, Result,
    config::USAGE_CPU_READ_OFTEN,
    queue::LockedImage,
    slot::{BufferSlot, Fence},
};

/// A borrowed view of one plane or blob of a frame.
///
/// Strides are in bytes. Compressed blobs report zero for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component<'a> {
    pub kind: ComponentKind,
    pub row_stride: i32,
    pub pixel_stride: i32,
    pub data: &'a [u8],
}

/// Splits the frame held by `slot` into `count` components of `format`.
///
/// The buffer is mapped for CPU reads on the first call and stays mapped
/// until the frame is released. A `count` of zero returns an empty list
/// without mapping anything.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if `format` is unknown, if `count` is
/// larger than the format's component count or if the mapped layout cannot
/// provide the requested planes. Mapping failures are reported as
/// [`Error::Queue`].
pub fn split(slot: &BufferSlot, format: LogicalFormat, count: usize) -> Result<Vec<Component<'_>>> {
    if format == LogicalFormat::Unknown {
        return Err(Error::Configuration(
            "cannot decompose a frame of unknown format.".to_string(),
        ));
    }
    let available = format.component_count();
    if count > available {
        return Err(Error::Configuration(format!(
            "format {format:?} has {available} component(s), {count} requested."
        )));
    }
    if count == 0 {
        return Ok(Vec::new());
    }
    let image = lock(slot)?;
    (0..count)
        .map(|index| component(image, format.component_kind(index)))
        .collect()
}

/// Maps the slot's payload once and caches the mapping in the slot.
fn lock(slot: &BufferSlot) -> Result<&LockedImage> {
    if let Some(image) = slot.locked.get() {
        return Ok(image);
    }
    let buffer = slot
        .payload()
        .ok_or_else(|| Error::InvalidState("slot holds no buffer to lock.".to_string()))?;
    let mut image = buffer
        .lock(USAGE_CPU_READ_OFTEN, slot.fence())
        .inspect_err(|err| {
            error!(
                "lock image buffer (format:{:#x}) failed: {err}",
                buffer.pixel_format()
            )
        })?;
    image.crop = slot.crop();
    image.timestamp = slot.timestamp();
    image.frame_number = slot.frame_seq();
    debug!(
        frame = image.frame_number,
        format = image.pixel_format,
        "Locked frame for CPU reads"
    );
    Ok(slot.locked.get_or_init(|| image))
}

/// Unmaps the payload if it was mapped, returning the fence to release with.
pub(crate) fn unlock(slot: &mut BufferSlot) -> Fence {
    if slot.locked.take().is_none() {
        return Fence::NO_FENCE;
    }
    let Some(buffer) = slot.payload() else {
        return Fence::NO_FENCE;
    };
    match buffer.unlock_async() {
        Ok(fence) => fence,
        Err(err) => {
            error!("unlock image buffer {} failed: {err}", buffer.id());
            Fence::NO_FENCE
        }
    }
}

fn component(image: &LockedImage, kind: ComponentKind) -> Result<Component<'_>> {
    let width = image.width as usize;
    let height = image.height as usize;
    let stride = image.stride as usize;
    let (offset, len, row_stride, pixel_stride) = match kind {
        ComponentKind::Y => (0, stride * (height - 1) + width, image.stride, 1),
        ComponentKind::U | ComponentKind::V => {
            let plane = if kind == ComponentKind::U { image.cb } else { image.cr };
            let offset = plane.ok_or_else(|| {
                Error::Configuration(format!(
                    "buffer format {:#x} has no chroma planes.",
                    image.pixel_format
                ))
            })?;
            let chroma_width = width.div_ceil(2);
            let chroma_height = height.div_ceil(2);
            let len = image.chroma_stride as usize * (chroma_height - 1)
                + image.chroma_step as usize * (chroma_width - 1)
                + 1;
            (offset, len, image.chroma_stride, image.chroma_step)
        }
        ComponentKind::Raw16Blob => (0, image.data.len(), image.stride, 2),
        ComponentKind::Raw10Blob => (0, image.data.len(), image.stride, 0),
        ComponentKind::JpegBlob | ComponentKind::H264Blob | ComponentKind::H265Blob => {
            (0, image.data.len(), 0, 0)
        }
        ComponentKind::Unknown => {
            return Err(Error::Configuration(
                "format has no component at this index.".to_string(),
            ));
        }
    };
    let data = image.data.get(offset..offset + len).ok_or_else(|| {
        Error::Configuration(format!(
            "{kind:?} plane [{offset}, {}) exceeds buffer of {} bytes.",
            offset + len,
            image.data.len()
        ))
    })?;
    Ok(Component {
        kind,
        row_stride: row_stride as i32,
        pixel_stride: pixel_stride as i32,
        data,
    })
}
