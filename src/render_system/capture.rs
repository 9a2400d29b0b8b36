//! On-demand frame capture.
//!
//! The presentation image is transferred device-side into a staging image and
//! read back through a host-visible buffer. When the device can blit between
//! the source format and RGBA8 the blit performs the channel reordering; when
//! it cannot, an exact image copy is used instead and the known
//! reversed-channel formats are swizzled while writing the file. Capture
//! blocks on a fence: it is user-initiated and infrequent, not part of the
//! steady-state frame budget.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use log::info;
use vulkano::{
    buffer::{Buffer, BufferCreateInfo, BufferUsage, Subbuffer},
    command_buffer::{
        AutoCommandBufferBuilder, BlitImageInfo, CommandBufferUsage, CopyImageInfo,
        CopyImageToBufferInfo,
    },
    format::{Format, FormatFeatures},
    image::{sampler::Filter, Image, ImageCreateInfo, ImageType, ImageUsage},
    memory::allocator::{AllocationCreateInfo, MemoryTypeFilter},
    sync::GpuFuture,
};

use super::context::RenderContext;
use crate::error::{Error, Result};

/// Common presentation formats whose in-memory channel order is reversed
/// relative to the RGB file layout. Only consulted on the copy path; a blit
/// converts the order itself.
const REVERSED_CHANNEL_FORMATS: [Format; 3] = [
    Format::B8G8R8A8_SRGB,
    Format::B8G8R8A8_UNORM,
    Format::B8G8R8A8_SNORM,
];

/// Capture `source` into a binary PPM at `path`. `before` is the GPU work the
/// transfer must order after; the submission is waited on synchronously.
pub fn capture_frame(
    ctx: &RenderContext,
    source: Arc<Image>,
    before: Box<dyn GpuFuture>,
    path: &Path,
) -> Result<()> {
    let source_format = source.format();
    let extent = source.extent();
    let [width, height] = [extent[0], extent[1]];

    let format_properties = |format: Format| {
        ctx.device
            .physical_device()
            .format_properties(format)
            .expect("failed to query format properties")
    };
    let supports_blit = format_properties(source_format)
        .optimal_tiling_features
        .contains(FormatFeatures::BLIT_SRC)
        && format_properties(Format::R8G8B8A8_UNORM)
            .optimal_tiling_features
            .contains(FormatFeatures::BLIT_DST);

    // the blit converts into RGBA8; the copy fallback needs an exact format
    // match and leaves any reordering to the file writer
    let staging_format = if supports_blit {
        Format::R8G8B8A8_UNORM
    } else {
        source_format
    };
    let staging = Image::new(
        ctx.memory_allocator.clone(),
        ImageCreateInfo {
            image_type: ImageType::Dim2d,
            format: staging_format,
            extent,
            usage: ImageUsage::TRANSFER_DST | ImageUsage::TRANSFER_SRC,
            ..Default::default()
        },
        AllocationCreateInfo::default(),
    )
    .expect("failed to create capture staging image");

    let readback: Subbuffer<[u8]> = Buffer::new_slice(
        ctx.memory_allocator.clone(),
        BufferCreateInfo {
            usage: BufferUsage::TRANSFER_DST,
            ..Default::default()
        },
        AllocationCreateInfo {
            memory_type_filter: MemoryTypeFilter::PREFER_HOST
                | MemoryTypeFilter::HOST_RANDOM_ACCESS,
            ..Default::default()
        },
        u64::from(width) * u64::from(height) * 4,
    )
    .expect("failed to allocate capture readback buffer");

    let mut builder = AutoCommandBufferBuilder::primary(
        &ctx.command_buffer_allocator,
        ctx.queue.queue_family_index(),
        CommandBufferUsage::OneTimeSubmit,
    )
    .expect("failed to begin capture command");

    if supports_blit {
        builder
            .blit_image(BlitImageInfo {
                filter: Filter::Nearest,
                ..BlitImageInfo::images(source, staging.clone())
            })
            .expect("failed to record capture blit");
    } else {
        builder
            .copy_image(CopyImageInfo::images(source, staging.clone()))
            .expect("failed to record capture copy");
    }
    builder
        .copy_image_to_buffer(CopyImageToBufferInfo::image_buffer(
            staging,
            readback.clone(),
        ))
        .expect("failed to record capture readback");

    let command_buffer = builder.build().expect("failed to build capture command");
    before
        .then_execute(ctx.queue.clone(), command_buffer)
        .expect("failed to submit capture")
        .then_signal_fence_and_flush()
        .expect("failed to flush capture")
        .wait(None)
        .expect("capture did not complete");

    let swizzle = !supports_blit && REVERSED_CHANNEL_FORMATS.contains(&source_format);

    let data = readback.read().expect("capture readback is inaccessible");
    let mut file = BufWriter::new(File::create(path)?);
    ppm::encode(&mut file, width, height, &data, width as usize * 4, swizzle)?;
    file.flush()?;

    info!("captured {}x{} frame to {:?}", width, height, path);
    Ok(())
}

/// Binary PPM (`P6`) reading and writing.
pub mod ppm {
    use super::*;

    /// Write `P6\n<width>\n<height>\n255\n` followed by RGB triples, walking
    /// `data` rows by `row_pitch` bytes (which may exceed `width * 4`).
    /// Pixels are 4 bytes each; `swizzle` swaps the first and third channel.
    pub fn encode<W: Write>(
        writer: &mut W,
        width: u32,
        height: u32,
        data: &[u8],
        row_pitch: usize,
        swizzle: bool,
    ) -> Result<()> {
        write!(writer, "P6\n{}\n{}\n255\n", width, height)?;
        for y in 0..height as usize {
            let row = &data[y * row_pitch..];
            for x in 0..width as usize {
                let pixel = &row[x * 4..x * 4 + 4];
                let rgb = if swizzle {
                    [pixel[2], pixel[1], pixel[0]]
                } else {
                    [pixel[0], pixel[1], pixel[2]]
                };
                writer.write_all(&rgb)?;
            }
        }
        Ok(())
    }

    /// Read a file produced by `encode`: dimensions plus tightly packed RGB
    /// triples.
    pub fn decode<R: Read>(reader: &mut R) -> Result<(u32, u32, Vec<u8>)> {
        let mut header = [0u8; 2];
        reader.read_exact(&mut header)?;
        if &header != b"P6" {
            return Err(Error::CaptureFormat("missing P6 magic".into()));
        }

        let mut fields = [0u64; 3];
        for field in fields.iter_mut() {
            *field = read_ascii_field(reader)?;
        }
        let [width, height, max_value] = fields;
        if max_value != 255 {
            return Err(Error::CaptureFormat(format!(
                "unsupported max channel value {max_value}"
            )));
        }

        let mut pixels = vec![0u8; (width * height * 3) as usize];
        reader.read_exact(&mut pixels)?;
        Ok((width as u32, height as u32, pixels))
    }

    fn read_ascii_field<R: Read>(reader: &mut R) -> Result<u64> {
        let mut value: Option<u64> = None;
        loop {
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte)?;
            match byte[0] {
                b'0'..=b'9' => {
                    value = Some(value.unwrap_or(0) * 10 + u64::from(byte[0] - b'0'));
                }
                b' ' | b'\t' | b'\r' | b'\n' if value.is_some() => return Ok(value.unwrap()),
                b' ' | b'\t' | b'\r' | b'\n' => {}
                other => {
                    return Err(Error::CaptureFormat(format!(
                        "unexpected byte {other:#x} in header"
                    )))
                }
            }
        }
    }

    /// Read a PPM from disk.
    pub fn read(path: &Path) -> Result<(u32, u32, Vec<u8>)> {
        decode(&mut BufReader::new(File::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::ppm;

    fn encode_to_vec(
        width: u32,
        height: u32,
        data: &[u8],
        row_pitch: usize,
        swizzle: bool,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        ppm::encode(&mut out, width, height, data, row_pitch, swizzle).unwrap();
        out
    }

    #[test]
    fn header_matches_the_fixed_layout() {
        let data = [10, 20, 30, 255, 40, 50, 60, 255];
        let out = encode_to_vec(2, 1, &data, 8, false);
        assert!(out.starts_with(b"P6\n2\n1\n255\n"));
        assert_eq!(out.len(), b"P6\n2\n1\n255\n".len() + 2 * 3);
    }

    #[test]
    fn swizzle_swaps_first_and_third_channel_of_every_pixel() {
        let data = [1, 2, 3, 255, 4, 5, 6, 255];
        let plain = encode_to_vec(2, 1, &data, 8, false);
        let swizzled = encode_to_vec(2, 1, &data, 8, true);
        assert_eq!(&plain[plain.len() - 6..], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(&swizzled[swizzled.len() - 6..], &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn row_pitch_padding_is_skipped() {
        // 1x2 image with 4 bytes of padding after each 4-byte row
        let data = [9, 8, 7, 255, 0, 0, 0, 0, 1, 2, 3, 255, 0, 0, 0, 0];
        let out = encode_to_vec(1, 2, &data, 8, false);
        assert_eq!(&out[out.len() - 6..], &[9, 8, 7, 1, 2, 3]);
    }

    #[test]
    fn decode_round_trips_encode() {
        let data: Vec<u8> = (0..4 * 4 * 4).map(|i| (i * 7 % 256) as u8).collect();
        let encoded = encode_to_vec(4, 4, &data, 16, false);

        let (width, height, pixels) = ppm::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!((width, height), (4, 4));
        assert_eq!(pixels.len(), 4 * 4 * 3);

        // re-encoding the same source buffer reproduces identical bytes
        let again = encode_to_vec(4, 4, &data, 16, false);
        assert_eq!(encoded, again);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let err = ppm::decode(&mut b"P3\n1\n1\n255\n".as_slice()).unwrap_err();
        assert!(matches!(err, crate::error::Error::CaptureFormat(_)));
    }
}
