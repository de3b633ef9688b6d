//! The on-disk container format
//!
//! A container starts with a fixed 20-byte header ([`RawHeader`]) followed by
//! a single zstd frame. The frame holds the palette (`palette_len *
//! num_channels` bytes, row-major) immediately followed by the index map
//! (`height * width` little-endian integers of `index_width` bytes each,
//! row-major).
use std::io::{self, prelude::*};

use ndarray::Array2;
use zerocopy::{
    byteorder::{LittleEndian, U32},
    AsBytes, FromBytes, LayoutVerified, Unaligned,
};

use crate::image::{IndexOutOfRange, PalettedImage};

/// The magic number at the start of every container.
pub const MAGIC: [u8; 4] = *b"QPAL";

/// The format version written by this crate.
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = std::mem::size_of::<RawHeader>();

/// The largest payload buffer reserved up front, before any data arrives.
const MAX_PREALLOC_LEN: usize = 1 << 20;

#[derive(FromBytes, AsBytes, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
struct RawHeader {
    magic: [u8; 4],
    version: u8,
    num_channels: u8,
    index_width: u8,
    reserved: u8,
    height: U32<LittleEndian>,
    width: U32<LittleEndian>,
    palette_len: U32<LittleEndian>,
}

/// Options for [`PalettedImage::write_to`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct WriteOpts {
    /// The zstd compression level. Out-of-range values are clamped by zstd.
    pub level: i32,
}

/// A `WriteOpts` with sensible default values.
pub const DEFAULT_WRITE_OPTS: WriteOpts = WriteOpts { level: 3 };

impl Default for WriteOpts {
    #[inline]
    fn default() -> Self {
        DEFAULT_WRITE_OPTS
    }
}

/// The decoded container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct ContainerInfo {
    /// The number of channels per pixel (3 or 4).
    pub num_channels: usize,
    /// The size of each stored index in bytes (1, 2, or 4).
    pub index_width: usize,
    /// `[height, width]`
    pub image_dim: [usize; 2],
    /// The number of palette entries.
    pub palette_len: usize,
}

impl ContainerInfo {
    fn palette_bytes(&self) -> Option<usize> {
        self.palette_len.checked_mul(self.num_channels)
    }

    fn index_bytes(&self) -> Option<usize> {
        self.image_dim[0]
            .checked_mul(self.image_dim[1])?
            .checked_mul(self.index_width)
    }
}

/// The error type for [`PalettedImage::write_to`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WriteError {
    #[error("I/O error")]
    Io(#[from] io::Error),
    /// The image dimensions or the palette length do not fit in `u32`.
    #[error("image is too large to store")]
    ImageTooLarge,
    /// The palette's channel count is not in
    /// [`SUPPORTED_CHANNELS`](crate::SUPPORTED_CHANNELS).
    #[error("unsupported channel count: {0}")]
    IncorrectChannelCount(usize),
    #[error(transparent)]
    IndexOutOfRange(#[from] IndexOutOfRange),
}

/// The error type for [`PalettedImage::read_from`] and [`read_info`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReadError {
    #[error("I/O error")]
    Io(#[from] io::Error),
    #[error("not a palette container (bad magic number)")]
    BadMagic,
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),
    #[error("unsupported channel count: {0}")]
    IncorrectChannelCount(u8),
    #[error("unsupported index width: {0}")]
    IncorrectIndexWidth(u8),
    #[error("reserved header byte is not zero")]
    NonZeroReserved,
    /// The container ended before `field` was complete.
    #[error("container is truncated: missing {field}")]
    Truncated { field: &'static str },
    #[error("container has trailing data after the index map")]
    TrailingData,
    #[error("failed to decompress the payload")]
    Decompress(#[source] io::Error),
    /// Palette entry `index` is not strictly greater than its predecessor.
    /// See `[ref:palette_sorted]`.
    #[error("palette entry {index} is duplicated or out of order")]
    PaletteNotSorted { index: usize },
    #[error(transparent)]
    IndexOutOfRange(#[from] IndexOutOfRange),
    /// The stored dimensions cannot be addressed on this platform.
    #[error("image is too large to load")]
    ImageTooLarge,
}

/// Get the narrowest index width (in bytes) able to address `palette_len`
/// entries.
#[inline]
pub fn index_width_for(palette_len: usize) -> usize {
    if palette_len <= 1 << 8 {
        1
    } else if palette_len <= 1 << 16 {
        2
    } else {
        4
    }
}

fn map_eof(e: io::Error, field: &'static str) -> ReadError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ReadError::Truncated { field }
    } else {
        ReadError::Io(e)
    }
}

/// Read and validate a container header without decompressing the payload.
pub fn read_info<R: Read + ?Sized>(reader: &mut R) -> Result<ContainerInfo, ReadError> {
    let mut header_bytes = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|e| map_eof(e, "header"))?;
    let header: RawHeader = *LayoutVerified::<_, RawHeader>::new_unaligned(&header_bytes[..])
        .ok_or(ReadError::Truncated { field: "header" })?;

    if header.magic != MAGIC {
        return Err(ReadError::BadMagic);
    }
    if header.version != FORMAT_VERSION {
        return Err(ReadError::UnsupportedVersion(header.version));
    }
    if !crate::SUPPORTED_CHANNELS.contains(&(header.num_channels as usize)) {
        return Err(ReadError::IncorrectChannelCount(header.num_channels));
    }
    if ![1, 2, 4].contains(&header.index_width) {
        return Err(ReadError::IncorrectIndexWidth(header.index_width));
    }
    if header.reserved != 0 {
        return Err(ReadError::NonZeroReserved);
    }

    let to_usize =
        |x: U32<LittleEndian>| usize::try_from(x.get()).map_err(|_| ReadError::ImageTooLarge);
    Ok(ContainerInfo {
        num_channels: header.num_channels as usize,
        index_width: header.index_width as usize,
        image_dim: [to_usize(header.height)?, to_usize(header.width)?],
        palette_len: to_usize(header.palette_len)?,
    })
}

impl PalettedImage {
    /// Serialize this image as a container.
    pub fn write_to<W: Write>(&self, mut writer: W, opts: &WriteOpts) -> Result<(), WriteError> {
        let num_channels = self.num_channels();
        if !crate::SUPPORTED_CHANNELS.contains(&num_channels) {
            return Err(WriteError::IncorrectChannelCount(num_channels));
        }
        self.check_indices()?;

        let palette_len = self.palette_len();
        let index_width = index_width_for(palette_len);
        let [height, width] = self.image_dim();
        let to_u32 = |x: usize| u32::try_from(x).map_err(|_| WriteError::ImageTooLarge);

        let header = RawHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            num_channels: num_channels as u8,
            index_width: index_width as u8,
            reserved: 0,
            height: U32::new(to_u32(height)?),
            width: U32::new(to_u32(width)?),
            palette_len: U32::new(to_u32(palette_len)?),
        };
        writer.write_all(header.as_bytes())?;

        let mut encoder = zstd::stream::write::Encoder::new(&mut writer, opts.level)?;

        let palette_bytes: Vec<u8> = self.palette.iter().copied().collect();
        encoder.write_all(&palette_bytes)?;

        // Encode one row at a time
        let mut row_bytes = Vec::with_capacity(width * index_width);
        for row in self.indices.rows() {
            row_bytes.clear();
            for &index in row.iter() {
                row_bytes.extend_from_slice(&index.to_le_bytes()[..index_width]);
            }
            encoder.write_all(&row_bytes)?;
        }

        encoder.finish()?;
        writer.flush()?;
        Ok(())
    }

    /// Deserialize an image from a container.
    ///
    /// The palette order and index range are validated, so the returned image
    /// upholds all invariants of [`PalettedImage`].
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, ReadError> {
        let info = read_info(&mut reader)?;
        let palette_bytes = info.palette_bytes().ok_or(ReadError::ImageTooLarge)?;
        let index_bytes = info.index_bytes().ok_or(ReadError::ImageTooLarge)?;
        let expected_len = palette_bytes
            .checked_add(index_bytes)
            .ok_or(ReadError::ImageTooLarge)?;

        let missing_field = |len: usize| {
            if len < palette_bytes {
                "palette"
            } else {
                "index map"
            }
        };

        // Read one byte more than expected to detect trailing data without
        // letting a bogus stream grow the buffer further. The header is
        // untrusted, so the buffer only grows with the decompressed data.
        let decoder = zstd::stream::read::Decoder::new(reader).map_err(ReadError::Decompress)?;
        let mut payload = Vec::with_capacity(expected_len.min(MAX_PREALLOC_LEN));
        match decoder
            .take((expected_len as u64).saturating_add(1))
            .read_to_end(&mut payload)
        {
            Ok(_) => {}
            // The file ends inside the zstd frame
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ReadError::Truncated {
                    field: missing_field(payload.len()),
                });
            }
            Err(e) => return Err(ReadError::Decompress(e)),
        }

        if payload.len() < expected_len {
            return Err(ReadError::Truncated {
                field: missing_field(payload.len()),
            });
        }
        if payload.len() > expected_len {
            return Err(ReadError::TrailingData);
        }

        let index_payload = payload.split_off(palette_bytes);
        let palette = Array2::from_shape_vec((info.palette_len, info.num_channels), payload)
            .map_err(|_| ReadError::ImageTooLarge)?;

        // [ref:palette_sorted]
        if let Some(index) = (1..info.palette_len)
            .find(|&i| palette.row(i - 1).iter().ge(palette.row(i).iter()))
        {
            return Err(ReadError::PaletteNotSorted { index });
        }

        let indices: Vec<u32> = index_payload
            .chunks_exact(info.index_width)
            .map(|bytes| {
                let mut buf = [0u8; 4];
                buf[..bytes.len()].copy_from_slice(bytes);
                u32::from_le_bytes(buf)
            })
            .collect();
        let indices = Array2::from_shape_vec((info.image_dim[0], info.image_dim[1]), indices)
            .map_err(|_| ReadError::ImageTooLarge)?;

        let image = PalettedImage { palette, indices };
        image.check_indices()?;
        Ok(image)
    }
}
