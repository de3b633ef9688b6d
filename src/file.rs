//! File-level entry points built on the `image` crate
use std::{
    fs::File,
    io::{self, BufReader, BufWriter},
    path::Path,
};

use ndarray::{Array3, ArrayView3};

use crate::{
    container::{read_info, ContainerInfo, ReadError, WriteError, WriteOpts, DEFAULT_WRITE_OPTS},
    image::{IndexOutOfRange, PalettedImage},
    quant::{quantize, QuantizeError, QuantizeOpts, DEFAULT_QUANTIZE_OPTS},
};

/// Options for [`compress`].
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct CompressOpts {
    pub quantize: QuantizeOpts,
    pub write: WriteOpts,
    /// Convert the input to RGBA even if it has no alpha channel.
    pub force_alpha: bool,
}

/// A `CompressOpts` with sensible default values.
pub const DEFAULT_COMPRESS_OPTS: CompressOpts = CompressOpts {
    quantize: DEFAULT_QUANTIZE_OPTS,
    write: DEFAULT_WRITE_OPTS,
    force_alpha: false,
};

/// The error type for [`compress`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CompressError {
    #[error("failed to read the input image")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Quantize(#[from] QuantizeError),
    #[error("failed to create the output file")]
    Io(#[from] io::Error),
    #[error("failed to write the container")]
    Write(#[from] WriteError),
}

/// The error type for [`save_image`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SaveError {
    #[error("failed to encode the output image")]
    Image(#[from] image::ImageError),
    #[error("unsupported channel count: {0}")]
    IncorrectChannelCount(usize),
    #[error("image is too large to encode")]
    ImageTooLarge,
    /// The image has zero width or height, which raster formats cannot
    /// store. Such images remain valid in a container.
    #[error("cannot save an image with zero width or height")]
    EmptyImage,
}

/// The error type for [`reconstruct`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReconstructError {
    #[error("failed to open the container")]
    Io(#[from] io::Error),
    #[error("failed to read the container")]
    Read(#[from] ReadError),
    #[error(transparent)]
    IndexOutOfRange(#[from] IndexOutOfRange),
    #[error("failed to save the reconstructed image")]
    Save(#[from] SaveError),
}

/// Load an image file as an array of size `[height, width, channels]`.
///
/// The result is RGBA if the source has an alpha channel or `force_alpha` is
/// set, and RGB otherwise.
pub fn load_image(path: &Path, force_alpha: bool) -> Result<Array3<u8>, image::ImageError> {
    let img = image::open(path)?;
    let (width, height) = (img.width() as usize, img.height() as usize);

    Ok(if force_alpha || img.color().has_alpha() {
        let img = img.into_rgba8();
        Array3::from_shape_fn((height, width, 4), |(y, x, ch_i)| {
            img.get_pixel(x as u32, y as u32)[ch_i]
        })
    } else {
        let img = img.into_rgb8();
        Array3::from_shape_fn((height, width, 3), |(y, x, ch_i)| {
            img.get_pixel(x as u32, y as u32)[ch_i]
        })
    })
}

/// Save an array of size `[height, width, channels]` as an image file.
///
/// The format is derived from the extension of `path`, falling back to PNG.
pub fn save_image(image: ArrayView3<'_, u8>, path: &Path) -> Result<(), SaveError> {
    let (height, width, num_channels) = image.dim();
    if height == 0 || width == 0 {
        return Err(SaveError::EmptyImage);
    }
    let width = u32::try_from(width).map_err(|_| SaveError::ImageTooLarge)?;
    let height = u32::try_from(height).map_err(|_| SaveError::ImageTooLarge)?;
    let format = image::ImageFormat::from_path(path).unwrap_or(image::ImageFormat::Png);
    let px = |x: u32, y: u32, ch_i: usize| image[[y as usize, x as usize, ch_i]];

    match num_channels {
        3 => image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([px(x, y, 0), px(x, y, 1), px(x, y, 2)])
        })
        .save_with_format(path, format)?,
        4 => image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([px(x, y, 0), px(x, y, 1), px(x, y, 2), px(x, y, 3)])
        })
        .save_with_format(path, format)?,
        _ => return Err(SaveError::IncorrectChannelCount(num_channels)),
    }
    Ok(())
}

/// Quantize the image at `image_path` and store it as a container at
/// `output_path`, overwriting any existing file.
///
/// The output file is not touched if the input cannot be read or quantized.
pub fn compress(
    image_path: &Path,
    output_path: &Path,
    opts: &CompressOpts,
) -> Result<PalettedImage, CompressError> {
    let image = load_image(image_path, opts.force_alpha)?;
    let pimg = quantize(image.view(), &opts.quantize)?;

    let mut writer = BufWriter::new(File::create(output_path)?);
    pimg.write_to(&mut writer, &opts.write)?;
    Ok(pimg)
}

/// Read the header of the container at `container_path`.
pub fn read_container_info(container_path: &Path) -> Result<ContainerInfo, ReadError> {
    let mut reader = BufReader::new(File::open(container_path)?);
    read_info(&mut reader)
}

/// Expand the container at `container_path` and save the result at
/// `output_image_path`.
pub fn reconstruct(
    container_path: &Path,
    output_image_path: &Path,
) -> Result<Array3<u8>, ReconstructError> {
    let reader = BufReader::new(File::open(container_path)?);
    let pimg = PalettedImage::read_from(reader)?;
    let image = pimg.to_image()?;
    save_image(image.view(), output_image_path)?;
    Ok(image)
}
