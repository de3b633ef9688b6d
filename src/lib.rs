//! Lossy palette compression for RGB and RGBA images
//!
//! [`quantize`] snaps every channel to a multiple of a fixed step size and
//! builds a palette of the distinct colors that remain. The resulting
//! [`PalettedImage`] can be stored as a zstd-compressed container with
//! [`PalettedImage::write_to`] and expanded back with
//! [`PalettedImage::read_from`] and [`PalettedImage::to_image`].
mod container;
#[cfg(feature = "image")]
mod file;
mod image;
mod quant;
#[cfg(feature = "image")]
pub use self::file::*;
pub use self::{container::*, image::*, quant::*};

/// The supported numbers of channels per pixel (RGB and RGBA).
pub const SUPPORTED_CHANNELS: [usize; 2] = [3, 4];
