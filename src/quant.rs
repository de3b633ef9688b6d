//! Image quantization
use ndarray::{s, Array2, ArrayView3};

use crate::image::PalettedImage;

/// Options for [`quantize`].
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct QuantizeOpts {
    /// The quantization step size. Each channel value `v` is mapped to
    /// `v / tolerance * tolerance` (integer division), so larger values
    /// produce fewer colors. Must be at least `1`; `1` is lossless.
    pub tolerance: u32,
}

/// A `QuantizeOpts` with sensible default values.
pub const DEFAULT_QUANTIZE_OPTS: QuantizeOpts = QuantizeOpts { tolerance: 10 };

impl Default for QuantizeOpts {
    #[inline]
    fn default() -> Self {
        DEFAULT_QUANTIZE_OPTS
    }
}

/// The error type for [`quantize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum QuantizeError {
    /// `tolerance` is zero.
    #[error("tolerance must be at least 1")]
    ZeroTolerance,
    /// The number of input channels (`image.dim().2`) is not in
    /// [`SUPPORTED_CHANNELS`](crate::SUPPORTED_CHANNELS).
    #[error("unsupported channel count: {0}")]
    IncorrectChannelCount(usize),
}

/// Apply the bucketing rule to a single channel value.
#[inline]
pub fn quantize_channel(value: u8, tolerance: u32) -> u8 {
    debug_assert_ne!(tolerance, 0);
    // The result never exceeds `value`, so it always fits in `u8`
    (value as u32 / tolerance * tolerance) as u8
}

/// Pack up to four channels into a `u32` whose numeric order matches the
/// lexicographic order of the channels.
#[inline]
fn pack(channels: impl IntoIterator<Item = u8>) -> u32 {
    channels
        .into_iter()
        .fold(0u32, |acc, channel| (acc << 8) | channel as u32)
}

/// Construct a [`PalettedImage`] from an 8-bit RGB or RGBA image represented
/// by an `ArrayView3` of size `[height, width, channels]`.
///
/// The palette is sorted in ascending lexicographic channel order, which is
/// the order recorded by the container format.
pub fn quantize(
    image: ArrayView3<'_, u8>,
    &QuantizeOpts { tolerance }: &QuantizeOpts,
) -> Result<PalettedImage, QuantizeError> {
    let (height, width, num_channels) = image.dim();
    if !crate::SUPPORTED_CHANNELS.contains(&num_channels) {
        return Err(QuantizeError::IncorrectChannelCount(num_channels));
    }
    if tolerance == 0 {
        return Err(QuantizeError::ZeroTolerance);
    }

    // Quantized colors in row-major pixel order
    let packed = Array2::from_shape_fn((height, width), |(y, x)| {
        pack(
            image
                .slice(s![y, x, ..])
                .iter()
                .map(|&c| quantize_channel(c, tolerance)),
        )
    });

    // Deduplicate. Since all colors have the same channel count, sorting the
    // packed values sorts the palette lexicographically.
    // `[tag:packed_in_colors]`
    let mut colors: Vec<u32> = packed.iter().copied().collect();
    colors.sort_unstable();
    colors.dedup();

    let mut palette = Array2::zeros((colors.len(), num_channels));
    for (mut entry, &color) in palette.rows_mut().into_iter().zip(colors.iter()) {
        for (i, channel) in entry.iter_mut().enumerate() {
            let shift = 8 * (num_channels - 1 - i);
            *channel = (color >> shift) as u8;
        }
    }

    // `[ref:packed_in_colors]` Every packed color is present in `colors`, so
    // the search always hits
    let indices = packed.map(|color| colors.binary_search(color).unwrap_or_else(|i| i) as u32);

    Ok(PalettedImage { palette, indices })
}
