use ndarray::{s, Array2, Array3, ArrayView1};

/// A palette-indexed image.
///
/// # Invariants
///
/// These hold for every value produced by [`quantize`](crate::quantize) or
/// [`PalettedImage::read_from`]. Because the fields are public, a
/// hand-assembled value may violate them; [`PalettedImage::to_image`] checks
/// the index range rather than trusting it.
///
/// - `palette.dim().1` is one of [`SUPPORTED_CHANNELS`](crate::SUPPORTED_CHANNELS).
/// - The rows of `palette` are unique and sorted in ascending lexicographic
///   order. `[tag:palette_sorted]`
/// - Every element of `indices` is less than `palette.dim().0`.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct PalettedImage {
    /// `[palette_len, num_channels]`
    pub palette: Array2<u8>,
    /// `[height, width]`
    pub indices: Array2<u32>,
}

/// The error type for [`PalettedImage::to_image`]. An index refers past the
/// end of the palette.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error(
    "index {index} at ({}, {}) is out of range for a palette of {palette_len} colors",
    .position[0],
    .position[1]
)]
pub struct IndexOutOfRange {
    /// The offending pixel as `[row, column]`.
    pub position: [usize; 2],
    /// The offending index.
    pub index: u32,
    /// The number of palette entries.
    pub palette_len: usize,
}

impl PalettedImage {
    /// Get the number of palette entries.
    #[inline]
    pub fn palette_len(&self) -> usize {
        self.palette.dim().0
    }

    /// Get the number of channels of each palette entry.
    #[inline]
    pub fn num_channels(&self) -> usize {
        self.palette.dim().1
    }

    /// Get the image size as `[height, width]`.
    #[inline]
    pub fn image_dim(&self) -> [usize; 2] {
        let (h, w) = self.indices.dim();
        [h, w]
    }

    /// Get the palette entry at `index`, if any.
    #[inline]
    pub fn palette_color(&self, index: u32) -> Option<ArrayView1<'_, u8>> {
        let index = usize::try_from(index).ok()?;
        (index < self.palette_len()).then(|| self.palette.row(index))
    }

    /// Find the first index that does not refer to a palette entry.
    pub fn check_indices(&self) -> Result<(), IndexOutOfRange> {
        let palette_len = self.palette_len();
        match self
            .indices
            .indexed_iter()
            .find(|&(_, &index)| index as usize >= palette_len)
        {
            Some(((y, x), &index)) => Err(IndexOutOfRange {
                position: [y, x],
                index,
                palette_len,
            }),
            None => Ok(()),
        }
    }

    /// Expand this image into an array of size `[height, width,
    /// num_channels]` where each pixel is `palette[indices[y, x]]`.
    pub fn to_image(&self) -> Result<Array3<u8>, IndexOutOfRange> {
        self.check_indices()?;

        let [height, width] = self.image_dim();
        let mut image = Array3::zeros((height, width, self.num_channels()));
        for ((y, x), &index) in self.indices.indexed_iter() {
            image
                .slice_mut(s![y, x, ..])
                .assign(&self.palette.row(index as usize));
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn to_image_looks_up_palette(
        palette: Vec<u8>,
        indices: Vec<u32>,
        img_width: usize,
    ) -> TestResult {
        let palette_len = palette.len() / 4;
        if palette_len == 0 || img_width == 0 || img_width > indices.len() {
            return TestResult::discard();
        }
        let img_height = indices.len() / img_width;
        let image = PalettedImage {
            palette: Array2::from_shape_vec((palette_len, 4), palette[..palette_len * 4].to_vec())
                .unwrap(),
            indices: Array2::from_shape_vec(
                (img_height, img_width),
                indices[..img_height * img_width]
                    .iter()
                    .map(|&i| i % palette_len as u32)
                    .collect(),
            )
            .unwrap(),
        };

        let out = image.to_image().unwrap();
        assert_eq!(out.dim(), (img_height, img_width, 4));
        for ((y, x), &index) in image.indices.indexed_iter() {
            assert_eq!(
                out.slice(s![y, x, ..]),
                image.palette_color(index).unwrap()
            );
        }
        TestResult::passed()
    }

    #[test]
    fn out_of_range_index() {
        let image = PalettedImage {
            palette: arr2(&[[0u8, 0, 0], [255, 255, 255]]),
            indices: arr2(&[[0u32, 1], [1, 2]]),
        };
        assert_eq!(
            image.to_image(),
            Err(IndexOutOfRange {
                position: [1, 1],
                index: 2,
                palette_len: 2,
            })
        );
    }

    #[test]
    fn indices_into_empty_palette() {
        let image = PalettedImage {
            palette: Array2::zeros((0, 3)),
            indices: Array2::zeros((1, 1)),
        };
        assert_eq!(image.to_image().unwrap_err().palette_len, 0);
    }

    #[test]
    fn palette_color_bounds() {
        let image = PalettedImage {
            palette: arr2(&[[1u8, 2, 3, 4]]),
            indices: Array2::zeros((1, 1)),
        };
        assert_eq!(image.palette_color(0).unwrap().to_vec(), vec![1, 2, 3, 4]);
        assert!(image.palette_color(1).is_none());
        assert!(image.palette_color(u32::MAX).is_none());
    }
}
