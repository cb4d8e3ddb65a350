//! Cropping a region out of a rasterized page.

use image::{imageops, DynamicImage};
use tracing::trace;

use super::RasterPage;
use crate::error::CropError;
use crate::models::region::Rect;

/// Crop `rect` out of `page`, clipped to the page bounds.
///
/// A rectangle that only partly overlaps the page yields the overlapping
/// part. One with no overlap at all is an [`CropError::EmptyRegion`].
pub fn crop_region(page: &RasterPage, rect: &Rect) -> Result<DynamicImage, CropError> {
    let (width, height) = (page.width(), page.height());

    let clipped = rect.clip_to(width, height).ok_or(CropError::EmptyRegion {
        rect: *rect,
        width,
        height,
    })?;

    if clipped != *rect {
        trace!(page = page.page, "Clipped region {} to {}", rect, clipped);
    }

    let cropped = imageops::crop_imm(
        &page.image,
        clipped.x1,
        clipped.y1,
        clipped.width(),
        clipped.height(),
    )
    .to_image();

    Ok(DynamicImage::ImageRgb8(cropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn page(width: u32, height: u32) -> RasterPage {
        let image = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0]));
        RasterPage::new(1, image)
    }

    #[test]
    fn test_crop_inside() {
        let page = page(100, 80);
        let rect = Rect::new(10, 20, 30, 25).unwrap();
        let cropped = crop_region(&page, &rect).unwrap();

        assert_eq!(cropped.dimensions(), (20, 5));
        assert_eq!(cropped.to_rgb8().get_pixel(0, 0), &Rgb([10, 20, 0]));
    }

    #[test]
    fn test_crop_partial_overlap_is_clipped() {
        let page = page(100, 80);
        let rect = Rect::new(90, 70, 150, 200).unwrap();
        let cropped = crop_region(&page, &rect).unwrap();

        assert_eq!(cropped.dimensions(), (10, 10));
        assert_eq!(cropped.to_rgb8().get_pixel(9, 9), &Rgb([99, 79, 0]));
    }

    #[test]
    fn test_crop_outside_fails() {
        let page = page(100, 80);
        let rect = Rect::new(100, 0, 120, 10).unwrap();

        assert_eq!(
            crop_region(&page, &rect).unwrap_err(),
            CropError::EmptyRegion {
                rect,
                width: 100,
                height: 80
            }
        );
    }
}
