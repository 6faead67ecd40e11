//! Image loading that honors the EXIF orientation tag.

use image::{DynamicImage, ImageDecoder, ImageReader, ImageResult};
use std::path::Path;

/// Decode the image at `path` and rotate/flip it upright as its EXIF
/// orientation tag requests. Images without the tag load unchanged.
///
/// The format is chosen from the file extension, as with [`image::open`].
pub fn open_upright(path: &Path) -> ImageResult<DynamicImage> {
    let mut decoder = ImageReader::open(path)?.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    tracing::trace!(?orientation, path = %path.display(), "decoded");
    image.apply_orientation(orientation);
    Ok(image)
}
