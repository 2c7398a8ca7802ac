use base64::Engine;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};
use std::{io::Cursor, path::Path};

/// Decodes an image, shrinks it so its longer side is at most
/// `max_dimension`, and re-encodes it as base64 JPEG for upload.
pub fn encode_image_for_upload(
    image_path: impl AsRef<Path>,
    max_dimension: u32,
) -> anyhow::Result<String> {
    let image = image::open(image_path.as_ref())?;
    let image = downscale(image, max_dimension);

    // JPEG has no alpha channel
    let image = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Jpeg)?;

    Ok(base64::engine::general_purpose::STANDARD.encode(buffer.into_inner()))
}

pub fn downscale(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if max_dimension == 0 || width.max(height) <= max_dimension {
        return image;
    }

    tracing::debug!(
        "downscaling image from {}x{} to fit {}",
        width,
        height,
        max_dimension
    );
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

pub fn jpeg_data_url(image_base64: &str) -> String {
    format!("data:image/jpeg;base64,{}", image_base64)
}
