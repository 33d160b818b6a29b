use std::path::Path;

use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};

use crate::error::Error;

/// Decodes an uploaded image, resizes it to exactly `width`×`height` and
/// re-encodes as JPEG quality 90 under `public/`.
pub fn resize_to_jpeg(
    data: &[u8],
    width: u32,
    height: u32,
    path: impl AsRef<Path>,
) -> Result<(), Error> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let resized = image::load_from_memory(data)?.resize_exact(width, height, FilterType::Triangle);

    let mut out = std::fs::File::create(path)?;
    let encoder = JpegEncoder::new_with_quality(&mut out, 90);
    resized.write_with_encoder(encoder)?;

    Ok(())
}

pub fn is_image(content_type: Option<&str>) -> bool {
    content_type
        .map(|it| it.starts_with("image/"))
        .unwrap_or(false)
}
