//! Thumbnail rendering for image uploads.
//!
//! Thumbnails are a best-effort side product of ingestion; callers treat
//! failure as non-fatal and proceed without one.

use std::io::Cursor;

use image::ImageFormat;

/// Render an aspect-preserving PNG thumbnail fitting a `max_dim` square.
/// Images already inside the box are re-encoded without upscaling.
pub fn render(bytes: &[u8], max_dim: u32) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let thumb = if img.width() <= max_dim && img.height() <= max_dim {
        img
    } else {
        img.thumbnail(max_dim, max_dim)
    };

    let mut out = Cursor::new(Vec::new());
    thumb.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Whether the pipeline renders thumbnails for this content type.
pub fn supports(mime: &str) -> bool {
    mime.starts_with("image/")
}
