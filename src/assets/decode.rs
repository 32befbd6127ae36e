use std::path::Path;

use image::imageops::FilterType;

use crate::{
    foundation::error::{ReelError, ReelResult},
    render::frame::RasterImage,
};

/// Decode an image file and resample it to exactly `width`x`height`, premultiplied.
///
/// Unreadable or undecodable files are [`ReelError::MediaNotFound`].
pub fn load_image_fitted(path: &Path, width: u32, height: u32) -> ReelResult<RasterImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| ReelError::media_not_found(format!("{}: {e}", path.display())))?;
    decode_image_fitted(&bytes, width, height)
        .map_err(|e| ReelError::media_not_found(format!("{}: {e}", path.display())))
}

pub fn decode_image_fitted(bytes: &[u8], width: u32, height: u32) -> ReelResult<RasterImage> {
    let dyn_img = image::load_from_memory(bytes)
        .map_err(|e| ReelError::evaluation(format!("decode image: {e}")))?;
    if width == 0 || height == 0 {
        return Ok(RasterImage::blank(width, height));
    }
    let rgba = if dyn_img.width() == width && dyn_img.height() == height {
        dyn_img.to_rgba8()
    } else {
        image::imageops::resize(&dyn_img.to_rgba8(), width, height, FilterType::Triangle)
    };

    let mut px = rgba.into_raw();
    premultiply_rgba8_in_place(&mut px);
    RasterImage::new(width, height, px)
}

pub fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 255 {
            continue;
        }
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((u16::from(px[0]) * a + 127) / 255) as u8;
        px[1] = ((u16::from(px[1]) * a + 127) / 255) as u8;
        px[2] = ((u16::from(px[2]) * a + 127) / 255) as u8;
    }
}
