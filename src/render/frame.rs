use std::sync::Arc;

use rayon::prelude::*;

use crate::foundation::{
    core::{Canvas, Rect, Rgba8Premul},
    error::{ReelError, ReelResult},
    math::mul_div255_u8,
};

pub type PremulRgba8 = [u8; 4];

/// One output frame. `data` is tightly packed row-major RGBA8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    /// Whether `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    pub fn solid(canvas: Canvas, color: Rgba8Premul) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            data: color.to_array().repeat(canvas.width as usize * canvas.height as usize),
            premultiplied: true,
        }
    }

    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> PremulRgba8 {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// Premultiplied RGBA8 raster shared between frames without copying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<Vec<u8>>,
}

impl RasterImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> ReelResult<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(ReelError::evaluation(format!(
                "raster of {width}x{height} expects {} bytes, got {}",
                width as usize * height as usize * 4,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels: Arc::new(pixels),
        })
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: Arc::new(vec![0u8; width as usize * height as usize * 4]),
        }
    }

    pub fn from_frame(frame: FrameRGBA) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            pixels: Arc::new(frame.data),
        }
    }

    /// Mutable access, cloning the buffer only if it is shared.
    pub fn pixels_mut(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.pixels)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255_u8(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255_u8(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255_u8(u16::from(src[i]), op);
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

pub fn crossfade(a: PremulRgba8, b: PremulRgba8, t: f32) -> PremulRgba8 {
    let t = t.clamp(0.0, 1.0);
    let tt = ((t * 255.0).round() as i32).clamp(0, 255) as u16;
    let it = 255u16 - tt;

    let mut out = [0u8; 4];
    for i in 0..4 {
        let av = mul_div255_u8(u16::from(a[i]), it);
        let bv = mul_div255_u8(u16::from(b[i]), tt);
        out[i] = av.saturating_add(bv);
    }
    out
}

/// Draw `src` stretched into `dest` (pixel space) over `dst`, clipped to the frame.
///
/// Sampling is nearest-neighbour at pixel centres, so a `dest` matching the source size at an
/// integer offset copies pixels exactly.
pub fn draw_image(dst: &mut FrameRGBA, src: &RasterImage, dest: Rect, opacity: f32) {
    if opacity <= 0.0 || src.is_empty() || dest.width() <= 0.0 || dest.height() <= 0.0 {
        return;
    }
    let fw = dst.width as i64;
    let fh = dst.height as i64;
    let x0 = (dest.x0.floor() as i64).clamp(0, fw);
    let x1 = (dest.x1.ceil() as i64).clamp(0, fw);
    let y0 = (dest.y0.floor() as i64).clamp(0, fh);
    let y1 = (dest.y1.ceil() as i64).clamp(0, fh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let sx = f64::from(src.width) / dest.width();
    let sy = f64::from(src.height) / dest.height();
    let stride = dst.width as usize * 4;
    let src_px = src.pixels.as_slice();
    let src_stride = src.width as usize * 4;

    dst.data
        .par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(y, row)| {
            let v = ((y as f64 + 0.5 - dest.y0) * sy).floor();
            if v < 0.0 || v >= f64::from(src.height) {
                return;
            }
            let src_row = &src_px[v as usize * src_stride..(v as usize + 1) * src_stride];
            for x in x0..x1 {
                let u = ((x as f64 + 0.5 - dest.x0) * sx).floor();
                if u < 0.0 || u >= f64::from(src.width) {
                    continue;
                }
                let si = u as usize * 4;
                let s = [
                    src_row[si],
                    src_row[si + 1],
                    src_row[si + 2],
                    src_row[si + 3],
                ];
                let di = x as usize * 4;
                let d = [row[di], row[di + 1], row[di + 2], row[di + 3]];
                row[di..di + 4].copy_from_slice(&over(d, s, opacity));
            }
        });
}

/// Flatten a premultiplied frame over an opaque background into straight RGBA bytes.
pub fn flatten_to_opaque_rgba8(frame: &FrameRGBA, bg: Rgba8Premul) -> ReelResult<Vec<u8>> {
    if frame.data.len() != frame.width as usize * frame.height as usize * 4 {
        return Err(ReelError::encoding("frame data length mismatch"));
    }
    let bg = [bg.r, bg.g, bg.b, 255];
    let mut out = Vec::with_capacity(frame.data.len());
    for px in frame.data.chunks_exact(4) {
        let s = [px[0], px[1], px[2], px[3]];
        let o = if frame.premultiplied {
            over(bg, s, 1.0)
        } else {
            over(
                bg,
                Rgba8Premul::from_straight_rgba(s[0], s[1], s[2], s[3]).to_array(),
                1.0,
            )
        };
        out.extend_from_slice(&[o[0], o[1], o[2], 255]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        let src = [200, 200, 200, 200];
        assert_eq!(over(dst, src, 0.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn over_dst_transparent_returns_scaled_src() {
        let dst = [0, 0, 0, 0];
        let src = [100, 110, 120, 200];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn crossfade_t_0_is_a_and_t_1_is_b() {
        let a = [10, 20, 30, 40];
        let b = [200, 210, 220, 230];
        assert_eq!(crossfade(a, b, 0.0), a);
        assert_eq!(crossfade(a, b, 1.0), b);
    }

    #[test]
    fn draw_image_copies_at_integer_offset_and_clips() {
        let mut frame = FrameRGBA::solid(Canvas::new(4, 4), Rgba8Premul::transparent());
        let red = RasterImage::new(2, 2, [255u8, 0, 0, 255].repeat(4)).unwrap();
        draw_image(&mut frame, &red, Rect::new(3.0, 3.0, 5.0, 5.0), 1.0);
        assert_eq!(frame.pixel(3, 3), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(2, 3), [0, 0, 0, 0]);
        assert_eq!(frame.pixel(3, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn draw_image_scales_into_dest_rect() {
        let mut frame = FrameRGBA::solid(Canvas::new(4, 4), Rgba8Premul::transparent());
        let mut px = [0u8, 0, 255, 255].repeat(2);
        px[..4].copy_from_slice(&[255, 0, 0, 255]);
        let img = RasterImage::new(2, 1, px).unwrap();
        draw_image(&mut frame, &img, Rect::new(0.0, 0.0, 4.0, 4.0), 1.0);
        assert_eq!(frame.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(1, 3), [255, 0, 0, 255]);
        assert_eq!(frame.pixel(2, 0), [0, 0, 255, 255]);
        assert_eq!(frame.pixel(3, 3), [0, 0, 255, 255]);
    }

    #[test]
    fn flatten_uses_background_for_transparency() {
        let frame = FrameRGBA::solid(Canvas::new(1, 1), Rgba8Premul::transparent());
        let out =
            flatten_to_opaque_rgba8(&frame, Rgba8Premul::from_straight_rgba(9, 8, 7, 255)).unwrap();
        assert_eq!(out, vec![9, 8, 7, 255]);
    }

    #[test]
    fn pixels_mut_copies_on_write() {
        let a = RasterImage::blank(1, 1);
        let mut b = a.clone();
        b.pixels_mut()[3] = 255;
        assert_eq!(a.pixels[3], 0);
        assert_eq!(b.pixels[3], 255);
    }
}
