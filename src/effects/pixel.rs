use rayon::prelude::*;

const ROW_CHUNK: usize = 4096;

/// Scale colour channels around black. Premultiplied colour stays bounded by alpha.
pub fn brightness_in_place(px: &mut [u8], factor: f32) {
    if factor == 1.0 {
        return;
    }
    px.par_chunks_mut(ROW_CHUNK).for_each(|chunk| {
        for p in chunk.chunks_exact_mut(4) {
            let a = f32::from(p[3]);
            for c in &mut p[..3] {
                *c = (f32::from(*c) * factor).round().clamp(0.0, a) as u8;
            }
        }
    });
}

/// Scale colour channels around the alpha-weighted mean intensity of the buffer.
pub fn contrast_in_place(px: &mut [u8], factor: f32) {
    if factor == 1.0 {
        return;
    }
    let Some(mean) = mean_intensity(px) else {
        return;
    };
    px.par_chunks_mut(ROW_CHUNK).for_each(|chunk| {
        for p in chunk.chunks_exact_mut(4) {
            let a = f32::from(p[3]);
            let pivot = mean * a / 255.0;
            for c in &mut p[..3] {
                let v = pivot + (f32::from(*c) - pivot) * factor;
                *c = v.round().clamp(0.0, a) as u8;
            }
        }
    });
}

/// Rec. 601 luma. Linear in the channels, so it applies directly to premultiplied colour.
pub fn grayscale_in_place(px: &mut [u8]) {
    px.par_chunks_mut(ROW_CHUNK).for_each(|chunk| {
        for p in chunk.chunks_exact_mut(4) {
            let y = 0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2]);
            let y = y.round().clamp(0.0, f32::from(p[3])) as u8;
            p[0] = y;
            p[1] = y;
            p[2] = y;
        }
    });
}

/// Mean straight-alpha channel intensity in `[0,255]`; `None` for a fully transparent buffer.
fn mean_intensity(px: &[u8]) -> Option<f32> {
    let (color, alpha) = px
        .par_chunks(ROW_CHUNK)
        .map(|chunk| {
            chunk.chunks_exact(4).fold((0u64, 0u64), |(c, a), p| {
                (
                    c + u64::from(p[0]) + u64::from(p[1]) + u64::from(p[2]),
                    a + u64::from(p[3]) * 3,
                )
            })
        })
        .reduce(|| (0, 0), |x, y| (x.0 + y.0, x.1 + y.1));
    if alpha == 0 {
        return None;
    }
    Some((color as f64 / alpha as f64 * 255.0) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightness_one_is_noop_and_scales_otherwise() {
        let mut px = vec![100, 50, 25, 255];
        brightness_in_place(&mut px, 1.0);
        assert_eq!(px, vec![100, 50, 25, 255]);
        brightness_in_place(&mut px, 2.0);
        assert_eq!(px, vec![200, 100, 50, 255]);
        brightness_in_place(&mut px, 2.0);
        assert_eq!(px, vec![255, 200, 100, 255]);
    }

    #[test]
    fn brightness_respects_premultiplied_bound() {
        let mut px = vec![100, 100, 100, 128];
        brightness_in_place(&mut px, 4.0);
        assert_eq!(px, vec![128, 128, 128, 128]);
    }

    #[test]
    fn contrast_pushes_away_from_mean() {
        let mut px = vec![50, 50, 50, 255, 150, 150, 150, 255];
        contrast_in_place(&mut px, 2.0);
        assert_eq!(&px[..4], &[0, 0, 0, 255]);
        assert_eq!(&px[4..], &[200, 200, 200, 255]);
    }

    #[test]
    fn contrast_zero_flattens_to_mean() {
        let mut px = vec![0, 0, 0, 255, 200, 200, 200, 255];
        contrast_in_place(&mut px, 0.0);
        assert_eq!(&px[..3], &[100, 100, 100]);
        assert_eq!(&px[4..7], &[100, 100, 100]);
    }

    #[test]
    fn grayscale_equalizes_channels() {
        let mut px = vec![255, 0, 0, 255, 0, 0, 0, 0];
        grayscale_in_place(&mut px);
        assert_eq!(&px[..4], &[76, 76, 76, 255]);
        assert_eq!(&px[4..], &[0, 0, 0, 0]);
    }
}
