pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn mul_div255_u8(x: u16, y: u16) -> u8 {
    mul_div255_u16(x, y) as u8
}

pub(crate) fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Linear ramp position of `t` within `[0, span]`; a non-positive span is already complete.
pub(crate) fn ramp(t: f64, span: f64) -> f64 {
    if span <= 0.0 {
        return 1.0;
    }
    (t / span).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div255_variants_align() {
        for x in [0u16, 1, 127, 255] {
            for y in [0u16, 1, 127, 255] {
                assert_eq!(u16::from(mul_div255_u8(x, y)), mul_div255_u16(x, y));
            }
        }
    }

    #[test]
    fn ramp_clamps_and_handles_empty_span() {
        assert_eq!(ramp(-1.0, 2.0), 0.0);
        assert_eq!(ramp(1.0, 2.0), 0.5);
        assert_eq!(ramp(5.0, 2.0), 1.0);
        assert_eq!(ramp(0.0, 0.0), 1.0);
        assert_eq!(lerp(10.0, 20.0, 0.25), 12.5);
    }
}
