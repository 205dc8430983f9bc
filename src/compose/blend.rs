use crate::error::{ReelError, ReelResult};

/// Source-over for straight-alpha RGBA8 against an (assumed opaque enough)
/// destination pixel.
pub fn over_straight(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    let sa = u16::from(src[3]);
    if sa == 0 {
        return dst;
    }
    if sa == 255 {
        return src;
    }
    let inv = 255 - sa;
    let mut out = [0u8; 4];
    for i in 0..3 {
        out[i] = add_sat(
            mul_div255(u16::from(src[i]), sa),
            mul_div255(u16::from(dst[i]), inv),
        );
    }
    out[3] = add_sat(sa as u8, mul_div255(u16::from(dst[3]), inv));
    out
}

/// Linear blend of two equal-size RGBA8 buffers: `t = 0` is all `a`,
/// `t = 1` is all `b`. Used for scene crossfade overlap regions.
pub fn crossfade_into(dst: &mut [u8], a: &[u8], b: &[u8], t: f32) -> ReelResult<()> {
    if dst.len() != a.len() || dst.len() != b.len() || !dst.len().is_multiple_of(4) {
        return Err(ReelError::compose(
            "crossfade_into expects equal-length rgba8 buffers",
        ));
    }
    let t = t.clamp(0.0, 1.0);
    let tq = ((t * 255.0).round() as i32).clamp(0, 255) as u16;
    let iq = 255 - tq;
    for ((d, pa), pb) in dst.iter_mut().zip(a.iter()).zip(b.iter()) {
        *d = add_sat(
            mul_div255(u16::from(*pa), iq),
            mul_div255(u16::from(*pb), tq),
        );
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}
