use crate::{
    compose::frame::Frame,
    error::{ReelError, ReelResult},
};

/// Default blur radius for background synthesis. Strong enough that source
/// detail reads as texture, not content.
pub const BACKGROUND_BLUR_RADIUS: u32 = 50;

/// Separable Gaussian blur over a straight-alpha RGBA8 frame.
///
/// The kernel is quantized to Q16 fixed point and normalized so weights sum to
/// exactly 1.0; edges clamp. `sigma` defaults to `radius / 2` via
/// [`blur_frame`].
pub fn blur_frame_with_sigma(frame: &Frame, radius: u32, sigma: f32) -> ReelResult<Frame> {
    if radius == 0 {
        return Ok(frame.clone());
    }
    let kernel = gaussian_kernel_q16(radius, sigma)?;

    let mut tmp = vec![0u8; frame.data.len()];
    let mut out = vec![0u8; frame.data.len()];
    blur_pass(
        &frame.data,
        &mut tmp,
        frame.width,
        frame.height,
        &kernel,
        Axis::Horizontal,
    );
    blur_pass(
        &tmp,
        &mut out,
        frame.width,
        frame.height,
        &kernel,
        Axis::Vertical,
    );

    Frame::new(frame.width, frame.height, out)
}

pub fn blur_frame(frame: &Frame, radius: u32) -> ReelResult<Frame> {
    blur_frame_with_sigma(frame, radius, (radius as f32 / 2.0).max(0.5))
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn gaussian_kernel_q16(radius: u32, sigma: f32) -> ReelResult<Vec<u32>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(ReelError::validation("blur sigma must be > 0"));
    }

    let r = radius as i32;
    let sigma = f64::from(sigma);
    let denom = 2.0 * sigma * sigma;

    let mut weights_f = Vec::with_capacity((2 * r + 1) as usize);
    let mut sum = 0.0f64;
    for i in -r..=r {
        let x = f64::from(i);
        let w = (-x * x / denom).exp();
        weights_f.push(w);
        sum += w;
    }

    let mut weights = Vec::with_capacity(weights_f.len());
    let mut acc: i64 = 0;
    for wf in &weights_f {
        let q = ((wf / sum) * 65536.0).round().clamp(0.0, 65536.0) as i64;
        weights.push(q as u32);
        acc += q;
    }
    // Push rounding residue into the center tap so the kernel sums to 1.0.
    let delta = 65536 - acc;
    if delta != 0 {
        let mid = weights.len() / 2;
        weights[mid] = (i64::from(weights[mid]) + delta).clamp(0, 65536) as u32;
    }
    Ok(weights)
}

fn blur_pass(src: &[u8], dst: &mut [u8], width: u32, height: u32, kernel: &[u32], axis: Axis) {
    let radius = (kernel.len() / 2) as i32;
    let w = width as i32;
    let h = height as i32;

    for y in 0..h {
        for x in 0..w {
            let mut acc = [0u64; 4];
            for (ki, &kw) in kernel.iter().enumerate() {
                let offset = ki as i32 - radius;
                let (sx, sy) = match axis {
                    Axis::Horizontal => ((x + offset).clamp(0, w - 1), y),
                    Axis::Vertical => (x, (y + offset).clamp(0, h - 1)),
                };
                let idx = ((sy * w + sx) as usize) * 4;
                for c in 0..4 {
                    acc[c] += u64::from(kw) * u64::from(src[idx + c]);
                }
            }
            let out_idx = ((y * w + x) as usize) * 4;
            for c in 0..4 {
                dst[out_idx + c] = (((acc[c] + 32768) >> 16).min(255)) as u8;
            }
        }
    }
}
