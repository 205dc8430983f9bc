use image::RgbaImage;

use crate::error::{ReelError, ReelResult};

/// A straight-alpha RGBA8 raster. Canvas frames handed to the encoder are
/// fully opaque; intermediate foregrounds (stickers, decoded GIF frames) may
/// carry alpha and are blended on paste.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> ReelResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| ReelError::validation("frame size overflow"))?;
        if data.len() != expected {
            return Err(ReelError::validation(format!(
                "frame data length {} does not match {width}x{height}*4",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn black(width: u32, height: u32) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn from_rgba_image(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }

    fn to_rgba_image(&self) -> RgbaImage {
        // Dimensions and buffer length are kept consistent by construction.
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    /// Resample to `width x height`. Lanczos3 is the standard filter for all
    /// resampling in this crate.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let resized = image::imageops::resize(
            &self.to_rgba_image(),
            width.max(1),
            height.max(1),
            image::imageops::FilterType::Lanczos3,
        );
        Self::from_rgba_image(resized)
    }

    /// Extract the `width x height` region whose top-left corner is `(x, y)`,
    /// clamped to stay inside the frame.
    pub fn cropped(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let width = width.min(self.width).max(1);
        let height = height.min(self.height).max(1);
        let x = x.min(self.width - width);
        let y = y.min(self.height - height);

        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for row in y..y + height {
            let start = ((row * self.width + x) as usize) * 4;
            let end = start + width as usize * 4;
            data.extend_from_slice(&self.data[start..end]);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Center-crop to exactly `width x height`.
    pub fn center_cropped(&self, width: u32, height: u32) -> Self {
        let x = self.width.saturating_sub(width) / 2;
        let y = self.height.saturating_sub(height) / 2;
        self.cropped(x, y, width, height)
    }

    /// Alpha-blend `src` over this frame with its top-left corner at
    /// `(x, y)`. Regions falling outside the destination are skipped.
    pub fn paste_over(&mut self, src: &Frame, x: i64, y: i64) {
        for sy in 0..src.height as i64 {
            let dy = y + sy;
            if dy < 0 || dy >= self.height as i64 {
                continue;
            }
            for sx in 0..src.width as i64 {
                let dx = x + sx;
                if dx < 0 || dx >= self.width as i64 {
                    continue;
                }
                let si = ((sy as u32 * src.width + sx as u32) as usize) * 4;
                let di = ((dy as u32 * self.width + dx as u32) as usize) * 4;
                let src_px = [
                    src.data[si],
                    src.data[si + 1],
                    src.data[si + 2],
                    src.data[si + 3],
                ];
                let dst_px = [
                    self.data[di],
                    self.data[di + 1],
                    self.data[di + 2],
                    self.data[di + 3],
                ];
                let out = super::blend::over_straight(dst_px, src_px);
                self.data[di..di + 4].copy_from_slice(&out);
            }
        }
    }

    /// Scale RGB toward black by `factor` (0.0 = black, 1.0 = unchanged).
    /// Alpha is preserved.
    pub fn darkened(&self, factor: f64) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        let scale = (factor * 255.0).round() as u16;
        let mut out = self.clone();
        for px in out.data.chunks_exact_mut(4) {
            for c in px.iter_mut().take(3) {
                *c = ((u16::from(*c) * scale + 127) / 255) as u8;
            }
        }
        out
    }

    /// Force every pixel opaque, compositing translucent pixels over black.
    pub fn flattened(&self) -> Self {
        let mut out = self.clone();
        for px in out.data.chunks_exact_mut(4) {
            let a = u16::from(px[3]);
            if a == 255 {
                continue;
            }
            for c in px.iter_mut().take(3) {
                *c = ((u16::from(*c) * a + 127) / 255) as u8;
            }
            px[3] = 255;
        }
        out
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

/// Aspect-preserving "contain" fit of `(src_w, src_h)` into
/// `(target_w, target_h)`.
pub fn contain_fit(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (target_w, target_h);
    }
    let scale = (f64::from(target_w) / f64::from(src_w)).min(f64::from(target_h) / f64::from(src_h));
    (
        ((f64::from(src_w) * scale) as u32).max(1),
        ((f64::from(src_h) * scale) as u32).max(1),
    )
}

/// Fraction of the target canvas area filled by a contain-fit of the source.
/// Drives the letterbox-vs-blur-background decision.
pub fn coverage(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> f64 {
    if target_w == 0 || target_h == 0 {
        return 0.0;
    }
    let (fit_w, fit_h) = contain_fit(src_w, src_h, target_w, target_h);
    f64::from(fit_w) * f64::from(fit_h) / (f64::from(target_w) * f64::from(target_h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Frame {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..width * height {
            data.extend_from_slice(&rgba);
        }
        Frame::new(width, height, data).unwrap()
    }

    #[test]
    fn black_frame_is_opaque() {
        let f = Frame::black(2, 2);
        assert_eq!(f.pixel(1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn new_rejects_mismatched_buffer() {
        assert!(Frame::new(2, 2, vec![0u8; 15]).is_err());
    }

    #[test]
    fn center_crop_takes_middle_region() {
        let mut f = Frame::black(4, 4);
        let i = ((1 * 4 + 1) as usize) * 4;
        f.data[i..i + 4].copy_from_slice(&[9, 9, 9, 255]);
        let cropped = f.center_cropped(2, 2);
        assert_eq!(cropped.width, 2);
        assert_eq!(cropped.pixel(0, 0), [9, 9, 9, 255]);
    }

    #[test]
    fn paste_over_blends_alpha() {
        let mut dst = Frame::black(1, 1);
        let src = solid(1, 1, [255, 0, 0, 128]);
        dst.paste_over(&src, 0, 0);
        let [r, g, b, a] = dst.pixel(0, 0);
        assert!(r > 120 && r < 136);
        assert_eq!((g, b, a), (0, 0, 255));
    }

    #[test]
    fn paste_over_clips_out_of_bounds() {
        let mut dst = Frame::black(2, 2);
        let src = solid(2, 2, [10, 10, 10, 255]);
        dst.paste_over(&src, 1, 1);
        assert_eq!(dst.pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(dst.pixel(1, 1), [10, 10, 10, 255]);
    }

    #[test]
    fn darkened_scales_rgb_only() {
        let f = solid(1, 1, [100, 200, 50, 255]).darkened(0.5);
        let [r, g, b, a] = f.pixel(0, 0);
        assert_eq!(a, 255);
        assert!((r as i32 - 50).abs() <= 1);
        assert!((g as i32 - 100).abs() <= 1);
        assert!((b as i32 - 25).abs() <= 1);
    }

    #[test]
    fn contain_fit_preserves_aspect() {
        assert_eq!(contain_fit(200, 100, 100, 100), (100, 50));
        assert_eq!(contain_fit(100, 200, 100, 100), (50, 100));
        assert_eq!(contain_fit(1080, 1920, 1080, 1920), (1080, 1920));
    }

    #[test]
    fn coverage_matches_fit_area() {
        assert!((coverage(1080, 1920, 1080, 1920) - 1.0).abs() < 1e-9);
        let c = coverage(200, 200, 1080, 1920);
        assert!(c < 0.35, "square into 9:16 should cover ~31%, got {c}");
    }
}
