use std::collections::HashMap;
use std::path::Path;

use fontdue::{
    Font, FontSettings,
    layout::{CoordinateSystem, GlyphRasterConfig, HorizontalAlign, Layout, LayoutSettings, TextStyle},
};
use tracing::debug;

use crate::{
    compose::{blend, frame::Frame},
    error::{ReelError, ReelResult},
};

/// Bold faces commonly installed on the render hosts, in preference order.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/truetype/freefont/FreeSansBold.ttf",
    "/usr/share/fonts/truetype/ubuntu/Ubuntu-B.ttf",
];

/// Visual style of burned-in captions. Defaults are the house look: big
/// uppercase white text with a heavy black stroke, sitting at 65% of the
/// canvas height so it clears both the subject and platform UI overlays.
#[derive(Clone, Debug)]
pub struct CaptionStyle {
    pub font_size: f32,
    pub stroke_width: i32,
    pub fill: [u8; 4],
    pub stroke: [u8; 4],
    /// Vertical anchor for the text block, as a fraction of canvas height.
    pub vertical_anchor: f32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size: 72.0,
            stroke_width: 6,
            fill: [255, 255, 255, 255],
            stroke: [0, 0, 0, 255],
            vertical_anchor: 0.65,
        }
    }
}

struct RasterGlyph {
    width: usize,
    height: usize,
    coverage: Vec<u8>,
}

/// Rasterizes caption text onto frames. Holds a glyph cache keyed by raster
/// config, so repeated stamps of the same chunk across a scene's frames only
/// rasterize each glyph once.
pub struct CaptionPainter {
    font: Font,
    style: CaptionStyle,
    cache: HashMap<GlyphRasterConfig, RasterGlyph>,
}

impl CaptionPainter {
    /// Load the first available bold system font. Errors when none of the
    /// known faces exist; callers treat that as "skip burn-in, keep the SRT".
    pub fn from_system_fonts(style: CaptionStyle) -> ReelResult<Self> {
        for candidate in FONT_CANDIDATES {
            let path = Path::new(candidate);
            if !path.exists() {
                continue;
            }
            let bytes = std::fs::read(path)
                .map_err(|e| ReelError::compose(format!("read font '{candidate}': {e}")))?;
            debug!(font = candidate, "loaded caption font");
            return Self::from_font_bytes(&bytes, style);
        }
        Err(ReelError::compose(
            "no usable bold font found on this host",
        ))
    }

    pub fn from_font_bytes(bytes: &[u8], style: CaptionStyle) -> ReelResult<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| ReelError::compose(format!("parse caption font: {e}")))?;
        Ok(Self {
            font,
            style,
            cache: HashMap::new(),
        })
    }

    /// Burn one caption chunk into `frame`: uppercased, centered horizontally,
    /// anchored at the style's vertical fraction. The stroke is drawn by
    /// stamping the glyphs in the stroke color at every pixel offset within
    /// the stroke box except the origin, then stamping the fill on top.
    pub fn draw_caption(&mut self, frame: &mut Frame, text: &str) {
        let text = text.to_uppercase();
        if text.trim().is_empty() {
            return;
        }

        let margin = f32::max(frame.width as f32 * 0.05, self.style.stroke_width as f32);
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x: margin,
            y: frame.height as f32 * self.style.vertical_anchor,
            max_width: Some(frame.width as f32 - 2.0 * margin),
            horizontal_align: HorizontalAlign::Center,
            ..LayoutSettings::default()
        });
        layout.append(
            &[&self.font],
            &TextStyle::new(&text, self.style.font_size, 0),
        );

        let glyphs = layout.glyphs().clone();
        let stroke = self.style.stroke;
        let fill = self.style.fill;
        for (dx, dy) in stroke_offsets(self.style.stroke_width) {
            self.stamp_glyphs(frame, &glyphs, dx, dy, stroke);
        }
        self.stamp_glyphs(frame, &glyphs, 0, 0, fill);
    }

    fn stamp_glyphs(
        &mut self,
        frame: &mut Frame,
        glyphs: &[fontdue::layout::GlyphPosition],
        dx: i32,
        dy: i32,
        color: [u8; 4],
    ) {
        for glyph in glyphs {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let raster = self.cache.entry(glyph.key).or_insert_with(|| {
                let (metrics, coverage) = self.font.rasterize_config(glyph.key);
                RasterGlyph {
                    width: metrics.width,
                    height: metrics.height,
                    coverage,
                }
            });
            blend_coverage(
                frame,
                glyph.x.round() as i64 + i64::from(dx),
                glyph.y.round() as i64 + i64::from(dy),
                raster.width,
                raster.height,
                &raster.coverage,
                color,
            );
        }
    }
}

/// Every offset within the square stroke box except the origin.
fn stroke_offsets(width: i32) -> impl Iterator<Item = (i32, i32)> {
    (-width..=width)
        .flat_map(move |dy| (-width..=width).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| (dx, dy) != (0, 0))
}

/// Blend a coverage mask onto the frame in `color`, clipping at the edges.
fn blend_coverage(
    frame: &mut Frame,
    x: i64,
    y: i64,
    width: usize,
    height: usize,
    coverage: &[u8],
    color: [u8; 4],
) {
    for gy in 0..height {
        let fy = y + gy as i64;
        if fy < 0 || fy >= i64::from(frame.height) {
            continue;
        }
        for gx in 0..width {
            let fx = x + gx as i64;
            if fx < 0 || fx >= i64::from(frame.width) {
                continue;
            }
            let cov = coverage[gy * width + gx];
            if cov == 0 {
                continue;
            }
            let alpha = ((u16::from(cov) * u16::from(color[3]) + 127) / 255) as u8;
            let di = ((fy as u32 * frame.width + fx as u32) as usize) * 4;
            let dst = [
                frame.data[di],
                frame.data[di + 1],
                frame.data[di + 2],
                frame.data[di + 3],
            ];
            let out = blend::over_straight(dst, [color[0], color[1], color[2], alpha]);
            frame.data[di..di + 4].copy_from_slice(&out);
        }
    }
}
