// Software 2D surface with a canvas-like state model:
// a current transform and global alpha, pushed/popped with save/restore.
// Both the interactive stage and the exporter paint through this type, which
// is what keeps the two pixel-identical.

use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};
use kurbo::{Affine, Point, Rect, Size, Vec2};

use crate::error::Error;
use crate::geometry::{clamp, map_range};
use crate::types::FrameBuffer;

/// Straight (non-premultiplied) RGBA in 0..=1.
type Color = [f64; 4];

#[derive(Clone, Copy, Debug)]
struct DrawState {
    transform: Affine,
    alpha: f64,
}

impl Default for DrawState {
    fn default() -> Self {
        Self { transform: Affine::IDENTITY, alpha: 1.0 }
    }
}

pub struct Surface {
    pixels: RgbaImage,
    state: DrawState,
    saved: Vec<DrawState>,
}

impl Surface {
    /// A surface of at least 1×1, cleared to opaque black.
    pub fn new(width: u32, height: u32) -> Self {
        let pixels = RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([0, 0, 0, 255]));
        Self { pixels, state: DrawState::default(), saved: Vec::new() }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size(&self) -> Size {
        Size::new(f64::from(self.width()), f64::from(self.height()))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    // -- state --

    pub fn save(&mut self) {
        self.saved.push(self.state);
    }

    /// Pop the last saved state. An unbalanced restore resets to defaults.
    pub fn restore(&mut self) {
        self.state = self.saved.pop().unwrap_or_default();
    }

    /// Post-multiply the current transform (like `ctx.transform`).
    pub fn transform(&mut self, t: Affine) {
        self.state.transform = self.state.transform * t;
    }

    pub fn set_alpha(&mut self, alpha: f64) {
        self.state.alpha = clamp(alpha, 0.0, 1.0);
    }

    // -- painting --

    /// Fill `rect` (user space) with a solid colour.
    pub fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        let c = to_color(color);
        self.shade(rect, |_| Some(c));
    }

    /// Fill `rect` with a two-stop linear gradient running `from` → `to`.
    pub fn fill_linear_gradient(&mut self, rect: Rect, from: Point, to: Point, stops: [Rgba<u8>; 2]) {
        let (c0, c1) = (to_color(stops[0]), to_color(stops[1]));
        let dir = to - from;
        let len2 = dir.hypot2();
        self.shade(rect, |q| {
            let t = clamp(map_range((q - from).dot(dir), 0.0, len2, 0.0, 1.0), 0.0, 1.0);
            Some(std::array::from_fn(|i| c0[i] + (c1[i] - c0[i]) * t))
        });
    }

    /// Draw `src` stretched into `dest` (user space), nearest-neighbour sampled.
    pub fn draw_image(&mut self, src: &RgbaImage, dest: Rect) {
        let (sw, sh) = src.dimensions();
        if sw == 0 || sh == 0 {
            return;
        }
        let sx = f64::from(sw) / dest.width();
        let sy = f64::from(sh) / dest.height();
        self.shade(dest, |q| {
            let u = ((q.x - dest.x0) * sx).floor();
            let v = ((q.y - dest.y0) * sy).floor();
            let u = clamp(u, 0.0, f64::from(sw - 1)) as u32;
            let v = clamp(v, 0.0, f64::from(sh - 1)) as u32;
            Some(to_color(*src.get_pixel(u, v)))
        });
    }

    /// Core scan loop: for every device pixel whose centre maps inside `rect`
    /// under the current transform, blend `shader(user_point)` source-over.
    fn shade(&mut self, rect: Rect, mut shader: impl FnMut(Point) -> Option<Color>) {
        let rect = rect.abs();
        if rect.width() <= 0.0 || rect.height() <= 0.0 || self.state.alpha <= 0.0 {
            return;
        }
        let t = self.state.transform;
        if t.determinant() == 0.0 {
            return;
        }
        let inv = t.inverse();
        let bounds = t.transform_rect_bbox(rect);
        let (w, h) = (self.width(), self.height());
        let x_start = clamp(bounds.x0.floor(), 0.0, f64::from(w)) as u32;
        let x_end = clamp(bounds.x1.ceil(), 0.0, f64::from(w)) as u32;
        let y_start = clamp(bounds.y0.floor(), 0.0, f64::from(h)) as u32;
        let y_end = clamp(bounds.y1.ceil(), 0.0, f64::from(h)) as u32;
        let alpha = self.state.alpha;

        for y in y_start..y_end {
            for x in x_start..x_end {
                let device = Point::new(f64::from(x), f64::from(y)) + Vec2::new(0.5, 0.5);
                let q = inv * device;
                if !rect.contains(q) {
                    continue;
                }
                if let Some(src) = shader(q) {
                    let dst = self.pixels.get_pixel_mut(x, y);
                    *dst = blend_over(src, alpha, *dst);
                }
            }
        }
    }

    // -- output --

    /// Pack into 0x00RRGGBB for the window (alpha dropped; the stage is opaque).
    pub fn to_frame_buffer(&self) -> FrameBuffer {
        let (w, h) = self.pixels.dimensions();
        let mut out = Vec::with_capacity((w as usize) * (h as usize));
        for pixel in self.pixels.pixels() {
            let r = pixel[0] as u32;
            let g = pixel[1] as u32;
            let b = pixel[2] as u32;
            out.push((r << 16) | (g << 8) | b);
        }
        FrameBuffer { width: w as usize, height: h as usize, pixels: out }
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = Cursor::new(Vec::new());
        self.pixels.write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }
}

fn to_color(p: Rgba<u8>) -> Color {
    std::array::from_fn(|i| f64::from(p[i]) / 255.0)
}

/// Straight-alpha source-over.
fn blend_over(src: Color, global_alpha: f64, dst: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] * global_alpha;
    if sa <= 0.0 {
        return dst;
    }
    let d = to_color(dst);
    let da = d[3];
    let out_a = sa + da * (1.0 - sa);
    let mut out = [0u8; 4];
    for i in 0..3 {
        let c = (src[i] * sa + d[i] * da * (1.0 - sa)) / out_a;
        out[i] = (clamp(c, 0.0, 1.0) * 255.0).round() as u8;
    }
    out[3] = (clamp(out_a, 0.0, 1.0) * 255.0).round() as u8;
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[test]
    fn new_surface_is_at_least_one_pixel() {
        let s = Surface::new(0, 0);
        assert_eq!((s.width(), s.height()), (1, 1));
    }

    #[test]
    fn fill_rect_respects_transform() {
        let mut s = Surface::new(10, 10);
        s.transform(Affine::translate((5.0, 0.0)));
        s.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), RED);
        assert_eq!(s.pixel(5, 0), RED);
        assert_eq!(s.pixel(6, 1), RED);
        assert_eq!(s.pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(s.pixel(7, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn alpha_blends_over_black() {
        let mut s = Surface::new(2, 2);
        s.set_alpha(0.5);
        s.fill_rect(Rect::new(0.0, 0.0, 2.0, 2.0), WHITE);
        let p = s.pixel(0, 0);
        assert!((127..=128).contains(&p[0]), "got {p:?}");
        assert_eq!(p[3], 255);
    }

    #[test]
    fn save_restore_roundtrips_state() {
        let mut s = Surface::new(4, 4);
        s.save();
        s.set_alpha(0.3);
        s.transform(Affine::translate((1.0, 1.0)));
        s.restore();
        assert_eq!(s.state.alpha, 1.0);
        assert_eq!(s.state.transform, Affine::IDENTITY);
    }

    #[test]
    fn draw_image_scales_into_dest() {
        let mut img = RgbaImage::from_pixel(2, 1, WHITE);
        img.put_pixel(1, 0, RED);
        let mut s = Surface::new(4, 2);
        s.draw_image(&img, Rect::new(0.0, 0.0, 4.0, 2.0));
        assert_eq!(s.pixel(0, 0), WHITE);
        assert_eq!(s.pixel(1, 1), WHITE);
        assert_eq!(s.pixel(2, 0), RED);
        assert_eq!(s.pixel(3, 1), RED);
    }

    #[test]
    fn gradient_runs_between_stops() {
        let mut s = Surface::new(10, 1);
        let r = Rect::new(0.0, 0.0, 10.0, 1.0);
        s.fill_linear_gradient(r, Point::new(0.0, 0.0), Point::new(10.0, 0.0), [Rgba([0, 0, 0, 255]), WHITE]);
        assert!(s.pixel(0, 0)[0] < 20);
        assert!(s.pixel(9, 0)[0] > 235);
        assert!(s.pixel(4, 0)[0] < s.pixel(5, 0)[0]);
    }

    #[test]
    fn frame_buffer_packs_rgb() {
        let mut s = Surface::new(1, 1);
        s.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), Rgba([0x12, 0x34, 0x56, 255]));
        assert_eq!(s.to_frame_buffer().pixels, vec![0x0012_3456]);
    }

    #[test]
    fn png_encoding_has_signature() {
        let bytes = Surface::new(3, 2).encode_png().unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
