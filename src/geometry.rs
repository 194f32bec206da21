// Pure numeric helpers shared by the store, the stage and the compositor.
// Nothing here knows about layers' identity; it only turns numbers into
// rectangles and affine transforms.

use kurbo::{Affine, Point, Size, Vec2};

/// Clamp `v` into `[min, max]`.
#[inline]
pub fn clamp(v: f64, min: f64, max: f64) -> f64 {
    v.max(min).min(max)
}

/// Linearly map `v` from `[in_min, in_max]` to `[out_min, out_max]`.
/// A degenerate input range divides by 1 instead of 0.
pub fn map_range(v: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    let span = in_max - in_min;
    let span = if span == 0.0 { 1.0 } else { span };
    out_min + (v - in_min) * (out_max - out_min) / span
}

/// Rendered size of a layer: width = round(base_width × scale), height follows
/// the image's intrinsic aspect ratio.
///
/// Returns `None` when the image has no usable intrinsic size yet.
pub fn rendered_size(base_width: f64, scale: f64, intrinsic_w: u32, intrinsic_h: u32) -> Option<Size> {
    if intrinsic_w == 0 || intrinsic_h == 0 {
        return None;
    }
    let width = (base_width * scale).round();
    let height = width * f64::from(intrinsic_h) / f64::from(intrinsic_w);
    Some(Size::new(width, height))
}

/// Stage-space transform of one layer: translate to `position`, then (only when
/// rotated) rotate clockwise by `rotation_deg` about the centre of `size`.
pub fn layer_transform(position: Point, size: Size, rotation_deg: f64) -> Affine {
    let base = Affine::translate(position.to_vec2());
    if rotation_deg == 0.0 {
        return base;
    }
    let center = Vec2::new(size.width / 2.0, size.height / 2.0);
    base * Affine::translate(center) * Affine::rotate(rotation_deg.to_radians()) * Affine::translate(-center)
}

/// The single global horizontal flip: translate by width, negative x scale.
pub fn mirror_transform(stage_width: f64) -> Affine {
    Affine::translate((stage_width, 0.0)) * Affine::scale_non_uniform(-1.0, 1.0)
}

/// Map a point from what the user sees back into model (unmirrored) space.
#[inline]
pub fn unmirror(p: Point, stage_width: f64, mirror: bool) -> Point {
    if mirror { Point::new(stage_width - p.x, p.y) } else { p }
}

/// Destination rectangle that scales `(iw, ih)` to cover `target`, centred.
pub fn cover_rect(iw: u32, ih: u32, target: Size) -> Option<kurbo::Rect> {
    if iw == 0 || ih == 0 {
        return None;
    }
    let (iw, ih) = (f64::from(iw), f64::from(ih));
    let s = (target.width / iw).max(target.height / ih);
    let (w, h) = (iw * s, ih * s);
    let x0 = (target.width - w) / 2.0;
    let y0 = (target.height - h) / 2.0;
    Some(kurbo::Rect::new(x0, y0, x0 + w, y0 + h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp(3.0, 0.3, 2.5), 2.5);
        assert_eq!(clamp(-1.0, 0.3, 2.5), 0.3);
        assert_eq!(clamp(1.2, 0.3, 2.5), 1.2);
    }

    #[test]
    fn map_range_handles_degenerate_input() {
        assert_relative_eq!(map_range(5.0, 0.0, 10.0, 0.0, 1.0), 0.5);
        // in_min == in_max: divides by one
        assert_relative_eq!(map_range(3.0, 2.0, 2.0, 0.0, 10.0), 10.0);
    }

    #[test]
    fn rendered_size_rounds_width_and_keeps_aspect() {
        let s = rendered_size(300.0, 0.333, 200, 400).unwrap();
        assert_relative_eq!(s.width, 100.0);
        assert_relative_eq!(s.height, 200.0);
        assert!(rendered_size(300.0, 1.0, 0, 10).is_none());
    }

    #[test]
    fn rotation_pivots_about_center() {
        let size = Size::new(100.0, 50.0);
        let t = layer_transform(Point::new(10.0, 20.0), size, 90.0);
        // the centre stays put
        let c = t * Point::new(50.0, 25.0);
        assert_relative_eq!(c.x, 60.0, epsilon = 1e-9);
        assert_relative_eq!(c.y, 45.0, epsilon = 1e-9);
        // clockwise: local top-left swings to the top-right of the centre
        let tl = t * Point::new(0.0, 0.0);
        assert_relative_eq!(tl.x, 85.0, epsilon = 1e-9);
        assert_relative_eq!(tl.y, -5.0, epsilon = 1e-9);
    }

    #[test]
    fn unrotated_transform_is_pure_translation() {
        let t = layer_transform(Point::new(30.0, 50.0), Size::new(300.0, 300.0), 0.0);
        assert_eq!(t, Affine::translate((30.0, 50.0)));
    }

    #[test]
    fn mirror_flips_horizontally() {
        let m = mirror_transform(200.0);
        let p = m * Point::new(30.0, 7.0);
        assert_relative_eq!(p.x, 170.0);
        assert_relative_eq!(p.y, 7.0);
        assert_eq!(unmirror(Point::new(170.0, 7.0), 200.0, true), Point::new(30.0, 7.0));
    }

    #[test]
    fn cover_fills_target() {
        let r = cover_rect(100, 50, Size::new(100.0, 100.0)).unwrap();
        assert_relative_eq!(r.height(), 100.0);
        assert_relative_eq!(r.width(), 200.0);
        assert_relative_eq!(r.x0, -50.0);
    }
}
