// Data model: what an overlay is (Product) and where it sits (Layer).
// Layers are plain values; the store swaps whole values instead of mutating.

use std::fmt::{self, Display};

use kurbo::Point;

use crate::geometry::clamp;

/// Valid interactive ranges. Anything stored is clamped into these first.
pub const SCALE_RANGE: (f64, f64) = (0.3, 2.5);
pub const OPACITY_RANGE: (f64, f64) = (0.2, 1.0);
pub const ROTATION_RANGE: (f64, f64) = (-45.0, 45.0);

/// Garment category. The known kinds get their own variant; anything else is
/// kept verbatim so deep links with free-form `type` values survive.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Category {
    #[default]
    Top,
    Bottom,
    Dress,
    Outer,
    Other(String),
}

impl Category {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "" | "top" => Category::Top,
            "bottom" => Category::Bottom,
            "dress" => Category::Dress,
            "outer" => Category::Outer,
            _ => Category::Other(raw.to_string()),
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Top => f.write_str("top"),
            Category::Bottom => f.write_str("bottom"),
            Category::Dress => f.write_str("dress"),
            Category::Outer => f.write_str("outer"),
            Category::Other(s) => f.write_str(s),
        }
    }
}

/// Identity of an overlay source. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: String,
    pub brand: String,
    pub name: String,
    pub category: Category,
    /// Resolved, fetchable URI (already normalised).
    pub image_source: String,
}

/// Stable handle of a placed layer. Never reused within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

impl Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

/// One placed instance of a product on the stage.
///
/// `position` is stage-local, top-left origin, and never has the mirror
/// flag baked in.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub product: Product,
    pub position: Point,
    pub scale: f64,
    pub opacity: f64,
    /// Degrees, clockwise positive, about the rendered box centre.
    pub rotation: f64,
    pub z_order: i32,
}

impl Layer {
    /// Copy of `self` with `patch` applied and every ranged field clamped.
    pub fn patched(&self, patch: &LayerPatch) -> Self {
        let mut next = self.clone();
        if let Some(p) = patch.position.filter(|p| p.x.is_finite() && p.y.is_finite()) {
            next.position = p;
        }
        if let Some(s) = patch.scale.filter(|v| v.is_finite()) {
            next.scale = clamp(s, SCALE_RANGE.0, SCALE_RANGE.1);
        }
        if let Some(o) = patch.opacity.filter(|v| v.is_finite()) {
            next.opacity = clamp(o, OPACITY_RANGE.0, OPACITY_RANGE.1);
        }
        if let Some(r) = patch.rotation.filter(|v| v.is_finite()) {
            next.rotation = clamp(r, ROTATION_RANGE.0, ROTATION_RANGE.1);
        }
        if let Some(z) = patch.z_order {
            next.z_order = z;
        }
        next
    }
}

/// Partial update. `None` leaves the field alone; non-finite numbers too.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LayerPatch {
    pub position: Option<Point>,
    pub scale: Option<f64>,
    pub opacity: Option<f64>,
    pub rotation: Option<f64>,
    pub z_order: Option<i32>,
}

impl LayerPatch {
    pub fn position(p: Point) -> Self {
        Self { position: Some(p), ..Self::default() }
    }

    pub fn scale(v: f64) -> Self {
        Self { scale: Some(v), ..Self::default() }
    }

    pub fn opacity(v: f64) -> Self {
        Self { opacity: Some(v), ..Self::default() }
    }

    pub fn rotation(v: f64) -> Self {
        Self { rotation: Some(v), ..Self::default() }
    }
}
