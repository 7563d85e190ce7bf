//! Position validation and auto-correction against format canvases.
//!
//! Out-of-bounds placement is never an error: the validator reports the
//! violation and the corrector clamps the element back inside the canvas,
//! honoring the format's margin policy. Correction is idempotent on
//! already-valid input.

use kurbo::Rect;

use crate::{
    format::{OutputFormat, ValidationMode},
    model::Position,
};

/// Element bounds in format-native pixels (position + effective size).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

/// A single boundary violation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Violation {
    /// `x < 0`.
    Left,
    /// `y < 0`.
    Top,
    /// Right edge overflows `canvas_width - margin` by this many pixels.
    Right(f64),
    /// Bottom edge overflows `canvas_height - margin` by this many pixels.
    Bottom(f64),
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::Left => write!(f, "left edge before x=0"),
            Violation::Top => write!(f, "top edge before y=0"),
            Violation::Right(px) => write!(f, "right edge overflows by {px:.2}px"),
            Violation::Bottom(px) => write!(f, "bottom edge overflows by {px:.2}px"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PositionReport {
    pub is_valid: bool,
    pub violations: Vec<Violation>,
}

/// Check an element against a format's canvas and margin policy.
pub fn validate_position(bounds: &Bounds, format: OutputFormat) -> PositionReport {
    let spec = format.spec();
    let (w, h) = (f64::from(spec.width), f64::from(spec.height));
    let mut violations = Vec::new();

    match spec.validation {
        ValidationMode::Standard => {
            let margin = spec.margin();
            if bounds.x < 0.0 {
                violations.push(Violation::Left);
            }
            if bounds.y < 0.0 {
                violations.push(Violation::Top);
            }
            let right_limit = w - margin;
            if bounds.x + bounds.width > right_limit {
                violations.push(Violation::Right(bounds.x + bounds.width - right_limit));
            }
            let bottom_limit = h - margin;
            if bounds.y + bounds.height > bottom_limit {
                violations.push(Violation::Bottom(bounds.y + bounds.height - bottom_limit));
            }
        }
        ValidationMode::Minimal => {
            // Only clearly-broken placement counts: negative positions or
            // positions entirely past the canvas edge.
            if bounds.x < 0.0 {
                violations.push(Violation::Left);
            }
            if bounds.y < 0.0 {
                violations.push(Violation::Top);
            }
            if bounds.x >= w {
                violations.push(Violation::Right(bounds.x - w));
            }
            if bounds.y >= h {
                violations.push(Violation::Bottom(bounds.y - h));
            }
        }
    }

    PositionReport {
        is_valid: violations.is_empty(),
        violations,
    }
}

/// Clamp an element's position so it lies inside the canvas.
///
/// `margin` overrides the format's area-driven margin when given. Valid
/// input comes back unchanged.
pub fn constrain_to_canvas(
    bounds: &Bounds,
    format: OutputFormat,
    margin: Option<f64>,
) -> Position {
    let spec = format.spec();
    let (w, h) = (f64::from(spec.width), f64::from(spec.height));

    let corrected = match spec.validation {
        ValidationMode::Standard => {
            let margin = margin.unwrap_or_else(|| spec.margin());
            Position {
                x: bounds.x.min(w - margin - bounds.width).max(0.0),
                y: bounds.y.min(h - margin - bounds.height).max(0.0),
            }
        }
        ValidationMode::Minimal => {
            let mut x = bounds.x;
            let mut y = bounds.y;
            if x < 0.0 {
                x = 0.0;
            } else if x >= w {
                x = (w - bounds.width).max(0.0);
            }
            if y < 0.0 {
                y = 0.0;
            } else if y >= h {
                y = (h - bounds.height).max(0.0);
            }
            Position { x, y }
        }
    };

    if corrected.x != bounds.x || corrected.y != bounds.y {
        tracing::debug!(
            format = %format,
            from_x = bounds.x,
            from_y = bounds.y,
            to_x = corrected.x,
            to_y = corrected.y,
            "position corrected"
        );
    }
    corrected
}
