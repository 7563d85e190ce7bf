//! Teacher-photo placement rules.
//!
//! Photos are placed by a static table, not by stored layouts: the rule
//! for `(format, photo_count)` fixes per-photo size and the horizontal
//! stride between photos, anchored to the bottom-right of the canvas.
//! Combinations outside the table are a logged no-op.

use crate::{
    format::OutputFormat,
    model::{Position, Size},
};

/// Per-photo sizing and stacking for one `(format, count)` combination.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhotoRule {
    pub width: f64,
    pub height: f64,
    /// Horizontal stride between stacked photos, right to left.
    pub x_offset: f64,
}

/// Look up the placement rule; defined only for 1-3 photos on
/// `youtube`/`feed`/`stories`.
pub fn photo_rule(format: OutputFormat, count: usize) -> Option<PhotoRule> {
    let rule = match (format, count) {
        (OutputFormat::Youtube, 1) => PhotoRule { width: 520.0, height: 680.0, x_offset: 0.0 },
        (OutputFormat::Youtube, 2) => PhotoRule { width: 440.0, height: 580.0, x_offset: 400.0 },
        (OutputFormat::Youtube, 3) => PhotoRule { width: 360.0, height: 480.0, x_offset: 330.0 },
        (OutputFormat::Feed, 1) => PhotoRule { width: 420.0, height: 560.0, x_offset: 0.0 },
        (OutputFormat::Feed, 2) => PhotoRule { width: 360.0, height: 480.0, x_offset: 330.0 },
        (OutputFormat::Feed, 3) => PhotoRule { width: 300.0, height: 400.0, x_offset: 270.0 },
        (OutputFormat::Stories, 1) => PhotoRule { width: 480.0, height: 640.0, x_offset: 0.0 },
        (OutputFormat::Stories, 2) => PhotoRule { width: 400.0, height: 540.0, x_offset: 370.0 },
        (OutputFormat::Stories, 3) => PhotoRule { width: 330.0, height: 440.0, x_offset: 300.0 },
        _ => {
            tracing::warn!(%format, count, "no photo placement rule; skipping photos");
            return None;
        }
    };
    Some(rule)
}

/// Bottom-right anchored slots for `count` photos, leftmost first.
///
/// Returns `None` exactly when [`photo_rule`] does.
pub fn photo_slots(format: OutputFormat, count: usize) -> Option<Vec<(Position, Size)>> {
    let rule = photo_rule(format, count)?;
    let spec = format.spec();
    let (w, h) = (f64::from(spec.width), f64::from(spec.height));

    let size = Size {
        width: rule.width,
        height: rule.height,
    };
    let y = h - rule.height;
    let slots = (0..count)
        .rev()
        .map(|i| {
            (
                Position {
                    x: w - rule.width - i as f64 * rule.x_offset,
                    y,
                },
                size,
            )
        })
        .collect();
    Some(slots)
}
