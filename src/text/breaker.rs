//! Width-constrained line breaking over measured text.

use crate::{
    error::CartazResult,
    fonts::FontSelection,
    model::Field,
    text::metrics::{TextMeasurer, TextMetrics},
};

/// Fixed line-height multiplier applied to the font size.
pub const LINE_HEIGHT_FACTOR: f64 = 1.2;

/// Result of a breaking pass.
#[derive(Clone, Debug, PartialEq)]
pub struct TextLayoutResult {
    pub lines: Vec<String>,
    pub needs_line_break: bool,
    /// `line_count × font_size × 1.2`.
    pub total_height: f64,
    /// Widest measured line.
    pub max_line_width: f64,
}

impl TextLayoutResult {
    fn single(line: String, width: f64, font_size: f64) -> Self {
        Self {
            lines: vec![line],
            needs_line_break: false,
            total_height: font_size * LINE_HEIGHT_FACTOR,
            max_line_width: width,
        }
    }
}

/// Per-field breaking policy layered over the raw algorithm.
///
/// Date and time have fixed, predictable widths and never break; a single
/// teacher name stays on one line; free text always attempts breaking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BreakPolicy {
    Never,
    Always,
}

impl BreakPolicy {
    pub fn for_field(field: Field, multiple_teachers: bool) -> Self {
        match field {
            Field::Date | Field::Time => BreakPolicy::Never,
            Field::TeacherName => {
                if multiple_teachers {
                    BreakPolicy::Always
                } else {
                    BreakPolicy::Never
                }
            }
            _ => BreakPolicy::Always,
        }
    }
}

/// Break `text` so every line's measured width stays within `max_width`.
///
/// Word boundaries first; a single word wider than `max_width` falls back
/// to character packing for that word only. Text is never truncated, so a
/// one-character line may still individually exceed `max_width`.
pub fn break_to_fit(
    metrics: &mut TextMetrics,
    measurer: &mut dyn TextMeasurer,
    text: &str,
    max_width: f64,
    sel: &FontSelection,
) -> CartazResult<TextLayoutResult> {
    if text.is_empty() {
        return Ok(TextLayoutResult::single(String::new(), 0.0, sel.size));
    }

    let full_width = metrics.measure_width(measurer, text, sel)?;
    if full_width <= max_width {
        return Ok(TextLayoutResult::single(text.to_string(), full_width, sel.size));
    }

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let word_width = metrics.measure_width(measurer, word, sel)?;
        if word_width > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            pack_chars(metrics, measurer, word, max_width, sel, &mut lines, &mut current)?;
            continue;
        }

        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if metrics.measure_width(measurer, &candidate, sel)? <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    let mut max_line_width: f64 = 0.0;
    for line in &lines {
        max_line_width = max_line_width.max(metrics.measure_width(measurer, line, sel)?);
    }

    Ok(TextLayoutResult {
        needs_line_break: lines.len() > 1,
        total_height: lines.len() as f64 * sel.size * LINE_HEIGHT_FACTOR,
        max_line_width,
        lines,
    })
}

/// Character fallback for a single over-wide word.
fn pack_chars(
    metrics: &mut TextMetrics,
    measurer: &mut dyn TextMeasurer,
    word: &str,
    max_width: f64,
    sel: &FontSelection,
    lines: &mut Vec<String>,
    current: &mut String,
) -> CartazResult<()> {
    for ch in word.chars() {
        let mut candidate = current.clone();
        candidate.push(ch);
        if current.is_empty()
            || metrics.measure_width(measurer, &candidate, sel)? <= max_width
        {
            *current = candidate;
        } else {
            lines.push(std::mem::take(current));
            current.push(ch);
        }
    }
    Ok(())
}

/// Apply a field policy: `Never` returns the text as one unbroken line.
pub fn break_field(
    metrics: &mut TextMetrics,
    measurer: &mut dyn TextMeasurer,
    text: &str,
    max_width: f64,
    sel: &FontSelection,
    policy: BreakPolicy,
) -> CartazResult<TextLayoutResult> {
    match policy {
        BreakPolicy::Never => {
            let width = if text.is_empty() {
                0.0
            } else {
                metrics.measure_width(measurer, text, sel)?
            };
            Ok(TextLayoutResult::single(text.to_string(), width, sel.size))
        }
        BreakPolicy::Always => break_to_fit(metrics, measurer, text, max_width, sel),
    }
}
