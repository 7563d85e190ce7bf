//! Text width measurement with a bounded cache.
//!
//! Raw glyph advances systematically under-report the painted width across
//! fonts, so measured widths carry a safety multiplier: 1.1 baseline, 1.15
//! when the text contains digits, 1.2 when it contains accented Latin.

use std::collections::{HashMap, VecDeque};

use crate::{
    error::CartazResult,
    fonts::{FontLibrary, FontSelection},
    format::TextAlign,
    model::Rgba8,
};

/// Raw (unmultiplied) width measurement seam.
///
/// The production implementation shapes with parley; tests inject a
/// deterministic fixed-advance implementation so breaking behavior can be
/// asserted without real font files.
pub trait TextMeasurer {
    fn measure_raw(&mut self, text: &str, sel: &FontSelection) -> CartazResult<f64>;
}

impl TextMeasurer for FontLibrary {
    fn measure_raw(&mut self, text: &str, sel: &FontSelection) -> CartazResult<f64> {
        if !self.is_loaded(&sel.family) {
            // Fallback-face measurement produces wrong widths; this is a
            // defect signal, not routine degradation.
            tracing::warn!(family = %sel.family, "measuring with unloaded font face");
        }
        let layout = self.layout_line(text, sel, Rgba8::WHITE, None, TextAlign::Left)?;
        Ok(f64::from(layout.width()))
    }
}

/// Deterministic measurer: every char advances `advance_em × font_size`.
pub struct FixedAdvanceMeasurer {
    pub advance_em: f64,
}

impl Default for FixedAdvanceMeasurer {
    fn default() -> Self {
        Self { advance_em: 0.6 }
    }
}

impl TextMeasurer for FixedAdvanceMeasurer {
    fn measure_raw(&mut self, text: &str, sel: &FontSelection) -> CartazResult<f64> {
        Ok(text.chars().count() as f64 * self.advance_em * sel.size)
    }
}

const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Measured-width cache plus the safety-multiplier policy.
pub struct TextMetrics {
    cache: HashMap<u64, f64>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TextMetrics {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Measure the painted width of `text`, multiplier applied, cached.
    ///
    /// Call sites must have gated the face already
    /// ([`FontLibrary::ensure_face`]); this is the synchronous variant the
    /// render path uses after its preload pass.
    pub fn measure_width(
        &mut self,
        measurer: &mut dyn TextMeasurer,
        text: &str,
        sel: &FontSelection,
    ) -> CartazResult<f64> {
        let key = cache_key(text, sel);
        if let Some(width) = self.cache.get(&key) {
            return Ok(*width);
        }

        let raw = measurer.measure_raw(text, sel)?;
        let width = raw * safety_multiplier(text);
        self.insert(key, width);
        Ok(width)
    }

    fn insert(&mut self, key: u64, width: f64) {
        if self.cache.insert(key, width).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.cache.remove(&old);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.order.clear();
    }
}

fn cache_key(text: &str, sel: &FontSelection) -> u64 {
    let mut buf = Vec::with_capacity(text.len() + sel.family.len() + 16);
    buf.extend_from_slice(text.as_bytes());
    buf.push(0);
    buf.extend_from_slice(sel.family.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&sel.size.to_bits().to_le_bytes());
    buf.extend_from_slice(&sel.weight.to_le_bytes());
    buf.push(u8::from(sel.italic));
    xxhash_rust::xxh3::xxh3_64(&buf)
}

/// Compensation for systematic under-measurement of glyph advances.
pub fn safety_multiplier(text: &str) -> f64 {
    if text.chars().any(is_accented_latin) {
        1.2
    } else if text.chars().any(|c| c.is_ascii_digit()) {
        1.15
    } else {
        1.1
    }
}

fn is_accented_latin(c: char) -> bool {
    ('\u{c0}'..='\u{17f}').contains(&c) && c != '\u{d7}' && c != '\u{f7}'
}
