//! Font loading and text layout plumbing.
//!
//! Measuring or rasterizing with a fallback face silently produces wrong
//! geometry, so every face goes through the load gate here before use:
//! bytes are fetched through the [`ByteFetcher`] seam, registered with
//! parley, and kept as [`vello_cpu::peniko::FontData`] so the glyphs drawn
//! come from the same bytes the layout was shaped with.

use std::{
    borrow::Cow,
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::{
    error::{CartazError, CartazResult},
    format::TextAlign,
    model::Rgba8,
    store::ByteFetcher,
};

/// Default budget for loading a single font face.
pub const DEFAULT_FONT_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// A font request: family plus the styling that affects shaping.
#[derive(Clone, Debug, PartialEq)]
pub struct FontSelection {
    pub family: String,
    pub size: f64,
    pub weight: u16,
    pub italic: bool,
}

impl FontSelection {
    pub fn new(family: impl Into<String>, size: f64) -> Self {
        Self {
            family: family.into(),
            size,
            weight: 400,
            italic: false,
        }
    }

    pub fn bold(mut self) -> Self {
        self.weight = 700;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }
}

/// A successfully gated face.
pub struct LoadedFace {
    /// Family name as parley registered it (may differ in case from the
    /// requested name).
    pub family_name: String,
    /// The exact bytes used for shaping, ready for glyph drawing.
    pub font: vello_cpu::peniko::FontData,
}

enum FaceState {
    Loaded(LoadedFace),
    /// Load failed or timed out; measurement proceeds on the fallback
    /// stack and rasterization skips glyphs.
    Degraded,
}

/// Font registry + parley contexts, one instance per worker.
pub struct FontLibrary {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<Rgba8>,
    faces: HashMap<String, FaceState>,
    sources: HashMap<String, String>,
}

impl Default for FontLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl FontLibrary {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            faces: HashMap::new(),
            sources: HashMap::new(),
        }
    }

    /// Register where a family's bytes can be fetched from.
    pub fn add_source(&mut self, family: impl Into<String>, url: impl Into<String>) {
        self.sources.insert(family.into(), url.into());
    }

    /// Register font bytes for a family directly.
    pub fn register_bytes(&mut self, family: &str, bytes: Vec<u8>) -> CartazResult<()> {
        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| CartazError::resource("no font families registered from font bytes"))?;
        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| CartazError::resource("registered font family has no name"))?
            .to_string();

        let font =
            vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), 0);
        self.faces.insert(
            family.to_string(),
            FaceState::Loaded(LoadedFace { family_name, font }),
        );
        Ok(())
    }

    /// Gate: guarantee a family is loaded before measuring or drawing.
    ///
    /// Returns `true` when the face is available. A family without a
    /// registered source, a fetch failure, or an expired deadline all
    /// degrade the face (logged once); later calls return `false` cheaply.
    pub fn ensure_face(
        &mut self,
        family: &str,
        fetcher: &dyn ByteFetcher,
        deadline: Option<Instant>,
    ) -> bool {
        match self.faces.get(family) {
            Some(FaceState::Loaded(_)) => return true,
            Some(FaceState::Degraded) => return false,
            None => {}
        }

        let Some(url) = self.sources.get(family).cloned() else {
            tracing::warn!(family, "no font source registered; falling back");
            self.faces.insert(family.to_string(), FaceState::Degraded);
            return false;
        };

        let budget = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    tracing::warn!(family, "font load deadline expired; falling back");
                    self.faces.insert(family.to_string(), FaceState::Degraded);
                    return false;
                }
                deadline - now
            }
            None => DEFAULT_FONT_LOAD_TIMEOUT,
        };

        match fetcher.fetch(&url, budget) {
            Ok(bytes) => match self.register_bytes(family, bytes) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(family, %err, "font bytes rejected; falling back");
                    self.faces.insert(family.to_string(), FaceState::Degraded);
                    false
                }
            },
            Err(err) => {
                tracing::warn!(family, url, %err, "font fetch failed; falling back");
                self.faces.insert(family.to_string(), FaceState::Degraded);
                false
            }
        }
    }

    pub fn is_loaded(&self, family: &str) -> bool {
        matches!(self.faces.get(family), Some(FaceState::Loaded(_)))
    }

    pub fn face(&self, family: &str) -> Option<&LoadedFace> {
        match self.faces.get(family) {
            Some(FaceState::Loaded(face)) => Some(face),
            _ => None,
        }
    }

    /// Drop all gated faces and sources (cache-invalidation hook for tests).
    pub fn clear(&mut self) {
        self.faces.clear();
        self.sources.clear();
    }

    /// Shape and lay out a single line of text.
    ///
    /// `container_width` enables alignment within a box; `None` lays the
    /// line out at its natural advance width.
    pub fn layout_line(
        &mut self,
        text: &str,
        sel: &FontSelection,
        brush: Rgba8,
        container_width: Option<f32>,
        align: TextAlign,
    ) -> CartazResult<parley::Layout<Rgba8>> {
        if !sel.size.is_finite() || sel.size <= 0.0 {
            return Err(CartazError::validation("font size must be finite and > 0"));
        }

        let family_name = match self.faces.get(&sel.family) {
            Some(FaceState::Loaded(face)) => face.family_name.clone(),
            _ => sel.family.clone(),
        };

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(sel.size as f32));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::new(f32::from(sel.weight)),
        ));
        if sel.italic {
            builder.push_default(parley::style::StyleProperty::FontStyle(
                parley::style::FontStyle::Italic,
            ));
        }
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<Rgba8> = builder.build(text);
        layout.break_all_lines(container_width);
        let alignment = match align {
            TextAlign::Left => parley::Alignment::Start,
            TextAlign::Center => parley::Alignment::Center,
        };
        layout.align(container_width, alignment, parley::AlignmentOptions::default());
        Ok(layout)
    }
}
