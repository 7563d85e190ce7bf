//! Headless template renderer: one layout + live event data -> bitmap.
//!
//! The render path mirrors the editor exactly: background first, then the
//! lesson-theme box, then every other element with its vertical position
//! adjusted by the theme box's final height. A per-element failure logs
//! and skips; only missing required event data fails the whole render.

use base64::{Engine as _, engine::general_purpose};

use crate::{
    error::{CartazError, CartazResult},
    factory::{self, ElementFactory, resolve_style},
    fonts::FontLibrary,
    format::OutputFormat,
    model::{EventData, Field, Layout, Rgba8},
    photos,
    scene::{
        Background, DecodedImage, Scene, SceneMode,
        raster::{self, Frame},
    },
    store::ByteFetcher,
    text::metrics::{TextMeasurer, TextMetrics},
};

/// Overall budget for preloading every font a layout references.
pub const FONT_PRELOAD_BUDGET: std::time::Duration = std::time::Duration::from_secs(3);

const BACKGROUND_FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Fallback canvas color when the background image fails to decode.
const BACKGROUND_FALLBACK: Rgba8 = Rgba8::opaque(0x0d, 0x13, 0x4c);

/// One render job.
pub struct RenderRequest<'a> {
    pub template_id: &'a str,
    pub background_url: &'a str,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// Stored layout; `None` falls back to the hard-coded default.
    pub layout: Option<Layout>,
}

impl<'a> RenderRequest<'a> {
    /// A request at the format's native dimensions.
    pub fn for_format(
        template_id: &'a str,
        background_url: &'a str,
        format: OutputFormat,
        layout: Option<Layout>,
    ) -> Self {
        let spec = format.spec();
        Self {
            template_id,
            background_url,
            format,
            width: spec.width,
            height: spec.height,
            layout,
        }
    }
}

/// A finished bitmap ready for external packaging.
#[derive(Debug)]
pub struct RenderedAsset {
    pub format: OutputFormat,
    pub display_name: &'static str,
    pub width: u32,
    pub height: u32,
    pub png_bytes: Vec<u8>,
    pub background_url: String,
}

impl RenderedAsset {
    pub fn data_url(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&self.png_bytes)
        )
    }
}

/// Vertical adjustments produced by the theme box, consulted when placing
/// every subsequent element.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LayoutAdjustments {
    /// Top edge of the theme box in native pixels.
    theme_top: f64,
    /// Height gained over the format's fixed box height by wrapping.
    extra_height: f64,
}

impl LayoutAdjustments {
    pub fn from_theme(theme_top: f64, fixed_height: f64, final_height: f64) -> Self {
        Self {
            theme_top,
            extra_height: (final_height - fixed_height).max(0.0),
        }
    }

    /// Offset for an element whose top edge sits below the theme box.
    pub fn offset_for(&self, y: f64) -> f64 {
        if self.extra_height > 0.0 && y > self.theme_top {
            self.extra_height
        } else {
            0.0
        }
    }

    pub fn extra_height(&self) -> f64 {
        self.extra_height
    }
}

/// Per-worker render state: owns the font stack and measurement cache.
pub struct Renderer {
    fonts: FontLibrary,
    metrics: TextMetrics,
    alt_measurer: Option<Box<dyn TextMeasurer + Send>>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            fonts: FontLibrary::new(),
            metrics: TextMetrics::new(),
            alt_measurer: None,
        }
    }

    /// Route width measurement through an injected measurer instead of
    /// the font stack.
    pub fn with_measurer(mut self, measurer: Box<dyn TextMeasurer + Send>) -> Self {
        self.alt_measurer = Some(measurer);
        self
    }

    pub fn fonts_mut(&mut self) -> &mut FontLibrary {
        &mut self.fonts
    }

    /// Render one format. Fails fast on invalid event data; everything
    /// else degrades per element.
    pub fn render(
        &mut self,
        fetcher: &dyn ByteFetcher,
        request: &RenderRequest<'_>,
        event: &EventData,
    ) -> CartazResult<RenderedAsset> {
        event.validate()?;

        let format = request.format;
        let layout = request
            .layout
            .clone()
            .unwrap_or_else(|| factory::default_layout(request.template_id, format));
        let elements = layout.deduped_elements();

        self.preload_fonts(fetcher, format, &layout, event);

        let mut scene = Scene::new(SceneMode::Headless, request.width, request.height);
        self.load_background(fetcher, &mut scene, request.background_url);

        // The theme box settles first; its final height shifts everything
        // placed below it.
        let mut adjustments = LayoutAdjustments::default();
        if let Some(theme) = elements.iter().find(|el| el.field == Field::ClassTheme) {
            let spec = format.spec();
            match self
                .factory(fetcher, format)
                .create_node(&mut scene, theme, event, 0.0)
            {
                Ok(Some(created)) => {
                    adjustments = LayoutAdjustments::from_theme(
                        theme.position.y,
                        spec.box_height,
                        created.size.height,
                    );
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(%format, id = %theme.id, %err, "theme element failed; skipped");
                }
            }
        }

        for el in &elements {
            if el.field == Field::ClassTheme {
                continue;
            }
            if el.field == Field::TeacherImages {
                // Photos come from the rule table, below.
                continue;
            }
            let y_offset = adjustments.offset_for(el.position.y);
            if let Err(err) = self
                .factory(fetcher, format)
                .create_node(&mut scene, el, event, y_offset)
            {
                tracing::error!(%format, id = %el.id, %err, "element failed; skipped");
            }
        }

        self.place_photos(fetcher, &mut scene, format, event);

        let frame = raster::rasterize(&scene, &mut self.fonts)?;
        let png_bytes = encode_png(&frame)?;
        Ok(RenderedAsset {
            format,
            display_name: format.spec().display_name,
            width: frame.width,
            height: frame.height,
            png_bytes,
            background_url: request.background_url.to_string(),
        })
    }

    fn factory<'b>(
        &'b mut self,
        fetcher: &'b dyn ByteFetcher,
        format: OutputFormat,
    ) -> ElementFactory<'b> {
        let factory =
            ElementFactory::new(format, 1.0, &mut self.fonts, &mut self.metrics, fetcher);
        match self.alt_measurer.as_deref_mut() {
            Some(m) => factory.with_measurer(m),
            None => factory,
        }
    }

    /// Preload every referenced face, deduplicated, under one shared
    /// deadline. Timeouts degrade to fallback shaping rather than hang.
    fn preload_fonts(
        &mut self,
        fetcher: &dyn ByteFetcher,
        format: OutputFormat,
        layout: &Layout,
        event: &EventData,
    ) {
        let deadline = std::time::Instant::now() + FONT_PRELOAD_BUDGET;
        let mut seen = std::collections::HashSet::new();
        for el in &layout.elements {
            let style = resolve_style(format, el.field, &el.style, event);
            if seen.insert((
                style.font.family.clone(),
                style.font.size.to_bits(),
                style.font.weight,
            )) && !self.fonts.ensure_face(&style.font.family, fetcher, Some(deadline))
            {
                tracing::warn!(
                    family = %style.font.family,
                    "font preload failed; shaping will fall back"
                );
            }
        }
    }

    fn load_background(
        &mut self,
        fetcher: &dyn ByteFetcher,
        scene: &mut Scene,
        url: &str,
    ) {
        let background = fetcher
            .fetch(url, BACKGROUND_FETCH_TIMEOUT)
            .and_then(|bytes| DecodedImage::decode(&bytes));
        match background {
            Ok(image) => scene.set_background(Background::Image(image)),
            Err(err) => {
                tracing::warn!(url, %err, "background load failed; using fallback color");
                scene.set_background(Background::Color(BACKGROUND_FALLBACK));
            }
        }
    }

    fn place_photos(
        &mut self,
        fetcher: &dyn ByteFetcher,
        scene: &mut Scene,
        format: OutputFormat,
        event: &EventData,
    ) {
        let count = event.teacher_images.len();
        let Some(slots) = photos::photo_slots(format, count) else {
            return;
        };
        let urls = event.teacher_images.clone();
        for (url, (position, size)) in urls.iter().zip(slots) {
            if let Err(err) = self.factory(fetcher, format).create_image_node(
                scene,
                Field::TeacherImages,
                url,
                position,
                size,
                true,
            ) {
                tracing::error!(url, %err, "photo placement failed; skipped");
            }
        }
    }
}

fn encode_png(frame: &Frame) -> CartazResult<Vec<u8>> {
    let mut data = frame.data.clone();
    if frame.premultiplied {
        unpremultiply_rgba8_in_place(&mut data);
    }
    let mut out = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut out);
    image::ImageEncoder::write_image(
        encoder,
        &data,
        frame.width,
        frame.height,
        image::ExtendedColorType::Rgba8,
    )
    .map_err(|e| CartazError::render(format!("png encode: {e}")))?;
    Ok(out)
}

fn unpremultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 || a == 255 {
            continue;
        }
        px[0] = ((px[0] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[1] = ((px[1] as u16 * 255 + a / 2) / a).min(255) as u8;
        px[2] = ((px[2] as u16 * 255 + a / 2) / a).min(255) as u8;
    }
}
