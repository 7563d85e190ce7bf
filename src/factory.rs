//! Element factory: descriptors + live event data -> scene nodes.
//!
//! All geometry math happens in unscaled format-native pixels; the editor
//! preview scale is applied once, when the node is inserted into the
//! scene. One element per field: creating a field that already exists
//! replaces the previous node.

use crate::{
    error::CartazResult,
    fonts::{FontLibrary, FontSelection},
    format::{FormatSpec, OutputFormat},
    model::{
        ElementDescriptor, ElementKind, ElementStyle, EventData, Field, Layout, Position, Rgba8,
        Size,
    },
    scene::{DecodedImage, NodeContent, NodeId, NodeMeta, Scene},
    store::ByteFetcher,
    text::{
        breaker::{self, BreakPolicy, TextLayoutResult},
        metrics::{TextMeasurer, TextMetrics},
    },
};

/// Fallback family when neither the descriptor nor the table names one.
pub const DEFAULT_FONT_FAMILY: &str = "Montserrat";

/// Marker color for images that failed to load.
const PLACEHOLDER_COLOR: Rgba8 = Rgba8 {
    r: 0xe0,
    g: 0x3a,
    b: 0x3a,
    a: 0x80,
};

const IMAGE_FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Style table default for a `(format, field)` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedStyle {
    pub font: FontSelection,
    pub color: Rgba8,
}

/// Per-format, per-field default font size.
fn default_font_size(format: OutputFormat, field: Field) -> f64 {
    use Field::*;
    use OutputFormat::*;
    match (format, field) {
        (Youtube, Title) => 64.0,
        (Youtube, ClassTheme) => 36.0,
        (Youtube, TeacherName) => 32.0,
        (Youtube, Date | Time | Location) => 28.0,
        (Youtube, Caption) => 24.0,
        (Youtube, TeacherImages) => 0.0,

        (Feed | Stories, Title) => 48.0,
        (Feed | Stories, ClassTheme) => 32.0,
        (Feed | Stories, TeacherName) => 28.0,
        (Feed | Stories, Date | Time | Location) => 24.0,
        (Feed | Stories, Caption) => 20.0,
        (Feed | Stories, TeacherImages) => 0.0,

        (BannerGco, Title) => 16.0,
        (BannerGco, ClassTheme) => 12.0,
        (BannerGco, TeacherName | Date | Time | Location) => 10.0,
        (BannerGco, Caption) => 9.0,
        (BannerGco, TeacherImages) => 0.0,

        (LedStudio, Title) => 40.0,
        (LedStudio, ClassTheme) => 24.0,
        (LedStudio, TeacherName) => 22.0,
        (LedStudio, Date | Time | Location) => 20.0,
        (LedStudio, Caption) => 16.0,
        (LedStudio, TeacherImages) => 0.0,

        (Lp, Title) => 36.0,
        (Lp, ClassTheme) => 28.0,
        (Lp, TeacherName) => 24.0,
        (Lp, Date | Time | Location) => 20.0,
        (Lp, Caption) => 18.0,
        (Lp, TeacherImages) => 0.0,
    }
}

/// Resolve the effective style: descriptor overrides over the table.
///
/// Title-like fields default bold; captions italic. Style is resolved
/// once, at element creation.
pub fn resolve_style(
    format: OutputFormat,
    field: Field,
    style: &ElementStyle,
    event: &EventData,
) -> ResolvedStyle {
    let size = style
        .font_size
        .unwrap_or_else(|| default_font_size(format, field));
    let family = style
        .font_family
        .clone()
        .unwrap_or_else(|| DEFAULT_FONT_FAMILY.to_string());
    let weight = style.font_weight.unwrap_or(match field {
        Field::Title | Field::ClassTheme => 700,
        _ => 400,
    });
    let mut font = FontSelection::new(family, size);
    font.weight = weight;
    if field == Field::Caption {
        font = font.italic();
    }

    let color = match field {
        Field::ClassTheme => event.theme_font_color(),
        _ => style
            .color
            .as_deref()
            .and_then(|hex| Rgba8::from_hex(hex).ok())
            .unwrap_or_else(|| event.text_color()),
    };

    ResolvedStyle { font, color }
}

/// Outcome of creating one element.
#[derive(Clone, Copy, Debug)]
pub struct CreatedElement {
    pub id: NodeId,
    /// Final size in unscaled format-native pixels.
    pub size: Size,
    /// Whether the text wrapped past one line (theme boxes grow).
    pub wrapped: bool,
}

/// Builds scene nodes from descriptors for one format at one scale.
pub struct ElementFactory<'a> {
    format: OutputFormat,
    scale: f64,
    fonts: &'a mut FontLibrary,
    metrics: &'a mut TextMetrics,
    alt_measurer: Option<&'a mut dyn TextMeasurer>,
    fetcher: &'a dyn ByteFetcher,
}

impl<'a> ElementFactory<'a> {
    pub fn new(
        format: OutputFormat,
        scale: f64,
        fonts: &'a mut FontLibrary,
        metrics: &'a mut TextMetrics,
        fetcher: &'a dyn ByteFetcher,
    ) -> Self {
        Self {
            format,
            scale,
            fonts,
            metrics,
            alt_measurer: None,
            fetcher,
        }
    }

    /// Route width measurement away from the font stack (deterministic
    /// measurement without real font files).
    pub fn with_measurer(mut self, measurer: &'a mut dyn TextMeasurer) -> Self {
        self.alt_measurer = Some(measurer);
        self
    }

    fn spec(&self) -> &'static FormatSpec {
        self.format.spec()
    }

    fn break_text(
        &mut self,
        text: &str,
        max_width: f64,
        sel: &FontSelection,
        policy: BreakPolicy,
    ) -> CartazResult<TextLayoutResult> {
        let measurer: &mut dyn TextMeasurer = match self.alt_measurer.as_deref_mut() {
            Some(m) => m,
            None => &mut *self.fonts,
        };
        breaker::break_field(self.metrics, measurer, text, max_width, sel, policy)
    }

    /// Create (or replace) the node for a descriptor.
    ///
    /// Returns `None` when the element has nothing to show: empty optional
    /// text, or a teacher-photo descriptor (photos are placed by rule, not
    /// by layout).
    pub fn create_node(
        &mut self,
        scene: &mut Scene,
        descriptor: &ElementDescriptor,
        event: &EventData,
        y_offset: f64,
    ) -> CartazResult<Option<CreatedElement>> {
        if descriptor.field == Field::TeacherImages {
            tracing::debug!(id = %descriptor.id, "photo descriptor ignored by factory");
            return Ok(None);
        }

        if let Some(existing) = scene.node_for_field(descriptor.field) {
            scene.remove_node(existing);
        }

        let position = Position {
            x: descriptor.position.x,
            y: descriptor.position.y + y_offset,
        };

        match descriptor.kind {
            ElementKind::Text => self.create_text(scene, descriptor, event, position),
            ElementKind::TextBox => self.create_text_box(scene, descriptor, event, position),
            ElementKind::Image => {
                // Non-photo image descriptors have no data source in the
                // event payload; show the placeholder so the editor keeps
                // a draggable stand-in.
                let id = self.insert(
                    scene,
                    NodeContent::Placeholder {
                        color: PLACEHOLDER_COLOR,
                    },
                    position,
                    descriptor.size,
                    NodeMeta {
                        field: descriptor.field,
                        kind: ElementKind::Image,
                        original_size: Some(descriptor.size),
                        is_photo: false,
                    },
                );
                Ok(Some(CreatedElement {
                    id,
                    size: descriptor.size,
                    wrapped: false,
                }))
            }
        }
    }

    fn create_text(
        &mut self,
        scene: &mut Scene,
        descriptor: &ElementDescriptor,
        event: &EventData,
        position: Position,
    ) -> CartazResult<Option<CreatedElement>> {
        let Some(text) = event.text_for(descriptor.field) else {
            tracing::debug!(field = %descriptor.field, "no event text; element skipped");
            return Ok(None);
        };

        let style = resolve_style(self.format, descriptor.field, &descriptor.style, event);
        let policy = BreakPolicy::for_field(descriptor.field, event.multiple_teachers());
        let max_width = if descriptor.size.width > 0.0 {
            descriptor.size.width
        } else {
            f64::from(self.spec().width) - position.x
        };
        let broken = self.break_text(&text, max_width, &style.font, policy)?;

        let size = Size {
            width: broken.max_line_width.max(descriptor.size.width),
            height: broken.total_height,
        };
        let wrapped = broken.needs_line_break;
        let id = self.insert(
            scene,
            NodeContent::Text {
                lines: broken.lines,
                font: self.scaled_font(&style.font),
                color: style.color,
            },
            position,
            size,
            NodeMeta {
                field: descriptor.field,
                kind: ElementKind::Text,
                original_size: None,
                is_photo: false,
            },
        );
        Ok(Some(CreatedElement { id, size, wrapped }))
    }

    /// Lesson-theme box: measured text plus padding over an optional fill.
    ///
    /// Unwrapped text keeps the format's fixed box height; wrapped text
    /// grows the box to `total_height + 2 x pad_y`.
    fn create_text_box(
        &mut self,
        scene: &mut Scene,
        descriptor: &ElementDescriptor,
        event: &EventData,
        position: Position,
    ) -> CartazResult<Option<CreatedElement>> {
        let Some(text) = event.text_for(descriptor.field) else {
            tracing::debug!(field = %descriptor.field, "no event text; box skipped");
            return Ok(None);
        };

        let spec = self.spec();
        let style = resolve_style(self.format, descriptor.field, &descriptor.style, event);
        let broken = self.break_text(
            &text,
            spec.theme_max_width,
            &style.font,
            BreakPolicy::Always,
        )?;

        let width = (broken.max_line_width + 2.0 * spec.box_pad_x)
            .min(spec.theme_max_width + 2.0 * spec.box_pad_x);
        let height = if broken.needs_line_break {
            broken.total_height + 2.0 * spec.box_pad_y
        } else {
            spec.box_height
        };
        let size = Size { width, height };
        let wrapped = broken.needs_line_break;

        let id = self.insert(
            scene,
            NodeContent::TextBox {
                lines: broken.lines,
                font: self.scaled_font(&style.font),
                font_color: style.color,
                box_fill: event.theme_box_fill(),
                align: spec.text_align,
                pad_x: spec.box_pad_x * self.scale,
                pad_y: spec.box_pad_y * self.scale,
                corner_radius: spec.box_pad_y.min(8.0) * self.scale,
            },
            position,
            size,
            NodeMeta {
                field: descriptor.field,
                kind: ElementKind::TextBox,
                original_size: None,
                is_photo: false,
            },
        );
        Ok(Some(CreatedElement { id, size, wrapped }))
    }

    /// Fetch, decode and place one image, aspect-fit into the requested
    /// size. Decode failure degrades to a visible placeholder.
    pub fn create_image_node(
        &mut self,
        scene: &mut Scene,
        field: Field,
        url: &str,
        position: Position,
        requested: Size,
        is_photo: bool,
    ) -> CartazResult<CreatedElement> {
        let decoded = self
            .fetcher
            .fetch(url, IMAGE_FETCH_TIMEOUT)
            .and_then(|bytes| DecodedImage::decode(&bytes));

        let (content, size) = match decoded {
            Ok(image) => {
                let fitted = fit_size(
                    f64::from(image.width),
                    f64::from(image.height),
                    requested,
                );
                (NodeContent::Image { image }, fitted)
            }
            Err(err) => {
                tracing::warn!(url, %err, "image load failed; using placeholder");
                (
                    NodeContent::Placeholder {
                        color: PLACEHOLDER_COLOR,
                    },
                    requested,
                )
            }
        };

        let id = self.insert(
            scene,
            content,
            position,
            size,
            NodeMeta {
                field,
                kind: ElementKind::Image,
                original_size: Some(requested),
                is_photo,
            },
        );
        Ok(CreatedElement {
            id,
            size,
            wrapped: false,
        })
    }

    fn scaled_font(&self, font: &FontSelection) -> FontSelection {
        let mut scaled = font.clone();
        scaled.size *= self.scale;
        scaled
    }

    fn insert(
        &self,
        scene: &mut Scene,
        content: NodeContent,
        position: Position,
        size: Size,
        meta: NodeMeta,
    ) -> NodeId {
        scene.add_node(
            content,
            Position {
                x: position.x * self.scale,
                y: position.y * self.scale,
            },
            Size {
                width: size.width * self.scale,
                height: size.height * self.scale,
            },
            meta,
        )
    }
}

/// Aspect-preserving fit of `(w, h)` into `requested`.
fn fit_size(w: f64, h: f64, requested: Size) -> Size {
    if w <= 0.0 || h <= 0.0 || requested.width <= 0.0 || requested.height <= 0.0 {
        return requested;
    }
    let scale = (requested.width / w).min(requested.height / h);
    Size {
        width: w * scale,
        height: h * scale,
    }
}

/// Fallback layout used when a template has no stored layout for a format.
pub fn default_layout(template_id: &str, format: OutputFormat) -> Layout {
    let spec = format.spec();
    let (w, h) = (f64::from(spec.width), f64::from(spec.height));
    let x = (w * 0.05).round();

    let element = |id: &str, field: Field, kind: ElementKind, y: f64| ElementDescriptor {
        id: id.to_string(),
        field,
        kind,
        position: Position { x, y: y.round() },
        size: Size::default(),
        style: ElementStyle::default(),
    };

    Layout {
        template_id: template_id.to_string(),
        format_name: format,
        elements: vec![
            element("default-title", Field::Title, ElementKind::Text, h * 0.08),
            element(
                "default-theme",
                Field::ClassTheme,
                ElementKind::TextBox,
                h * 0.24,
            ),
            element(
                "default-teacher",
                Field::TeacherName,
                ElementKind::Text,
                h * 0.72,
            ),
            element("default-date", Field::Date, ElementKind::Text, h * 0.82),
            element("default-time", Field::Time, ElementKind::Text, h * 0.90),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::LessonThemeBoxStyle,
        scene::SceneMode,
        store::MemoryFetcher,
        text::metrics::FixedAdvanceMeasurer,
    };

    fn event() -> EventData {
        EventData {
            title: "Aulão".to_string(),
            class_theme: "Tema da aula".to_string(),
            date: "10/03".to_string(),
            time: "19h".to_string(),
            teacher_names: vec!["Ana".to_string()],
            teacher_images: vec!["teachers/ana.png".to_string()],
            location: None,
            caption: None,
            text_color: "#ffffff".to_string(),
            box_color: None,
            box_font_color: None,
            lesson_theme_box_style: LessonThemeBoxStyle::Red,
        }
    }

    fn descriptor(field: Field, kind: ElementKind) -> ElementDescriptor {
        ElementDescriptor {
            id: format!("el-{field}"),
            field,
            kind,
            position: Position { x: 100.0, y: 200.0 },
            size: Size::default(),
            style: ElementStyle::default(),
        }
    }

    struct Fixture {
        fonts: FontLibrary,
        metrics: TextMetrics,
        measurer: FixedAdvanceMeasurer,
        fetcher: MemoryFetcher,
        scene: Scene,
    }

    fn fixture(format: OutputFormat, scale: f64) -> Fixture {
        let spec = format.spec();
        Fixture {
            fonts: FontLibrary::new(),
            metrics: TextMetrics::new(),
            measurer: FixedAdvanceMeasurer::default(),
            fetcher: MemoryFetcher::new(),
            scene: Scene::new(
                SceneMode::Interactive,
                (f64::from(spec.width) * scale).round() as u32,
                (f64::from(spec.height) * scale).round() as u32,
            ),
        }
    }

    #[test]
    fn short_theme_keeps_fixed_box_height() {
        let mut fx = fixture(OutputFormat::Youtube, 1.0);
        let mut factory = ElementFactory::new(
            OutputFormat::Youtube,
            1.0,
            &mut fx.fonts,
            &mut fx.metrics,
            &fx.fetcher,
        )
        .with_measurer(&mut fx.measurer);

        let created = factory
            .create_node(
                &mut fx.scene,
                &descriptor(Field::ClassTheme, ElementKind::TextBox),
                &event(),
                0.0,
            )
            .unwrap()
            .unwrap();

        assert!(!created.wrapped);
        assert_eq!(created.size.height, 100.0);
    }

    #[test]
    fn long_theme_grows_the_box() {
        let mut fx = fixture(OutputFormat::BannerGco, 1.0);
        let mut ev = event();
        ev.class_theme =
            "Revisão completa de literatura brasileira do modernismo à contemporaneidade"
                .to_string();
        let mut factory = ElementFactory::new(
            OutputFormat::BannerGco,
            1.0,
            &mut fx.fonts,
            &mut fx.metrics,
            &fx.fetcher,
        )
        .with_measurer(&mut fx.measurer);

        let created = factory
            .create_node(
                &mut fx.scene,
                &descriptor(Field::ClassTheme, ElementKind::TextBox),
                &ev,
                0.0,
            )
            .unwrap()
            .unwrap();

        assert!(created.wrapped);
        assert!(created.size.height > 40.0, "got {}", created.size.height);
    }

    #[test]
    fn replaces_existing_node_for_same_field() {
        let mut fx = fixture(OutputFormat::Feed, 1.0);
        let mut factory = ElementFactory::new(
            OutputFormat::Feed,
            1.0,
            &mut fx.fonts,
            &mut fx.metrics,
            &fx.fetcher,
        )
        .with_measurer(&mut fx.measurer);

        let d = descriptor(Field::Date, ElementKind::Text);
        factory.create_node(&mut fx.scene, &d, &event(), 0.0).unwrap();
        factory.create_node(&mut fx.scene, &d, &event(), 0.0).unwrap();
        assert_eq!(fx.scene.node_count(), 1);
    }

    #[test]
    fn photo_descriptors_are_skipped() {
        let mut fx = fixture(OutputFormat::Feed, 1.0);
        let mut factory = ElementFactory::new(
            OutputFormat::Feed,
            1.0,
            &mut fx.fonts,
            &mut fx.metrics,
            &fx.fetcher,
        )
        .with_measurer(&mut fx.measurer);

        let out = factory
            .create_node(
                &mut fx.scene,
                &descriptor(Field::TeacherImages, ElementKind::Image),
                &event(),
                0.0,
            )
            .unwrap();
        assert!(out.is_none());
        assert_eq!(fx.scene.node_count(), 0);
    }

    #[test]
    fn scale_applies_to_scene_geometry_only() {
        let mut fx = fixture(OutputFormat::Feed, 0.5);
        let mut factory = ElementFactory::new(
            OutputFormat::Feed,
            0.5,
            &mut fx.fonts,
            &mut fx.metrics,
            &fx.fetcher,
        )
        .with_measurer(&mut fx.measurer);

        let created = factory
            .create_node(
                &mut fx.scene,
                &descriptor(Field::Date, ElementKind::Text),
                &event(),
                0.0,
            )
            .unwrap()
            .unwrap();

        // Reported size is native; the scene node is scaled.
        let node = fx.scene.node(created.id).unwrap();
        assert_eq!(node.position.x, 50.0);
        assert_eq!(node.position.y, 100.0);
        assert!((node.size.height - created.size.height * 0.5).abs() < 1e-9);
    }

    #[test]
    fn failed_image_becomes_placeholder_with_original_size() {
        let mut fx = fixture(OutputFormat::Feed, 1.0);
        let mut factory = ElementFactory::new(
            OutputFormat::Feed,
            1.0,
            &mut fx.fonts,
            &mut fx.metrics,
            &fx.fetcher,
        );

        let requested = Size { width: 300.0, height: 400.0 };
        let created = factory
            .create_image_node(
                &mut fx.scene,
                Field::TeacherImages,
                "missing.png",
                Position { x: 700.0, y: 600.0 },
                requested,
                true,
            )
            .unwrap();

        let meta = fx.scene.meta(created.id).unwrap();
        assert!(meta.is_photo);
        assert_eq!(meta.original_size, Some(requested));
        assert!(matches!(
            fx.scene.node(created.id).unwrap().content,
            NodeContent::Placeholder { .. }
        ));
    }

    #[test]
    fn fit_preserves_aspect_ratio() {
        let fitted = fit_size(200.0, 100.0, Size { width: 100.0, height: 100.0 });
        assert_eq!(fitted, Size { width: 100.0, height: 50.0 });
    }

    #[test]
    fn default_layout_places_theme_as_box() {
        for format in OutputFormat::ALL {
            let layout = default_layout("t1", format);
            assert_eq!(layout.format_name, format);
            let theme = layout
                .elements
                .iter()
                .find(|e| e.field == Field::ClassTheme)
                .unwrap();
            assert_eq!(theme.kind, ElementKind::TextBox);
            // Everything starts inside the canvas.
            for el in &layout.elements {
                assert!(el.position.x >= 0.0);
                assert!(el.position.y < f64::from(format.spec().height));
            }
        }
    }

    #[test]
    fn caption_style_is_italic_and_title_bold() {
        let ev = event();
        let caption =
            resolve_style(OutputFormat::Feed, Field::Caption, &ElementStyle::default(), &ev);
        assert!(caption.font.italic);
        let title =
            resolve_style(OutputFormat::Feed, Field::Title, &ElementStyle::default(), &ev);
        assert_eq!(title.font.weight, 700);
    }

    #[test]
    fn theme_style_uses_event_box_font_color() {
        let ev = event(); // Red style: white text on red box
        let style = resolve_style(
            OutputFormat::Feed,
            Field::ClassTheme,
            &ElementStyle::default(),
            &ev,
        );
        assert_eq!(style.color, Rgba8::WHITE);
    }
}
