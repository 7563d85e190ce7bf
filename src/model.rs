use std::collections::HashMap;

use crate::{
    error::{CartazError, CartazResult},
    format::OutputFormat,
};

/// Semantic binding of a layout element to live event data.
///
/// Wire names are the camelCase strings used by persisted layouts.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum Field {
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "classTheme")]
    ClassTheme,
    #[serde(rename = "teacherName")]
    TeacherName,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "teacherImages")]
    TeacherImages,
    #[serde(rename = "location")]
    Location,
    #[serde(rename = "caption")]
    Caption,
}

impl Field {
    pub fn wire_name(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::ClassTheme => "classTheme",
            Field::TeacherName => "teacherName",
            Field::Date => "date",
            Field::Time => "time",
            Field::TeacherImages => "teacherImages",
            Field::Location => "location",
            Field::Caption => "caption",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Element kinds supported by the factory and serializer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ElementKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "text_box")]
    TextBox,
    #[serde(rename = "image")]
    Image,
}

/// Position in unscaled, format-native pixel coordinates.
///
/// Invariant: never stored pre-multiplied by an editor preview scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Size in the same unscaled space as [`Position`].
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Per-element style overrides.
///
/// Absent keys fall back to the format+field style table. Style is
/// immutable after element creation: editing moves and resizes elements
/// but never restyles them.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ElementStyle {
    #[serde(rename = "fontSize", default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(rename = "fontFamily", default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(rename = "fontWeight", default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// The unit of layout persistence.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ElementDescriptor {
    pub id: String,
    pub field: Field,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub position: Position,
    pub size: Size,
    #[serde(default)]
    pub style: ElementStyle,
}

/// One layout exists per (template, format) pair.
///
/// Persisted records nest the elements under a `layout_config` key; the
/// wire bridge below keeps the in-memory type flat.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(from = "LayoutWire", into = "LayoutWire")]
pub struct Layout {
    pub template_id: String,
    pub format_name: OutputFormat,
    pub elements: Vec<ElementDescriptor>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct LayoutWire {
    template_id: String,
    format_name: OutputFormat,
    layout_config: LayoutConfigWire,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct LayoutConfigWire {
    #[serde(default)]
    elements: Vec<ElementDescriptor>,
}

impl From<LayoutWire> for Layout {
    fn from(wire: LayoutWire) -> Self {
        Self {
            template_id: wire.template_id,
            format_name: wire.format_name,
            elements: wire.layout_config.elements,
        }
    }
}

impl From<Layout> for LayoutWire {
    fn from(layout: Layout) -> Self {
        Self {
            template_id: layout.template_id,
            format_name: layout.format_name,
            layout_config: LayoutConfigWire {
                elements: layout.elements,
            },
        }
    }
}

impl Layout {
    /// Enforce the one-element-per-field invariant.
    ///
    /// Legacy layouts may carry duplicate fields; the most-recently-defined
    /// descriptor wins, and output order follows the surviving occurrences.
    pub fn deduped_elements(&self) -> Vec<ElementDescriptor> {
        let mut last_index: HashMap<Field, usize> = HashMap::new();
        for (i, el) in self.elements.iter().enumerate() {
            last_index.insert(el.field, i);
        }
        self.elements
            .iter()
            .enumerate()
            .filter(|(i, el)| last_index.get(&el.field) == Some(i))
            .map(|(_, el)| el.clone())
            .collect()
    }
}

/// RGBA color, 8 bits per channel; doubles as the parley brush type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Rgba8 = Rgba8::opaque(0xff, 0xff, 0xff);
    pub const BLACK: Rgba8 = Rgba8::opaque(0x00, 0x00, 0x00);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(s: &str) -> CartazResult<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(CartazError::validation(format!("invalid hex color '{s}'")));
        }
        let parse = |h: &str| {
            u8::from_str_radix(h, 16)
                .map_err(|_| CartazError::validation(format!("invalid hex color '{s}'")))
        };
        match hex.len() {
            3 => {
                let mut c = [0u8; 3];
                for (i, ch) in hex.chars().enumerate() {
                    let v = parse(ch.encode_utf8(&mut [0u8; 4]))?;
                    c[i] = v << 4 | v;
                }
                Ok(Self::opaque(c[0], c[1], c[2]))
            }
            6 => Ok(Self::opaque(
                parse(&hex[0..2])?,
                parse(&hex[2..4])?,
                parse(&hex[4..6])?,
            )),
            8 => Ok(Self {
                r: parse(&hex[0..2])?,
                g: parse(&hex[2..4])?,
                b: parse(&hex[4..6])?,
                a: parse(&hex[6..8])?,
            }),
            _ => Err(CartazError::validation(format!("invalid hex color '{s}'"))),
        }
    }
}

/// Named lesson-theme box style.
///
/// Each named style maps to a fixed box+font color pair; `Transparent`
/// draws no box and defers the font color to the event `textColor`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LessonThemeBoxStyle {
    Red,
    Green,
    White,
    #[default]
    Transparent,
}

impl LessonThemeBoxStyle {
    pub fn box_fill(self) -> Option<Rgba8> {
        match self {
            LessonThemeBoxStyle::Red => Some(Rgba8::opaque(0xd3, 0x2f, 0x2f)),
            LessonThemeBoxStyle::Green => Some(Rgba8::opaque(0x2e, 0x7d, 0x32)),
            LessonThemeBoxStyle::White => Some(Rgba8::WHITE),
            LessonThemeBoxStyle::Transparent => None,
        }
    }

    pub fn font_color(self, text_color: Rgba8) -> Rgba8 {
        match self {
            LessonThemeBoxStyle::Red | LessonThemeBoxStyle::Green => Rgba8::WHITE,
            LessonThemeBoxStyle::White => Rgba8::opaque(0x0d, 0x13, 0x4c),
            LessonThemeBoxStyle::Transparent => text_color,
        }
    }
}

/// Live event payload supplied per generation request; never persisted.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    #[serde(default)]
    pub title: String,
    pub class_theme: String,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub teacher_names: Vec<String>,
    #[serde(default)]
    pub teacher_images: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Hex color for plain text elements.
    #[serde(default = "default_text_color")]
    pub text_color: String,
    /// Explicit box color override; takes precedence over the named style.
    #[serde(default)]
    pub box_color: Option<String>,
    /// Explicit box font color override; takes precedence over the named style.
    #[serde(default)]
    pub box_font_color: Option<String>,
    #[serde(default)]
    pub lesson_theme_box_style: LessonThemeBoxStyle,
}

fn default_text_color() -> String {
    "#ffffff".to_string()
}

impl EventData {
    /// Fail-fast check before any rendering work.
    ///
    /// Generation must not silently produce a blank or photo-less asset, so
    /// the required text fields and at least one teacher photo are checked
    /// up front and reported together.
    pub fn validate(&self) -> CartazResult<()> {
        let mut missing = Vec::new();
        if self.class_theme.trim().is_empty() {
            missing.push("classTheme".to_string());
        }
        if self.date.trim().is_empty() {
            missing.push("date".to_string());
        }
        if self.time.trim().is_empty() {
            missing.push("time".to_string());
        }
        if self.teacher_images.is_empty() {
            missing.push("teacherImages".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CartazError::MissingFields(missing))
        }
    }

    pub fn text_color(&self) -> Rgba8 {
        Rgba8::from_hex(&self.text_color).unwrap_or(Rgba8::WHITE)
    }

    /// Resolved lesson-theme box fill, explicit override first.
    pub fn theme_box_fill(&self) -> Option<Rgba8> {
        if let Some(hex) = &self.box_color
            && let Ok(color) = Rgba8::from_hex(hex)
        {
            return Some(color);
        }
        self.lesson_theme_box_style.box_fill()
    }

    /// Resolved lesson-theme font color, explicit override first.
    pub fn theme_font_color(&self) -> Rgba8 {
        if let Some(hex) = &self.box_font_color
            && let Ok(color) = Rgba8::from_hex(hex)
        {
            return color;
        }
        self.lesson_theme_box_style.font_color(self.text_color())
    }

    /// Text content bound to a field, `None` for non-text fields or empty
    /// optional fields.
    pub fn text_for(&self, field: Field) -> Option<String> {
        match field {
            Field::Title => Some(self.title.clone()).filter(|s| !s.is_empty()),
            Field::ClassTheme => Some(self.class_theme.clone()),
            Field::TeacherName => {
                if self.teacher_names.is_empty() {
                    None
                } else {
                    Some(self.teacher_names.join(" e "))
                }
            }
            Field::Date => Some(self.date.clone()),
            Field::Time => Some(self.time.clone()),
            Field::Location => self.location.clone().filter(|s| !s.is_empty()),
            Field::Caption => self.caption.clone().filter(|s| !s.is_empty()),
            Field::TeacherImages => None,
        }
    }

    pub fn multiple_teachers(&self) -> bool {
        self.teacher_names.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EventData {
        EventData {
            title: "Aulão de Véspera".to_string(),
            class_theme: "Introdução ao Cálculo".to_string(),
            date: "2025-03-10".to_string(),
            time: "19:00".to_string(),
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

    #[test]
    fn descriptor_json_round_trip() {
        let el = ElementDescriptor {
            id: "el-1".to_string(),
            field: Field::ClassTheme,
            kind: ElementKind::TextBox,
            position: Position { x: 42.5, y: 96.0 },
            size: Size {
                width: 300.0,
                height: 100.0,
            },
            style: ElementStyle {
                font_size: Some(36.0),
                font_family: Some("Montserrat".to_string()),
                font_weight: None,
                color: Some("#0d134c".to_string()),
            },
        };
        let json = serde_json::to_string(&el).unwrap();
        assert!(json.contains("\"type\":\"text_box\""));
        assert!(json.contains("\"field\":\"classTheme\""));
        assert!(json.contains("\"fontSize\":36.0"));
        let de: ElementDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(de, el);
    }

    #[test]
    fn dedupe_keeps_last_defined_per_field() {
        let mk = |id: &str, field: Field, x: f64| ElementDescriptor {
            id: id.to_string(),
            field,
            kind: ElementKind::Text,
            position: Position { x, y: 0.0 },
            size: Size::default(),
            style: ElementStyle::default(),
        };
        let layout = Layout {
            template_id: "t1".to_string(),
            format_name: OutputFormat::Feed,
            elements: vec![
                mk("a", Field::Date, 1.0),
                mk("b", Field::Title, 2.0),
                mk("c", Field::Date, 3.0),
            ],
        };
        let deduped = layout.deduped_elements();
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "b");
        assert_eq!(deduped[1].id, "c");
        assert_eq!(deduped[1].position.x, 3.0);
    }

    #[test]
    fn hex_colors_parse() {
        assert!(matches!(
            Rgba8::from_hex("#0d134c"),
            Ok(c) if c == Rgba8::opaque(0x0d, 0x13, 0x4c)
        ));
        assert!(matches!(Rgba8::from_hex("fff"), Ok(c) if c == Rgba8::WHITE));
        assert!(matches!(
            Rgba8::from_hex("#11223344"),
            Ok(Rgba8 { r: 0x11, g: 0x22, b: 0x33, a: 0x44 })
        ));
        assert!(Rgba8::from_hex("#12345").is_err());
        assert!(Rgba8::from_hex("zzzzzz").is_err());
    }

    #[test]
    fn transparent_style_defers_to_text_color() {
        let mut event = sample_event();
        event.lesson_theme_box_style = LessonThemeBoxStyle::Transparent;
        event.text_color = "#0d134c".to_string();
        assert_eq!(event.theme_box_fill(), None);
        assert_eq!(event.theme_font_color(), Rgba8::opaque(0x0d, 0x13, 0x4c));
    }

    #[test]
    fn explicit_box_colors_override_named_style() {
        let mut event = sample_event();
        event.box_color = Some("#112233".to_string());
        event.box_font_color = Some("#445566".to_string());
        assert_eq!(event.theme_box_fill(), Some(Rgba8::opaque(0x11, 0x22, 0x33)));
        assert_eq!(event.theme_font_color(), Rgba8::opaque(0x44, 0x55, 0x66));
    }

    #[test]
    fn validate_reports_all_missing_fields_at_once() {
        let mut event = sample_event();
        event.class_theme = String::new();
        event.teacher_images.clear();
        let err = event.validate().unwrap_err();
        let missing = err.missing_fields().unwrap();
        assert_eq!(missing, &["classTheme".to_string(), "teacherImages".to_string()]);
    }

    #[test]
    fn teacher_name_joins_with_separator() {
        let mut event = sample_event();
        event.teacher_names = vec!["Ana".to_string(), "Bruno".to_string()];
        assert_eq!(
            event.text_for(Field::TeacherName).as_deref(),
            Some("Ana e Bruno")
        );
        assert!(event.multiple_teachers());
        assert_eq!(event.text_for(Field::TeacherImages), None);
    }
}
