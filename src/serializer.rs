//! Scene -> persistable layout conversion.
//!
//! A pure read: the live scene is never mutated. Geometry is unscaled
//! back to format-native pixels, boundary-corrected per the format's
//! validation mode, and rounded to the format's serialization precision.
//! Teacher-photo nodes belong to the placement table and are skipped.

use crate::{
    bounds::{self, Bounds},
    error::{CartazError, CartazResult},
    format::OutputFormat,
    model::{ElementDescriptor, ElementStyle, Layout, Position, Size},
    scene::Scene,
};

/// Serialize the scene into a layout draft.
///
/// `reference` supplies stable element ids and immutable styles by field
/// (normally the layout the scene was built from); fields absent from it
/// get generated ids and empty styles.
pub fn serialize_scene(
    scene: &Scene,
    template_id: &str,
    format: OutputFormat,
    scale: f64,
    reference: Option<&Layout>,
) -> CartazResult<Layout> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(CartazError::validation(format!(
            "serialization scale must be finite and > 0, got {scale}"
        )));
    }
    let spec = format.spec();

    let mut elements = Vec::new();
    for node in scene.nodes_in_order() {
        let Some(meta) = scene.meta(node.id) else {
            continue;
        };
        if meta.is_photo {
            continue;
        }

        let position = Position {
            x: node.position.x / scale,
            y: node.position.y / scale,
        };
        // Images persist the size that was asked for, not the
        // aspect-fitted display size.
        let size = match meta.original_size {
            Some(original) => original,
            None => Size {
                width: node.size.width / scale,
                height: node.size.height / scale,
            },
        };

        let checked = Bounds::new(position.x, position.y, size.width, size.height);
        let position = if bounds::validate_position(&checked, format).is_valid {
            position
        } else {
            bounds::constrain_to_canvas(&checked, format, None)
        };

        let reference_el = reference.and_then(|layout| {
            layout.elements.iter().find(|el| el.field == meta.field)
        });
        let id = reference_el
            .map(|el| el.id.clone())
            .unwrap_or_else(|| format!("{template_id}-{}", meta.field));
        let style = reference_el
            .map(|el| el.style.clone())
            .unwrap_or_else(ElementStyle::default);

        elements.push(ElementDescriptor {
            id,
            field: meta.field,
            kind: meta.kind,
            position: Position {
                x: round_to(position.x, spec.round_decimals),
                y: round_to(position.y, spec.round_decimals),
            },
            size: Size {
                width: round_to(size.width, spec.round_decimals),
                height: round_to(size.height, spec.round_decimals),
            },
            style,
        });
    }

    Ok(Layout {
        template_id: template_id.to_string(),
        format_name: format,
        elements,
    })
}

fn round_to(v: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (v * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fonts::FontSelection,
        model::{ElementKind, Field, Rgba8},
        scene::{NodeContent, NodeMeta, Scene, SceneMode},
    };

    fn text_content() -> NodeContent {
        NodeContent::Text {
            lines: vec!["x".to_string()],
            font: FontSelection::new("Montserrat", 24.0),
            color: Rgba8::WHITE,
        }
    }

    fn add(
        scene: &mut Scene,
        field: Field,
        kind: ElementKind,
        pos: Position,
        size: Size,
        original: Option<Size>,
        is_photo: bool,
    ) {
        scene.add_node(
            text_content(),
            pos,
            size,
            NodeMeta {
                field,
                kind,
                original_size: original,
                is_photo,
            },
        );
    }

    #[test]
    fn unscales_geometry_by_the_preview_scale() {
        let mut scene = Scene::new(SceneMode::Interactive, 540, 540);
        add(
            &mut scene,
            Field::Date,
            ElementKind::Text,
            Position { x: 50.0, y: 100.0 },
            Size { width: 80.0, height: 14.0 },
            None,
            false,
        );

        let layout =
            serialize_scene(&scene, "t1", OutputFormat::Feed, 0.5, None).unwrap();
        assert_eq!(layout.elements.len(), 1);
        let el = &layout.elements[0];
        assert_eq!(el.position, Position { x: 100.0, y: 200.0 });
        assert_eq!(el.size, Size { width: 160.0, height: 28.0 });
    }

    #[test]
    fn photos_are_skipped() {
        let mut scene = Scene::new(SceneMode::Interactive, 1080, 1080);
        add(
            &mut scene,
            Field::TeacherImages,
            ElementKind::Image,
            Position { x: 700.0, y: 500.0 },
            Size { width: 300.0, height: 400.0 },
            Some(Size { width: 300.0, height: 400.0 }),
            true,
        );
        add(
            &mut scene,
            Field::Date,
            ElementKind::Text,
            Position { x: 10.0, y: 10.0 },
            Size { width: 50.0, height: 20.0 },
            None,
            false,
        );

        let layout =
            serialize_scene(&scene, "t1", OutputFormat::Feed, 1.0, None).unwrap();
        assert_eq!(layout.elements.len(), 1);
        assert_eq!(layout.elements[0].field, Field::Date);
    }

    #[test]
    fn images_prefer_the_original_requested_size() {
        let mut scene = Scene::new(SceneMode::Interactive, 1080, 1080);
        add(
            &mut scene,
            Field::Title,
            ElementKind::Image,
            Position { x: 100.0, y: 100.0 },
            Size { width: 100.0, height: 50.0 }, // aspect-fitted display size
            Some(Size { width: 120.0, height: 120.0 }),
            false,
        );

        let layout =
            serialize_scene(&scene, "t1", OutputFormat::Feed, 1.0, None).unwrap();
        assert_eq!(
            layout.elements[0].size,
            Size { width: 120.0, height: 120.0 }
        );
    }

    #[test]
    fn out_of_bounds_positions_are_corrected() {
        let mut scene = Scene::new(SceneMode::Interactive, 1080, 1080);
        add(
            &mut scene,
            Field::Date,
            ElementKind::Text,
            Position { x: 2000.0, y: 50.0 },
            Size { width: 200.0, height: 40.0 },
            None,
            false,
        );

        let layout =
            serialize_scene(&scene, "t1", OutputFormat::Feed, 1.0, None).unwrap();
        let el = &layout.elements[0];
        let margin = OutputFormat::Feed.spec().margin();
        assert!(el.position.x + el.size.width <= 1080.0 - margin);
    }

    #[test]
    fn rounding_precision_follows_the_format() {
        let mut scene = Scene::new(SceneMode::Interactive, 255, 192);
        add(
            &mut scene,
            Field::Date,
            ElementKind::Text,
            Position { x: 10.123456, y: 20.987654 },
            Size { width: 30.5555, height: 10.4444 },
            None,
            false,
        );
        let layout =
            serialize_scene(&scene, "t1", OutputFormat::BannerGco, 1.0, None).unwrap();
        let el = &layout.elements[0];
        assert_eq!(el.position.x, 10.123);
        assert_eq!(el.position.y, 20.988);
        assert_eq!(el.size.width, 30.556);

        let mut scene2 = Scene::new(SceneMode::Interactive, 1080, 1080);
        add(
            &mut scene2,
            Field::Date,
            ElementKind::Text,
            Position { x: 10.123456, y: 20.987654 },
            Size { width: 30.5555, height: 10.4444 },
            None,
            false,
        );
        let layout2 =
            serialize_scene(&scene2, "t1", OutputFormat::Feed, 1.0, None).unwrap();
        assert_eq!(layout2.elements[0].position.x, 10.12);
    }

    #[test]
    fn reference_layout_supplies_ids_and_styles() {
        let mut scene = Scene::new(SceneMode::Interactive, 1080, 1080);
        add(
            &mut scene,
            Field::Date,
            ElementKind::Text,
            Position { x: 10.0, y: 10.0 },
            Size { width: 50.0, height: 20.0 },
            None,
            false,
        );

        let reference = Layout {
            template_id: "t1".to_string(),
            format_name: OutputFormat::Feed,
            elements: vec![ElementDescriptor {
                id: "stable-date-id".to_string(),
                field: Field::Date,
                kind: ElementKind::Text,
                position: Position::default(),
                size: Size::default(),
                style: ElementStyle {
                    font_size: Some(24.0),
                    ..ElementStyle::default()
                },
            }],
        };

        let layout =
            serialize_scene(&scene, "t1", OutputFormat::Feed, 1.0, Some(&reference))
                .unwrap();
        assert_eq!(layout.elements[0].id, "stable-date-id");
        assert_eq!(layout.elements[0].style.font_size, Some(24.0));
    }

    #[test]
    fn rejects_degenerate_scale() {
        let scene = Scene::new(SceneMode::Interactive, 10, 10);
        assert!(serialize_scene(&scene, "t", OutputFormat::Feed, 0.0, None).is_err());
        assert!(serialize_scene(&scene, "t", OutputFormat::Feed, -1.0, None).is_err());
    }
}
