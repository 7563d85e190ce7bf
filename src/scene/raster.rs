//! Headless rasterization of a [`Scene`] via `vello_cpu`.

use std::sync::Arc;

use crate::{
    error::{CartazError, CartazResult},
    fonts::{FontLibrary, FontSelection},
    format::TextAlign,
    model::{Position, Rgba8},
    scene::{Background, NodeContent, Scene},
    text::breaker::LINE_HEIGHT_FACTOR,
};

use super::DecodedImage;

/// Final bitmap produced by a render: premultiplied RGBA8, row-major.
#[derive(Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

/// Draw the whole scene into a premultiplied RGBA8 frame.
///
/// Glyphs are drawn from the same font bytes the layout was shaped with;
/// a node whose face never loaded keeps its box/placeholder geometry but
/// skips glyph painting (logged, not fatal).
pub fn rasterize(scene: &Scene, fonts: &mut FontLibrary) -> CartazResult<Frame> {
    let w: u16 = scene
        .width()
        .try_into()
        .map_err(|_| CartazError::render("canvas width exceeds u16"))?;
    let h: u16 = scene
        .height()
        .try_into()
        .map_err(|_| CartazError::render("canvas height exceeds u16"))?;
    if w == 0 || h == 0 {
        return Err(CartazError::render("canvas must be non-empty"));
    }

    let mut ctx = vello_cpu::RenderContext::new(w, h);
    ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);

    draw_background(&mut ctx, scene)?;

    for node in scene.nodes_in_order() {
        match &node.content {
            NodeContent::Text { lines, font, color } => {
                draw_lines(
                    &mut ctx,
                    fonts,
                    lines,
                    font,
                    *color,
                    node.position,
                    None,
                    TextAlign::Left,
                )?;
            }
            NodeContent::TextBox {
                lines,
                font,
                font_color,
                box_fill,
                align,
                pad_x,
                pad_y,
                corner_radius,
            } => {
                if let Some(fill) = box_fill {
                    let rounded = kurbo::RoundedRect::new(
                        node.position.x,
                        node.position.y,
                        node.position.x + node.size.width,
                        node.position.y + node.size.height,
                        *corner_radius,
                    );
                    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                    ctx.set_paint(color_to_cpu(*fill));
                    ctx.fill_path(&bezpath_to_cpu(&kurbo::Shape::to_path(&rounded, 0.1)));
                }
                let origin = Position {
                    x: node.position.x + pad_x,
                    y: node.position.y + pad_y,
                };
                let container = (node.size.width - 2.0 * pad_x).max(0.0) as f32;
                draw_lines(
                    &mut ctx,
                    fonts,
                    lines,
                    font,
                    *font_color,
                    origin,
                    Some(container),
                    *align,
                )?;
            }
            NodeContent::Image { image } => {
                let paint = image_paint(image)?;
                let sx = node.size.width / f64::from(image.width.max(1));
                let sy = node.size.height / f64::from(image.height.max(1));
                ctx.set_transform(
                    vello_cpu::kurbo::Affine::translate((node.position.x, node.position.y))
                        * vello_cpu::kurbo::Affine::scale_non_uniform(sx, sy),
                );
                ctx.set_paint(paint);
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(image.width),
                    f64::from(image.height),
                ));
            }
            NodeContent::Placeholder { color } => {
                ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
                ctx.set_paint(color_to_cpu(*color));
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    node.position.x,
                    node.position.y,
                    node.position.x + node.size.width,
                    node.position.y + node.size.height,
                ));
            }
        }
    }

    ctx.flush();
    let mut pixmap = vello_cpu::Pixmap::new(w, h);
    ctx.render_to_pixmap(&mut pixmap);

    Ok(Frame {
        width: u32::from(w),
        height: u32::from(h),
        data: pixmap.data_as_u8_slice().to_vec(),
        premultiplied: true,
    })
}

fn draw_background(ctx: &mut vello_cpu::RenderContext, scene: &Scene) -> CartazResult<()> {
    let (w, h) = (f64::from(scene.width()), f64::from(scene.height()));
    match scene.background() {
        Some(Background::Image(image)) => {
            // Scale-to-fill, centered; overflow crops at the canvas edge.
            let iw = f64::from(image.width.max(1));
            let ih = f64::from(image.height.max(1));
            let scale = (w / iw).max(h / ih);
            let dx = (w - iw * scale) / 2.0;
            let dy = (h - ih * scale) / 2.0;

            let paint = image_paint(image)?;
            ctx.set_transform(
                vello_cpu::kurbo::Affine::translate((dx, dy))
                    * vello_cpu::kurbo::Affine::scale(scale),
            );
            ctx.set_paint(paint);
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, iw, ih));
        }
        Some(Background::Color(color)) => {
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(color_to_cpu(*color));
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));
        }
        None => {}
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn draw_lines(
    ctx: &mut vello_cpu::RenderContext,
    fonts: &mut FontLibrary,
    lines: &[String],
    font: &FontSelection,
    color: Rgba8,
    origin: Position,
    container_width: Option<f32>,
    align: TextAlign,
) -> CartazResult<()> {
    let Some(face_font) = fonts.face(&font.family).map(|f| f.font.clone()) else {
        tracing::warn!(family = %font.family, "face not loaded; skipping glyph paint");
        return Ok(());
    };

    let line_height = font.size * LINE_HEIGHT_FACTOR;
    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let layout = fonts.layout_line(line, font, color, container_width, align)?;
        ctx.set_transform(vello_cpu::kurbo::Affine::translate((
            origin.x,
            origin.y + i as f64 * line_height,
        )));
        for layout_line in layout.lines() {
            for item in layout_line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let brush = run.style().brush;
                ctx.set_paint(color_to_cpu(brush));
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(&face_font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }
    Ok(())
}

fn color_to_cpu(c: Rgba8) -> vello_cpu::peniko::Color {
    vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
}

fn image_paint(image: &DecodedImage) -> CartazResult<vello_cpu::Image> {
    let pixmap = pixmap_from_premul_bytes(&image.rgba8_premul, image.width, image.height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> CartazResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| CartazError::render("pixmap width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| CartazError::render("pixmap height exceeds u16"))?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(CartazError::render("pixmap byte len mismatch"));
    }
    let mut pixels = Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(
        (width as usize) * (height as usize),
    );
    for px in bytes.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels, w, h, true,
    ))
}

fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::LineTo(p) => out.line_to(vello_cpu::kurbo::Point::new(p.x, p.y)),
            PathEl::QuadTo(p1, p2) => out.quad_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
            ),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(
                vello_cpu::kurbo::Point::new(p1.x, p1.y),
                vello_cpu::kurbo::Point::new(p2.x, p2.y),
                vello_cpu::kurbo::Point::new(p3.x, p3.y),
            ),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{ElementKind, Field, Size},
        scene::{NodeMeta, SceneMode},
    };

    fn meta() -> NodeMeta {
        NodeMeta {
            field: Field::ClassTheme,
            kind: ElementKind::TextBox,
            original_size: None,
            is_photo: false,
        }
    }

    #[test]
    fn solid_background_fills_every_pixel() {
        let mut scene = Scene::new(SceneMode::Headless, 4, 3);
        scene.set_background(Background::Color(Rgba8::opaque(10, 20, 30)));
        let mut fonts = FontLibrary::new();

        let frame = rasterize(&scene, &mut fonts).unwrap();
        assert_eq!((frame.width, frame.height), (4, 3));
        assert!(frame.premultiplied);
        assert_eq!(frame.data.len(), 4 * 3 * 4);
        for px in frame.data.chunks_exact(4) {
            assert_eq!(px, &[10, 20, 30, 255]);
        }
    }

    #[test]
    fn placeholder_paints_its_rect_only() {
        let mut scene = Scene::new(SceneMode::Headless, 4, 4);
        scene.set_background(Background::Color(Rgba8::BLACK));
        scene.add_node(
            NodeContent::Placeholder {
                color: Rgba8::opaque(255, 0, 0),
            },
            Position { x: 0.0, y: 0.0 },
            Size { width: 2.0, height: 2.0 },
            meta(),
        );
        let mut fonts = FontLibrary::new();

        let frame = rasterize(&scene, &mut fonts).unwrap();
        let px = |x: usize, y: usize| &frame.data[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(px(0, 0), &[255, 0, 0, 255]);
        assert_eq!(px(3, 3), &[0, 0, 0, 255]);
    }

    #[test]
    fn image_background_scales_to_fill() {
        // 1x1 white source stretched over a 3x2 canvas.
        let image = DecodedImage {
            width: 1,
            height: 1,
            rgba8_premul: Arc::new(vec![255, 255, 255, 255]),
        };
        let mut scene = Scene::new(SceneMode::Headless, 3, 2);
        scene.set_background(Background::Image(image));
        let mut fonts = FontLibrary::new();

        let frame = rasterize(&scene, &mut fonts).unwrap();
        for px in frame.data.chunks_exact(4) {
            assert_eq!(px[3], 255);
            assert_eq!(px[0], 255);
        }
    }

    #[test]
    fn unloaded_face_keeps_box_but_skips_glyphs() {
        let mut scene = Scene::new(SceneMode::Headless, 8, 8);
        scene.set_background(Background::Color(Rgba8::BLACK));
        scene.add_node(
            NodeContent::TextBox {
                lines: vec!["Oi".to_string()],
                font: FontSelection::new("Missing", 4.0),
                font_color: Rgba8::WHITE,
                box_fill: Some(Rgba8::opaque(0, 255, 0)),
                align: TextAlign::Left,
                pad_x: 0.0,
                pad_y: 0.0,
                corner_radius: 0.0,
            },
            Position { x: 0.0, y: 0.0 },
            Size { width: 8.0, height: 8.0 },
            meta(),
        );
        let mut fonts = FontLibrary::new();

        let frame = rasterize(&scene, &mut fonts).unwrap();
        // Box fill made it to the output even though no glyphs painted.
        assert_eq!(&frame.data[(4 * 8 + 4) * 4..(4 * 8 + 4) * 4 + 3], &[0, 255, 0]);
    }

    #[test]
    fn fill_less_text_box_draws_no_rectangle() {
        let mut scene = Scene::new(SceneMode::Headless, 8, 8);
        scene.set_background(Background::Color(Rgba8::BLACK));
        scene.add_node(
            NodeContent::TextBox {
                lines: vec!["Oi".to_string()],
                font: FontSelection::new("Missing", 4.0),
                font_color: Rgba8::opaque(0x0d, 0x13, 0x4c),
                box_fill: None,
                align: TextAlign::Left,
                pad_x: 0.0,
                pad_y: 0.0,
                corner_radius: 0.0,
            },
            Position { x: 0.0, y: 0.0 },
            Size { width: 8.0, height: 8.0 },
            meta(),
        );
        let mut fonts = FontLibrary::new();

        // No fill and no loadable face: the background shows through the
        // whole box.
        let frame = rasterize(&scene, &mut fonts).unwrap();
        for px in frame.data.chunks_exact(4) {
            assert_eq!(px, &[0, 0, 0, 255]);
        }
    }

    #[test]
    fn oversized_canvas_is_rejected() {
        let scene = Scene::new(SceneMode::Headless, 70_000, 10);
        let mut fonts = FontLibrary::new();
        assert!(rasterize(&scene, &mut fonts).is_err());
    }
}
