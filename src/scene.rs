//! Retained 2D scene graph shared by the editor and the headless renderer.
//!
//! One type serves both: interactive mode keeps selection and emits events
//! for a host UI; headless mode is the same graph built once and
//! rasterized. Per-element semantics (field binding, descriptor kind, the
//! originally requested image size) live in a metadata side table keyed by
//! node id, never on the nodes themselves.

pub mod raster;

use std::{collections::HashMap, sync::Arc};

use crate::{
    error::CartazResult,
    fonts::FontSelection,
    format::TextAlign,
    model::{ElementKind, Field, Position, Rgba8, Size},
};

/// Opaque scene node handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneMode {
    /// Selection, hit-testing and event emission are live.
    Interactive,
    /// Build-once graph for rasterization; events are not recorded.
    Headless,
}

/// A decoded bitmap, premultiplied RGBA8.
#[derive(Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

impl DecodedImage {
    /// Decode and premultiply arbitrary encoded image bytes.
    pub fn decode(bytes: &[u8]) -> CartazResult<Self> {
        let dyn_img = image::load_from_memory(bytes)
            .map_err(|e| crate::error::CartazError::resource(format!("decode image: {e}")))?;
        let rgba = dyn_img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut rgba8_premul = rgba.into_raw();
        premultiply_rgba8_in_place(&mut rgba8_premul);
        Ok(Self {
            width,
            height,
            rgba8_premul: Arc::new(rgba8_premul),
        })
    }
}

pub(crate) fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

/// What a node draws.
#[derive(Clone)]
pub enum NodeContent {
    /// Plain text, one or more pre-broken lines.
    Text {
        lines: Vec<String>,
        font: FontSelection,
        color: Rgba8,
    },
    /// Lesson-theme box: optional fill behind padded, aligned text lines.
    TextBox {
        lines: Vec<String>,
        font: FontSelection,
        font_color: Rgba8,
        box_fill: Option<Rgba8>,
        align: TextAlign,
        pad_x: f64,
        pad_y: f64,
        corner_radius: f64,
    },
    /// A decoded bitmap drawn scaled to the node size.
    Image { image: DecodedImage },
    /// Visibly-marked stand-in for an image that failed to load.
    Placeholder { color: Rgba8 },
}

/// Background layer behind all nodes. Never hit-testable.
#[derive(Clone)]
pub enum Background {
    Image(DecodedImage),
    Color(Rgba8),
}

pub struct SceneNode {
    pub id: NodeId,
    pub position: Position,
    pub size: Size,
    pub content: NodeContent,
}

impl SceneNode {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.position.x
            && y >= self.position.y
            && x < self.position.x + self.size.width
            && y < self.position.y + self.size.height
    }
}

/// Per-node semantics the serializer and editor need.
#[derive(Clone, Debug)]
pub struct NodeMeta {
    pub field: Field,
    pub kind: ElementKind,
    /// Requested (pre-fit) size for images; serialization prefers this
    /// over the scaled-to-fit display size.
    pub original_size: Option<Size>,
    /// Teacher-photo nodes are placed by rule, not by the stored layout,
    /// and are skipped by the serializer.
    pub is_photo: bool,
}

/// Notifications drained by the host after each interaction.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneEvent {
    SelectionChanged(Option<NodeId>),
    ObjectMoving(NodeId),
    ObjectModified(NodeId),
}

pub struct Scene {
    mode: SceneMode,
    width: u32,
    height: u32,
    background: Option<Background>,
    /// Paint order: later entries draw on top and hit-test first.
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, SceneNode>,
    meta: HashMap<NodeId, NodeMeta>,
    selection: Option<NodeId>,
    events: Vec<SceneEvent>,
    next_id: u64,
}

impl Scene {
    pub fn new(mode: SceneMode, width: u32, height: u32) -> Self {
        Self {
            mode,
            width,
            height,
            background: None,
            order: Vec::new(),
            nodes: HashMap::new(),
            meta: HashMap::new(),
            selection: None,
            events: Vec::new(),
            next_id: 1,
        }
    }

    pub fn mode(&self) -> SceneMode {
        self.mode
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn set_background(&mut self, background: Background) {
        self.background = Some(background);
    }

    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    pub fn add_node(
        &mut self,
        content: NodeContent,
        position: Position,
        size: Size,
        meta: NodeMeta,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            SceneNode {
                id,
                position,
                size,
                content,
            },
        );
        self.meta.insert(id, meta);
        self.order.push(id);
        id
    }

    pub fn remove_node(&mut self, id: NodeId) -> bool {
        if self.nodes.remove(&id).is_none() {
            return false;
        }
        self.meta.remove(&id);
        self.order.retain(|n| *n != id);
        if self.selection == Some(id) {
            self.select(None);
        }
        true
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn meta(&self, id: NodeId) -> Option<&NodeMeta> {
        self.meta.get(&id)
    }

    /// Nodes in paint order (bottom first).
    pub fn nodes_in_order(&self) -> impl Iterator<Item = &SceneNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn node_for_field(&self, field: Field) -> Option<NodeId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.meta.get(id).is_some_and(|m| m.field == field))
    }

    /// Topmost node containing the point; the background never hits.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<NodeId> {
        self.order
            .iter()
            .rev()
            .copied()
            .find(|id| self.nodes.get(id).is_some_and(|n| n.contains(x, y)))
    }

    pub fn selection(&self) -> Option<NodeId> {
        self.selection
    }

    pub fn select(&mut self, id: Option<NodeId>) {
        if self.selection == id {
            return;
        }
        self.selection = id;
        self.emit(SceneEvent::SelectionChanged(id));
    }

    /// In-progress drag: position updates without committing.
    pub fn move_node(&mut self, id: NodeId, position: Position) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        node.position = position;
        self.emit(SceneEvent::ObjectMoving(id));
        true
    }

    /// Committed move (drag release, keyboard nudge).
    pub fn set_node_position(&mut self, id: NodeId, position: Position) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        node.position = position;
        self.emit(SceneEvent::ObjectModified(id));
        true
    }

    pub fn translate_node(&mut self, id: NodeId, dx: f64, dy: f64) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        let position = Position {
            x: node.position.x + dx,
            y: node.position.y + dy,
        };
        self.set_node_position(id, position)
    }

    pub fn resize_node(&mut self, id: NodeId, size: Size) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        node.size = size;
        self.emit(SceneEvent::ObjectModified(id));
        true
    }

    /// Take all events recorded since the previous drain.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.background = None;
        self.order.clear();
        self.nodes.clear();
        self.meta.clear();
        if self.selection.take().is_some() {
            self.emit(SceneEvent::SelectionChanged(None));
        }
    }

    fn emit(&mut self, event: SceneEvent) {
        if self.mode == SceneMode::Interactive {
            self.events.push(event);
        }
    }
}
